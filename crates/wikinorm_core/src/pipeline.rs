use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::categories::normalize_categories;
use crate::extract::extract;
use crate::links::normalize_links;
use crate::lists::{RedirectGuard, normalize_lists};
use crate::references::normalize_references;
use crate::sections::normalize_sections;
use crate::spacing::normalize_spacing;
use crate::tables::normalize_tables;
use crate::templates::normalize_templates;
use crate::title::{NamespaceTitleResolver, TitleResolver};
use crate::vault::Vault;

/// One normalization pass. Declaration order is execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Templates,
    Tables,
    Links,
    References,
    Lists,
    Sections,
    Categories,
    Spacing,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Templates,
        Module::Tables,
        Module::Links,
        Module::References,
        Module::Lists,
        Module::Sections,
        Module::Categories,
        Module::Spacing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Templates => "templates",
            Self::Tables => "tables",
            Self::Links => "links",
            Self::References => "references",
            Self::Lists => "lists",
            Self::Sections => "sections",
            Self::Categories => "categories",
            Self::Spacing => "spacing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub modules: BTreeSet<Module>,
    pub redirect_guard: RedirectGuard,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            modules: Module::ALL.into_iter().collect(),
            redirect_guard: RedirectGuard::default(),
        }
    }
}

impl NormalizeOptions {
    pub fn only(modules: impl IntoIterator<Item = Module>) -> Self {
        Self {
            modules: modules.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self, module: Module) -> bool {
        self.modules.contains(&module)
    }
}

/// The pass pipeline. Holds no per-document state, so one instance can be
/// shared across threads when its resolver allows it.
#[derive(Debug, Clone, Default)]
pub struct Normalizer<R = NamespaceTitleResolver> {
    options: NormalizeOptions,
    resolver: R,
}

impl<R: TitleResolver> Normalizer<R> {
    pub fn new(options: NormalizeOptions, resolver: R) -> Self {
        Self { options, resolver }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Run every enabled pass in order. `<html>...</html>` islands are
    /// hidden from all passes and come back byte for byte.
    pub fn normalize(&self, wikitext: &str) -> String {
        let mut document = wikitext.to_string();
        let mut islands = Vault::for_text(wikitext);
        islands.hide_spans(&mut document, &extract("<html>", "</html>", wikitext));

        for module in Module::ALL {
            if !self.options.is_enabled(module) {
                continue;
            }
            let before = document.len();
            document = self.run_pass(module, &document);
            tracing::debug!(
                pass = module.as_str(),
                delta = document.len() as i64 - before as i64,
                "normalization pass finished"
            );
        }

        islands.restore(&document)
    }

    fn run_pass(&self, module: Module, document: &str) -> String {
        match module {
            Module::Templates => normalize_templates(document),
            Module::Tables => normalize_tables(document),
            Module::Links => normalize_links(document, &self.resolver),
            Module::References => normalize_references(document),
            Module::Lists => normalize_lists(document, self.options.redirect_guard),
            Module::Sections => normalize_sections(document),
            Module::Categories => normalize_categories(document),
            Module::Spacing => normalize_spacing(document, &self.resolver),
        }
    }
}

/// Normalize with every pass enabled and the built-in namespace table.
pub fn normalize(wikitext: &str) -> String {
    Normalizer::<NamespaceTitleResolver>::default().normalize(wikitext)
}
