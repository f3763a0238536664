use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::lists::RedirectGuard;
use crate::pipeline::{Module, NormalizeOptions};
use crate::title::{NS_MAIN, NamespaceTitleResolver};

pub const DEFAULT_USER_AGENT: &str = "wikinorm/0.1";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "Wikinorm";
pub const DEFAULT_EDIT_SUMMARY: &str = "Normalize wikitext";
pub const DEFAULT_OPT_OUT_PROPERTY: &str = "nowikinorm";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub normalize: NormalizeSection,
    #[serde(default)]
    pub service: ServiceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NormalizeSection {
    pub modules: Option<Vec<Module>>,
    pub namespaces: Option<Vec<i32>>,
    pub redirect_guard: Option<RedirectGuard>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServiceSection {
    pub account: Option<String>,
    pub summary: Option<String>,
    pub opt_out_property: Option<String>,
    pub skip_redirects: Option<bool>,
    pub skip_reverts: Option<bool>,
}

fn env_override(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl NormalizerConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url_owned(&self) -> Option<String> {
        env_override("WIKI_API_URL").or_else(|| self.wiki.api_url.clone())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// The identity normalization edits are saved as, and whose own edits
    /// are never normalized again.
    pub fn service_account(&self) -> String {
        env_override("WIKINORM_SERVICE_ACCOUNT")
            .or_else(|| self.service.account.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string())
    }

    pub fn edit_summary(&self) -> &str {
        self.service
            .summary
            .as_deref()
            .unwrap_or(DEFAULT_EDIT_SUMMARY)
    }

    pub fn opt_out_property(&self) -> &str {
        self.service
            .opt_out_property
            .as_deref()
            .unwrap_or(DEFAULT_OPT_OUT_PROPERTY)
    }

    pub fn skip_redirects(&self) -> bool {
        self.service.skip_redirects.unwrap_or(true)
    }

    pub fn skip_reverts(&self) -> bool {
        self.service.skip_reverts.unwrap_or(true)
    }

    pub fn enabled_modules(&self) -> BTreeSet<Module> {
        match &self.normalize.modules {
            Some(modules) => modules.iter().copied().collect(),
            None => Module::ALL.into_iter().collect(),
        }
    }

    pub fn eligible_namespaces(&self) -> BTreeSet<i32> {
        match &self.normalize.namespaces {
            Some(namespaces) => namespaces.iter().copied().collect(),
            None => BTreeSet::from([NS_MAIN]),
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            modules: self.enabled_modules(),
            redirect_guard: self.normalize.redirect_guard.unwrap_or_default(),
        }
    }

    pub fn title_resolver(&self) -> NamespaceTitleResolver {
        NamespaceTitleResolver::with_custom_namespaces(&self.wiki.custom_namespaces)
    }

    fn validate(&self, config_path: &Path) -> Result<()> {
        for namespace in &self.wiki.custom_namespaces {
            if namespace.name.trim().is_empty() {
                bail!(
                    "custom namespace {} has an empty name in {}",
                    namespace.id,
                    config_path.display()
                );
            }
        }
        if let Some(account) = &self.service.account
            && account.trim().is_empty()
        {
            bail!("[service] account cannot be empty in {}", config_path.display());
        }
        Ok(())
    }
}

/// Load and parse a NormalizerConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<NormalizerConfig> {
    if !config_path.exists() {
        return Ok(NormalizerConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: NormalizerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed.validate(config_path)?;
    Ok(parsed)
}
