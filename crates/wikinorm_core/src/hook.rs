use anyhow::Result;
use serde::Serialize;

use crate::config::NormalizerConfig;
use crate::pipeline::Normalizer;
use crate::store::{CONTENT_MODEL_WIKITEXT, EditFlags, EditRequest, PageStore, StoredPage};
use crate::text::{normalize_spaces, upper_first};
use crate::title::TitleResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    ContentModel,
    Namespace,
    Redirect,
    OptedOut,
    SelfEdit,
    Revert,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentModel => "content-model",
            Self::Namespace => "namespace",
            Self::Redirect => "redirect",
            Self::OptedOut => "opted-out",
            Self::SelfEdit => "self-edit",
            Self::Revert => "revert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Missing,
    Skipped {
        reason: SkipReason,
    },
    Unchanged,
    Pending {
        original: String,
        normalized: String,
    },
    Saved {
        revision_id: Option<i64>,
        original: String,
        normalized: String,
    },
}

/// Decide whether the latest revision of `page` may be normalized.
///
/// `editor` is the account that made the triggering edit; without one the
/// page's last editor is used.
pub fn decide(
    page: &StoredPage,
    editor: Option<&str>,
    config: &NormalizerConfig,
) -> Result<(), SkipReason> {
    if !page.is_wikitext() {
        return Err(SkipReason::ContentModel);
    }
    if !config.eligible_namespaces().contains(&page.namespace) {
        return Err(SkipReason::Namespace);
    }
    if config.skip_redirects() && page.is_redirect {
        return Err(SkipReason::Redirect);
    }
    if page.opted_out {
        return Err(SkipReason::OptedOut);
    }
    if let Some(editor) = editor.or(page.last_editor.as_deref())
        && same_account(editor, &config.service_account())
    {
        return Err(SkipReason::SelfEdit);
    }
    if config.skip_reverts() && page.is_revert {
        return Err(SkipReason::Revert);
    }
    Ok(())
}

/// Load `title`, normalize it when policy allows, and save the result as the
/// service account when `save` is set. Unchanged text is never saved.
pub fn normalize_page<S, R>(
    store: &mut S,
    normalizer: &Normalizer<R>,
    config: &NormalizerConfig,
    title: &str,
    editor: Option<&str>,
    save: bool,
) -> Result<PageOutcome>
where
    S: PageStore + ?Sized,
    R: TitleResolver,
{
    let Some(page) = store.load_page(title)? else {
        tracing::info!(title, "page does not exist");
        return Ok(PageOutcome::Missing);
    };

    if let Err(reason) = decide(&page, editor, config) {
        tracing::info!(title = %page.title, reason = reason.as_str(), "skipping page");
        return Ok(PageOutcome::Skipped { reason });
    }

    let normalized = normalizer.normalize(&page.text);
    if normalized == page.text {
        tracing::info!(title = %page.title, "page is already normalized");
        return Ok(PageOutcome::Unchanged);
    }
    if !save {
        return Ok(PageOutcome::Pending {
            original: page.text,
            normalized,
        });
    }

    let request = EditRequest {
        title: page.title.clone(),
        text: normalized.clone(),
        summary: config.edit_summary().to_string(),
        author: config.service_account(),
        base_revision_id: Some(page.revision_id),
        base_timestamp: Some(page.timestamp.clone()),
        flags: EditFlags::service(),
    };
    let saved = store.save_page(&request)?;
    if saved.no_change {
        tracing::warn!(title = %page.title, "wiki reported no change; nothing saved");
        return Ok(PageOutcome::Unchanged);
    }
    tracing::info!(
        title = %saved.title,
        revision_id = ?saved.revision_id,
        "saved normalized page"
    );
    Ok(PageOutcome::Saved {
        revision_id: saved.revision_id,
        original: page.text,
        normalized,
    })
}

/// Pre-save transform: normalize text that is about to be saved when its
/// content model and namespace are eligible, otherwise return it unchanged.
pub fn transform_on_save<R: TitleResolver>(
    namespace: i32,
    content_model: &str,
    text: &str,
    normalizer: &Normalizer<R>,
    config: &NormalizerConfig,
) -> String {
    if content_model != CONTENT_MODEL_WIKITEXT
        || !config.eligible_namespaces().contains(&namespace)
    {
        return text.to_string();
    }
    normalizer.normalize(text)
}

fn same_account(left: &str, right: &str) -> bool {
    upper_first(&normalize_spaces(left)) == upper_first(&normalize_spaces(right))
}
