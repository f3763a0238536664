use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::rules::{RewriteRule, apply_rules};
use crate::vault::Vault;

/// How the list pass tells a `#REDIRECT [[...]]` line from a numbered item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectGuard {
    /// A first line starting with `#` and holding a `[[...]]` link is left
    /// alone. Also catches a numbered list whose first item is a link.
    #[default]
    LinkHeuristic,
    /// No protection. Redirect pages must be kept away from the pass by the
    /// caller.
    Disabled,
}

impl RedirectGuard {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkHeuristic => "link-heuristic",
            Self::Disabled => "disabled",
        }
    }
}

static REDIRECT_LINE: LazyLock<RewriteRule> =
    LazyLock::new(|| RewriteRule::new("redirect-line", r"\A#[^\n]*\[\[[^\n]*\]\]", ""));

static LIST_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new("dash-item", r"(?m)^- +", "* "),
        RewriteRule::new("numbered-item", r"(?m)^[0-9]+\. +", "# "),
        RewriteRule::new(
            "marker-run",
            r"(?m)^([*#]) ?([*#])? ?([*#])?",
            "${1}${2}${3}",
        ),
        RewriteRule::new("empty-item", r"(?m)^[*#]+[ \t]*$", ""),
        RewriteRule::new("marker-space", r"(?m)^([*#]+) *", "${1} "),
        RewriteRule::new("contiguous-items", r"(?m)^\n+([*#])", "${1}"),
        RewriteRule::new("blank-before-list", r"(?m)^([^*#\n][^\n]*)\n([*#])", "${1}\n\n${2}"),
        RewriteRule::new("blank-after-list", r"(?m)^([*#][^\n]*)\n([^*#\n])", "${1}\n\n${2}"),
    ]
});

/// Canonicalize `*`/`#` list items and the blank lines around lists.
pub fn normalize_lists(wikitext: &str, guard: RedirectGuard) -> String {
    let mut text = wikitext.to_string();
    let mut vault = Vault::for_text(wikitext);
    if guard == RedirectGuard::LinkHeuristic && REDIRECT_LINE.is_match(&text) {
        let sentinel = vault.stash("#");
        text.replace_range(..1, &sentinel);
    }

    let text = apply_rules(&LIST_RULES, &text);
    vault.restore(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(input: &str) -> String {
        normalize_lists(input, RedirectGuard::LinkHeuristic)
    }

    #[test]
    fn marker_gets_one_space() {
        assert_eq!(fix("*item1\n*item2"), "* item1\n* item2");
        assert_eq!(fix("#   one\n##two"), "# one\n## two");
    }

    #[test]
    fn spaced_markers_collapse_into_one_run() {
        assert_eq!(fix("* * nested\n# * mixed"), "** nested\n#* mixed");
    }

    #[test]
    fn dash_and_number_items_are_converted() {
        assert_eq!(fix("- a\n- b"), "* a\n* b");
        assert_eq!(fix("1. a\n12. b"), "# a\n# b");
        assert_eq!(fix("----"), "----");
    }

    #[test]
    fn empty_items_and_gaps_inside_lists_are_removed() {
        assert_eq!(fix("* a\n*\n\n* b"), "* a\n* b");
    }

    #[test]
    fn lists_are_separated_from_prose() {
        assert_eq!(
            fix("Intro:\n* a\n* b\nOutro"),
            "Intro:\n\n* a\n* b\n\nOutro"
        );
    }

    #[test]
    fn redirect_line_is_protected_by_link_heuristic() {
        let input = "#REDIRECT [[Target page]]";
        assert_eq!(normalize_lists(input, RedirectGuard::LinkHeuristic), input);
        assert_eq!(
            normalize_lists(input, RedirectGuard::Disabled),
            "# REDIRECT [[Target page]]"
        );
    }

    #[test]
    fn link_heuristic_misreads_numbered_list_opening_with_a_link() {
        assert_eq!(
            normalize_lists("#[[a]]\n#b", RedirectGuard::LinkHeuristic),
            "#[[a]]\n\n# b"
        );
        assert_eq!(
            normalize_lists("#[[a]]\n#b", RedirectGuard::Disabled),
            "# [[a]]\n# b"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["text\n*a\n\n*b\nmore", "#x\n#*y\nz", "- a\n1. b"] {
            let once = fix(input);
            assert_eq!(fix(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn redirect_guard_serializes_kebab_case() {
        assert_eq!(RedirectGuard::LinkHeuristic.as_str(), "link-heuristic");
        let parsed: RedirectGuard =
            serde_json::from_str("\"disabled\"").expect("parse redirect guard");
        assert_eq!(parsed, RedirectGuard::Disabled);
    }
}
