use std::sync::LazyLock;

use crate::rules::{RewriteRule, apply_rules, apply_rules_until_stable};
use crate::text::trim_wiki;

static HEADING_LAYOUT_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new(
            "heading-spacing",
            r"(?m)^(=+) *([^\n]*?[^=\s][^\n]*?) *(=+) *$",
            "\n\n${1} ${2} ${3}\n\n",
        ),
        RewriteRule::new("blank-line-runs", r"\n\n\n+", "\n\n"),
    ]
});

static HEADING_TEXT_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new("heading-bold", r"(?m)^(=+) '''(.+?)''' (=+)$", "${1} ${2} ${3}"),
        RewriteRule::new("heading-colon", r"(?m)^(=+) (.+?): (=+)$", "${1} ${2} ${3}"),
    ]
});

/// Canonicalize `== Heading ==` lines and the blank lines around them.
pub fn normalize_sections(wikitext: &str) -> String {
    let laid_out = apply_rules(&HEADING_LAYOUT_RULES, wikitext);
    apply_rules_until_stable(&HEADING_TEXT_RULES, trim_wiki(&laid_out))
}
