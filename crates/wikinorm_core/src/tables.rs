use std::sync::LazyLock;

use crate::extract::{SpanRewriter, extract};
use crate::rules::{RewriteRule, apply_rules};

// Flattening runs before marker spacing, and spacing before bold stripping.
static TABLE_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new("flatten-headers", r"!!", "\n!"),
        RewriteRule::new("flatten-cells", r"\|\|", "\n|"),
        RewriteRule::new("header-space", r"(?m)^!([^ \n])", "! ${1}"),
        RewriteRule::new("caption-space", r"(?m)^\|\+([^ \n])", "|+ ${1}"),
        RewriteRule::new("row-space", r"(?m)^\|-([^ \n-])", "|- ${1}"),
        RewriteRule::new("cell-space", r"(?m)^\|([^ \n}+-])", "| ${1}"),
        RewriteRule::new("empty-caption", r"(?m)^\|\+ *\n", ""),
        RewriteRule::new("row-after-caption", r"(?m)^(\|\+[^\n]+)\n\|-[ \t]*$", "${1}"),
        RewriteRule::new(
            "caption-bold",
            r"(?m)^\|\+ *'''([^'\n]+)''' *$",
            "|+ ${1}",
        ),
        RewriteRule::new("header-bold", r"(?m)^! *'''([^'\n]+)''' *$", "! ${1}"),
        RewriteRule::new("pseudo-header", r"(?m)^\| *'''([^'\n]+)''' *$", "! ${1}"),
        RewriteRule::new("leading-row", r"\A(\{\|[^\n]*\n)\|-[ \t]*\n", "${1}"),
        RewriteRule::new("trailing-row", r"\n\|-[ \t]*\n\|\}\z", "\n|}"),
    ]
});

/// Canonicalize every `{| ... |}` wikitable: one cell marker per line, one
/// space after each marker, no redundant row separators, bold pseudo-headers
/// promoted to real headers.
pub fn normalize_tables(wikitext: &str) -> String {
    let mut rewriter = SpanRewriter::new(wikitext);
    for span in extract("{|", "\n|}", wikitext) {
        let fixed = apply_rules(&TABLE_RULES, &span.text);
        rewriter.replace(&span.text, &fixed);
    }
    rewriter.finish()
}
