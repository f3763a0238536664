use std::sync::LazyLock;

use crate::rules::{RewriteRule, apply_rules, apply_rules_until_stable};

// `<ref` must be followed by whitespace, `>` or `/` so `<references />` is
// never matched.
static REFERENCE_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new("name-spacing", r"<ref +name *= *", "<ref name="),
        RewriteRule::new("self-closing-space", r"<ref(\s[^>]*[^\s/>])/>", "<ref${1} />"),
        RewriteRule::new(
            "single-quoted-name",
            r"<ref name=' *([^'\n]+?) *'",
            r#"<ref name="${1}""#,
        ),
        RewriteRule::new("bare-name", r#"<ref name=([^"'\s/>]+)"#, r#"<ref name="${1}""#),
        RewriteRule::new("open-inner-space", r"<ref((?:\s[^>/]*)?)>[ \n]+", "<ref${1}>"),
        RewriteRule::new(
            "empty-named",
            r#"<ref name="([^"]+)"></ref>"#,
            r#"<ref name="${1}" />"#,
        ),
        RewriteRule::new("empty", r"<ref></ref>", ""),
        RewriteRule::new("open-outer-space", r" *<ref((?:\s[^>/]*)?)>[ \n]*", "<ref${1}>"),
        RewriteRule::new("self-closing-outer-space", r" +<ref(\s[^<>]*/>)", "<ref${1}"),
        RewriteRule::new("close-inner-space", r"[ \n]+</ref>", "</ref>"),
    ]
});

static PUNCTUATION_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new(
            "punctuation-before-paired",
            r"<ref((?:\s[^<>]*)?>[^<]*)</ref>([.,;:])",
            "${2}<ref${1}</ref>",
        ),
        RewriteRule::new(
            "punctuation-before-self-closing",
            r"<ref(\s[^<>]*)/>([.,;:])",
            "${2}<ref${1}/>",
        ),
    ]
});

/// Canonicalize `<ref>` tags and move them after adjacent punctuation.
pub fn normalize_references(wikitext: &str) -> String {
    let spaced = apply_rules(&REFERENCE_RULES, wikitext);
    apply_rules_until_stable(&PUNCTUATION_RULES, &spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_named_reference_becomes_self_closing() {
        assert_eq!(normalize_references("<ref name=foo></ref>"), r#"<ref name="foo" />"#);
    }

    #[test]
    fn names_are_double_quoted() {
        assert_eq!(
            normalize_references("a<ref name = 'Smith 2001' >x</ref>"),
            r#"a<ref name="Smith 2001" >x</ref>"#
        );
        assert_eq!(
            normalize_references("a<ref name=smith/>"),
            r#"a<ref name="smith" />"#
        );
    }

    #[test]
    fn whitespace_inside_and_around_tags_is_stripped() {
        assert_eq!(
            normalize_references("Claim <ref>\n  Source \n</ref> more"),
            "Claim<ref>Source</ref> more"
        );
    }

    #[test]
    fn reference_opening_a_line_stays_on_its_line() {
        assert_eq!(
            normalize_references("Claim\n<ref>x</ref>"),
            "Claim\n<ref>x</ref>"
        );
        assert_eq!(
            normalize_references("Claim  <ref>x</ref>"),
            "Claim<ref>x</ref>"
        );
    }

    #[test]
    fn empty_references_are_deleted() {
        assert_eq!(normalize_references("a<ref></ref> b"), "a b");
    }

    #[test]
    fn references_move_after_punctuation() {
        assert_eq!(
            normalize_references("Fact<ref>A</ref><ref name=\"b\" />."),
            "Fact.<ref>A</ref><ref name=\"b\" />"
        );
        assert_eq!(
            normalize_references("One<ref>x</ref>, two"),
            "One,<ref>x</ref> two"
        );
    }

    #[test]
    fn references_list_tag_is_untouched() {
        let input = "== Notes ==\n<references />\n<references>\n</references>";
        assert_eq!(normalize_references(input), input);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_references("x <ref name = a>\nb\n</ref>. y <ref name='c'/>;");
        assert_eq!(once, "x.<ref name=\"a\">b</ref> y;<ref name=\"c\" />");
        assert_eq!(normalize_references(&once), once);
    }
}
