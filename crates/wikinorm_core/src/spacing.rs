use std::sync::LazyLock;

use crate::extract::{Span, SpanRewriter, extract};
use crate::links::link_namespace;
use crate::rules::{RewriteRule, apply_rules};
use crate::title::{NS_FILE, TitleResolver};

// A leading space opens a preformatted block; the indentation after it is
// rewritten as tabs, deepest first.
static INDENT_RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new("indent-8", r"(?m)^ {9}", " \t\t\t\t"),
        RewriteRule::new("indent-6", r"(?m)^ {7}", " \t\t\t"),
        RewriteRule::new("indent-4", r"(?m)^ {5}", " \t\t"),
        RewriteRule::new("indent-2", r"(?m)^ {3}", " \t"),
        RewriteRule::new("four-spaces", r" {4}", "\t"),
        RewriteRule::new("space-runs", r" {2,}", " "),
    ]
});

static LINE_BREAK: LazyLock<RewriteRule> =
    LazyLock::new(|| RewriteRule::new("line-break", r"(?i) *<br */? *> *", "<br>"));

static BLANK_LINE_RUNS: LazyLock<RewriteRule> =
    LazyLock::new(|| RewriteRule::new("blank-line-runs", r"(?m)^\n{2,}", "\n"));

pub fn normalize_spacing<R: TitleResolver + ?Sized>(wikitext: &str, resolver: &R) -> String {
    let padded = pad_blocks(wikitext, resolver);
    let indented = apply_rules(&INDENT_RULES, &padded);
    let stripped = strip_trailing_spaces(&indented);
    let broken = LINE_BREAK.apply(&stripped);
    let collapsed = BLANK_LINE_RUNS.apply(&broken);
    collapsed.trim_matches('\n').to_string()
}

/// Surround block templates, tables and standalone file links with newlines.
/// The blank-line collapse afterwards turns these into single blank lines.
fn pad_blocks<R: TitleResolver + ?Sized>(wikitext: &str, resolver: &R) -> String {
    let text = pad_spans(wikitext, extract("{{", "}}", wikitext), |span, text| {
        span.starts_line(text) && span.ends_line(text)
    });
    let text = pad_spans(&text, extract("{|", "\n|}", &text), |span, text| {
        span.starts_line(text)
    });
    pad_spans(&text, extract("[[", "]]", &text), |span, text| {
        span.starts_line(text)
            && span.ends_line(text)
            && link_namespace(&span.text, resolver) == Some(NS_FILE)
    })
}

fn pad_spans(
    text: &str,
    spans: Vec<Span>,
    is_block: impl Fn(&Span, &str) -> bool,
) -> String {
    let mut rewriter = SpanRewriter::new(text);
    for span in spans {
        if is_block(&span, text) {
            rewriter.replace(&span.text, &format!("\n{}\n", span.text));
        } else {
            rewriter.replace(&span.text, &span.text);
        }
    }
    rewriter.finish()
}

/// A line holding a single space marks an empty preformatted line and keeps
/// it.
fn strip_trailing_spaces(text: &str) -> String {
    text.split('\n')
        .map(|line| if line == " " { line } else { line.trim_end_matches(' ') })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::NamespaceTitleResolver;

    fn fix(input: &str) -> String {
        normalize_spacing(input, &NamespaceTitleResolver::default())
    }

    #[test]
    fn block_templates_and_tables_get_blank_lines() {
        assert_eq!(
            fix("Text\n{{Infobox\n| a = b\n}}\nMore\n{|\n| x\n|}\nEnd"),
            "Text\n\n{{Infobox\n| a = b\n}}\n\nMore\n\n{|\n| x\n|}\n\nEnd"
        );
    }

    #[test]
    fn inline_templates_are_not_padded() {
        assert_eq!(fix("Text {{cite|x}} more\nnext"), "Text {{cite|x}} more\nnext");
    }

    #[test]
    fn standalone_file_links_get_blank_lines() {
        assert_eq!(
            fix("Para\n[[File:A.png|thumb|Cap]]\nPara"),
            "Para\n\n[[File:A.png|thumb|Cap]]\n\nPara"
        );
        assert_eq!(fix("Para\n[[Other page]]\nPara"), "Para\n[[Other page]]\nPara");
    }

    #[test]
    fn preformatted_indentation_becomes_tabs() {
        assert_eq!(fix(" code\n   one\n     two"), " code\n \tone\n \t\ttwo");
        assert_eq!(fix("a    b"), "a\tb");
    }

    #[test]
    fn space_runs_and_trailing_spaces_are_removed() {
        assert_eq!(fix("a  b   \nc"), "a b\nc");
    }

    #[test]
    fn lone_space_line_survives() {
        assert_eq!(fix(" a\n \n b"), " a\n \n b");
    }

    #[test]
    fn line_breaks_are_canonical() {
        assert_eq!(fix("a <br /> b<BR/>c<br >d"), "a<br>b<br>c<br>d");
    }

    #[test]
    fn blank_lines_collapse_and_document_is_trimmed() {
        assert_eq!(fix("\n\na\n\n\n\nb\n\n"), "a\n\nb");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = fix("{{Nav}}\nText  here\n{|\n| x\n|}\n[[File:B.jpg]]");
        assert_eq!(once, "{{Nav}}\n\nText here\n\n{|\n| x\n|}\n\n[[File:B.jpg]]");
        assert_eq!(fix(&once), once);
    }
}
