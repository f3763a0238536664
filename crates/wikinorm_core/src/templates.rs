use crate::extract::{Span, SpanRewriter, extract};
use crate::text::{trim_wiki, upper_first};
use crate::vault::Vault;

/// Canonicalize every top-level `{{...}}` transclusion.
///
/// A template whose body has a parameter starting a line (`\n|`) is written
/// in block style, everything else inline. Nested templates are normalized
/// first; nested templates, tables and links are then hidden so their pipes
/// do not split parameters.
pub fn normalize_templates(wikitext: &str) -> String {
    let mut rewriter = SpanRewriter::new(wikitext);
    for span in extract("{{", "}}", wikitext) {
        let fixed = normalize_template(&span.text);
        rewriter.replace(&span.text, &fixed);
    }
    rewriter.finish()
}

fn normalize_template(template: &str) -> String {
    let Some(body) = template
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    else {
        return template.to_string();
    };

    let mut body = normalize_templates(body);
    let mut vault = Vault::for_text(&body);
    let nested = nested_spans(&body);
    vault.hide_spans(&mut body, &nested);

    let block = body.contains("\n|");
    let mut parts = body.split('|').map(trim_wiki);
    let title = parts.next().unwrap_or_default();

    let mut rebuilt = if block {
        upper_first(title)
    } else {
        title.to_string()
    };
    for part in parts {
        let parameter = Parameter::parse(part);
        if block {
            parameter.write_block(&mut rebuilt);
        } else {
            parameter.write_inline(&mut rebuilt);
        }
    }
    if block {
        rebuilt.push('\n');
    }

    format!("{{{{{}}}}}", vault.restore(&rebuilt))
}

fn nested_spans(body: &str) -> Vec<Span> {
    let mut spans = extract("{{", "}}", body);
    spans.extend(extract("{|", "|}", body));
    spans.extend(extract("[[", "]]", body));
    spans
}

#[derive(Debug)]
struct Parameter<'a> {
    key: Option<&'a str>,
    value: &'a str,
}

impl<'a> Parameter<'a> {
    fn parse(part: &'a str) -> Self {
        match part.split_once('=') {
            Some((key, value)) => Self {
                key: Some(trim_wiki(key)),
                value: value.trim_matches(' '),
            },
            None => Self {
                key: None,
                value: part.trim_matches(' '),
            },
        }
    }

    /// Values that already start on a new line, and list items (which must
    /// open a line), are written below their key.
    fn own_line_value(&self) -> Option<&'a str> {
        let stripped = self.value.trim_start_matches(['\n', ' ']);
        (self.value.starts_with('\n') || stripped.starts_with(['*', '#'])).then_some(stripped)
    }

    fn write_inline(&self, out: &mut String) {
        match (self.key, self.own_line_value()) {
            (Some(_), _) if self.value.is_empty() => {}
            (Some(key), Some(list)) => {
                out.push_str(&format!("|{key}=\n{list}"));
            }
            (Some(key), None) => out.push_str(&format!("|{key}={}", self.value)),
            (None, Some(list)) => out.push_str(&format!("|\n{list}")),
            (None, None) => out.push_str(&format!("|{}", self.value)),
        }
    }

    fn write_block(&self, out: &mut String) {
        match (self.key, self.own_line_value()) {
            (Some(_), _) if self.value.is_empty() => {}
            (Some(key), Some(list)) => out.push_str(&format!("\n| {key} =\n{list}")),
            (Some(key), None) => out.push_str(&format!("\n| {key} = {}", self.value)),
            (None, Some(list)) => out.push_str(&format!("\n|\n{list}")),
            (None, None) if self.value.is_empty() => out.push_str("\n|"),
            (None, None) => out.push_str(&format!("\n| {}", self.value)),
        }
    }
}
