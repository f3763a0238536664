use std::sync::LazyLock;

use regex::Regex;

use crate::extract::extract;
use crate::rules::RewriteRule;
use crate::text::{is_wiki_padding, normalize_spaces, trim_wiki, upper_first};
use crate::vault::Vault;

static CATEGORY_LINK: LazyLock<RewriteRule> = LazyLock::new(|| {
    RewriteRule::new(
        "category-link",
        r"(?i)\[\[[ \t]*category[ \t]*:[ \t]*([^\[\]|\n]+?)[ \t]*(?:\|([^\[\]\n]*))?\]\]",
        "",
    )
});

#[derive(Debug)]
struct Category {
    name: String,
    rendered: String,
}

/// Move every category link outside templates, comments and `<nowiki>` to
/// the end of the page, one per line, without duplicates.
pub fn normalize_categories(wikitext: &str) -> String {
    let mut text = wikitext.to_string();
    let mut vault = Vault::for_text(wikitext);
    let mut protected = extract("{{", "}}", wikitext);
    protected.extend(extract("<!--", "-->", wikitext));
    protected.extend(extract("<nowiki>", "</nowiki>", wikitext));
    vault.hide_spans(&mut text, &protected);
    if !CATEGORY_LINK.is_match(&text) {
        return wikitext.to_string();
    }

    let mut categories: Vec<Category> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if !CATEGORY_LINK.is_match(line) {
            lines.push(line.to_string());
            continue;
        }

        collect_categories(CATEGORY_LINK.regex(), line, &mut categories);
        let stripped = CATEGORY_LINK.apply(line);
        if trim_wiki(&stripped).is_empty() {
            while lines.last().is_some_and(|previous| trim_wiki(previous).is_empty()) {
                lines.pop();
            }
        } else {
            lines.push(stripped.trim_end().to_string());
        }
    }

    let body = lines.join("\n");
    let body = body.trim_end_matches(is_wiki_padding);
    let footer = categories
        .iter()
        .map(|category| category.rendered.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let rebuilt = if body.is_empty() {
        footer
    } else {
        format!("{body}\n\n{footer}")
    };
    vault.restore(&rebuilt)
}

fn collect_categories(pattern: &Regex, line: &str, categories: &mut Vec<Category>) {
    for captures in pattern.captures_iter(line) {
        let name = upper_first(&normalize_spaces(&captures[1]));
        if categories.iter().any(|category| category.name == name) {
            continue;
        }
        let rendered = match captures.get(2) {
            Some(sort_key) => format!("[[Category:{name}|{}]]", sort_key.as_str()),
            None => format!("[[Category:{name}]]"),
        };
        categories.push(Category { name, rendered });
    }
}
