use crate::extract::{Span, SpanRewriter, extract};
use crate::text::{lower_first, trim_wiki, upper_first};
use crate::title::{NS_CATEGORY, NS_FILE, TitleResolver};
use crate::vault::Vault;

/// Canonicalize every top-level `[[...]]` link.
///
/// Links whose title the resolver rejects are left exactly as written.
pub fn normalize_links<R: TitleResolver + ?Sized>(wikitext: &str, resolver: &R) -> String {
    let mut rewriter = SpanRewriter::new(wikitext);
    for span in extract("[[", "]]", wikitext) {
        let fixed = normalize_link(&span.text, resolver).unwrap_or_else(|| span.text.clone());
        rewriter.replace(&span.text, &fixed);
    }
    rewriter.finish()
}

/// Namespace of the page a `[[...]]` span points at.
pub(crate) fn link_namespace<R: TitleResolver + ?Sized>(link: &str, resolver: &R) -> Option<i32> {
    let parts = LinkParts::split(link)?;
    resolver
        .resolve(&clean_title(&parts.title))
        .map(|resolved| resolved.namespace)
}

fn normalize_link<R: TitleResolver + ?Sized>(link: &str, resolver: &R) -> Option<String> {
    let parts = LinkParts::split(link)?;

    let bare_title = trim_wiki(&parts.title);
    if bare_title.starts_with("http://") || bare_title.starts_with("https://") {
        let inner = link.strip_prefix("[[")?.strip_suffix("]]")?;
        return Some(format!("[{}]", trim_wiki(inner)));
    }

    let title = clean_title(&parts.title);
    let resolved = resolver.resolve(&title)?;

    let rebuilt = if resolved.namespace == NS_FILE {
        file_link(&title, &parts.params, resolver)
    } else if resolved.namespace == NS_CATEGORY
        && !title.starts_with(':')
        && !parts.params.is_empty()
    {
        // Sort keys are significant down to a single space.
        format!("{title}|{}", parts.params.join("|"))
    } else if !parts.params.is_empty() {
        alias_link(&title, &parts.params.join("|"))
    } else {
        title
    };

    Some(format!("[[{rebuilt}]]"))
}

fn file_link<R: TitleResolver + ?Sized>(title: &str, params: &[String], resolver: &R) -> String {
    let params = params
        .iter()
        .map(|param| normalize_links(trim_wiki(param), resolver))
        .filter(|param| param != "alt=")
        .collect::<Vec<_>>();

    let mut rebuilt = title.to_string();
    let mut index = 0usize;
    while index < params.len() {
        let param = params[index].as_str();
        let next = params.get(index + 1).map(String::as_str);
        if matches!((param, next), ("thumb", Some("right")) | ("right", Some("thumb"))) {
            rebuilt.push_str("|thumb");
            index += 2;
            continue;
        }
        rebuilt.push('|');
        rebuilt.push_str(param);
        index += 1;
    }
    rebuilt
}

fn alias_link(title: &str, alias: &str) -> String {
    let alias = trim_wiki(alias);
    let title = upper_first(title);
    if alias == title || alias == lower_first(&title) {
        alias.to_string()
    } else {
        format!("{title}|{alias}")
    }
}

/// `trim`, percent-decode and `_` → space. A title with malformed escapes
/// keeps its escapes.
fn clean_title(raw: &str) -> String {
    let trimmed = trim_wiki(raw);
    let decoded = match urlencoding::decode(trimmed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => trimmed.to_string(),
    };
    decoded.replace('_', " ")
}

/// A link body split at its top-level pipes. Pipes inside nested links and
/// templates belong to those and are not split on.
struct LinkParts {
    title: String,
    params: Vec<String>,
}

impl LinkParts {
    fn split(link: &str) -> Option<Self> {
        let body = link.strip_prefix("[[")?.strip_suffix("]]")?;

        let mut hidden = body.to_string();
        let mut vault = Vault::for_text(body);
        let mut nested: Vec<Span> = extract("[[", "]]", body);
        nested.extend(extract("{{", "}}", body));
        vault.hide_spans(&mut hidden, &nested);

        let mut pieces = hidden.split('|').map(|piece| vault.restore(piece));
        let title = pieces.next().unwrap_or_default();
        Some(Self {
            title,
            params: pieces.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::NamespaceTitleResolver;

    fn fix(input: &str) -> String {
        normalize_links(input, &NamespaceTitleResolver::default())
    }

    #[test]
    fn alias_matching_title_collapses() {
        assert_eq!(fix("[[foo|foo]]"), "[[foo]]");
        assert_eq!(fix("[[Foo|foo]]"), "[[foo]]");
        assert_eq!(fix("[[foo bar|Foo bar]]"), "[[Foo bar]]");
    }

    #[test]
    fn alias_links_are_title_cased_and_trimmed() {
        assert_eq!(fix("[[ foo | the foo ]]"), "[[Foo|the foo]]");
    }

    #[test]
    fn plain_links_are_decoded_and_spaced() {
        assert_eq!(fix("[[ Fo%C3%B3_bar ]]"), "[[Foó bar]]");
        assert_eq!(fix("see [[Main_Page]]."), "see [[Main Page]].");
    }

    #[test]
    fn malformed_escapes_stay_verbatim() {
        assert_eq!(fix("[[100%_pure]]"), "[[100% pure]]");
        assert_eq!(fix("[[Bad%FFbyte]]"), "[[Bad%FFbyte]]");
    }

    #[test]
    fn double_bracketed_urls_become_external_links() {
        assert_eq!(
            fix("[[https://example.org Example]]"),
            "[https://example.org Example]"
        );
        assert_eq!(
            fix("[[ https://example.org Example ]]"),
            "[https://example.org Example]"
        );
    }

    #[test]
    fn category_sort_keys_are_kept_verbatim() {
        assert_eq!(fix("[[Category:People| ]]"), "[[Category:People| ]]");
        assert_eq!(
            fix("[[Category:Tall_people|Smith, John]]"),
            "[[Category:Tall people|Smith, John]]"
        );
        assert_eq!(fix("[[:Category:People| people ]]"), "[[:Category:People|people]]");
    }

    #[test]
    fn unresolvable_titles_are_untouched() {
        assert_eq!(fix("[[ {{PAGENAME}} | x ]]"), "[[ {{PAGENAME}} | x ]]");
        assert_eq!(fix("[[File:]]"), "[[File:]]");
    }

    #[test]
    fn file_links_keep_parameters_and_fix_nested_links() {
        assert_eq!(
            fix("[[File:Foo.jpg| thumb | right |alt=| A [[sub_link]] caption ]]"),
            "[[File:Foo.jpg|thumb|A [[sub link]] caption]]"
        );
        assert_eq!(
            fix("[[Image:Foo.jpg|right|thumb|Caption]]"),
            "[[Image:Foo.jpg|thumb|Caption]]"
        );
    }

    #[test]
    fn alias_keeps_nested_template_pipes() {
        assert_eq!(fix("[[foo|{{small|a|b}}]]"), "[[Foo|{{small|a|b}}]]");
    }

    #[test]
    fn identical_links_are_each_fixed_once() {
        assert_eq!(fix("[[a_b]] and [[a_b]]"), "[[a b]] and [[a b]]");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "[[foo|foo]]",
            "[[ foo | bar ]]",
            "[[File:X.png|thumb|right|[[a_b|c]]]]",
            "[[http://x.org]]",
            "[[ https://example.org Example ]]",
            "[[Category:People| ]]",
        ] {
            let once = fix(input);
            assert_eq!(fix(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn link_namespace_sees_through_nested_markup() {
        let resolver = NamespaceTitleResolver::default();
        assert_eq!(link_namespace("[[File:A.png|[[b|c]]]]", &resolver), Some(NS_FILE));
        assert_eq!(link_namespace("[[Text]]", &resolver), Some(0));
    }
}
