use std::collections::BTreeMap;

use crate::config::CustomNamespace;
use crate::text::normalize_spaces;

pub const NS_MEDIA: i32 = -2;
pub const NS_SPECIAL: i32 = -1;
pub const NS_MAIN: i32 = 0;
pub const NS_USER: i32 = 2;
pub const NS_PROJECT: i32 = 4;
pub const NS_FILE: i32 = 6;
pub const NS_MEDIAWIKI: i32 = 8;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_HELP: i32 = 12;
pub const NS_CATEGORY: i32 = 14;
pub const NS_MODULE: i32 = 828;

const CANONICAL_NAMESPACES: &[(&str, i32)] = &[
    ("Media", NS_MEDIA),
    ("Special", NS_SPECIAL),
    ("Talk", 1),
    ("User", NS_USER),
    ("User talk", 3),
    ("Project", NS_PROJECT),
    ("Project talk", 5),
    ("File", NS_FILE),
    ("File talk", 7),
    ("Image", NS_FILE),
    ("Image talk", 7),
    ("MediaWiki", NS_MEDIAWIKI),
    ("MediaWiki talk", 9),
    ("Template", NS_TEMPLATE),
    ("Template talk", 11),
    ("Help", NS_HELP),
    ("Help talk", 13),
    ("Category", NS_CATEGORY),
    ("Category talk", 15),
    ("Module", NS_MODULE),
    ("Module talk", 829),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTitle {
    pub namespace: i32,
    pub text: String,
}

/// Resolves a raw link target to its namespace. `None` marks a title the
/// wiki would refuse to parse.
pub trait TitleResolver {
    fn resolve(&self, raw_title: &str) -> Option<ResolvedTitle>;
}

impl<T: TitleResolver + ?Sized> TitleResolver for &T {
    fn resolve(&self, raw_title: &str) -> Option<ResolvedTitle> {
        (**self).resolve(raw_title)
    }
}

/// Offline resolver backed by a table of namespace names.
#[derive(Debug, Clone)]
pub struct NamespaceTitleResolver {
    namespaces: BTreeMap<String, (String, i32)>,
}

impl Default for NamespaceTitleResolver {
    fn default() -> Self {
        let mut resolver = Self {
            namespaces: BTreeMap::new(),
        };
        for (name, id) in CANONICAL_NAMESPACES {
            resolver.insert(name, *id);
        }
        resolver
    }
}

impl NamespaceTitleResolver {
    pub fn with_custom_namespaces(custom: &[CustomNamespace]) -> Self {
        let mut resolver = Self::default();
        for namespace in custom {
            resolver.insert(&namespace.name, namespace.id);
        }
        resolver
    }

    pub fn insert(&mut self, name: &str, id: i32) {
        let display = normalize_spaces(name);
        if display.is_empty() {
            return;
        }
        self.namespaces
            .insert(display.to_lowercase(), (display, id));
    }

    fn lookup(&self, prefix: &str) -> Option<&(String, i32)> {
        self.namespaces.get(&normalize_spaces(prefix).to_lowercase())
    }
}

impl TitleResolver for NamespaceTitleResolver {
    fn resolve(&self, raw_title: &str) -> Option<ResolvedTitle> {
        let normalized = normalize_spaces(raw_title);
        let title = normalized
            .strip_prefix(':')
            .map(str::trim_start)
            .unwrap_or(&normalized);

        let (name, fragment) = match title.split_once('#') {
            Some((name, fragment)) => (name.trim_end(), Some(fragment)),
            None => (title, None),
        };
        if name.chars().any(is_illegal_title_char) {
            return None;
        }
        if name.is_empty() {
            return fragment.map(|_| ResolvedTitle {
                namespace: NS_MAIN,
                text: title.to_string(),
            });
        }

        if let Some((prefix, rest)) = name.split_once(':')
            && let Some((display, namespace)) = self.lookup(prefix)
        {
            let rest = rest.trim();
            if rest.is_empty() {
                return None;
            }
            return Some(ResolvedTitle {
                namespace: *namespace,
                text: format!("{display}:{rest}"),
            });
        }

        Some(ResolvedTitle {
            namespace: NS_MAIN,
            text: name.to_string(),
        })
    }
}

fn is_illegal_title_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | '[' | ']' | '{' | '}' | '|') || ch.is_control()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace_of(resolver: &NamespaceTitleResolver, title: &str) -> Option<i32> {
        resolver.resolve(title).map(|resolved| resolved.namespace)
    }

    #[test]
    fn canonical_namespaces_resolve_case_insensitively() {
        let resolver = NamespaceTitleResolver::default();
        assert_eq!(namespace_of(&resolver, "File:Foo.jpg"), Some(NS_FILE));
        assert_eq!(namespace_of(&resolver, "image:Foo.jpg"), Some(NS_FILE));
        assert_eq!(namespace_of(&resolver, "category : People"), Some(NS_CATEGORY));
        assert_eq!(namespace_of(&resolver, "User_talk:Someone"), Some(3));
        assert_eq!(namespace_of(&resolver, "Plain title"), Some(NS_MAIN));
    }

    #[test]
    fn unknown_prefixes_stay_in_main_namespace() {
        let resolver = NamespaceTitleResolver::default();
        let resolved = resolver.resolve("Star Wars: Episode IV").expect("resolves");
        assert_eq!(resolved.namespace, NS_MAIN);
        assert_eq!(resolved.text, "Star Wars: Episode IV");
    }

    #[test]
    fn leading_colon_and_fragments() {
        let resolver = NamespaceTitleResolver::default();
        assert_eq!(namespace_of(&resolver, ":File:Foo.jpg"), Some(NS_FILE));
        assert_eq!(namespace_of(&resolver, "#History"), Some(NS_MAIN));
        assert_eq!(namespace_of(&resolver, "Help:Editing#Links"), Some(NS_HELP));
    }

    #[test]
    fn invalid_titles_are_rejected() {
        let resolver = NamespaceTitleResolver::default();
        assert_eq!(namespace_of(&resolver, ""), None);
        assert_eq!(namespace_of(&resolver, "   "), None);
        assert_eq!(namespace_of(&resolver, "{{PAGENAME}}"), None);
        assert_eq!(namespace_of(&resolver, "a]]b"), None);
        assert_eq!(namespace_of(&resolver, "File:"), None);
    }

    #[test]
    fn custom_namespaces_are_registered() {
        let resolver = NamespaceTitleResolver::with_custom_namespaces(&[CustomNamespace {
            name: "Lore".to_string(),
            id: 3000,
        }]);
        let resolved = resolver.resolve("lore:Origins").expect("resolves");
        assert_eq!(resolved.namespace, 3000);
        assert_eq!(resolved.text, "Lore:Origins");
    }
}
