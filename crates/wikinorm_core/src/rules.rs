use regex::Regex;

/// One named regex substitution. Passes keep their rules in ordered slices
/// so the order of application is visible in one place.
#[derive(Debug)]
pub struct RewriteRule {
    pub name: &'static str,
    regex: Regex,
    replacement: &'static str,
}

impl RewriteRule {
    pub fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|error| panic!("rewrite rule `{name}` does not compile: {error}"));
        Self {
            name,
            regex,
            replacement,
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn apply(&self, text: &str) -> String {
        self.regex.replace_all(text, self.replacement).into_owned()
    }
}

pub fn apply_rules(rules: &[RewriteRule], text: &str) -> String {
    let mut current = text.to_string();
    for rule in rules {
        let next = rule.apply(&current);
        if next != current {
            tracing::trace!(rule = rule.name, "rewrite rule applied");
            current = next;
        }
    }
    current
}

/// Re-run the whole rule list until the text stops changing. Only for rules
/// that move content strictly in one direction.
pub fn apply_rules_until_stable(rules: &[RewriteRule], text: &str) -> String {
    let mut current = apply_rules(rules, text);
    loop {
        let next = apply_rules(rules, &current);
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_apply_in_order() {
        let rules = [
            RewriteRule::new("double", "a", "aa"),
            RewriteRule::new("mark", "aa", "b"),
        ];
        assert_eq!(apply_rules(&rules, "a-a"), "b-b");
    }

    #[test]
    fn apply_rules_until_stable_converges() {
        let rules = [RewriteRule::new("bubble", "x([.,])", "${1}x")];
        assert_eq!(apply_rules(&rules, "xx."), "x.x");
        assert_eq!(apply_rules_until_stable(&rules, "xx."), ".xx");
    }
}
