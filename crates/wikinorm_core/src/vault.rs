use crate::extract::Span;

const FENCE_CHAR: char = '\u{1}';

/// Short-lived sentinel table used to hide markup from a rewrite.
///
/// Sentinels are `<fence><key><fence>`, where the fence is the shortest run
/// of U+0001 that does not occur in the text the vault was created for. No
/// sentinel can therefore collide with content already in that text.
#[derive(Debug, Clone)]
pub struct Vault {
    fence: String,
    entries: Vec<(String, String)>,
}

impl Vault {
    pub fn for_text(text: &str) -> Self {
        let mut fence = FENCE_CHAR.to_string();
        while text.contains(&fence) {
            fence.push(FENCE_CHAR);
        }
        Self {
            fence,
            entries: Vec::new(),
        }
    }

    /// Record `original` and return the sentinel that stands for it.
    pub fn stash(&mut self, original: &str) -> String {
        let sentinel = format!("{}{}{}", self.fence, self.entries.len(), self.fence);
        debug_assert!(!original.contains(&sentinel));
        self.entries.push((sentinel.clone(), original.to_string()));
        sentinel
    }

    /// Replace the first occurrence of `original` in `text` with a fresh
    /// sentinel. Returns false (and records nothing) when it does not occur.
    pub fn hide(&mut self, text: &mut String, original: &str) -> bool {
        if original.is_empty() {
            return false;
        }
        let Some(position) = text.find(original) else {
            return false;
        };
        let sentinel = self.stash(original);
        text.replace_range(position..position + original.len(), &sentinel);
        true
    }

    /// Hide spans, skipping any span that lies inside an earlier one so the
    /// outermost construct is always the one protected.
    pub fn hide_spans(&mut self, text: &mut String, spans: &[Span]) -> usize {
        let mut ordered = spans.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|span| (span.start, std::cmp::Reverse(span.end)));

        let mut covered_until = 0usize;
        let mut hidden = 0usize;
        for span in ordered {
            if span.start < covered_until {
                continue;
            }
            covered_until = span.end;
            if self.hide(text, &span.text) {
                hidden += 1;
            }
        }
        hidden
    }

    pub fn restore(&self, text: &str) -> String {
        let mut restored = text.to_string();
        for (sentinel, original) in self.entries.iter().rev() {
            if restored.contains(sentinel.as_str()) {
                restored = restored.replace(sentinel.as_str(), original);
            }
        }
        restored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    #[test]
    fn hide_and_restore_round_trip() {
        let source = "{{a|[[b|c]]|d}}";
        let mut text = source.to_string();
        let mut vault = Vault::for_text(&text);
        assert!(vault.hide(&mut text, "[[b|c]]"));
        assert!(!text.contains("[[b|c]]"));
        assert_eq!(text.matches('|').count(), 2);
        assert_eq!(vault.restore(&text), source);
    }

    #[test]
    fn identical_spans_hide_both_occurrences() {
        let mut text = "[[x]] and [[x]]".to_string();
        let spans = extract("[[", "]]", &text);
        let mut vault = Vault::for_text(&text);
        assert_eq!(vault.hide_spans(&mut text, &spans), 2);
        assert!(!text.contains("[[x]]"));
        assert_eq!(vault.len(), 2);
        assert_eq!(vault.restore(&text), "[[x]] and [[x]]");
    }

    #[test]
    fn fence_grows_past_existing_control_characters() {
        let source = "odd \u{1}0\u{1} text [[a]]";
        let mut text = source.to_string();
        let mut vault = Vault::for_text(&text);
        assert!(vault.hide(&mut text, "[[a]]"));
        assert!(text.contains("\u{1}\u{1}0\u{1}\u{1}"));
        assert_eq!(vault.restore(&text), source);
    }

    #[test]
    fn nested_spans_defer_to_their_container() {
        let source = "[[a|{{b}}]] {{c}}";
        let mut text = source.to_string();
        let mut spans = extract("{{", "}}", source);
        spans.extend(extract("[[", "]]", source));
        let mut vault = Vault::for_text(&text);
        assert_eq!(vault.hide_spans(&mut text, &spans), 2);
        assert!(!text.contains('|'));
        assert_eq!(vault.restore(&text), source);
    }

    #[test]
    fn missing_original_records_nothing() {
        let mut text = "plain".to_string();
        let mut vault = Vault::for_text(&text);
        assert!(!vault.hide(&mut text, "[[gone]]"));
        assert!(vault.is_empty());
    }
}
