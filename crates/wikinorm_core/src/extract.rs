/// A top-level balanced occurrence of a delimiter pair, captured by value.
///
/// Spans are not references into the document: passes rewrite the document
/// by replacing a span's original text, so offsets are only meaningful for
/// the text the span was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Span {
    /// True when the span opens a line (or the text).
    pub fn starts_line(&self, source: &str) -> bool {
        self.start == 0 || source[..self.start].ends_with('\n')
    }

    /// True when a newline (or the end of the text) follows the span.
    pub fn ends_line(&self, source: &str) -> bool {
        self.end == source.len() || source[self.end..].starts_with('\n')
    }
}

/// Return every top-level balanced `open`..`close` span of `text`, in order.
///
/// Delimiters are matched as whole strings, one character position at a
/// time, with `open` tested before `close`. A span whose nesting never
/// returns to zero is not emitted. After a span is emitted the search for the
/// next `open` resumes at its final `close`, which keeps nested occurrences
/// out of the result while still finding a span that shares a delimiter
/// character with the previous one.
pub fn extract(open: &str, close: &str, text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    if open.is_empty() || close.is_empty() {
        return spans;
    }
    let open_step = open.chars().next().map_or(1, char::len_utf8);

    let mut search_from = 0usize;
    while let Some(offset) = text[search_from..].find(open) {
        let start = search_from + offset;
        match balanced_end(open, close, text, start) {
            Some(end) => {
                spans.push(Span {
                    start,
                    end,
                    text: text[start..end].to_string(),
                });
                search_from = (end - close.len()).max(start + open_step);
            }
            None => search_from = start + open_step,
        }
    }

    spans
}

fn balanced_end(open: &str, close: &str, text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut cursor = start;

    while cursor < text.len() {
        let rest = &text[cursor..];
        if rest.starts_with(open) {
            depth += 1;
            cursor += open.len();
            continue;
        }
        if rest.starts_with(close) {
            depth = depth.saturating_sub(1);
            cursor += close.len();
            if depth == 0 {
                return Some(cursor);
            }
            continue;
        }
        cursor += rest.chars().next().map_or(1, char::len_utf8);
    }

    None
}

/// Applies span rewrites to a document by content.
///
/// Each original text is replaced at its first occurrence at or after the
/// end of the previous replacement. Feeding spans in extraction order makes
/// that occurrence the span itself; identical text elsewhere in the document
/// is left alone.
#[derive(Debug)]
pub struct SpanRewriter {
    text: String,
    cursor: usize,
}

impl SpanRewriter {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: 0,
        }
    }

    /// Returns false when `original` no longer occurs past the cursor.
    pub fn replace(&mut self, original: &str, fixed: &str) -> bool {
        let Some(offset) = self.text[self.cursor..].find(original) else {
            return false;
        };
        let position = self.cursor + offset;
        if original != fixed {
            self.text
                .replace_range(position..position + original.len(), fixed);
        }
        self.cursor = position + fixed.len();
        true
    }

    pub fn finish(self) -> String {
        self.text
    }
}
