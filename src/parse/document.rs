/// A document split into lines, remembering each line's terminator so that
/// joining it back reproduces the original bytes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLines {
    lines: Vec<Line>,
    /// Whether the last line was followed by a terminator
    trailing_newline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    text: String,
    /// Terminated by `\r\n` rather than `\n`
    crlf: bool,
}

impl DocumentLines {
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return DocumentLines {
                lines: Vec::new(),
                trailing_newline: false,
            };
        }

        let mut pieces: Vec<&str> = text.split('\n').collect();
        let trailing_newline = text.ends_with('\n');
        if trailing_newline {
            pieces.pop();
        }
        let count = pieces.len();

        let lines = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| {
                // Only terminated lines can end in a CRLF pair
                let terminated = i + 1 < count || trailing_newline;
                match piece.strip_suffix('\r') {
                    Some(stripped) if terminated => Line {
                        text: stripped.to_string(),
                        crlf: true,
                    },
                    _ => Line {
                        text: piece.to_string(),
                        crlf: false,
                    },
                }
            })
            .collect();

        DocumentLines {
            lines,
            trailing_newline,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|l| l.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.text.as_str())
    }

    /// Replace one line's text, keeping its terminator. Returns false if the
    /// index is out of range.
    pub fn replace(&mut self, index: usize, text: String) -> bool {
        match self.lines.get_mut(index) {
            Some(line) => {
                line.text = text;
                true
            }
            None => false,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(&line.text);
            if i < last || self.trailing_newline {
                out.push_str(if line.crlf { "\r\n" } else { "\n" });
            }
        }
        out
    }
}

/// Find the line a stored binding points at: the hinted line if it still
/// satisfies `matches`, otherwise the first line that does.
pub fn locate_line(
    doc: &DocumentLines,
    hint: usize,
    matches: impl Fn(&str) -> bool,
) -> Option<usize> {
    if doc.get(hint).is_some_and(&matches) {
        return Some(hint);
    }
    doc.iter().position(|l| matches(l))
}
