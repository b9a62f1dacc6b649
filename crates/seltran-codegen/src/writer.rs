//! Indented line output for generated C.

use std::fmt::Write as _;

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    level: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Write one full line at the current indentation. Empty lines carry no
    /// trailing whitespace.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `head {`, run `body` one level deeper, then close the brace.
    pub fn braced(&mut self, head: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        let head = head.as_ref();
        if head.is_empty() {
            self.line("{");
        } else {
            self.line(format!("{head} {{"));
        }
        self.indent();
        body(self);
        self.dedent();
        self.line("}");
    }

    /// Append text verbatim, ignoring indentation.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    /// Write a `//` comment line. Control characters become `?` and a
    /// trailing backslash is padded so it cannot splice the next line.
    pub fn comment(&mut self, text: &str) {
        let mut safe = String::with_capacity(text.len() + 3);
        safe.push_str("// ");
        for ch in text.chars() {
            if ch.is_control() && ch != '\t' {
                safe.push('?');
            } else {
                safe.push(ch);
            }
        }
        if safe.trim_end().ends_with('\\') {
            safe.push('.');
        }
        self.line(safe);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// `bytes` as the body lines of a C byte-array initializer: `per_line`
/// values each, every value followed by a comma.
pub fn byte_rows(bytes: impl IntoIterator<Item = u8>, per_line: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut in_row = 0;
    for byte in bytes {
        if in_row > 0 {
            row.push(' ');
        }
        let _ = write!(row, "{byte:3},");
        in_row += 1;
        if in_row == per_line {
            rows.push(std::mem::take(&mut row));
            in_row = 0;
        }
    }
    if in_row > 0 {
        rows.push(row);
    }
    rows
}

/// A C string literal for arbitrary bytes.
pub fn c_string_literal(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() + 2);
    s.push('"');
    for &b in bytes {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            b'\n' => s.push_str("\\n"),
            b'\t' => s.push_str("\\t"),
            // `?` escaped so no trigraph can form.
            b'?' => s.push_str("\\?"),
            0x20..=0x7e => s.push(b as char),
            _ => {
                let _ = write!(s, "\\{b:03o}");
            }
        }
    }
    s.push('"');
    s
}
