//! Cursor over the raw text of a .bvh file.
//!
//! The hierarchy and motion parsers walk the file with these primitives instead of
//! splitting it into lines, since BVH files in the wild freely mix line breaks and
//! spaces between tokens.

use regex::Regex;
use std::sync::OnceLock;

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| {
        Regex::new(r"^[-+]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][-+]?[0-9]+)?")
            .expect("number pattern is valid")
    })
}

fn integer_pattern() -> &'static Regex {
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    INTEGER.get_or_init(|| Regex::new(r"^\+?[0-9]+").expect("integer pattern is valid"))
}

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Cursor {
            text,
            pos: 0,
            line: 1,
        }
    }

    /// Unconsumed part of the text.
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// 1-based line number of the cursor.
    pub fn line(&self) -> usize {
        self.line
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.text[self.pos..self.pos + len];
        self.line += consumed.bytes().filter(|&b| b == b'\n').count();
        self.pos += len;
    }

    pub fn skip_whitespace(&mut self) {
        let len = self
            .rest()
            .find(|c: char| !matches!(c, ' ' | '\t' | '\n' | '\r'))
            .unwrap_or(self.rest().len());
        self.advance(len);
    }

    /// Skip spaces and tabs, staying on the current line.
    pub fn skip_spaces(&mut self) {
        let len = self
            .rest()
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(self.rest().len());
        self.advance(len);
    }

    pub fn at_line_end(&self) -> bool {
        matches!(self.rest().as_bytes().first().copied(), None | Some(b'\n' | b'\r'))
    }

    /// Drop everything up to the end of the current line, then skip whitespace.
    pub fn next_line(&mut self) {
        let len = self
            .rest()
            .find(|c: char| c == '\n' || c == '\r')
            .unwrap_or(self.rest().len());
        self.advance(len);
        self.skip_whitespace();
    }

    /// Consume `key` if the text at the cursor starts with it.
    pub fn keyword(&mut self, key: &str) -> bool {
        if self.rest().starts_with(key) {
            self.advance(key.len());
            true
        } else {
            false
        }
    }

    /// Peek at the next whitespace delimited token without consuming it.
    pub fn peek_token(&self) -> &'a str {
        let rest = self.rest();
        let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        &rest[..len]
    }

    /// Read a floating point literal. The cursor is left in place when there is none.
    pub fn read_f64(&mut self) -> Option<f64> {
        let start = (self.pos, self.line);
        self.skip_whitespace();
        let value = number_pattern()
            .find(self.rest())
            .and_then(|m| m.as_str().parse::<f64>().ok().map(|v| (v, m.end())));
        match value {
            Some((value, len)) => {
                self.advance(len);
                Some(value)
            }
            None => {
                (self.pos, self.line) = start;
                None
            }
        }
    }

    /// Read an unsigned decimal integer. The cursor is left in place when there is none.
    pub fn read_usize(&mut self) -> Option<usize> {
        let start = (self.pos, self.line);
        self.skip_whitespace();
        let value = integer_pattern()
            .find(self.rest())
            .and_then(|m| m.as_str().trim_start_matches('+').parse::<usize>().ok().map(|v| (v, m.end())));
        match value {
            Some((value, len)) => {
                self.advance(len);
                Some(value)
            }
            None => {
                (self.pos, self.line) = start;
                None
            }
        }
    }

    /// Read a joint name: printable, non-whitespace characters up to a brace. May be empty,
    /// and may sit on the line after its keyword.
    pub fn read_identifier(&mut self) -> &'a str {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c.is_control() || c == '{' || c == '}')
            .unwrap_or(rest.len());
        self.advance(len);
        &rest[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers_across_lines() {
        let mut cursor = Cursor::new("  1.5 -2\n\t3e2 .25 +4.");
        assert_eq!(cursor.read_f64(), Some(1.5));
        assert_eq!(cursor.read_f64(), Some(-2.0));
        assert_eq!(cursor.read_f64(), Some(300.0));
        assert_eq!(cursor.read_f64(), Some(0.25));
        assert_eq!(cursor.read_f64(), Some(4.0));
        assert_eq!(cursor.read_f64(), None);
        assert!(cursor.is_eof());
        assert_eq!(cursor.line(), 2);
    }

    #[test]
    fn failed_number_does_not_move() {
        let mut cursor = Cursor::new("  Xrotation");
        assert_eq!(cursor.read_f64(), None);
        assert_eq!(cursor.rest(), "  Xrotation");
        assert_eq!(cursor.read_usize(), None);
    }

    #[test]
    fn keyword_and_next_line() {
        let mut cursor = Cursor::new("OFFSET 1 2 3\r\n  CHANNELS 3");
        assert!(!cursor.keyword("CHANNELS"));
        assert!(cursor.keyword("OFFSET"));
        cursor.next_line();
        assert_eq!(cursor.peek_token(), "CHANNELS");
        assert_eq!(cursor.line(), 2);
    }

    #[test]
    fn identifiers_stop_at_braces() {
        let mut cursor = Cursor::new(" l_hip{");
        assert_eq!(cursor.read_identifier(), "l_hip");
        assert_eq!(cursor.rest(), "{");

        let mut anonymous = Cursor::new("\n{");
        assert_eq!(anonymous.read_identifier(), "");
        assert_eq!(anonymous.rest(), "{");

        let mut next_line = Cursor::new("\r\n  Hips\n{");
        assert_eq!(next_line.read_identifier(), "Hips");
        assert_eq!(next_line.line(), 2);
    }

    #[test]
    fn spaces_stay_on_the_line() {
        let mut cursor = Cursor::new("Yrotation \t\n  JOINT");
        assert!(cursor.keyword("Yrotation"));
        cursor.skip_spaces();
        assert!(cursor.at_line_end());
        cursor.skip_whitespace();
        assert!(!cursor.at_line_end());
        assert_eq!(cursor.peek_token(), "JOINT");
    }
}
