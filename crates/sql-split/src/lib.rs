//! Statement splitting for MySQL script files
//!
//! Turns the text of a `.sql` seed or `mysqldump` file into the individual
//! statements a client has to send one by one. Splitting follows what the
//! `mysql` command line client does:
//!
//! - the active delimiter (`;` unless changed) ends a statement
//! - delimiters inside `'...'`, `"..."` and `` `...` `` do not split; doubled
//!   quotes and backslash escapes are honoured
//! - `-- `, `#` and `/* */` comments are dropped
//! - executable comments (`/*! ... */`, `/*+ ... */`) are statement content
//! - `DELIMITER <token>` lines switch the delimiter and are not emitted
//! - statements with nothing but whitespace or comments are skipped

use std::io;
use std::path::Path;

const DEFAULT_DELIMITER: &str = ";";
const DELIMITER_KEYWORD: &str = "delimiter";

/// Split a MySQL script into individual statements, without their delimiters.
pub fn split_statements(input: &str) -> Vec<String> {
    Splitter::new(input).run()
}

/// Read a script file and split it into statements.
pub fn split_file(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(split_statements(&contents))
}

struct Splitter {
    chars: Vec<char>,
    pos: usize,
    delimiter: Vec<char>,
    current: String,
    has_content: bool,
    /// Nothing but whitespace and plain comments since the last newline.
    at_line_start: bool,
    statements: Vec<String>,
}

impl Splitter {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            delimiter: DEFAULT_DELIMITER.chars().collect(),
            current: String::new(),
            has_content: false,
            at_line_start: true,
            statements: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<String> {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];

            if !self.has_content && self.at_delimiter_directive() {
                self.consume_delimiter_directive();
                continue;
            }

            if self.starts_with_delimiter() {
                self.at_line_start = false;
                self.pos += self.delimiter.len();
                self.finish_statement();
                continue;
            }

            match ch {
                '-' if self.peek(1) == Some('-')
                    && self.peek(2).map_or(true, char::is_whitespace) =>
                {
                    self.skip_line();
                }
                '#' => self.skip_line(),
                '/' if self.peek(1) == Some('*') => {
                    if matches!(self.peek(2), Some('!') | Some('+')) {
                        self.consume_executable_comment();
                    } else {
                        self.skip_block_comment();
                    }
                }
                '\'' | '"' | '`' => self.consume_quoted(ch),
                _ => {
                    if ch == '\n' {
                        self.at_line_start = true;
                    } else if !ch.is_whitespace() {
                        self.has_content = true;
                        self.at_line_start = false;
                    }
                    self.current.push(ch);
                    self.pos += 1;
                }
            }
        }

        self.finish_statement();
        self.statements
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with_delimiter(&self) -> bool {
        self.chars[self.pos..].starts_with(&self.delimiter)
    }

    fn finish_statement(&mut self) {
        let statement = self.current.trim();
        if self.has_content && !statement.is_empty() {
            self.statements.push(statement.to_string());
        }
        self.current.clear();
        self.has_content = false;
    }

    /// `DELIMITER` is only recognised as the first word on its line, ignoring
    /// comments before it.
    fn at_delimiter_directive(&self) -> bool {
        if !self.at_line_start {
            return false;
        }

        let keyword_len = DELIMITER_KEYWORD.len();
        let Some(word) = self.chars.get(self.pos..self.pos + keyword_len) else {
            return false;
        };
        let word: String = word.iter().collect();
        word.eq_ignore_ascii_case(DELIMITER_KEYWORD)
            && self
                .chars
                .get(self.pos + keyword_len)
                .is_some_and(|c| c.is_whitespace())
    }

    fn consume_delimiter_directive(&mut self) {
        let start = self.pos + DELIMITER_KEYWORD.len();
        let end = self.chars[start..]
            .iter()
            .position(|c| *c == '\n')
            .map_or(self.chars.len(), |offset| start + offset);
        let rest: String = self.chars[start..end].iter().collect();

        if let Some(token) = rest.split_whitespace().next() {
            self.delimiter = token.chars().collect();
        }
        self.current.clear();
        self.pos = end;
    }

    fn skip_line(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.chars.len() {
            if self.chars[self.pos] == '*' && self.peek(1) == Some('/') {
                self.pos += 2;
                break;
            }
            self.pos += 1;
        }
        // keeps `SELECT/**/1` from collapsing into one token
        self.current.push(' ');
    }

    fn consume_executable_comment(&mut self) {
        self.has_content = true;
        self.at_line_start = false;
        self.current.push_str("/*");
        self.pos += 2;
        while self.pos < self.chars.len() {
            if self.chars[self.pos] == '*' && self.peek(1) == Some('/') {
                self.current.push_str("*/");
                self.pos += 2;
                return;
            }
            self.current.push(self.chars[self.pos]);
            self.pos += 1;
        }
    }

    fn consume_quoted(&mut self, quote: char) {
        self.has_content = true;
        self.at_line_start = false;
        self.current.push(quote);
        self.pos += 1;

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.current.push(c);
            self.pos += 1;

            if c == '\\' && quote != '`' {
                if let Some(escaped) = self.chars.get(self.pos) {
                    self.current.push(*escaped);
                    self.pos += 1;
                }
                continue;
            }

            if c == quote {
                if self.chars.get(self.pos) == Some(&quote) {
                    self.current.push(quote);
                    self.pos += 1;
                } else {
                    return;
                }
            }
        }
    }
}
