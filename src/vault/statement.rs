//! Dump stream lexer
//!
//! A dump holds one statement per line, terminated by `;`. Quoted text values
//! may span several physical lines, so a logical statement ends at the first
//! line whose last significant character is a `;` outside any quoted literal or
//! identifier.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A complete statement read from a dump stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based line on which the statement starts
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
    /// Inside a `/* ... */` comment
    Block,
}

/// Incremental quote tracker for the statement reader
#[derive(Debug)]
struct Scanner {
    quote: Quote,
    last_significant: Option<char>,
}

impl Scanner {
    fn new() -> Self {
        Self {
            quote: Quote::None,
            last_significant: None,
        }
    }

    /// Feed one physical line; returns true when it completes a statement
    fn feed(&mut self, line: &str) -> bool {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match self.quote {
                Quote::None => match c {
                    '\'' => self.quote = Quote::Single,
                    '"' => self.quote = Quote::Double,
                    // line comment: the rest of the physical line is ignored
                    '-' if chars.peek() == Some(&'-') => break,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        self.quote = Quote::Block;
                        continue;
                    }
                    _ => {}
                },
                Quote::Single => {
                    if c == '\'' {
                        self.quote = Quote::None;
                    }
                }
                Quote::Double => {
                    if c == '"' {
                        self.quote = Quote::None;
                    }
                }
                Quote::Block => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        self.quote = Quote::None;
                    }
                    continue;
                }
            }
            if !c.is_whitespace() {
                self.last_significant = Some(c);
            }
        }
        self.quote == Quote::None && self.last_significant == Some(';')
    }
}

/// Iterator over the statements of a dump stream
pub struct StatementReader<R> {
    reader: R,
    source: PathBuf,
    line_no: usize,
    finished: bool,
}

impl StatementReader<BufReader<File>> {
    /// Open a dump file; an unreadable file is reported as a corrupt dump
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::CorruptDump {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> StatementReader<R> {
    /// Wrap a reader; `source` names the stream in error messages
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            source: source.into(),
            line_no: 0,
            finished: false,
        }
    }

    fn corrupt(&self, message: String) -> Error {
        Error::CorruptDump {
            path: self.source.clone(),
            message,
        }
    }

    fn next_statement(&mut self) -> Result<Option<Statement>> {
        let mut scanner = Scanner::new();
        let mut buffer = String::new();
        let mut start_line = 0;
        let mut line = String::new();

        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| self.corrupt(format!("line {}: {}", self.line_no + 1, e)))?;
            if read == 0 {
                break;
            }
            self.line_no += 1;

            if buffer.is_empty() && line.trim().is_empty() {
                continue;
            }
            if buffer.is_empty() {
                start_line = self.line_no;
            }
            buffer.push_str(&line);

            if scanner.feed(&line) {
                return Ok(Some(Statement {
                    line: start_line,
                    text: buffer.trim().to_string(),
                }));
            }
        }

        if buffer.trim().is_empty() {
            return Ok(None);
        }
        if scanner.quote != Quote::None {
            return Err(self.corrupt(format!(
                "unterminated quoted text or comment in statement starting at line {}",
                start_line
            )));
        }
        // final statement without its terminator
        Ok(Some(Statement {
            line: start_line,
            text: buffer.trim().to_string(),
        }))
    }
}

impl<R: BufRead> Iterator for StatementReader<R> {
    type Item = Result<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_statement() {
            Ok(Some(statement)) => Some(Ok(statement)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Write one statement followed by the `;` terminator and a newline
pub fn write_statement<W: Write>(out: &mut W, statement: &str) -> Result<()> {
    let statement = statement.trim_end();
    let statement = statement.strip_suffix(';').unwrap_or(statement);
    out.write_all(statement.as_bytes())?;
    out.write_all(b";\n")?;
    Ok(())
}

/// Fold a multi-line statement onto one line
///
/// Line breaks (and the indentation after them) outside quoted text become a
/// single space, dropped next to parentheses; quoted text is copied verbatim.
/// `--` comments are removed since they would swallow the rest of the folded
/// line; line breaks inside `/* */` comments become spaces.
pub fn single_line(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote = Quote::None;
    let mut pending_break = false;
    let mut chars = sql.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Quote::None => {
                if c == '-' && chars.peek() == Some(&'-') {
                    while chars.next_if(|&n| n != '\n' && n != '\r').is_some() {}
                    out.truncate(out.trim_end().len());
                    pending_break = true;
                    continue;
                }
                if c == '\n' || c == '\r' {
                    pending_break = true;
                    continue;
                }
                if pending_break {
                    if c.is_whitespace() {
                        continue;
                    }
                    if c != ')' && !out.is_empty() && !out.ends_with('(') && !out.ends_with(' ') {
                        out.push(' ');
                    }
                    pending_break = false;
                }
            }
            Quote::Block if c == '\n' || c == '\r' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
                continue;
            }
            _ => {}
        }

        match (quote, c) {
            (Quote::None, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("/*");
                quote = Quote::Block;
                continue;
            }
            (Quote::Block, '*') if chars.peek() == Some(&'/') => {
                chars.next();
                out.push_str("*/");
                quote = Quote::None;
                continue;
            }
            (Quote::None, '\'') => quote = Quote::Single,
            (Quote::None, '"') => quote = Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            _ => {}
        }
        out.push(c);
    }

    out
}
