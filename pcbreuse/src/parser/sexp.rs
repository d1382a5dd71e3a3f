//! Minimal s-expression reader for KiCad netlist and footprint files.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected '{found}' at line {line}")]
    UnexpectedToken { found: char, line: usize },
    #[error("Unterminated string starting at line {0}")]
    UnterminatedString(usize),
    #[error("Trailing content after the root expression at line {0}")]
    TrailingContent(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    /// Leading atom of a list: `(pad "1" smd ...)` -> `pad`.
    pub fn head(&self) -> Option<&str> {
        self.as_list().and_then(|l| l.first()).and_then(SExp::as_atom)
    }

    /// Atom at position `index` of a list (the head is index 0).
    pub fn atom_at(&self, index: usize) -> Option<&str> {
        self.as_list().and_then(|l| l.get(index)).and_then(SExp::as_atom)
    }

    /// First child list whose head is `key`.
    pub fn find(&self, key: &str) -> Option<&SExp> {
        self.as_list()?.iter().find(|item| item.head() == Some(key))
    }

    /// Every child list whose head is `key`.
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |item| item.head() == Some(key))
    }

    /// `(key value ...)` -> `value`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(|child| child.atom_at(1))
    }

    /// Numeric atoms following the head of `(key n1 n2 ...)`.
    pub fn numbers(&self, key: &str) -> Vec<f64> {
        self.find(key)
            .and_then(SExp::as_list)
            .map(|items| {
                items
                    .iter()
                    .skip(1)
                    .filter_map(|i| i.as_atom().and_then(|a| a.parse::<f64>().ok()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the list holds `token` as a bare atom.
    pub fn has_atom(&self, token: &str) -> bool {
        self.as_list()
            .map(|items| items.iter().any(|i| i.as_atom() == Some(token)))
            .unwrap_or(false)
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s) => {
                let bare = !s.is_empty()
                    && !s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"');
                if bare {
                    write!(f, "{}", s)
                } else {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                }
            }
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Reads exactly one root expression.
pub struct SExpParser<'a> {
    bytes: &'a [u8],
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> SExpParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            src: input,
            pos: 0,
            line: 1,
        }
    }

    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        let root = self.expr()?;
        self.skip_ws();
        if self.pos < self.bytes.len() {
            return Err(ParseError::TrailingContent(self.line));
        }
        Ok(root)
    }

    fn expr(&mut self) -> Result<SExp, ParseError> {
        self.skip_ws();
        match self.bytes.get(self.pos) {
            None => Err(ParseError::UnexpectedEof),
            Some(b'(') => self.list(),
            Some(b')') => Err(ParseError::UnexpectedToken { found: ')', line: self.line }),
            Some(b'"') => self.quoted(),
            Some(_) => Ok(self.symbol()),
        }
    }

    fn list(&mut self) -> Result<SExp, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                None => return Err(ParseError::UnexpectedEof),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(SExp::List(items));
                }
                Some(_) => items.push(self.expr()?),
            }
        }
    }

    fn quoted(&mut self) -> Result<SExp, ParseError> {
        let start_line = self.line;
        self.pos += 1;
        let mut out = String::new();
        let src: &'a str = self.src;
        let mut chars = src[self.pos..].char_indices();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(SExp::Atom(out));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                '\n' => {
                    self.line += 1;
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
        Err(ParseError::UnterminatedString(start_line))
    }

    fn symbol(&mut self) -> SExp {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        SExp::Atom(self.src[start..self.pos].to_string())
    }

    fn skip_ws(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if !b.is_ascii_whitespace() {
                break;
            }
            if b == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> SExp {
        SExpParser::new(s).parse().unwrap()
    }

    #[test]
    fn test_parse_nested() {
        let sexp = parse("(pad \"1\" smd rect (at -1 0) (size 1 1.2))");
        assert_eq!(sexp.head(), Some("pad"));
        assert_eq!(sexp.atom_at(1), Some("1"));
        assert!(sexp.has_atom("smd"));
        assert_eq!(sexp.numbers("at"), vec![-1.0, 0.0]);
        assert_eq!(sexp.numbers("size"), vec![1.0, 1.2]);
    }

    #[test]
    fn test_value_and_find_all() {
        let sexp = parse("(comp (ref \"C1\") (node (pin 1)) (node (pin 2)))");
        assert_eq!(sexp.value("ref"), Some("C1"));
        assert_eq!(sexp.find_all("node").count(), 2);
        assert!(sexp.find("missing").is_none());
    }

    #[test]
    fn test_escaped_string() {
        let sexp = parse(r#"(descr "say \"hi\"")"#);
        assert_eq!(sexp.atom_at(1), Some("say \"hi\""));
    }

    #[test]
    fn test_unbalanced_input() {
        assert_eq!(SExpParser::new("(a (b)").parse(), Err(ParseError::UnexpectedEof));
        assert!(matches!(
            SExpParser::new("(a))").parse(),
            Err(ParseError::TrailingContent(1))
        ));
        assert!(matches!(
            SExpParser::new("(a\n\"open)").parse(),
            Err(ParseError::UnterminatedString(2))
        ));
    }

    #[test]
    fn test_display_quotes_when_needed() {
        let sexp = parse("(a \"b c\" d)");
        assert_eq!(sexp.to_string(), "(a \"b c\" d)");
    }
}
