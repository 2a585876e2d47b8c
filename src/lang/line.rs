use super::{ast::Statement, lex::lex, parse::parse, token::*, Error};
use std::rc::Rc;

/// One physical source line.
#[derive(Debug, PartialEq)]
pub struct Line {
    source: usize,
    number: Option<u32>,
    label: Option<Rc<str>>,
    prefix: usize,
    tokens: Vec<Token>,
}

impl Line {
    /// `source` is the 1-based physical line, used in error reports.
    pub fn new(source: usize, s: &str) -> Line {
        let mut tokens = lex(s);
        let mut number = None;
        let mut label = None;
        let mut skip = 0;
        let mut iter = tokens.iter().enumerate().filter(|(_, t)| !matches!(t, Token::Whitespace(_)));
        match iter.next() {
            Some((i, Token::Literal(Literal::Integer(n))))
            | Some((i, Token::Literal(Literal::Long(n))))
                if n.chars().all(|c| c.is_ascii_digit()) =>
            {
                number = n.parse::<u32>().ok();
                skip = i + 1;
            }
            Some((i, Token::Ident(Ident::Plain(name)))) => {
                if let Some((j, Token::Colon)) = iter.next() {
                    if j == i + 1 {
                        label = Some(name.clone());
                        skip = j + 1;
                    }
                }
            }
            _ => {}
        }
        let prefix = tokens[..skip].iter().map(|t| t.to_string().chars().count()).sum();
        tokens.drain(..skip);
        Line {
            source,
            number,
            label,
            prefix,
            tokens,
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn label(&self) -> Option<&Rc<str>> {
        self.label.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Whitespace(_)))
    }

    pub fn ast(&self) -> Result<Vec<Statement>, Error> {
        parse(self.source, self.prefix, &self.tokens)
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s: String = self.tokens.iter().map(|s| s.to_string()).collect();
        match (&self.number, &self.label) {
            (Some(n), _) => write!(f, "{} {}", n, s.trim_start()),
            (None, Some(l)) => write!(f, "{}: {}", l, s.trim_start()),
            _ => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number() {
        let line = Line::new(1, "100 print x");
        assert_eq!(line.number(), Some(100));
        assert_eq!(line.label(), None);
        assert_eq!(line.to_string(), "100 PRINT X");
    }

    #[test]
    fn test_label() {
        let line = Line::new(3, "handler: resume next");
        assert_eq!(line.label().map(|l| l.as_ref()), Some("HANDLER"));
        assert_eq!(line.source(), 3);
        let line = Line::new(4, "x = 1: y = 2");
        assert_eq!(line.label(), None);
        assert_eq!(line.ast().map(|s| s.len()), Ok(2));
    }
}
