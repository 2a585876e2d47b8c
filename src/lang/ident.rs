// Used in both Token and Ast

use std::rc::Rc;

/// An identifier and its type-declaration suffix.
///
/// The stored name is upper case and keeps the suffix character, so `a$`
/// and `A` are distinct identifiers.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Ident {
    Plain(Rc<str>),
    String(Rc<str>),
    Single(Rc<str>),
    Double(Rc<str>),
    Integer(Rc<str>),
    Long(Rc<str>),
    Currency(Rc<str>),
}

impl Ident {
    pub fn from_name(s: &str) -> Ident {
        let s: Rc<str> = s.to_ascii_uppercase().into();
        match s.chars().last() {
            Some('$') => Ident::String(s),
            Some('!') => Ident::Single(s),
            Some('#') => Ident::Double(s),
            Some('%') => Ident::Integer(s),
            Some('&') => Ident::Long(s),
            Some('@') => Ident::Currency(s),
            _ => Ident::Plain(s),
        }
    }

    /// The full name including any suffix.
    pub fn name(&self) -> &Rc<str> {
        use Ident::*;
        match self {
            Plain(s) | String(s) | Single(s) | Double(s) | Integer(s) | Long(s) | Currency(s) => s,
        }
    }

    /// The name without its suffix.
    pub fn base(&self) -> &str {
        let s = self.name();
        match self {
            Ident::Plain(_) => s,
            _ => &s[..s.len() - 1],
        }
    }

    pub fn suffix(&self) -> Option<char> {
        match self {
            Ident::Plain(_) => None,
            _ => self.name().chars().last(),
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Ident::Plain(_))
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes() {
        assert_eq!(Ident::from_name("a$"), Ident::String("A$".into()));
        assert_eq!(Ident::from_name("Total&").base(), "TOTAL");
        assert_eq!(Ident::from_name("my.var").suffix(), None);
        assert_eq!(Ident::from_name("price@").suffix(), Some('@'));
    }
}
