use super::token::*;

pub fn lex(s: &str) -> Vec<Token> {
    BasicLexer::lex(s)
}

fn is_basic_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_basic_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_basic_alphabetic(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_type_suffix(c: char) -> bool {
    matches!(c, '$' | '!' | '#' | '%' | '&' | '@')
}

trait Tokenizers<'a> {
    fn chars(&mut self) -> &mut std::iter::Peekable<std::str::Chars<'a>>;

    fn whitespace(&mut self) -> Option<Token> {
        let mut len = 0;
        loop {
            self.chars().next();
            len += 1;
            if let Some(pk) = self.chars().peek() {
                if is_basic_whitespace(*pk) {
                    continue;
                }
            }
            return Some(Token::Whitespace(len));
        }
    }

    fn number(&mut self) -> Option<Token> {
        let mut s = String::new();
        let mut digits = 0;
        let mut decimal = false;
        let mut exp = false;
        let mut double_exp = false;
        loop {
            let mut ch = match self.chars().next() {
                Some(c) => c,
                None => {
                    debug_assert!(false, "Failed to tokenize number.");
                    return None;
                }
            };
            if ch == 'e' {
                ch = 'E'
            }
            if ch == 'd' {
                ch = 'D'
            }
            s.push(ch);
            if !exp && is_basic_digit(ch) && !(digits == 0 && ch == '0') {
                digits += 1;
            }
            match ch {
                '.' => decimal = true,
                'E' => exp = true,
                'D' => {
                    exp = true;
                    double_exp = true;
                }
                '!' => return Some(Token::Literal(Literal::Single(s))),
                '#' => return Some(Token::Literal(Literal::Double(s))),
                '%' => return Some(Token::Literal(Literal::Integer(s))),
                '&' => return Some(Token::Literal(Literal::Long(s))),
                '@' => return Some(Token::Literal(Literal::Currency(s))),
                _ => {}
            }
            if let Some(pk) = self.chars().peek() {
                let pk = *pk;
                if (ch == 'E' || ch == 'D') && (pk == '+' || pk == '-') {
                    continue;
                }
                if is_basic_digit(pk) {
                    continue;
                }
                if !decimal && !exp && pk == '.' {
                    continue;
                }
                if !exp && matches!(pk, 'E' | 'e' | 'D' | 'd') {
                    continue;
                }
                if matches!(pk, '!' | '#' | '%' | '@') {
                    continue;
                }
                if pk == '&' && !decimal && !exp {
                    continue;
                }
            }
            break;
        }
        if double_exp {
            return Some(Token::Literal(Literal::Double(s)));
        }
        if !exp && !decimal {
            if s.parse::<i16>().is_ok() {
                return Some(Token::Literal(Literal::Integer(s)));
            }
            if s.parse::<i32>().is_ok() {
                return Some(Token::Literal(Literal::Long(s)));
            }
            return Some(Token::Literal(Literal::Double(s)));
        }
        if digits > 7 {
            return Some(Token::Literal(Literal::Double(s)));
        }
        Some(Token::Literal(Literal::Single(s)))
    }

    fn radix(&mut self) -> Option<Token> {
        let mut s = String::new();
        if let Some(amp) = self.chars().next() {
            s.push(amp);
        }
        let radix = match self.chars().peek().map(|c| c.to_ascii_uppercase()) {
            Some('H') => 16,
            Some('O') => 8,
            _ => return Some(Token::Unknown(s)),
        };
        if let Some(c) = self.chars().next() {
            s.push(c.to_ascii_uppercase());
        }
        let mut value: u64 = 0;
        while let Some(pk) = self.chars().peek() {
            match pk.to_digit(radix) {
                Some(d) => {
                    value = value.saturating_mul(radix as u64).saturating_add(d as u64);
                    s.push(pk.to_ascii_uppercase());
                    self.chars().next();
                }
                None => break,
            }
        }
        let mut long = false;
        match self.chars().peek() {
            Some('&') => {
                long = true;
                s.push('&');
                self.chars().next();
            }
            Some('%') => {
                s.push('%');
                self.chars().next();
            }
            _ => {}
        }
        if !long && value <= 0xFFFF {
            Some(Token::Literal(Literal::Integer(s)))
        } else {
            Some(Token::Literal(Literal::Long(s)))
        }
    }

    fn string(&mut self) -> Option<Token> {
        let mut s = String::new();
        self.chars().next();
        loop {
            if let Some(ch) = self.chars().next() {
                if ch != '"' {
                    s.push(ch);
                    continue;
                }
            }
            return Some(Token::Literal(Literal::String(s)));
        }
    }

    fn alphabetic(&mut self) -> Option<Token> {
        let mut s = String::new();
        loop {
            let ch = match self.chars().next() {
                Some(ch) => ch.to_ascii_uppercase(),
                None => {
                    debug_assert!(false, "Failed to tokenize alphabetic.");
                    return None;
                }
            };
            s.push(ch);
            if is_type_suffix(ch) {
                return Some(Token::Ident(Ident::from_name(&s)));
            }
            if let Some(pk) = self.chars().peek() {
                if is_basic_alphabetic(*pk) || is_basic_digit(*pk) || *pk == '.' || *pk == '_' {
                    continue;
                }
                if is_type_suffix(*pk) {
                    if let Some(Token::Word(_)) = Token::from_string(&s) {
                        if *pk != '$' {
                            break;
                        }
                    }
                    continue;
                }
            }
            break;
        }
        if let Some(token) = Token::from_string(&s) {
            return Some(token);
        }
        Some(Token::Ident(Ident::from_name(&s)))
    }

    fn minutia(&mut self) -> Option<Token> {
        let ch = self.chars().next()?;
        let mut s = ch.to_string();
        if let Some(pk) = self.chars().peek() {
            let pair = matches!((ch, *pk), ('<', '>') | ('<', '=') | ('>', '=') | ('=', '<') | ('=', '>'));
            if pair {
                s.push(*pk);
                self.chars().next();
            }
        }
        match s.as_str() {
            "=<" => return Some(Token::Operator(Operator::LessEqual)),
            "=>" => return Some(Token::Operator(Operator::GreaterEqual)),
            _ => {}
        }
        if let Some(t) = Token::from_string(&s) {
            return Some(t);
        }
        Some(Token::Unknown(s))
    }
}

struct BasicLexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    remark: bool,
    after_paren: bool,
}

impl<'a> Tokenizers<'a> for BasicLexer<'a> {
    fn chars(&mut self) -> &mut std::iter::Peekable<std::str::Chars<'a>> {
        &mut self.chars
    }
}

impl<'a> BasicLexer<'a> {
    fn lex(s: &str) -> Vec<Token> {
        let mut tokens: Vec<Token> = BasicLexer {
            chars: s.chars().peekable(),
            remark: false,
            after_paren: false,
        }
        .collect();
        if let Some(Token::Whitespace(_)) = tokens.last() {
            tokens.pop();
        }
        tokens
    }

    /// A `.` directly after `)` and before a letter selects a record field.
    fn is_field_dot(&self) -> bool {
        if !self.after_paren {
            return false;
        }
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some(c) if is_basic_alphabetic(*c))
    }

    fn token(&mut self) -> Option<Token> {
        let pk = *self.chars.peek()?;
        if self.remark {
            return Some(Token::Unknown(self.chars.by_ref().collect::<String>()));
        }
        if is_basic_whitespace(pk) {
            return self.whitespace();
        }
        if pk == '.' && self.is_field_dot() {
            self.chars.next();
            return Some(Token::Dot);
        }
        if is_basic_digit(pk) || pk == '.' {
            return self.number();
        }
        if is_basic_alphabetic(pk) {
            let r = self.alphabetic();
            if let Some(Token::Word(Word::Rem1)) = r {
                self.remark = true;
            }
            return r;
        }
        if pk == '"' {
            return self.string();
        }
        if pk == '&' {
            return self.radix();
        }
        let minutia = self.minutia();
        if let Some(Token::Word(Word::Rem2)) = minutia {
            self.remark = true;
        }
        minutia
    }
}

impl<'a> Iterator for BasicLexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.token()?;
        match t {
            Token::Whitespace(_) => {}
            Token::RParen => self.after_paren = true,
            _ => self.after_paren = false,
        }
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<Token> {
        lex(s)
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect()
    }

    #[test]
    fn test_numbers() {
        let t = words("1 40000 1.5 1D2 12345678.5 7% 7& 2.5@ &HFF &HFFFFF");
        assert_eq!(
            t,
            vec![
                Token::Literal(Literal::Integer("1".into())),
                Token::Literal(Literal::Long("40000".into())),
                Token::Literal(Literal::Single("1.5".into())),
                Token::Literal(Literal::Double("1D2".into())),
                Token::Literal(Literal::Double("12345678.5".into())),
                Token::Literal(Literal::Integer("7%".into())),
                Token::Literal(Literal::Long("7&".into())),
                Token::Literal(Literal::Currency("2.5@".into())),
                Token::Literal(Literal::Integer("&HFF".into())),
                Token::Literal(Literal::Long("&HFFFFF".into())),
            ]
        );
    }

    #[test]
    fn test_idents_and_words() {
        let t = words("print my.var$ , a& <> b");
        assert_eq!(
            t,
            vec![
                Token::Word(Word::Print1),
                Token::Ident(Ident::from_name("MY.VAR$")),
                Token::Comma,
                Token::Ident(Ident::from_name("A&")),
                Token::Operator(Operator::NotEqual),
                Token::Ident(Ident::from_name("B")),
            ]
        );
    }

    #[test]
    fn test_field_dot() {
        let t = words("a(1).x = .5");
        assert_eq!(t[4], Token::Dot);
        assert_eq!(t[5], Token::Ident(Ident::from_name("X")));
        assert_eq!(t[7], Token::Literal(Literal::Single(".5".into())));
    }

    #[test]
    fn test_remark() {
        let t = words("x = 1 ' the rest: is ignored");
        assert_eq!(t[3], Token::Word(Word::Rem2));
        assert_eq!(t.len(), 5);
    }
}
