use super::{ast::*, token::*, Column, Error};
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// Parse the tokens of one line. `prefix` is the width of the line
/// number or label already removed from the front of `tokens`.
pub fn parse(line: usize, prefix: usize, tokens: &[Token]) -> Result<Vec<Statement>> {
    Parser::parse(prefix, tokens).map_err(|e| e.in_line(Some(line)))
}

struct Parser<'a> {
    token_stream: std::slice::Iter<'a, Token>,
    peeked: Option<&'a Token>,
    rem: bool,
    col: Column,
}

impl<'a> Parser<'a> {
    fn parse(prefix: usize, tokens: &'a [Token]) -> Result<Vec<Statement>> {
        let mut parse = Parser {
            token_stream: tokens.iter(),
            peeked: None,
            rem: false,
            col: prefix..prefix,
        };
        let mut r: Vec<Statement> = vec![];
        loop {
            match parse.peek() {
                None => return Ok(r),
                Some(Token::Colon) => {
                    parse.next();
                    continue;
                }
                _ => {}
            }
            match parse.statement() {
                Ok(s) => {
                    let open_else = matches!(s, Statement::Else(_));
                    r.push(s);
                    if !open_else {
                        parse.end_of_statement()?;
                    }
                }
                Err(e) => return Err(e.in_column(&parse.col)),
            }
        }
    }

    fn column(&self) -> Column {
        self.col.clone()
    }

    fn next(&mut self) -> Option<&'a Token> {
        if self.peeked.is_some() {
            return self.peeked.take();
        }
        loop {
            if self.rem {
                return None;
            }
            self.col.start = self.col.end;
            let t = self.token_stream.next()?;
            self.col.end += t.to_string().chars().count();
            match t {
                Token::Word(Word::Rem1) | Token::Word(Word::Rem2) => {
                    self.rem = true;
                    return None;
                }
                Token::Whitespace(_) => continue,
                _ => return Some(t),
            }
        }
    }

    fn peek(&mut self) -> Option<&'a Token> {
        if self.peeked.is_none() {
            self.peeked = self.next();
        }
        self.peeked
    }

    fn end_of_statement(&mut self) -> Result<()> {
        match self.peek() {
            None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => Ok(()),
            Some(_) => Err(error!(SyntaxError, ..&self.col; "EXPECTED END OF STATEMENT")),
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        match self.peek() {
            Some(Token::Ident(_)) => Statement::for_ident(self),
            Some(Token::Word(word)) => {
                self.next();
                Statement::for_word(self, word)
            }
            _ => Err(error!(SyntaxError; "EXPECTED STATEMENT")),
        }
    }

    /// Statements of a single-line IF branch, up to ELSE or end of line.
    fn branch(&mut self) -> Result<Vec<Statement>> {
        if let Some(Token::Literal(_)) = self.peek() {
            let column = self.column();
            let target = self.target()?;
            return Ok(vec![Statement::Goto(column, target)]);
        }
        let mut v = vec![];
        loop {
            match self.peek() {
                None | Some(Token::Word(Word::Else)) => return Ok(v),
                Some(Token::Colon) => {
                    self.next();
                }
                _ => {
                    v.push(self.statement()?);
                    self.end_of_statement()?;
                }
            }
        }
    }

    fn expression(&mut self) -> Result<Expression> {
        fn parse(this: &mut Parser, precedence: usize) -> Result<Expression> {
            let mut lhs = match this.next() {
                Some(Token::LParen) => {
                    let expr = this.expression()?;
                    this.expect(Token::RParen)?;
                    expr
                }
                Some(Token::Ident(i)) => {
                    let column = this.column();
                    let expr = match this.peek() {
                        Some(Token::LParen) => {
                            Expression::Function(column, i.clone(), this.expression_list()?)
                        }
                        _ => Expression::UnaryVar(column, i.clone()),
                    };
                    this.fields(expr)?
                }
                Some(Token::Literal(l)) => Expression::for_literal(this.column(), l)?,
                Some(Token::Operator(Operator::Minus)) => {
                    let column = this.column();
                    let expr = parse(this, 13)?;
                    Expression::Negation(column, Box::new(expr))
                }
                Some(Token::Operator(Operator::Plus)) => parse(this, 13)?,
                Some(Token::Operator(Operator::Not)) => {
                    let column = this.column();
                    let expr = parse(this, 7)?;
                    Expression::Not(column, Box::new(expr))
                }
                _ => return Err(error!(SyntaxError; "EXPECTED EXPRESSION")),
            };
            while let Some(Token::Operator(op)) = this.peek() {
                let op_precedence = Expression::op_precedence(op);
                if op_precedence < precedence {
                    break;
                }
                this.next();
                let column = this.column();
                let rhs = parse(this, op_precedence + 1)?;
                lhs = Expression::for_binary_op(column, op, lhs, rhs)?;
            }
            Ok(lhs)
        }
        parse(self, 1)
    }

    fn fields(&mut self, mut expr: Expression) -> Result<Expression> {
        while let Some(Token::Dot) = self.peek() {
            self.next();
            let (column, field) = self.ident()?;
            expr = Expression::Field(column, Box::new(expr), field);
        }
        Ok(expr)
    }

    /// A parenthesized list. `name()` yields an empty list.
    fn expression_list(&mut self) -> Result<Vec<Expression>> {
        self.expect(Token::LParen)?;
        let mut v: Vec<Expression> = vec![];
        if let Some(Token::RParen) = self.peek() {
            self.next();
            return Ok(v);
        }
        loop {
            v.push(self.expression()?);
            match self.next() {
                Some(Token::RParen) => return Ok(v),
                Some(Token::Comma) => continue,
                _ => return Err(error!(SyntaxError; "EXPECTED END OR SEPARATOR")),
            }
        }
    }

    fn variable(&mut self) -> Result<Variable> {
        let (column, ident) = self.ident()?;
        let expr = match self.peek() {
            Some(Token::LParen) => Expression::Function(column, ident, self.expression_list()?),
            _ => Expression::UnaryVar(column, ident),
        };
        let expr = self.fields(expr)?;
        match expr.to_variable() {
            Some(var) => Ok(var),
            None => Err(error!(SyntaxError; "EXPECTED VARIABLE")),
        }
    }

    fn variable_list(&mut self) -> Result<Vec<Variable>> {
        let mut v = vec![self.variable()?];
        while let Some(Token::Comma) = self.peek() {
            self.next();
            v.push(self.variable()?);
        }
        Ok(v)
    }

    fn printer_list(&mut self) -> Result<Vec<PrintItem>> {
        let mut v: Vec<PrintItem> = vec![];
        loop {
            match self.peek() {
                None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => return Ok(v),
                Some(Token::Semicolon) => {
                    self.next();
                    v.push(PrintItem::Semicolon);
                }
                Some(Token::Comma) => {
                    self.next();
                    v.push(PrintItem::Comma);
                }
                _ => v.push(PrintItem::Expression(self.expression()?)),
            };
        }
    }

    fn ident(&mut self) -> Result<(Column, Ident)> {
        let ident = match self.next() {
            Some(Token::Ident(i)) => i.clone(),
            _ => return Err(error!(SyntaxError, ..&self.col; "EXPECTED IDENTIFIER")),
        };
        Ok((self.column(), ident))
    }

    fn target(&mut self) -> Result<Target> {
        match self.next() {
            Some(Token::Ident(Ident::Plain(s))) => Ok(Target::Label(s.clone())),
            Some(Token::Literal(Literal::Integer(s))) | Some(Token::Literal(Literal::Long(s))) => {
                match s.parse::<u32>() {
                    Ok(n) => Ok(Target::Line(n)),
                    Err(_) => Err(error!(SyntaxError, ..&self.col; "EXPECTED LINE NUMBER")),
                }
            }
            _ => Err(error!(SyntaxError, ..&self.col; "EXPECTED LABEL OR LINE NUMBER")),
        }
    }

    fn target_list(&mut self) -> Result<Vec<Target>> {
        let mut v = vec![self.target()?];
        while let Some(Token::Comma) = self.peek() {
            self.next();
            v.push(self.target()?);
        }
        Ok(v)
    }

    fn type_name(&mut self) -> Result<TypeName> {
        match self.next() {
            Some(Token::Word(Word::Integer)) => Ok(TypeName::Integer),
            Some(Token::Word(Word::Long)) => Ok(TypeName::Long),
            Some(Token::Word(Word::Single)) => Ok(TypeName::Single),
            Some(Token::Word(Word::Double)) => Ok(TypeName::Double),
            Some(Token::Word(Word::Currency)) => Ok(TypeName::Currency),
            Some(Token::Word(Word::String)) => {
                if let Some(Token::Operator(Operator::Multiply)) = self.peek() {
                    self.next();
                    match self.next() {
                        Some(Token::Literal(Literal::Integer(s))) => match s.parse::<usize>() {
                            Ok(n) if n > 0 => Ok(TypeName::FixedString(n)),
                            _ => Err(error!(IllegalNumber, ..&self.col)),
                        },
                        _ => Err(error!(SyntaxError, ..&self.col; "EXPECTED STRING LENGTH")),
                    }
                } else {
                    Ok(TypeName::String)
                }
            }
            Some(Token::Ident(i)) if i.is_plain() => Ok(TypeName::Named(i.clone())),
            _ => Err(error!(SyntaxError, ..&self.col; "EXPECTED TYPE")),
        }
    }

    fn as_type(&mut self) -> Result<Option<TypeName>> {
        if let Some(Token::Word(Word::As)) = self.peek() {
            self.next();
            return Ok(Some(self.type_name()?));
        }
        Ok(None)
    }

    fn declaration(&mut self) -> Result<Declaration> {
        let (col, ident) = self.ident()?;
        let mut bounds = None;
        if let Some(Token::LParen) = self.peek() {
            self.next();
            let mut v = vec![];
            if let Some(Token::RParen) = self.peek() {
                self.next();
            } else {
                loop {
                    let first = self.expression()?;
                    let bound = if let Some(Token::Word(Word::To)) = self.peek() {
                        self.next();
                        (Some(first), self.expression()?)
                    } else {
                        (None, first)
                    };
                    v.push(bound);
                    match self.next() {
                        Some(Token::RParen) => break,
                        Some(Token::Comma) => continue,
                        _ => return Err(error!(SyntaxError, ..&self.col; "EXPECTED END OR SEPARATOR")),
                    }
                }
            }
            bounds = Some(v);
        }
        let as_type = self.as_type()?;
        Ok(Declaration {
            col,
            ident,
            bounds,
            as_type,
        })
    }

    fn declaration_list(&mut self) -> Result<Vec<Declaration>> {
        let mut v = vec![self.declaration()?];
        while let Some(Token::Comma) = self.peek() {
            self.next();
            v.push(self.declaration()?);
        }
        Ok(v)
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        let mut v = vec![];
        if let Some(Token::LParen) = self.peek() {
            self.next();
            if let Some(Token::RParen) = self.peek() {
                self.next();
                return Ok(v);
            }
            loop {
                let by_val = if let Some(Token::Word(Word::ByVal)) = self.peek() {
                    self.next();
                    true
                } else {
                    false
                };
                let (col, ident) = self.ident()?;
                let mut array = false;
                if let Some(Token::LParen) = self.peek() {
                    self.next();
                    self.expect(Token::RParen)?;
                    array = true;
                }
                let as_type = self.as_type()?;
                v.push(Param {
                    col,
                    ident,
                    array,
                    as_type,
                    by_val,
                });
                match self.next() {
                    Some(Token::RParen) => break,
                    Some(Token::Comma) => continue,
                    _ => return Err(error!(SyntaxError, ..&self.col; "EXPECTED END OR SEPARATOR")),
                }
            }
        }
        Ok(v)
    }

    fn procedure(&mut self, function: bool, declare: bool) -> Result<Procedure> {
        let (_, name) = self.ident()?;
        let mut lib = None;
        if declare {
            if let Some(Token::Word(Word::Lib)) = self.peek() {
                self.next();
                match self.next() {
                    Some(Token::Literal(Literal::String(s))) => lib = Some(Rc::from(s.as_str())),
                    _ => return Err(error!(SyntaxError, ..&self.col; "EXPECTED LIBRARY NAME")),
                }
            }
        }
        let params = self.params()?;
        let as_type = if function { self.as_type()? } else { None };
        if let Some(Token::Word(Word::Static)) = self.peek() {
            self.next();
        }
        Ok(Procedure {
            name,
            function,
            params,
            as_type,
            lib,
        })
    }

    fn condition(&mut self) -> Result<Option<Condition>> {
        match self.peek() {
            Some(Token::Word(Word::While)) => {
                self.next();
                Ok(Some(Condition::While(self.expression()?)))
            }
            Some(Token::Word(Word::Until)) => {
                self.next();
                Ok(Some(Condition::Until(self.expression()?)))
            }
            _ => Ok(None),
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if let Some(t) = self.next() {
            if *t == token {
                return Ok(());
            }
        }
        Err(error!(SyntaxError, ..&self.col;
            match token {
                Token::Unknown(_) | Token::Whitespace(_) => "UNEXPECTED TOKEN",
                Token::Literal(_) => "EXPECTED LITERAL",
                Token::Word(Word::Then) => "EXPECTED THEN",
                Token::Word(Word::To) => "EXPECTED TO",
                Token::Word(_) => "EXPECTED RESERVED WORD",
                Token::Operator(Operator::Equal) => "EXPECTED EQUALS SIGN",
                Token::Operator(_) => "EXPECTED OPERATOR",
                Token::Ident(_) => "EXPECTED IDENTIFIER",
                Token::LParen => "EXPECTED LEFT PARENTHESIS",
                Token::RParen => "EXPECTED RIGHT PARENTHESIS",
                Token::Comma => "EXPECTED COMMA",
                Token::Colon => "EXPECTED COLON",
                Token::Semicolon => "EXPECTED SEMICOLON",
                Token::Dot => "EXPECTED PERIOD",
            }
        ))
    }
}

fn radix_value(s: &str) -> Option<u64> {
    let radix = if s.starts_with("&H") {
        16
    } else if s.starts_with("&O") {
        8
    } else {
        return None;
    };
    let digits = s[2..].trim_end_matches(|c| c == '%' || c == '&');
    if digits.is_empty() {
        return Some(0);
    }
    Some(u64::from_str_radix(digits, radix).unwrap_or(u64::MAX))
}

fn parse_currency(s: &str) -> Option<i64> {
    if s.contains('E') || s.contains('D') {
        let v = s.replace('D', "E").parse::<f64>().ok()? * 10_000.0;
        if !v.is_finite() || v.abs() >= i64::MAX as f64 {
            return None;
        }
        return Some(v.round() as i64);
    }
    let (int, frac) = match s.find('.') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    };
    let int: i64 = if int.is_empty() { 0 } else { int.parse().ok()? };
    let mut digits: String = frac.chars().take(4).collect();
    while digits.len() < 4 {
        digits.push('0');
    }
    let mut frac_value: i64 = digits.parse().ok()?;
    if let Some(d) = frac.chars().nth(4) {
        if d >= '5' {
            frac_value += 1;
        }
    }
    int.checked_mul(10_000)?.checked_add(frac_value)
}

impl Expression {
    fn for_binary_op(col: Column, op: &Operator, lhs: Expression, rhs: Expression) -> Result<Expression> {
        use Operator::*;
        let col = lhs.column().start.min(col.start)..rhs.column().end.max(col.end);
        let (l, r) = (Box::new(lhs), Box::new(rhs));
        Ok(match op {
            Caret => Expression::Power(col, l, r),
            Multiply => Expression::Multiply(col, l, r),
            Divide => Expression::Divide(col, l, r),
            DivideInt => Expression::DivideInt(col, l, r),
            Modulo => Expression::Modulus(col, l, r),
            Plus => Expression::Add(col, l, r),
            Minus => Expression::Subtract(col, l, r),
            Equal => Expression::Equal(col, l, r),
            NotEqual => Expression::NotEqual(col, l, r),
            Less => Expression::Less(col, l, r),
            LessEqual => Expression::LessEqual(col, l, r),
            Greater => Expression::Greater(col, l, r),
            GreaterEqual => Expression::GreaterEqual(col, l, r),
            And => Expression::And(col, l, r),
            Or => Expression::Or(col, l, r),
            Xor => Expression::Xor(col, l, r),
            Imp => Expression::Imp(col, l, r),
            Eqv => Expression::Eqv(col, l, r),
            Not => return Err(error!(SyntaxError, ..&col; "UNEXPECTED NOT")),
        })
    }

    fn op_precedence(op: &Operator) -> usize {
        use Operator::*;
        match op {
            Imp => 1,
            Eqv => 2,
            Xor => 3,
            Or => 4,
            And => 5,
            Not => 6,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => 7,
            Plus | Minus => 8,
            Modulo => 9,
            DivideInt => 10,
            Multiply | Divide => 11,
            Caret => 13,
        }
    }

    fn for_literal(col: Column, lit: &Literal) -> Result<Expression> {
        match lit {
            Literal::Integer(s) => match radix_value(s) {
                Some(v) if v <= 0xFFFF => Ok(Expression::Integer(col, v as u16 as i16)),
                Some(_) => Err(error!(Overflow, ..&col)),
                None => match s.trim_end_matches('%').parse::<i16>() {
                    Ok(v) => Ok(Expression::Integer(col, v)),
                    Err(_) => Err(error!(Overflow, ..&col)),
                },
            },
            Literal::Long(s) => match radix_value(s) {
                Some(v) if v <= 0xFFFF_FFFF => Ok(Expression::Long(col, v as u32 as i32)),
                Some(_) => Err(error!(Overflow, ..&col)),
                None => match s.trim_end_matches('&').parse::<i32>() {
                    Ok(v) => Ok(Expression::Long(col, v)),
                    Err(_) => Err(error!(Overflow, ..&col)),
                },
            },
            Literal::Single(s) => match s.trim_end_matches('!').parse::<f32>() {
                Ok(v) if v.is_finite() => Ok(Expression::Single(col, v)),
                Ok(_) => Err(error!(Overflow, ..&col)),
                Err(_) => Err(error!(IllegalNumber, ..&col)),
            },
            Literal::Double(s) => match s.trim_end_matches('#').replace('D', "E").parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Expression::Double(col, v)),
                Ok(_) => Err(error!(Overflow, ..&col)),
                Err(_) => Err(error!(IllegalNumber, ..&col)),
            },
            Literal::Currency(s) => match parse_currency(s.trim_end_matches('@')) {
                Some(v) => Ok(Expression::Currency(col, v)),
                None => Err(error!(Overflow, ..&col)),
            },
            Literal::String(s) => Ok(Expression::String(col, s.as_str().into())),
        }
    }
}

impl Statement {
    fn for_ident(parse: &mut Parser) -> Result<Statement> {
        let var = parse.variable()?;
        let column = var.column();
        match parse.peek() {
            Some(Token::Operator(Operator::Equal)) => {
                parse.next();
                Ok(Statement::Let(column, var, parse.expression()?))
            }
            Some(Token::Word(Word::As)) => match var {
                Variable::Unary(col, ident) => {
                    parse.next();
                    Ok(Statement::Field(col, ident, parse.type_name()?))
                }
                _ => Err(error!(SyntaxError, ..&column; "EXPECTED FIELD NAME")),
            },
            _ => {
                let (ident, args) = match var {
                    Variable::Unary(_, ident) => {
                        if !matches!(parse.peek(), None | Some(Token::Colon) | Some(Token::Word(Word::Else))) {
                            return Self::call_args(parse, column, ident, vec![]);
                        }
                        (ident, vec![])
                    }
                    Variable::Array(_, ident, args) => (ident, args),
                    Variable::Field(..) => {
                        return Err(error!(SyntaxError, ..&column; "EXPECTED EQUALS SIGN"))
                    }
                };
                if let Some(Token::Comma) = parse.peek() {
                    parse.next();
                    return Self::call_args(parse, column, ident, args);
                }
                Ok(Statement::Call(column, ident, args))
            }
        }
    }

    fn call_args(
        parse: &mut Parser,
        column: Column,
        ident: Ident,
        mut args: Vec<Expression>,
    ) -> Result<Statement> {
        args.push(parse.expression()?);
        while let Some(Token::Comma) = parse.peek() {
            parse.next();
            args.push(parse.expression()?);
        }
        Ok(Statement::Call(column, ident, args))
    }

    fn for_word(parse: &mut Parser, word: &Word) -> Result<Statement> {
        let column = parse.column();
        use Word::*;
        match word {
            Call => Self::r#call(parse, column),
            Const => Self::r#const(parse, column),
            Data => Self::r#data(parse, column),
            Declare => Self::r#declare(parse, column),
            DefCur => Self::r#deftype(parse, column, TypeName::Currency),
            DefDbl => Self::r#deftype(parse, column, TypeName::Double),
            DefInt => Self::r#deftype(parse, column, TypeName::Integer),
            DefLng => Self::r#deftype(parse, column, TypeName::Long),
            DefSng => Self::r#deftype(parse, column, TypeName::Single),
            DefStr => Self::r#deftype(parse, column, TypeName::String),
            Dim => Self::r#dim(parse, column),
            Do => Ok(Statement::Do(column, parse.condition()?)),
            Else => Ok(Statement::Else(column)),
            ElseIf => Self::r#elseif(parse, column),
            End => Self::r#end(parse, column),
            Erase => Self::r#erase(parse, column),
            Error => Ok(Statement::Error(column, parse.expression()?)),
            Exit => Self::r#exit(parse, column),
            For => Self::r#for(parse, column),
            Function => Ok(Statement::Function(column, parse.procedure(true, false)?)),
            Gosub => Ok(Statement::Gosub(column, parse.target()?)),
            Goto => Ok(Statement::Goto(column, parse.target()?)),
            If => Self::r#if(parse, column),
            Input => Self::r#input(parse, column),
            Let => {
                let var = parse.variable()?;
                parse.expect(Token::Operator(Operator::Equal))?;
                Ok(Statement::Let(column, var, parse.expression()?))
            }
            Line => Self::r#line(parse, column),
            Loop => Ok(Statement::Loop(column, parse.condition()?)),
            Next => Self::r#next(parse, column),
            On => Self::r#on(parse, column),
            Print1 | Print2 => Ok(Statement::Print(column, parse.printer_list()?)),
            Randomize => Self::r#randomize(parse, column),
            Read => Ok(Statement::Read(column, parse.variable_list()?)),
            Redim => Self::r#redim(parse, column),
            Restore => Self::r#restore(parse, column),
            Resume => Self::r#resume(parse, column),
            Return => Ok(Statement::Return(column)),
            Shared => Ok(Statement::Shared(column, parse.declaration_list()?)),
            Stop => Ok(Statement::Stop(column)),
            Sub => Ok(Statement::Sub(column, parse.procedure(false, false)?)),
            Swap => Self::r#swap(parse, column),
            Type => Ok(Statement::Type(column, parse.ident()?.1)),
            Wend => Ok(Statement::Wend(column)),
            While => Ok(Statement::While(column, parse.expression()?)),
            As | ByVal | Currency | Double | Integer | Lib | Local | Long | Preserve | Rem1
            | Rem2 | Single | Static | Step | String | Then | To | Until => {
                Err(error!(SyntaxError, ..&column; "EXPECTED STATEMENT"))
            }
        }
    }

    fn r#call(parse: &mut Parser, column: Column) -> Result<Statement> {
        let (_, ident) = parse.ident()?;
        let args = match parse.peek() {
            Some(Token::LParen) => parse.expression_list()?,
            _ => vec![],
        };
        Ok(Statement::Call(column, ident, args))
    }

    fn r#const(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut v = vec![];
        loop {
            let (_, ident) = parse.ident()?;
            parse.expect(Token::Operator(Operator::Equal))?;
            v.push((ident, parse.expression()?));
            match parse.peek() {
                Some(Token::Comma) => {
                    parse.next();
                }
                _ => return Ok(Statement::Const(column, v)),
            }
        }
    }

    fn r#data(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut v = vec![];
        loop {
            let item = match parse.next() {
                Some(Token::Literal(lit)) => Expression::for_literal(parse.column(), lit)?,
                Some(Token::Operator(Operator::Minus)) => {
                    let col = parse.column();
                    match parse.next() {
                        Some(Token::Literal(lit)) if !matches!(lit, Literal::String(_)) => {
                            let lit = Expression::for_literal(parse.column(), lit)?;
                            Expression::Negation(col, Box::new(lit))
                        }
                        _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED NUMBER")),
                    }
                }
                Some(Token::Ident(i)) => Expression::String(parse.column(), i.name().clone()),
                _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED DATA ITEM")),
            };
            v.push(item);
            match parse.peek() {
                Some(Token::Comma) => {
                    parse.next();
                }
                _ => return Ok(Statement::Data(column, v)),
            }
        }
    }

    fn r#declare(parse: &mut Parser, column: Column) -> Result<Statement> {
        let function = match parse.next() {
            Some(Token::Word(Word::Sub)) => false,
            Some(Token::Word(Word::Function)) => true,
            _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED SUB OR FUNCTION")),
        };
        Ok(Statement::Declare(column, parse.procedure(function, true)?))
    }

    fn r#deftype(parse: &mut Parser, column: Column, type_name: TypeName) -> Result<Statement> {
        fn letter(parse: &mut Parser) -> Result<char> {
            match parse.next() {
                Some(Token::Ident(Ident::Plain(s))) if s.len() == 1 => {
                    Ok(s.chars().next().unwrap_or('A'))
                }
                _ => Err(error!(SyntaxError, ..&parse.col; "EXPECTED LETTER")),
            }
        }
        let mut v = vec![];
        loop {
            let from = letter(parse)?;
            let to = if let Some(Token::Operator(Operator::Minus)) = parse.peek() {
                parse.next();
                letter(parse)?
            } else {
                from
            };
            v.push((from, to));
            match parse.peek() {
                Some(Token::Comma) => {
                    parse.next();
                }
                _ => return Ok(Statement::DefType(column, type_name, v)),
            }
        }
    }

    fn r#dim(parse: &mut Parser, column: Column) -> Result<Statement> {
        let shared = if let Some(Token::Word(Word::Shared)) = parse.peek() {
            parse.next();
            true
        } else {
            false
        };
        Ok(Statement::Dim(column, shared, parse.declaration_list()?))
    }

    fn r#elseif(parse: &mut Parser, column: Column) -> Result<Statement> {
        let predicate = parse.expression()?;
        parse.expect(Token::Word(Word::Then))?;
        Ok(Statement::ElseIf(column, predicate))
    }

    fn r#end(parse: &mut Parser, column: Column) -> Result<Statement> {
        let statement = match parse.peek() {
            Some(Token::Word(Word::If)) => Statement::EndIf(column),
            Some(Token::Word(Word::Sub)) => Statement::EndSub(column),
            Some(Token::Word(Word::Function)) => Statement::EndFunction(column),
            Some(Token::Word(Word::Type)) => Statement::EndType(column),
            _ => return Ok(Statement::End(column)),
        };
        parse.next();
        Ok(statement)
    }

    fn r#erase(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut v = vec![parse.ident()?.1];
        while let Some(Token::Comma) = parse.peek() {
            parse.next();
            v.push(parse.ident()?.1);
        }
        Ok(Statement::Erase(column, v))
    }

    fn r#exit(parse: &mut Parser, column: Column) -> Result<Statement> {
        let kind = match parse.next() {
            Some(Token::Word(Word::For)) => ExitKind::For,
            Some(Token::Word(Word::Do)) => ExitKind::Do,
            Some(Token::Word(Word::Sub)) => ExitKind::Sub,
            Some(Token::Word(Word::Function)) => ExitKind::Function,
            _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED FOR, DO, SUB OR FUNCTION")),
        };
        Ok(Statement::Exit(column, kind))
    }

    fn r#for(parse: &mut Parser, column: Column) -> Result<Statement> {
        let (_, ident) = parse.ident()?;
        parse.expect(Token::Operator(Operator::Equal))?;
        let from = parse.expression()?;
        parse.expect(Token::Word(Word::To))?;
        let to = parse.expression()?;
        let step = if let Some(Token::Word(Word::Step)) = parse.peek() {
            parse.next();
            Some(parse.expression()?)
        } else {
            None
        };
        Ok(Statement::For(column, ident, from, to, step))
    }

    fn r#if(parse: &mut Parser, column: Column) -> Result<Statement> {
        let predicate = parse.expression()?;
        let then = match parse.next() {
            Some(Token::Word(Word::Then)) => {
                if parse.peek().is_none() {
                    return Ok(Statement::IfBlock(column, predicate));
                }
                parse.branch()?
            }
            Some(Token::Word(Word::Goto)) => {
                let col = parse.column();
                vec![Statement::Goto(col, parse.target()?)]
            }
            _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED THEN")),
        };
        let otherwise = if let Some(Token::Word(Word::Else)) = parse.peek() {
            parse.next();
            parse.branch()?
        } else {
            vec![]
        };
        Ok(Statement::If(column, predicate, then, otherwise))
    }

    fn r#input(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut prompt = None;
        let mut question = true;
        if let Some(Token::Literal(Literal::String(s))) = parse.peek() {
            parse.next();
            prompt = Some(Rc::from(s.as_str()));
            match parse.next() {
                Some(Token::Semicolon) => {}
                Some(Token::Comma) => question = false,
                _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED SEPARATOR")),
            }
        }
        Ok(Statement::Input(column, prompt, question, parse.variable_list()?))
    }

    fn r#line(parse: &mut Parser, column: Column) -> Result<Statement> {
        parse.expect(Token::Word(Word::Input))?;
        let mut prompt = None;
        if let Some(Token::Literal(Literal::String(s))) = parse.peek() {
            parse.next();
            prompt = Some(Rc::from(s.as_str()));
            match parse.next() {
                Some(Token::Semicolon) | Some(Token::Comma) => {}
                _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED SEPARATOR")),
            }
        }
        Ok(Statement::LineInput(column, prompt, parse.variable()?))
    }

    fn r#next(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut v = vec![];
        if let Some(Token::Ident(_)) = parse.peek() {
            v.push(parse.ident()?.1);
            while let Some(Token::Comma) = parse.peek() {
                parse.next();
                v.push(parse.ident()?.1);
            }
        }
        Ok(Statement::Next(column, v))
    }

    fn r#on(parse: &mut Parser, column: Column) -> Result<Statement> {
        let local = if let Some(Token::Word(Word::Local)) = parse.peek() {
            parse.next();
            parse.expect(Token::Word(Word::Error))?;
            true
        } else if let Some(Token::Word(Word::Error)) = parse.peek() {
            parse.next();
            false
        } else {
            let selector = parse.expression()?;
            return match parse.next() {
                Some(Token::Word(Word::Goto)) => {
                    Ok(Statement::OnGoto(column, selector, parse.target_list()?))
                }
                Some(Token::Word(Word::Gosub)) => {
                    Ok(Statement::OnGosub(column, selector, parse.target_list()?))
                }
                _ => Err(error!(SyntaxError, ..&parse.col; "EXPECTED GOTO OR GOSUB")),
            };
        };
        let action = match parse.next() {
            Some(Token::Word(Word::Goto)) => match parse.target()? {
                Target::Line(0) => OnError::Disable,
                target => OnError::Goto(target),
            },
            Some(Token::Word(Word::Resume)) => {
                parse.expect(Token::Word(Word::Next))?;
                OnError::ResumeNext
            }
            _ => return Err(error!(SyntaxError, ..&parse.col; "EXPECTED GOTO OR RESUME")),
        };
        Ok(Statement::OnError(column, local, action))
    }

    fn r#randomize(parse: &mut Parser, column: Column) -> Result<Statement> {
        match parse.peek() {
            None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => {
                Ok(Statement::Randomize(column, None))
            }
            _ => Ok(Statement::Randomize(column, Some(parse.expression()?))),
        }
    }

    fn r#redim(parse: &mut Parser, column: Column) -> Result<Statement> {
        let mut preserve = false;
        let mut shared = false;
        loop {
            match parse.peek() {
                Some(Token::Word(Word::Preserve)) => preserve = true,
                Some(Token::Word(Word::Shared)) => shared = true,
                _ => break,
            }
            parse.next();
        }
        Ok(Statement::Redim(column, preserve, shared, parse.declaration_list()?))
    }

    fn r#restore(parse: &mut Parser, column: Column) -> Result<Statement> {
        match parse.peek() {
            None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => {
                Ok(Statement::Restore(column, None))
            }
            _ => Ok(Statement::Restore(column, Some(parse.target()?))),
        }
    }

    fn r#resume(parse: &mut Parser, column: Column) -> Result<Statement> {
        let resume = match parse.peek() {
            None | Some(Token::Colon) | Some(Token::Word(Word::Else)) => Resume::Retry,
            Some(Token::Word(Word::Next)) => {
                parse.next();
                Resume::Next
            }
            _ => match parse.target()? {
                Target::Line(0) => Resume::Retry,
                target => Resume::Target(target),
            },
        };
        Ok(Statement::Resume(column, resume))
    }

    fn r#swap(parse: &mut Parser, column: Column) -> Result<Statement> {
        let a = parse.variable()?;
        parse.expect(Token::Comma)?;
        let b = parse.variable()?;
        Ok(Statement::Swap(column, a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::super::lex::lex;
    use super::*;

    fn parse_str(s: &str) -> Statement {
        let tokens = lex(s);
        match parse(1, 0, &tokens) {
            Ok(mut v) => {
                assert_eq!(v.len(), 1, "{:?}", v);
                v.pop().unwrap()
            }
            Err(e) => panic!("{} : {:?}", e, e),
        }
    }

    fn var(col: Column, name: &str) -> Expression {
        Expression::UnaryVar(col, Ident::from_name(name))
    }

    #[test]
    fn test_let_foo_eq_bar() {
        let answer = Statement::Let(
            0..3,
            Variable::Unary(0..3, Ident::from_name("FOO")),
            var(4..7, "BAR"),
        );
        assert_eq!(parse_str("foo=bar:"), answer);
    }

    #[test]
    fn test_literals() {
        let lit = |s: &str| match parse_str(&format!("A={}", s)) {
            Statement::Let(_, _, e) => e,
            s => panic!("{:?}", s),
        };
        assert_eq!(lit("12"), Expression::Integer(2..4, 12));
        assert_eq!(lit("12!"), Expression::Single(2..5, 12.0));
        assert_eq!(lit("12d4"), Expression::Double(2..6, 12e4));
        assert_eq!(lit("1.25@"), Expression::Currency(2..7, 12_500));
        assert_eq!(lit("&HFFFF"), Expression::Integer(2..8, -1));
        assert_eq!(lit("\"food\""), Expression::String(2..8, "food".into()));
    }

    #[test]
    fn test_literal_overflow() {
        let tokens = lex("A = 40000%");
        let e = parse(7, 0, &tokens).unwrap_err();
        assert_eq!(e.code(), 6);
        assert_eq!(e.line(), Some(7));
    }

    #[test]
    fn test_precedence() {
        let answer = Expression::Subtract(
            2..9,
            Box::new(Expression::Integer(2..3, 2)),
            Box::new(Expression::Multiply(
                4..9,
                Box::new(Expression::Integer(4..5, 3)),
                Box::new(Expression::Power(
                    6..9,
                    Box::new(Expression::Integer(6..7, 4)),
                    Box::new(Expression::Integer(8..9, 2)),
                )),
            )),
        );
        match parse_str("A=2-3*4^2") {
            Statement::Let(_, _, e) => assert_eq!(e, answer),
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_negation_binds_looser_than_power() {
        match parse_str("A=-2^2") {
            Statement::Let(_, _, Expression::Negation(_, e)) => {
                assert!(matches!(*e, Expression::Power(..)))
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_single_line_if() {
        match parse_str("IF a THEN 100 ELSE PRINT 1: PRINT 2") {
            Statement::If(_, _, then, otherwise) => {
                assert_eq!(then, vec![Statement::Goto(10..13, Target::Line(100))]);
                assert_eq!(otherwise.len(), 2);
            }
            s => panic!("{:?}", s),
        }
        assert!(matches!(parse_str("if x > 1 then"), Statement::IfBlock(..)));
    }

    #[test]
    fn test_on_error() {
        assert_eq!(
            parse_str("ON LOCAL ERROR GOTO handler"),
            Statement::OnError(0..2, true, OnError::Goto(Target::Label("HANDLER".into())))
        );
        assert_eq!(
            parse_str("on error goto 0"),
            Statement::OnError(0..2, false, OnError::Disable)
        );
        assert_eq!(
            parse_str("on error resume next"),
            Statement::OnError(0..2, false, OnError::ResumeNext)
        );
    }

    #[test]
    fn test_declare_lib() {
        match parse_str("DECLARE FUNCTION Total& LIB \"host\" (a() AS LONG, BYVAL n AS INTEGER)") {
            Statement::Declare(_, p) => {
                assert!(p.function);
                assert_eq!(p.lib.as_deref(), Some("host"));
                assert_eq!(p.params.len(), 2);
                assert!(p.params[0].array);
                assert!(p.params[1].by_val);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_field_and_call() {
        assert_eq!(
            parse_str("name AS STRING * 10"),
            Statement::Field(0..4, Ident::from_name("NAME"), TypeName::FixedString(10))
        );
        match parse_str("Foo 1, x") {
            Statement::Call(_, ident, args) => {
                assert_eq!(ident, Ident::from_name("FOO"));
                assert_eq!(args.len(), 2);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_record_element_field() {
        match parse_str("a(1).x = 5") {
            Statement::Let(_, Variable::Field(_, base, field), _) => {
                assert!(matches!(*base, Variable::Array(..)));
                assert_eq!(field, Ident::from_name("X"));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_syntax_error_column() {
        let tokens = lex("X = 1 2");
        let e = parse(3, 0, &tokens).unwrap_err();
        assert_eq!(e.code(), 2);
        assert_eq!(e.line(), Some(3));
        assert_eq!(e.column(), 6..7);
    }
}
