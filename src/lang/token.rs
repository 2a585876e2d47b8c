pub use super::ident::Ident;
use std::collections::HashMap;

thread_local!(
    static STRING_TO_TOKEN: HashMap<std::string::String, Token> = Token::FIELD_LESS
        .iter()
        .cloned()
        .chain(Word::ALL.iter().cloned().map(Token::Word))
        .chain(Operator::ALL.iter().cloned().map(Token::Operator))
        .map(|d| (d.to_string(), d))
        .collect();
);

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Unknown(String),
    Whitespace(usize),
    Literal(Literal),
    Word(Word),
    Operator(Operator),
    Ident(Ident),
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Dot,
}

impl Token {
    const FIELD_LESS: &'static [Token] = &[
        Token::LParen,
        Token::RParen,
        Token::Comma,
        Token::Colon,
        Token::Semicolon,
        Token::Dot,
    ];

    pub fn from_string(s: &str) -> Option<Token> {
        STRING_TO_TOKEN.with(|stt| stt.get(s).cloned())
    }

    pub fn is_word(&self) -> bool {
        matches!(self, Token::Word(_))
    }

    pub fn is_reserved_word(&self) -> bool {
        match self {
            Token::Word(_) => true,
            Token::Operator(op) => op.is_reserved_word(),
            _ => false,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Token::*;
        match self {
            Unknown(s) => write!(f, "{}", s),
            Whitespace(u) => write!(f, "{s:>w$}", s = "", w = u),
            Literal(s) => write!(f, "{}", s),
            Word(s) => write!(f, "{}", s),
            Operator(s) => write!(f, "{}", s),
            Ident(s) => write!(f, "{}", s),
            LParen => write!(f, "("),
            RParen => write!(f, ")"),
            Comma => write!(f, ","),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
            Dot => write!(f, "."),
        }
    }
}

/// Literals keep their source spelling; the parser converts them.
#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Single(String),
    Double(String),
    Integer(String),
    Long(String),
    Currency(String),
    String(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Literal::*;
        match self {
            Single(s) | Double(s) | Integer(s) | Long(s) | Currency(s) => write!(f, "{}", s),
            String(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Word {
    As,
    ByVal,
    Call,
    Const,
    Currency,
    Data,
    Declare,
    DefCur,
    DefDbl,
    DefInt,
    DefLng,
    DefSng,
    DefStr,
    Dim,
    Do,
    Double,
    Else,
    ElseIf,
    End,
    Erase,
    Error,
    Exit,
    For,
    Function,
    Gosub,
    Goto,
    If,
    Input,
    Integer,
    Let,
    Lib,
    Line,
    Local,
    Long,
    Loop,
    Next,
    On,
    Preserve,
    Print1,
    Print2,
    Randomize,
    Read,
    Redim,
    Rem1,
    Rem2,
    Restore,
    Resume,
    Return,
    Shared,
    Single,
    Static,
    Step,
    Stop,
    String,
    Sub,
    Swap,
    Then,
    To,
    Type,
    Until,
    Wend,
    While,
}

impl Word {
    pub const ALL: &'static [Word] = &[
        Word::As,
        Word::ByVal,
        Word::Call,
        Word::Const,
        Word::Currency,
        Word::Data,
        Word::Declare,
        Word::DefCur,
        Word::DefDbl,
        Word::DefInt,
        Word::DefLng,
        Word::DefSng,
        Word::DefStr,
        Word::Dim,
        Word::Do,
        Word::Double,
        Word::Else,
        Word::ElseIf,
        Word::End,
        Word::Erase,
        Word::Error,
        Word::Exit,
        Word::For,
        Word::Function,
        Word::Gosub,
        Word::Goto,
        Word::If,
        Word::Input,
        Word::Integer,
        Word::Let,
        Word::Lib,
        Word::Line,
        Word::Local,
        Word::Long,
        Word::Loop,
        Word::Next,
        Word::On,
        Word::Preserve,
        Word::Print1,
        Word::Print2,
        Word::Randomize,
        Word::Read,
        Word::Redim,
        Word::Rem1,
        Word::Rem2,
        Word::Restore,
        Word::Resume,
        Word::Return,
        Word::Shared,
        Word::Single,
        Word::Static,
        Word::Step,
        Word::Stop,
        Word::String,
        Word::Sub,
        Word::Swap,
        Word::Then,
        Word::To,
        Word::Type,
        Word::Until,
        Word::Wend,
        Word::While,
    ];
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Word::*;
        let s = match self {
            As => "AS",
            ByVal => "BYVAL",
            Call => "CALL",
            Const => "CONST",
            Currency => "CURRENCY",
            Data => "DATA",
            Declare => "DECLARE",
            DefCur => "DEFCUR",
            DefDbl => "DEFDBL",
            DefInt => "DEFINT",
            DefLng => "DEFLNG",
            DefSng => "DEFSNG",
            DefStr => "DEFSTR",
            Dim => "DIM",
            Do => "DO",
            Double => "DOUBLE",
            Else => "ELSE",
            ElseIf => "ELSEIF",
            End => "END",
            Erase => "ERASE",
            Error => "ERROR",
            Exit => "EXIT",
            For => "FOR",
            Function => "FUNCTION",
            Gosub => "GOSUB",
            Goto => "GOTO",
            If => "IF",
            Input => "INPUT",
            Integer => "INTEGER",
            Let => "LET",
            Lib => "LIB",
            Line => "LINE",
            Local => "LOCAL",
            Long => "LONG",
            Loop => "LOOP",
            Next => "NEXT",
            On => "ON",
            Preserve => "PRESERVE",
            Print1 => "PRINT",
            Print2 => "?",
            Randomize => "RANDOMIZE",
            Read => "READ",
            Redim => "REDIM",
            Rem1 => "REM",
            Rem2 => "'",
            Restore => "RESTORE",
            Resume => "RESUME",
            Return => "RETURN",
            Shared => "SHARED",
            Single => "SINGLE",
            Static => "STATIC",
            Step => "STEP",
            Stop => "STOP",
            String => "STRING",
            Sub => "SUB",
            Swap => "SWAP",
            Then => "THEN",
            To => "TO",
            Type => "TYPE",
            Until => "UNTIL",
            Wend => "WEND",
            While => "WHILE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Operator {
    Caret,
    Multiply,
    Divide,
    DivideInt,
    Modulo,
    Plus,
    Minus,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Not,
    And,
    Or,
    Xor,
    Imp,
    Eqv,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::Caret,
        Operator::Multiply,
        Operator::Divide,
        Operator::DivideInt,
        Operator::Modulo,
        Operator::Plus,
        Operator::Minus,
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::LessEqual,
        Operator::Greater,
        Operator::GreaterEqual,
        Operator::Not,
        Operator::And,
        Operator::Or,
        Operator::Xor,
        Operator::Imp,
        Operator::Eqv,
    ];

    pub fn is_reserved_word(&self) -> bool {
        use Operator::*;
        match self {
            Caret | Multiply | Divide | DivideInt | Plus | Minus | Equal | NotEqual | Less
            | LessEqual | Greater | GreaterEqual => false,
            Modulo | Not | And | Or | Xor | Imp | Eqv => true,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Operator::*;
        match self {
            Caret => write!(f, "^"),
            Multiply => write!(f, "*"),
            Divide => write!(f, "/"),
            DivideInt => write!(f, "\\"),
            Modulo => write!(f, "MOD"),
            Plus => write!(f, "+"),
            Minus => write!(f, "-"),
            Equal => write!(f, "="),
            NotEqual => write!(f, "<>"),
            Less => write!(f, "<"),
            LessEqual => write!(f, "<="),
            Greater => write!(f, ">"),
            GreaterEqual => write!(f, ">="),
            Not => write!(f, "NOT"),
            And => write!(f, "AND"),
            Or => write!(f, "OR"),
            Xor => write!(f, "XOR"),
            Imp => write!(f, "IMP"),
            Eqv => write!(f, "EQV"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string() {
        let t = Token::from_string("REM");
        assert_eq!(t, Some(Token::Word(Word::Rem1)));
        let t = Token::from_string("MOD");
        assert_eq!(t, Some(Token::Operator(Operator::Modulo)));
        let t = Token::from_string("PICKLES");
        assert_eq!(t, None);
    }
}
