use super::Column;
use std::borrow::Cow;

/// A numbered BASIC error.
///
/// The same value describes compile-time faults (which carry the source line
/// and column of the offending token) and runtime faults (whose code is what
/// `ERR` reports to a handler).
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    code: u16,
    line: Option<usize>,
    column: Column,
    message: Cow<'static, str>,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
    };
    ($err:ident, ..$col:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).in_column($col)
    };
    ($err:ident, $line:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).in_line($line)
    };
    ($err:ident; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).message($msg)
    };
    ($err:ident, ..$col:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_column($col)
            .message($msg)
    };
    ($err:ident, $line:expr, ..$col:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line($line)
            .in_column($col)
    };
    ($err:ident, $line:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line($line)
            .message($msg)
    };
    ($err:ident, $line:expr, ..$col:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line($line)
            .in_column($col)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error::numbered(code as u16)
    }

    /// An error raised by number, as the `ERROR n` statement does.
    pub fn numbered(code: u16) -> Error {
        Error {
            code,
            line: None,
            column: 0..0,
            message: Cow::Borrowed(""),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code as u16
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn column(&self) -> Column {
        self.column.clone()
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    pub fn in_line(&self, line: Option<usize>) -> Error {
        Error {
            code: self.code,
            line: self.line.or(line),
            column: self.column.clone(),
            message: self.message.clone(),
        }
    }

    pub fn in_column(&self, column: &Column) -> Error {
        let column = if self.column == (0..0) {
            column.clone()
        } else {
            self.column.clone()
        };
        Error {
            code: self.code,
            line: self.line,
            column,
            message: self.message.clone(),
        }
    }

    pub fn message<S: Into<Cow<'static, str>>>(&self, message: S) -> Error {
        Error {
            code: self.code,
            line: self.line,
            column: self.column.clone(),
            message: message.into(),
        }
    }

    pub fn is_compile_time(&self) -> bool {
        self.code >= 100
    }
}

/// Historical runtime error numbers, followed by the compiler's own
/// diagnostics which have no `ERR` value of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NextWithoutFor = 1,
    SyntaxError = 2,
    ReturnWithoutGosub = 3,
    OutOfData = 4,
    IllegalFunctionCall = 5,
    Overflow = 6,
    OutOfMemory = 7,
    LabelNotDefined = 8,
    SubscriptOutOfRange = 9,
    DuplicateDefinition = 10,
    DivisionByZero = 11,
    TypeMismatch = 13,
    StringFormulaTooComplex = 16,
    FunctionNotDefined = 18,
    NoResume = 19,
    ResumeWithoutError = 20,
    ForWithoutNext = 26,
    OutOfStackSpace = 28,
    WhileWithoutWend = 29,
    WendWithoutWhile = 30,
    DuplicateLabel = 33,
    SubprogramNotDefined = 35,
    ArgumentCountMismatch = 37,
    ArrayNotDefined = 38,
    VariableRequired = 40,
    InternalError = 51,
    FileNotFound = 53,
    InputPastEnd = 62,

    BlockIfWithoutEndIf = 100,
    ElseWithoutIf = 101,
    EndIfWithoutBlockIf = 102,
    TypeWithoutEndType = 103,
    StatementIllegalInTypeBlock = 104,
    EndTypeWithoutType = 105,
    SubWithoutEndSub = 106,
    FunctionWithoutEndFunction = 107,
    IllegalInSubFunction = 108,
    IllegalOutsideSubFunction = 109,
    DoWithoutLoop = 110,
    LoopWithoutDo = 111,
    ExitWithoutBlock = 112,
    IllegalNumber = 113,
    InvalidConstant = 114,
    IdentifierCannotIncludePeriod = 115,
    ParameterTypeMismatch = 116,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let code_str = match self.code {
            1 => "NEXT WITHOUT FOR",
            2 => "SYNTAX ERROR",
            3 => "RETURN WITHOUT GOSUB",
            4 => "OUT OF DATA",
            5 => "ILLEGAL FUNCTION CALL",
            6 => "OVERFLOW",
            7 => "OUT OF MEMORY",
            8 => "LABEL NOT DEFINED",
            9 => "SUBSCRIPT OUT OF RANGE",
            10 => "DUPLICATE DEFINITION",
            11 => "DIVISION BY ZERO",
            12 => "ILLEGAL IN DIRECT MODE",
            13 => "TYPE MISMATCH",
            14 => "OUT OF STRING SPACE",
            16 => "STRING FORMULA TOO COMPLEX",
            17 => "CANNOT CONTINUE",
            18 => "FUNCTION NOT DEFINED",
            19 => "NO RESUME",
            20 => "RESUME WITHOUT ERROR",
            24 => "DEVICE TIMEOUT",
            25 => "DEVICE FAULT",
            26 => "FOR WITHOUT NEXT",
            27 => "OUT OF PAPER",
            28 => "OUT OF STACK SPACE",
            29 => "WHILE WITHOUT WEND",
            30 => "WEND WITHOUT WHILE",
            33 => "DUPLICATE LABEL",
            35 => "SUBPROGRAM NOT DEFINED",
            37 => "ARGUMENT-COUNT MISMATCH",
            38 => "ARRAY NOT DEFINED",
            40 => "VARIABLE REQUIRED",
            50 => "FIELD OVERFLOW",
            51 => "INTERNAL ERROR",
            52 => "BAD FILE NAME OR NUMBER",
            53 => "FILE NOT FOUND",
            54 => "BAD FILE MODE",
            55 => "FILE ALREADY OPEN",
            56 => "FIELD STATEMENT ACTIVE",
            57 => "DEVICE I/O ERROR",
            58 => "FILE ALREADY EXISTS",
            59 => "BAD RECORD LENGTH",
            61 => "DISK FULL",
            62 => "INPUT PAST END OF FILE",
            63 => "BAD RECORD NUMBER",
            64 => "BAD FILE NAME",
            67 => "TOO MANY FILES",
            68 => "DEVICE UNAVAILABLE",
            69 => "COMMUNICATION-BUFFER OVERFLOW",
            70 => "PERMISSION DENIED",
            71 => "DISK NOT READY",
            72 => "DISK-MEDIA ERROR",
            73 => "FEATURE UNAVAILABLE",
            74 => "RENAME ACROSS DISKS",
            75 => "PATH/FILE ACCESS ERROR",
            76 => "PATH NOT FOUND",
            100 => "BLOCK IF WITHOUT END IF",
            101 => "ELSE WITHOUT IF",
            102 => "END IF WITHOUT BLOCK IF",
            103 => "TYPE WITHOUT END TYPE",
            104 => "STATEMENT ILLEGAL IN TYPE BLOCK",
            105 => "END TYPE WITHOUT TYPE",
            106 => "SUB WITHOUT END SUB",
            107 => "FUNCTION WITHOUT END FUNCTION",
            108 => "ILLEGAL IN SUB/FUNCTION",
            109 => "ILLEGAL OUTSIDE OF SUB/FUNCTION",
            110 => "DO WITHOUT LOOP",
            111 => "LOOP WITHOUT DO",
            112 => "EXIT NOT WITHIN BLOCK",
            113 => "ILLEGAL NUMBER",
            114 => "INVALID CONSTANT",
            115 => "IDENTIFIER CANNOT INCLUDE PERIOD",
            116 => "PARAMETER TYPE MISMATCH",
            _ => "",
        };
        let mut suffix = String::new();
        if let Some(line) = self.line {
            suffix.push_str(&format!(" {}", line));
        }
        if (0..0) != self.column {
            suffix.push_str(&format!(" ({}..{})", self.column.start, self.column.end));
        }
        if !self.message.is_empty() {
            suffix.push_str(&format!("; {}", self.message));
        }
        if code_str.is_empty() {
            if suffix.is_empty() {
                write!(f, "UNPRINTABLE ERROR {}", self.code)
            } else {
                write!(f, "UNPRINTABLE ERROR {} IN{}", self.code, suffix)
            }
        } else if suffix.is_empty() {
            write!(f, "{}", code_str)
        } else {
            write!(f, "{} IN{}", code_str, suffix)
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(error!(Overflow).to_string(), "OVERFLOW");
        assert_eq!(
            error!(SyntaxError, Some(10), ..&(3..5); "EXPECTED EXPRESSION").to_string(),
            "SYNTAX ERROR IN 10 (3..5); EXPECTED EXPRESSION"
        );
        assert_eq!(Error::numbered(222).to_string(), "UNPRINTABLE ERROR 222");
    }

    #[test]
    fn test_first_location_wins() {
        let e = error!(TypeMismatch, ..&(1..2)).in_column(&(7..9)).in_line(Some(3));
        assert_eq!(e.column(), 1..2);
        assert_eq!(e.in_line(Some(4)).line(), Some(3));
        assert!(!e.is_compile_time());
        assert!(error!(BlockIfWithoutEndIf).is_compile_time());
    }
}
