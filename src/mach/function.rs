use super::currency::SCALE;
use super::types::DataType;
use super::Val;
use crate::error;
use crate::lang::Error;
use std::ops::RangeInclusive;

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Asc,
    Atn,
    Ccur,
    Cdbl,
    Chr,
    Cint,
    Clng,
    Cos,
    Csng,
    Erl,
    Err,
    Exp,
    Fix,
    Hex,
    Instr,
    Int,
    Lcase,
    Left,
    Len,
    Log,
    Ltrim,
    Mid,
    Oct,
    Right,
    Rnd,
    Rtrim,
    Sgn,
    Sin,
    Space,
    Sqr,
    Str,
    String,
    Tan,
    Timer,
    Ucase,
    Val,
}

/// Interpreter state some built-ins read.
pub trait Context {
    /// `RND`: a negative argument reseeds, zero repeats the last
    /// number, anything else draws the next one.
    fn rnd(&mut self, arg: Option<f64>) -> f32;
    fn timer(&self) -> f64;
    fn err(&self) -> u16;
    fn erl(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Number,
    Text,
    Either,
}

pub struct Function {}

impl Function {
    pub fn lookup(name: &str) -> Option<(Builtin, RangeInclusive<usize>)> {
        use Builtin::*;
        let f = match name {
            "ABS" => (Abs, 1..=1),
            "ASC" => (Asc, 1..=1),
            "ATN" => (Atn, 1..=1),
            "CCUR" => (Ccur, 1..=1),
            "CDBL" => (Cdbl, 1..=1),
            "CHR$" => (Chr, 1..=1),
            "CINT" => (Cint, 1..=1),
            "CLNG" => (Clng, 1..=1),
            "COS" => (Cos, 1..=1),
            "CSNG" => (Csng, 1..=1),
            "ERL" => (Erl, 0..=0),
            "ERR" => (Err, 0..=0),
            "EXP" => (Exp, 1..=1),
            "FIX" => (Fix, 1..=1),
            "HEX$" => (Hex, 1..=1),
            "INSTR" => (Instr, 2..=3),
            "INT" => (Int, 1..=1),
            "LCASE$" => (Lcase, 1..=1),
            "LEFT$" => (Left, 2..=2),
            "LEN" => (Len, 1..=1),
            "LOG" => (Log, 1..=1),
            "LTRIM$" => (Ltrim, 1..=1),
            "MID$" => (Mid, 2..=3),
            "OCT$" => (Oct, 1..=1),
            "RIGHT$" => (Right, 2..=2),
            "RND" => (Rnd, 0..=1),
            "RTRIM$" => (Rtrim, 1..=1),
            "SGN" => (Sgn, 1..=1),
            "SIN" => (Sin, 1..=1),
            "SPACE$" => (Space, 1..=1),
            "SQR" => (Sqr, 1..=1),
            "STR$" => (Str, 1..=1),
            "STRING$" => (String, 2..=2),
            "TAN" => (Tan, 1..=1),
            "TIMER" => (Timer, 0..=0),
            "UCASE$" => (Ucase, 1..=1),
            "VAL" => (Val, 1..=1),
            _ => return None,
        };
        Some(f)
    }

    fn kinds(builtin: Builtin, argc: usize) -> Vec<Kind> {
        use Builtin::*;
        use Kind::*;
        match builtin {
            Asc | Lcase | Len | Ltrim | Rtrim | Ucase | Val => vec![Text],
            Left | Right => vec![Text, Number],
            Mid if argc == 3 => vec![Text, Number, Number],
            Mid => vec![Text, Number],
            Instr if argc == 3 => vec![Number, Text, Text],
            Instr => vec![Text, Text],
            String => vec![Number, Either],
            Erl | Err | Timer => vec![],
            _ => vec![Number; argc],
        }
    }

    /// Check argument types and give the result type.
    pub fn return_type(builtin: Builtin, args: &[DataType]) -> Result<DataType> {
        for (kind, arg) in Function::kinds(builtin, args.len()).iter().zip(args) {
            let ok = match kind {
                Kind::Number => arg.is_numeric(),
                Kind::Text => arg.is_string(),
                Kind::Either => arg.is_scalar(),
            };
            if !ok {
                return Err(error!(TypeMismatch));
            }
        }
        let first = args.first().map(|t| t.value_type());
        Ok(match builtin {
            Builtin::Abs | Builtin::Fix | Builtin::Int => first.unwrap_or(DataType::Single),
            Builtin::Atn | Builtin::Cos | Builtin::Exp | Builtin::Log | Builtin::Sin | Builtin::Sqr
            | Builtin::Tan => match first {
                Some(DataType::Double) | Some(DataType::Currency) => DataType::Double,
                _ => DataType::Single,
            },
            Builtin::Asc | Builtin::Cint | Builtin::Err | Builtin::Instr | Builtin::Len
            | Builtin::Sgn => DataType::Integer,
            Builtin::Clng | Builtin::Erl => DataType::Long,
            Builtin::Csng | Builtin::Rnd | Builtin::Timer => DataType::Single,
            Builtin::Cdbl | Builtin::Val => DataType::Double,
            Builtin::Ccur => DataType::Currency,
            _ => DataType::String,
        })
    }

    /// Whether two calls with the same arguments always agree.
    pub fn is_pure(builtin: Builtin) -> bool {
        !matches!(builtin, Builtin::Rnd | Builtin::Timer | Builtin::Err | Builtin::Erl)
    }

    pub fn call(builtin: Builtin, args: Vec<Val>, ctx: &mut dyn Context) -> Result<Val> {
        let mut args = args.into_iter();
        let mut arg = || args.next().ok_or_else(|| error!(ArgumentCountMismatch));
        match builtin {
            Builtin::Abs => Function::abs(arg()?),
            Builtin::Asc => match text(arg()?)?.chars().next() {
                Some(c) => Ok(Val::Integer(c as i16)),
                None => Err(error!(IllegalFunctionCall)),
            },
            Builtin::Atn => float(arg()?, f64::atan),
            Builtin::Ccur => Ok(Val::Currency(arg()?.to_currency()?)),
            Builtin::Cdbl => Ok(Val::Double(arg()?.to_f64()?)),
            Builtin::Chr => {
                let n = arg()?.to_i64()?;
                if (0..=255).contains(&n) {
                    Ok(Val::String((n as u8 as char).to_string()))
                } else {
                    Err(error!(IllegalFunctionCall))
                }
            }
            Builtin::Cint => arg()?.convert(&DataType::Integer),
            Builtin::Clng => arg()?.convert(&DataType::Long),
            Builtin::Cos => float(arg()?, f64::cos),
            Builtin::Csng => arg()?.convert(&DataType::Single),
            Builtin::Erl => Ok(Val::Long(ctx.erl() as i32)),
            Builtin::Err => Ok(Val::Integer(ctx.err() as i16)),
            Builtin::Exp => float(arg()?, f64::exp),
            Builtin::Fix => Function::fix(arg()?),
            Builtin::Hex => radix(arg()?, 16),
            Builtin::Instr => {
                let first = arg()?;
                let (start, haystack, needle) = match first {
                    Val::String(s) => (1, s, text(arg()?)?),
                    n => (n.to_i64()?, text(arg()?)?, text(arg()?)?),
                };
                Function::instr(start, &haystack, &needle)
            }
            Builtin::Int => Function::int(arg()?),
            Builtin::Lcase => Ok(Val::String(text(arg()?)?.to_ascii_lowercase())),
            Builtin::Left => {
                let s = text(arg()?)?;
                let n = count(arg()?)?;
                Ok(Val::String(s.chars().take(n).collect()))
            }
            Builtin::Len => Ok(Val::Integer(text(arg()?)?.chars().count() as i16)),
            Builtin::Log => {
                let v = arg()?;
                if v.to_f64()? <= 0.0 {
                    return Err(error!(IllegalFunctionCall));
                }
                float(v, f64::ln)
            }
            Builtin::Ltrim => Ok(Val::String(text(arg()?)?.trim_start_matches(' ').to_string())),
            Builtin::Mid => {
                let s = text(arg()?)?;
                let start = arg()?.to_i64()?;
                let len = match arg() {
                    Ok(v) => Some(count(v)?),
                    Err(_) => None,
                };
                if start < 1 {
                    return Err(error!(IllegalFunctionCall));
                }
                let rest = s.chars().skip(start as usize - 1);
                Ok(Val::String(match len {
                    Some(n) => rest.take(n).collect(),
                    None => rest.collect(),
                }))
            }
            Builtin::Oct => radix(arg()?, 8),
            Builtin::Right => {
                let s = text(arg()?)?;
                let n = count(arg()?)?;
                let len = s.chars().count();
                Ok(Val::String(s.chars().skip(len.saturating_sub(n)).collect()))
            }
            Builtin::Rnd => {
                let n = match arg() {
                    Ok(v) => Some(v.to_f64()?),
                    Err(_) => None,
                };
                Ok(Val::Single(ctx.rnd(n)))
            }
            Builtin::Rtrim => Ok(Val::String(text(arg()?)?.trim_end_matches(' ').to_string())),
            Builtin::Sgn => {
                let n = arg()?.to_f64()?;
                Ok(Val::Integer(if n > 0.0 {
                    1
                } else if n < 0.0 {
                    -1
                } else {
                    0
                }))
            }
            Builtin::Sin => float(arg()?, f64::sin),
            Builtin::Space => Ok(Val::String(" ".repeat(count(arg()?)?))),
            Builtin::Sqr => {
                let v = arg()?;
                if v.to_f64()? < 0.0 {
                    return Err(error!(IllegalFunctionCall));
                }
                float(v, f64::sqrt)
            }
            Builtin::Str => Ok(Val::String(arg()?.str_string())),
            Builtin::String => {
                let n = count(arg()?)?;
                let c = match arg()? {
                    Val::String(s) => s.chars().next().ok_or_else(|| error!(IllegalFunctionCall))?,
                    v => match v.to_i64()? {
                        code @ 0..=255 => code as u8 as char,
                        _ => return Err(error!(IllegalFunctionCall)),
                    },
                };
                Ok(Val::String(std::iter::repeat(c).take(n).collect()))
            }
            Builtin::Tan => float(arg()?, f64::tan),
            Builtin::Timer => Ok(Val::Single(ctx.timer() as f32)),
            Builtin::Ucase => Ok(Val::String(text(arg()?)?.to_ascii_uppercase())),
            Builtin::Val => Ok(Val::Double(parse_val(&text(arg()?)?))),
        }
    }

    fn abs(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Integer(n) => n.checked_abs().map(Integer).ok_or_else(|| error!(Overflow)),
            Long(n) => n.checked_abs().map(Long).ok_or_else(|| error!(Overflow)),
            Single(n) => Ok(Single(n.abs())),
            Double(n) => Ok(Double(n.abs())),
            Currency(c) if c.0 < 0 => Ok(Currency(c.checked_neg()?)),
            Currency(c) => Ok(Currency(c)),
            String(_) => Err(error!(TypeMismatch)),
        }
    }

    fn int(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Single(n) => Ok(Single(n.floor())),
            Double(n) => Ok(Double(n.floor())),
            Currency(c) => {
                Ok(Currency(super::currency::Currency(c.0.div_euclid(SCALE) * SCALE)))
            }
            String(_) => Err(error!(TypeMismatch)),
            v => Ok(v),
        }
    }

    fn fix(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Single(n) => Ok(Single(n.trunc())),
            Double(n) => Ok(Double(n.trunc())),
            Currency(c) => {
                Ok(Currency(super::currency::Currency(c.0 / SCALE * SCALE)))
            }
            String(_) => Err(error!(TypeMismatch)),
            v => Ok(v),
        }
    }

    fn instr(start: i64, haystack: &str, needle: &str) -> Result<Val> {
        if start < 1 {
            return Err(error!(IllegalFunctionCall));
        }
        let hay: Vec<char> = haystack.chars().collect();
        let pat: Vec<char> = needle.chars().collect();
        let start = start as usize - 1;
        if start > hay.len() {
            return Ok(Val::Integer(0));
        }
        if pat.is_empty() {
            return Ok(Val::Integer(if hay.is_empty() { 0 } else { start as i16 + 1 }));
        }
        let found = (start..hay.len())
            .find(|i| hay[*i..].starts_with(&pat))
            .map(|i| i as i16 + 1)
            .unwrap_or(0);
        Ok(Val::Integer(found))
    }
}

fn text(val: Val) -> Result<String> {
    match val {
        Val::String(s) => Ok(s),
        _ => Err(error!(TypeMismatch)),
    }
}

fn count(val: Val) -> Result<usize> {
    let n = val.to_i64()?;
    if n < 0 || n > 32767 {
        Err(error!(IllegalFunctionCall))
    } else {
        Ok(n as usize)
    }
}

/// Transcendental functions keep Double precision for Double
/// arguments and compute in Single otherwise.
fn float(val: Val, f: fn(f64) -> f64) -> Result<Val> {
    match val {
        Val::Double(_) | Val::Currency(_) => {
            let n = f(val.to_f64()?);
            if n.is_finite() {
                Ok(Val::Double(n))
            } else {
                Err(error!(Overflow))
            }
        }
        Val::String(_) => Err(error!(TypeMismatch)),
        v => {
            let n = f(v.to_f64()?) as f32;
            if n.is_finite() {
                Ok(Val::Single(n))
            } else {
                Err(error!(Overflow))
            }
        }
    }
}

fn radix(val: Val, base: u32) -> Result<Val> {
    let n = val.to_i32()?;
    let bits = if n >= i16::MIN as i32 && n <= i16::MAX as i32 {
        n as i16 as u16 as u32
    } else {
        n as u32
    };
    Ok(Val::String(match base {
        16 => format!("{:X}", bits),
        _ => format!("{:o}", bits),
    }))
}

/// The numeric prefix of `s`, as `VAL` reads it. Spaces are ignored.
pub fn parse_val(s: &str) -> f64 {
    let s: String = s.chars().filter(|c| *c != ' ' && *c != '\t').collect();
    let upper = s.to_ascii_uppercase();
    for (prefix, base) in [("&H", 16), ("&O", 8), ("&", 8)] {
        if let Some(digits) = upper.strip_prefix(prefix) {
            let digits: String = digits.chars().take_while(|c| c.is_digit(base)).collect();
            return match i64::from_str_radix(&digits, base) {
                Ok(n) if n <= 0xFFFF => n as u16 as i16 as f64,
                Ok(n) => n as u32 as i32 as f64,
                Err(_) => 0.0,
            };
        }
    }
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_point = false;
    let mut seen_exp = false;
    let bytes: Vec<char> = upper.chars().collect();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == '-' || bytes[i] == '+') {
        i += 1;
    }
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            seen_digit = true;
            end = i + 1;
        } else if c == '.' && !seen_point && !seen_exp {
            seen_point = true;
        } else if (c == 'E' || c == 'D') && seen_digit && !seen_exp {
            seen_exp = true;
            if i + 1 < bytes.len() && (bytes[i + 1] == '-' || bytes[i + 1] == '+') {
                i += 1;
            }
        } else {
            break;
        }
        i += 1;
    }
    let text: String = bytes[..end].iter().map(|c| if *c == 'D' { 'E' } else { *c }).collect();
    text.parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Context for Fixed {
        fn rnd(&mut self, _arg: Option<f64>) -> f32 {
            0.5
        }
        fn timer(&self) -> f64 {
            3600.0
        }
        fn err(&self) -> u16 {
            11
        }
        fn erl(&self) -> u32 {
            20
        }
    }

    fn call(name: &str, args: Vec<Val>) -> Result<Val> {
        let (f, arity) = Function::lookup(name).unwrap();
        assert!(arity.contains(&args.len()));
        Function::call(f, args, &mut Fixed)
    }

    fn s(v: &str) -> Val {
        Val::String(v.into())
    }

    #[test]
    fn test_strings() {
        assert_eq!(call("LEFT$", vec![s("HELLO"), Val::Integer(2)]), Ok(s("HE")));
        assert_eq!(call("RIGHT$", vec![s("HELLO"), Val::Integer(9)]), Ok(s("HELLO")));
        assert_eq!(call("MID$", vec![s("HELLO"), Val::Integer(2), Val::Integer(3)]), Ok(s("ELL")));
        assert_eq!(call("MID$", vec![s("HELLO"), Val::Integer(4)]), Ok(s("LO")));
        assert_eq!(call("INSTR", vec![s("BANANA"), s("NA")]), Ok(Val::Integer(3)));
        assert_eq!(
            call("INSTR", vec![Val::Integer(4), s("BANANA"), s("NA")]),
            Ok(Val::Integer(5))
        );
        assert_eq!(call("STRING$", vec![Val::Integer(3), s("xy")]), Ok(s("xxx")));
        assert_eq!(call("STRING$", vec![Val::Integer(2), Val::Integer(65)]), Ok(s("AA")));
        assert_eq!(call("LTRIM$", vec![s("  a ")]), Ok(s("a ")));
        assert_eq!(call("STR$", vec![Val::Single(1.5)]), Ok(s(" 1.5")));
    }

    #[test]
    fn test_illegal_calls() {
        assert_eq!(call("CHR$", vec![Val::Integer(256)]).unwrap_err().code(), 5);
        assert_eq!(call("ASC", vec![s("")]).unwrap_err().code(), 5);
        assert_eq!(call("SQR", vec![Val::Integer(-1)]).unwrap_err().code(), 5);
        assert_eq!(call("LOG", vec![Val::Integer(0)]).unwrap_err().code(), 5);
        assert_eq!(call("MID$", vec![s("A"), Val::Integer(0)]).unwrap_err().code(), 5);
        assert_eq!(call("ABS", vec![Val::Integer(i16::MIN)]).unwrap_err().code(), 6);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(call("INT", vec![Val::Single(-2.5)]), Ok(Val::Single(-3.0)));
        assert_eq!(call("FIX", vec![Val::Single(-2.5)]), Ok(Val::Single(-2.0)));
        assert_eq!(call("CINT", vec![Val::Double(2.5)]), Ok(Val::Integer(2)));
        assert_eq!(call("SGN", vec![Val::Double(-0.1)]), Ok(Val::Integer(-1)));
        assert_eq!(call("SQR", vec![Val::Integer(16)]), Ok(Val::Single(4.0)));
        assert_eq!(call("SQR", vec![Val::Double(2.25)]), Ok(Val::Double(1.5)));
        assert_eq!(call("HEX$", vec![Val::Integer(-1)]), Ok(s("FFFF")));
        assert_eq!(call("OCT$", vec![Val::Integer(8)]), Ok(s("10")));
        assert_eq!(call("ERR", vec![]), Ok(Val::Integer(11)));
        assert_eq!(call("ERL", vec![]), Ok(Val::Long(20)));
    }

    #[test]
    fn test_val() {
        assert_eq!(parse_val(" 12 34"), 1234.0);
        assert_eq!(parse_val("-1.5E2xyz"), -150.0);
        assert_eq!(parse_val("&HFF"), 255.0);
        assert_eq!(parse_val("&HFFFF"), -1.0);
        assert_eq!(parse_val("abc"), 0.0);
    }

    #[test]
    fn test_typing() {
        use DataType::*;
        assert_eq!(Function::return_type(Builtin::Abs, &[Long]), Ok(Long));
        assert_eq!(Function::return_type(Builtin::Sin, &[Integer]), Ok(Single));
        assert_eq!(Function::return_type(Builtin::Sin, &[Double]), Ok(Double));
        assert_eq!(Function::return_type(Builtin::Left, &[FixedString(4), Long]), Ok(String));
        let e = Function::return_type(Builtin::Len, &[Integer]).unwrap_err();
        assert_eq!(e.code(), 13);
    }
}
