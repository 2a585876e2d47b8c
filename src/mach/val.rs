use super::currency::{round_even, Currency};
use super::types::DataType;
use crate::error;
use crate::lang::Error;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// A scalar value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    Currency(Currency),
    String(String),
}

impl Val {
    pub fn data_type(&self) -> DataType {
        use Val::*;
        match self {
            Integer(_) => DataType::Integer,
            Long(_) => DataType::Long,
            Single(_) => DataType::Single,
            Double(_) => DataType::Double,
            Currency(_) => DataType::Currency,
            String(_) => DataType::String,
        }
    }

    /// The zero value of a scalar type.
    pub fn zero(data_type: &DataType) -> Val {
        match data_type {
            DataType::Integer => Val::Integer(0),
            DataType::Long => Val::Long(0),
            DataType::Double => Val::Double(0.0),
            DataType::Currency => Val::Currency(Currency(0)),
            DataType::String => Val::String(String::new()),
            DataType::FixedString(n) => Val::String("\0".repeat(*n)),
            _ => Val::Single(0.0),
        }
    }

    pub fn to_f64(&self) -> Result<f64> {
        use Val::*;
        match self {
            Integer(n) => Ok(*n as f64),
            Long(n) => Ok(*n as f64),
            Single(n) => Ok(*n as f64),
            Double(n) => Ok(*n),
            Currency(c) => Ok(c.to_f64()),
            String(_) => Err(error!(TypeMismatch)),
        }
    }

    /// Round to a whole number, ties to even, as every integer
    /// conversion does.
    pub fn to_i64(&self) -> Result<i64> {
        use Val::*;
        match self {
            Integer(n) => Ok(*n as i64),
            Long(n) => Ok(*n as i64),
            Currency(c) => Ok(c.round()),
            Single(_) | Double(_) => {
                let f = round_even(self.to_f64()?);
                if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(f as i64)
                } else {
                    Err(error!(Overflow))
                }
            }
            String(_) => Err(error!(TypeMismatch)),
        }
    }

    pub fn to_i16(&self) -> Result<i16> {
        i16::try_from(self.to_i64()?).map_err(|_| error!(Overflow))
    }

    pub fn to_i32(&self) -> Result<i32> {
        i32::try_from(self.to_i64()?).map_err(|_| error!(Overflow))
    }

    pub fn to_currency(&self) -> Result<Currency> {
        match self {
            Val::Integer(n) => Currency::from_i64(*n as i64),
            Val::Long(n) => Currency::from_i64(*n as i64),
            Val::Currency(c) => Ok(*c),
            Val::Single(_) | Val::Double(_) => Currency::from_f64(self.to_f64()?),
            Val::String(_) => Err(error!(TypeMismatch)),
        }
    }

    pub fn is_true(&self) -> Result<bool> {
        use Val::*;
        match self {
            Integer(n) => Ok(*n != 0),
            Long(n) => Ok(*n != 0),
            Single(n) => Ok(*n != 0.0),
            Double(n) => Ok(*n != 0.0),
            Currency(c) => Ok(c.0 != 0),
            String(_) => Err(error!(TypeMismatch)),
        }
    }

    /// Convert for assignment to, or evaluation as, `data_type`.
    pub fn convert(self, data_type: &DataType) -> Result<Val> {
        if self.data_type() == data_type.value_type() {
            return Ok(self);
        }
        match data_type {
            DataType::Integer => Ok(Val::Integer(self.to_i16()?)),
            DataType::Long => Ok(Val::Long(self.to_i32()?)),
            DataType::Single => {
                let f = self.to_f64()?;
                let s = f as f32;
                if f.is_finite() && !s.is_finite() {
                    return Err(error!(Overflow));
                }
                Ok(Val::Single(s))
            }
            DataType::Double => Ok(Val::Double(self.to_f64()?)),
            DataType::Currency => Ok(Val::Currency(self.to_currency()?)),
            DataType::String | DataType::FixedString(_) => match self {
                Val::String(s) => Ok(Val::String(s)),
                _ => Err(error!(TypeMismatch)),
            },
            DataType::Array(..) | DataType::Record(_) => Err(error!(TypeMismatch)),
        }
    }

    /// The text `PRINT` writes: numbers get a sign position and a
    /// trailing space.
    pub fn print_string(&self) -> String {
        match self {
            Val::String(s) => s.clone(),
            _ => {
                let s = self.to_string();
                if s.starts_with('-') {
                    format!("{} ", s)
                } else {
                    format!(" {} ", s)
                }
            }
        }
    }

    /// The text `STR$` returns.
    pub fn str_string(&self) -> String {
        let s = self.to_string();
        match self {
            Val::String(_) => s,
            _ if s.starts_with('-') => s,
            _ => format!(" {}", s),
        }
    }
}

fn format_float(v: f64, digits: usize, exp_char: char) -> String {
    if v == 0.0 {
        return "0".into();
    }
    if !v.is_finite() {
        return format!("{}", v);
    }
    let s = format!("{:.*e}", digits - 1, v.abs());
    let (mantissa, exp) = match s.split_once('e') {
        Some(pair) => pair,
        None => return s,
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let all: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let trimmed = all.trim_end_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    let sign = if v < 0.0 { "-" } else { "" };
    let leading_zeros = if exp < 0 { (-exp - 1) as usize } else { 0 };
    if exp < digits as i32 && leading_zeros + trimmed.len() <= digits {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if trimmed.len() <= int_len {
                format!("{}{}{}", sign, trimmed, "0".repeat(int_len - trimmed.len()))
            } else {
                format!("{}{}.{}", sign, &trimmed[..int_len], &trimmed[int_len..])
            }
        } else {
            format!("{}.{}{}", sign, "0".repeat(leading_zeros), trimmed)
        }
    } else {
        let (first, rest) = trimmed.split_at(1);
        let point = if rest.is_empty() { "" } else { "." };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{}{}{}{}{}{}{:02}",
            sign,
            first,
            point,
            rest,
            exp_char,
            exp_sign,
            exp.abs()
        )
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Val::*;
        match self {
            Integer(n) => write!(f, "{}", n),
            Long(n) => write!(f, "{}", n),
            Single(n) => write!(f, "{}", format_float(*n as f64, 7, 'E')),
            Double(n) => write!(f, "{}", format_float(*n, 16, 'D')),
            Currency(c) => {
                let s = c.to_string();
                match s.strip_prefix("0.") {
                    Some(frac) => write!(f, ".{}", frac),
                    None => match s.strip_prefix("-0.") {
                        Some(frac) => write!(f, "-.{}", frac),
                        None => write!(f, "{}", s),
                    },
                }
            }
            String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_rounds_to_even() {
        assert_eq!(Val::Single(2.5).convert(&DataType::Integer), Ok(Val::Integer(2)));
        assert_eq!(Val::Double(3.5).convert(&DataType::Long), Ok(Val::Long(4)));
        assert_eq!(Val::Double(-2.5).convert(&DataType::Integer), Ok(Val::Integer(-2)));
    }

    #[test]
    fn test_convert_errors() {
        let e = Val::Long(40_000).convert(&DataType::Integer).unwrap_err();
        assert_eq!(e.code(), 6);
        let e = Val::String("x".into()).convert(&DataType::Single).unwrap_err();
        assert_eq!(e.code(), 13);
        let e = Val::Integer(1).convert(&DataType::String).unwrap_err();
        assert_eq!(e.code(), 13);
        let e = Val::Double(1e300).convert(&DataType::Single).unwrap_err();
        assert_eq!(e.code(), 6);
    }

    #[test]
    fn test_to_currency() {
        assert_eq!(Val::Integer(-3).to_currency(), Ok(Currency(-30_000)));
        assert_eq!(Val::Long(70_000).to_currency(), Ok(Currency(700_000_000)));
        assert_eq!(Val::Double(1.25).to_currency(), Ok(Currency(12_500)));
        assert_eq!(Val::Currency(Currency(7)).to_currency(), Ok(Currency(7)));
        let e = Val::String("1".into()).to_currency().unwrap_err();
        assert_eq!(e.code(), 13);
    }

    #[test]
    fn test_print_format() {
        assert_eq!(Val::Integer(5).print_string(), " 5 ");
        assert_eq!(Val::Integer(-5).print_string(), "-5 ");
        assert_eq!(Val::Single(5.5).to_string(), "5.5");
        assert_eq!(Val::Single(1.0 / 3.0).to_string(), ".3333333");
        assert_eq!(Val::Single(1e20).to_string(), "1E+20");
        assert_eq!(Val::Double(1.0 / 3.0).to_string(), ".3333333333333333");
        assert_eq!(Val::Single(100.0).to_string(), "100");
        assert_eq!(Val::Currency(Currency(12_500)).to_string(), "1.25");
        assert_eq!(Val::Currency(Currency(5_000)).to_string(), ".5");
        assert_eq!(Val::Long(7).str_string(), " 7");
    }
}
