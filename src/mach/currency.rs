use crate::error;
use crate::lang::Error;

type Result<T> = std::result::Result<T, Error>;

pub const SCALE: i64 = 10_000;

/// Fixed point decimal with four places, stored as the scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Currency(pub i64);

/// Round half to even on a 128 bit quotient.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    let twice = (r * 2).abs();
    let d_abs = d.abs();
    let away = if (n < 0) != (d < 0) { -1 } else { 1 };
    if twice > d_abs || (twice == d_abs && q % 2 != 0) {
        q + away
    } else {
        q
    }
}

fn narrow(v: i128) -> Result<Currency> {
    if v > i64::MAX as i128 || v < i64::MIN as i128 {
        Err(error!(Overflow))
    } else {
        Ok(Currency(v as i64))
    }
}

impl Currency {
    pub fn from_raw(raw: i64) -> Currency {
        Currency(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_i64(n: i64) -> Result<Currency> {
        narrow(n as i128 * SCALE as i128)
    }

    pub fn from_f64(n: f64) -> Result<Currency> {
        let scaled = n * SCALE as f64;
        if !scaled.is_finite() || scaled >= 9.223_372_036_854_776e18 || scaled < -9.223_372_036_854_776e18 {
            return Err(error!(Overflow));
        }
        Ok(Currency(round_even(scaled) as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Nearest whole number, ties to even.
    pub fn round(self) -> i64 {
        div_round(self.0 as i128, SCALE as i128) as i64
    }

    pub fn checked_add(self, rhs: Currency) -> Result<Currency> {
        self.0.checked_add(rhs.0).map(Currency).ok_or_else(|| error!(Overflow))
    }

    pub fn checked_sub(self, rhs: Currency) -> Result<Currency> {
        self.0.checked_sub(rhs.0).map(Currency).ok_or_else(|| error!(Overflow))
    }

    pub fn checked_neg(self) -> Result<Currency> {
        self.0.checked_neg().map(Currency).ok_or_else(|| error!(Overflow))
    }

    pub fn checked_mul(self, rhs: Currency) -> Result<Currency> {
        narrow(div_round(self.0 as i128 * rhs.0 as i128, SCALE as i128))
    }

    pub fn checked_div(self, rhs: Currency) -> Result<Currency> {
        if rhs.0 == 0 {
            return Err(error!(DivisionByZero));
        }
        narrow(div_round(self.0 as i128 * SCALE as i128, rhs.0 as i128))
    }

    /// Integer power by repeated squaring on the scaled value.
    pub fn pow(self, exp: i64) -> Result<Currency> {
        if exp < 0 {
            let p = self.pow(-exp)?;
            return Currency(SCALE).checked_div(p);
        }
        let mut result = Currency(SCALE);
        let mut base = self;
        let mut e = exp;
        while e > 0 {
            if e & 1 == 1 {
                result = result.checked_mul(base)?;
            }
            e >>= 1;
            if e > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Ok(result)
    }
}

/// Round half to even for floats.
pub fn round_even(n: f64) -> f64 {
    let r = n.round();
    if (n - n.trunc()).abs() == 0.5 {
        2.0 * (n / 2.0).round()
    } else {
        r
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let neg = self.0 < 0;
        let abs = (self.0 as i128).abs();
        let int = abs / SCALE as i128;
        let frac = abs % SCALE as i128;
        let sign = if neg { "-" } else { "" };
        if frac == 0 {
            write!(f, "{}{}", sign, int)
        } else {
            let frac = format!("{:04}", frac);
            write!(f, "{}{}.{}", sign, int, frac.trim_end_matches('0'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Currency::from_f64(1.5).unwrap();
        let b = Currency::from_f64(2.25).unwrap();
        assert_eq!(a.checked_add(b).unwrap(), Currency(37_500));
        assert_eq!(a.checked_mul(b).unwrap(), Currency(33_750));
        assert_eq!(b.checked_div(a).unwrap(), Currency(15_000));
        assert_eq!(a.checked_div(Currency(0)).unwrap_err().code(), 11);
    }

    #[test]
    fn test_pow() {
        let c = Currency::from_f64(1.1).unwrap();
        assert_eq!(c.pow(2).unwrap(), Currency(12_100));
        assert_eq!(Currency::from_i64(2).unwrap().pow(10).unwrap(), Currency(10_240_000));
        assert_eq!(Currency::from_i64(2).unwrap().pow(-2).unwrap(), Currency(2_500));
        assert_eq!(Currency::from_i64(1_000_000).unwrap().pow(4).unwrap_err().code(), 6);
    }

    #[test]
    fn test_rounding_and_display() {
        assert_eq!(Currency(25_000).round(), 2);
        assert_eq!(Currency(35_000).round(), 4);
        assert_eq!(Currency(-25_000).round(), -2);
        assert_eq!(round_even(2.5), 2.0);
        assert_eq!(round_even(-3.5), -4.0);
        assert_eq!(Currency(-12_500).to_string(), "-1.25");
        assert_eq!(Currency(30_000).to_string(), "3");
    }
}
