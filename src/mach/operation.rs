use super::types::DataType;
use super::Val;
use crate::error;
use crate::lang::Error;
use std::cmp::Ordering;

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    DivideInt,
    Modulus,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Xor,
    Eqv,
    Imp,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        use BinaryOp::*;
        matches!(self, Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual)
    }

    pub fn is_logical(self) -> bool {
        use BinaryOp::*;
        matches!(self, And | Or | Xor | Eqv | Imp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Operand and result types chosen for one binary operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub lhs: DataType,
    pub rhs: DataType,
    pub result: DataType,
}

impl Promotion {
    fn uniform(operand: DataType, result: DataType) -> Promotion {
        Promotion {
            lhs: operand.clone(),
            rhs: operand,
            result,
        }
    }
}

pub struct Operation {}

impl Operation {
    /// The common type of the addition family. Evaluated top to bottom;
    /// the first rule that matches wins.
    fn waterfall(lhs: &DataType, rhs: &DataType) -> Result<DataType> {
        use DataType::*;
        let (l, r) = (lhs.value_type(), rhs.value_type());
        if !l.is_scalar() || !r.is_scalar() {
            return Err(error!(TypeMismatch));
        }
        if l == String || r == String {
            return if l == r {
                Ok(String)
            } else {
                Err(error!(TypeMismatch))
            };
        }
        if l == Double || r == Double {
            return Ok(Double);
        }
        if (l == Currency && r == Single) || (l == Single && r == Currency) {
            return Ok(Double);
        }
        if l == Currency || r == Currency {
            return Ok(Currency);
        }
        if l == Single || r == Single {
            return Ok(Single);
        }
        if l == Long || r == Long {
            return Ok(Long);
        }
        Ok(Integer)
    }

    fn integral(lhs: &DataType, rhs: &DataType) -> Result<DataType> {
        if !lhs.is_numeric() || !rhs.is_numeric() {
            return Err(error!(TypeMismatch));
        }
        if *lhs == DataType::Integer && *rhs == DataType::Integer {
            Ok(DataType::Integer)
        } else {
            Ok(DataType::Long)
        }
    }

    pub fn promote(op: BinaryOp, lhs: &DataType, rhs: &DataType) -> Result<Promotion> {
        use BinaryOp::*;
        use DataType::*;
        match op {
            Add => {
                let t = Operation::waterfall(lhs, rhs)?;
                Ok(Promotion::uniform(t.clone(), t))
            }
            Subtract | Multiply => {
                let t = Operation::waterfall(lhs, rhs)?;
                if t == String {
                    return Err(error!(TypeMismatch));
                }
                Ok(Promotion::uniform(t.clone(), t))
            }
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => {
                Ok(Promotion::uniform(Operation::waterfall(lhs, rhs)?, Integer))
            }
            Divide => {
                if !lhs.is_numeric() || !rhs.is_numeric() {
                    return Err(error!(TypeMismatch));
                }
                let t = match (lhs, rhs) {
                    (Currency, Currency) => Currency,
                    (Integer, Integer) | (Integer, Single) | (Single, Integer) | (Single, Single) => {
                        Single
                    }
                    _ => Double,
                };
                Ok(Promotion::uniform(t.clone(), t))
            }
            DivideInt | Modulus | And | Or | Xor | Eqv | Imp => {
                let t = Operation::integral(lhs, rhs)?;
                Ok(Promotion::uniform(t.clone(), t))
            }
            Power => {
                if !lhs.is_numeric() || !rhs.is_numeric() {
                    return Err(error!(TypeMismatch));
                }
                match (lhs, rhs) {
                    (Currency, Integer) | (Currency, Long) => Ok(Promotion {
                        lhs: Currency,
                        rhs: Long,
                        result: Currency,
                    }),
                    _ => Ok(Promotion::uniform(Double, Double)),
                }
            }
        }
    }

    pub fn unary_type(op: UnaryOp, operand: &DataType) -> Result<DataType> {
        if !operand.is_numeric() {
            return Err(error!(TypeMismatch));
        }
        match op {
            UnaryOp::Negate => Ok(operand.clone()),
            UnaryOp::Not if *operand == DataType::Integer => Ok(DataType::Integer),
            UnaryOp::Not => Ok(DataType::Long),
        }
    }

    /// Promote, convert and apply.
    pub fn evaluate(op: BinaryOp, lhs: Val, rhs: Val) -> Result<Val> {
        let p = Operation::promote(op, &lhs.data_type(), &rhs.data_type())?;
        Operation::apply(op, lhs.convert(&p.lhs)?, rhs.convert(&p.rhs)?)
    }

    /// Apply to operands that already carry their promoted types.
    pub fn apply(op: BinaryOp, lhs: Val, rhs: Val) -> Result<Val> {
        use BinaryOp::*;
        match op {
            Add => Operation::add(lhs, rhs),
            Subtract => Operation::subtract(lhs, rhs),
            Multiply => Operation::multiply(lhs, rhs),
            Divide => Operation::divide(lhs, rhs),
            DivideInt => Operation::divide_int(lhs, rhs),
            Modulus => Operation::modulus(lhs, rhs),
            Power => Operation::power(lhs, rhs),
            Equal => Operation::compare(lhs, rhs, |o| o == Ordering::Equal),
            NotEqual => Operation::compare(lhs, rhs, |o| o != Ordering::Equal),
            Less => Operation::compare(lhs, rhs, |o| o == Ordering::Less),
            LessEqual => Operation::compare(lhs, rhs, |o| o != Ordering::Greater),
            Greater => Operation::compare(lhs, rhs, |o| o == Ordering::Greater),
            GreaterEqual => Operation::compare(lhs, rhs, |o| o != Ordering::Less),
            And | Or | Xor | Eqv | Imp => Operation::logical(op, lhs, rhs),
        }
    }

    pub fn unary(op: UnaryOp, val: Val) -> Result<Val> {
        use Val::*;
        match op {
            UnaryOp::Negate => match val {
                Integer(n) => n.checked_neg().map(Integer).ok_or_else(|| error!(Overflow)),
                Long(n) => n.checked_neg().map(Long).ok_or_else(|| error!(Overflow)),
                Single(n) => Ok(Single(-n)),
                Double(n) => Ok(Double(-n)),
                Currency(c) => Ok(Currency(c.checked_neg()?)),
                String(_) => Err(error!(TypeMismatch)),
            },
            UnaryOp::Not => match val {
                Integer(n) => Ok(Integer(!n)),
                String(_) => Err(error!(TypeMismatch)),
                v => Ok(Long(!v.to_i32()?)),
            },
        }
    }

    fn single(n: f32) -> Result<Val> {
        if n.is_finite() {
            Ok(Val::Single(n))
        } else {
            Err(error!(Overflow))
        }
    }

    fn double(n: f64) -> Result<Val> {
        if n.is_finite() {
            Ok(Val::Double(n))
        } else {
            Err(error!(Overflow))
        }
    }

    fn add(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => l.checked_add(r).map(Integer).ok_or_else(|| error!(Overflow)),
            (Long(l), Long(r)) => l.checked_add(r).map(Long).ok_or_else(|| error!(Overflow)),
            (Single(l), Single(r)) => Operation::single(l + r),
            (Double(l), Double(r)) => Operation::double(l + r),
            (Currency(l), Currency(r)) => Ok(Currency(l.checked_add(r)?)),
            (String(mut l), String(r)) => {
                l.push_str(&r);
                Ok(String(l))
            }
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn subtract(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => l.checked_sub(r).map(Integer).ok_or_else(|| error!(Overflow)),
            (Long(l), Long(r)) => l.checked_sub(r).map(Long).ok_or_else(|| error!(Overflow)),
            (Single(l), Single(r)) => Operation::single(l - r),
            (Double(l), Double(r)) => Operation::double(l - r),
            (Currency(l), Currency(r)) => Ok(Currency(l.checked_sub(r)?)),
            (String(_), String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn multiply(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => l.checked_mul(r).map(Integer).ok_or_else(|| error!(Overflow)),
            (Long(l), Long(r)) => l.checked_mul(r).map(Long).ok_or_else(|| error!(Overflow)),
            (Single(l), Single(r)) => Operation::single(l * r),
            (Double(l), Double(r)) => Operation::double(l * r),
            (Currency(l), Currency(r)) => Ok(Currency(l.checked_mul(r)?)),
            (String(_), String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn divide(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Single(l), Single(r)) => {
                if r == 0.0 {
                    return Err(error!(DivisionByZero));
                }
                Operation::single(l / r)
            }
            (Double(l), Double(r)) => {
                if r == 0.0 {
                    return Err(error!(DivisionByZero));
                }
                Operation::double(l / r)
            }
            (Currency(l), Currency(r)) => Ok(Currency(l.checked_div(r)?)),
            (String(_), _) | (_, String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn divide_int(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(_), Integer(0)) | (Long(_), Long(0)) => Err(error!(DivisionByZero)),
            (Integer(l), Integer(r)) => l.checked_div(r).map(Integer).ok_or_else(|| error!(Overflow)),
            (Long(l), Long(r)) => l.checked_div(r).map(Long).ok_or_else(|| error!(Overflow)),
            (String(_), _) | (_, String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn modulus(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(_), Integer(0)) | (Long(_), Long(0)) => Err(error!(DivisionByZero)),
            (Integer(l), Integer(r)) => Ok(Integer(l.checked_rem(r).unwrap_or(0))),
            (Long(l), Long(r)) => Ok(Long(l.checked_rem(r).unwrap_or(0))),
            (String(_), _) | (_, String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn power(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Currency(l), Long(r)) => Ok(Currency(l.pow(r as i64)?)),
            (Double(l), Double(r)) => {
                if l == 0.0 && r < 0.0 {
                    return Err(error!(DivisionByZero));
                }
                if l < 0.0 && r.fract() != 0.0 {
                    return Err(error!(IllegalFunctionCall));
                }
                Operation::double(l.powf(r))
            }
            (String(_), _) | (_, String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }

    fn compare(lhs: Val, rhs: Val, test: fn(Ordering) -> bool) -> Result<Val> {
        use Val::*;
        let ordering = match (&lhs, &rhs) {
            (Integer(l), Integer(r)) => l.cmp(r),
            (Long(l), Long(r)) => l.cmp(r),
            (Currency(l), Currency(r)) => l.cmp(r),
            (Single(l), Single(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
            (Double(l), Double(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
            (String(l), String(r)) => l.as_bytes().cmp(r.as_bytes()),
            _ => return Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        };
        Ok(Integer(if test(ordering) { -1 } else { 0 }))
    }

    fn logical(op: BinaryOp, lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        fn bits<T>(op: BinaryOp, l: T, r: T) -> T
        where
            T: std::ops::BitAnd<Output = T>
                + std::ops::BitOr<Output = T>
                + std::ops::BitXor<Output = T>
                + std::ops::Not<Output = T>
                + Copy,
        {
            match op {
                BinaryOp::And => l & r,
                BinaryOp::Or => l | r,
                BinaryOp::Xor => l ^ r,
                BinaryOp::Eqv => !(l ^ r),
                _ => !l | r,
            }
        }
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(Integer(bits(op, l, r))),
            (Long(l), Long(r)) => Ok(Long(bits(op, l, r))),
            (String(_), _) | (_, String(_)) => Err(error!(TypeMismatch)),
            _ => Err(error!(InternalError; "UNPROMOTED OPERANDS")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::currency::Currency;
    use super::*;
    use DataType::{Double, Integer, Long, Single};

    fn result(op: BinaryOp, l: DataType, r: DataType) -> DataType {
        Operation::promote(op, &l, &r).unwrap().result
    }

    #[test]
    fn test_addition_lattice() {
        let numeric = [Integer, Long, Single, Double, DataType::Currency];
        let rank = |t: &DataType| numeric.iter().position(|n| n == t).unwrap_or(0);
        for l in numeric.iter() {
            for r in numeric.iter() {
                let expected = match (l, r) {
                    (DataType::Currency, Single) | (Single, DataType::Currency) => Double,
                    (DataType::Currency, Double) | (Double, DataType::Currency) => Double,
                    (DataType::Currency, _) | (_, DataType::Currency) => DataType::Currency,
                    _ => numeric[rank(l).max(rank(r))].clone(),
                };
                for op in [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply] {
                    assert_eq!(result(op, l.clone(), r.clone()), expected, "{:?} {:?} {:?}", op, l, r);
                }
            }
        }
    }

    #[test]
    fn test_examples() {
        assert_eq!(
            Operation::evaluate(BinaryOp::Add, Val::Integer(3), Val::Single(2.5)),
            Ok(Val::Single(5.5))
        );
        assert_eq!(
            Operation::evaluate(BinaryOp::Add, Val::Currency(Currency(10_000)), Val::Single(2.0)),
            Ok(Val::Double(3.0))
        );
        let e = Operation::evaluate(BinaryOp::Add, Val::Integer(32000), Val::Integer(1000));
        assert_eq!(e.unwrap_err().code(), 6);
    }

    #[test]
    fn test_division_types() {
        assert_eq!(result(BinaryOp::Divide, Integer, Integer), Single);
        assert_eq!(result(BinaryOp::Divide, Long, Integer), Double);
        assert_eq!(result(BinaryOp::Divide, DataType::Currency, DataType::Currency), DataType::Currency);
        assert_eq!(result(BinaryOp::Divide, DataType::Currency, Integer), Double);
        assert_eq!(result(BinaryOp::DivideInt, Integer, Integer), Integer);
        assert_eq!(result(BinaryOp::Modulus, Single, Integer), Long);
        assert_eq!(result(BinaryOp::Power, DataType::Currency, Integer), DataType::Currency);
        assert_eq!(result(BinaryOp::Power, Integer, Integer), Double);
        assert_eq!(result(BinaryOp::Less, DataType::String, DataType::String), Integer);
    }

    #[test]
    fn test_faults() {
        let code = |op, l, r| Operation::evaluate(op, l, r).unwrap_err().code();
        assert_eq!(code(BinaryOp::Divide, Val::Integer(1), Val::Integer(0)), 11);
        assert_eq!(code(BinaryOp::Modulus, Val::Long(1), Val::Single(0.2)), 11);
        assert_eq!(code(BinaryOp::Subtract, Val::String("a".into()), Val::String("b".into())), 13);
        assert_eq!(code(BinaryOp::Add, Val::String("a".into()), Val::Integer(1)), 13);
        assert_eq!(code(BinaryOp::Power, Val::Integer(-8), Val::Single(0.5)), 5);
        assert_eq!(code(BinaryOp::Multiply, Val::Double(1e300), Val::Double(1e300)), 6);
    }

    #[test]
    fn test_integer_division_rounds_operands() {
        assert_eq!(
            Operation::evaluate(BinaryOp::DivideInt, Val::Single(7.6), Val::Integer(2)),
            Ok(Val::Long(4))
        );
        assert_eq!(
            Operation::evaluate(BinaryOp::Modulus, Val::Integer(-7), Val::Integer(3)),
            Ok(Val::Integer(-1))
        );
    }

    #[test]
    fn test_logical() {
        assert_eq!(
            Operation::evaluate(BinaryOp::Imp, Val::Integer(0), Val::Integer(0)),
            Ok(Val::Integer(-1))
        );
        assert_eq!(
            Operation::evaluate(BinaryOp::And, Val::Integer(6), Val::Long(3)),
            Ok(Val::Long(2))
        );
        assert_eq!(Operation::unary(UnaryOp::Not, Val::Integer(0)), Ok(Val::Integer(-1)));
    }

    #[test]
    fn test_string_compare() {
        assert_eq!(
            Operation::evaluate(BinaryOp::Less, Val::String("A".into()), Val::String("B".into())),
            Ok(Val::Integer(-1))
        );
    }
}
