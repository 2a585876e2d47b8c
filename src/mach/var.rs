use super::array::Array;
use super::currency::Currency;
use super::types::{DataType, RecordId, TypeTable};
use super::Val;
use crate::error;
use crate::lang::Error;

type Result<T> = std::result::Result<T, Error>;

/// ## Variable memory
///
/// A live value of any declared type. Scalars, arrays and records all
/// share this one holder so frames can alias any of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    Currency(Currency),
    String(String),
    /// Latin-1 bytes of the declared length.
    FixedString(Vec<u8>),
    Array(Array),
    Record(Record),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: Vec<Variable>,
}

pub fn latin1_encode(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

impl Variable {
    /// The zero value of `data_type`. Arrays start undimensioned.
    pub fn new(data_type: &DataType, types: &TypeTable) -> Variable {
        match data_type {
            DataType::Integer => Variable::Integer(0),
            DataType::Long => Variable::Long(0),
            DataType::Single => Variable::Single(0.0),
            DataType::Double => Variable::Double(0.0),
            DataType::Currency => Variable::Currency(Currency(0)),
            DataType::String => Variable::String(String::new()),
            DataType::FixedString(n) => Variable::FixedString(vec![0; *n]),
            DataType::Array(element, rank) => {
                Variable::Array(Array::new(Variable::new(element, types), *rank))
            }
            DataType::Record(id) => {
                let fields = types
                    .record(*id)
                    .map(|r| r.fields.iter().map(|f| Variable::new(&f.data_type, types)).collect())
                    .unwrap_or_default();
                Variable::Record(Record { id: *id, fields })
            }
        }
    }

    pub fn data_type(&self) -> DataType {
        use Variable::*;
        match self {
            Integer(_) => DataType::Integer,
            Long(_) => DataType::Long,
            Single(_) => DataType::Single,
            Double(_) => DataType::Double,
            Currency(_) => DataType::Currency,
            String(_) => DataType::String,
            FixedString(b) => DataType::FixedString(b.len()),
            Array(a) => DataType::Array(Box::new(a.element_type()), a.rank()),
            Record(r) => DataType::Record(r.id),
        }
    }

    pub fn get(&self) -> Result<Val> {
        use Variable::*;
        match self {
            Integer(n) => Ok(Val::Integer(*n)),
            Long(n) => Ok(Val::Long(*n)),
            Single(n) => Ok(Val::Single(*n)),
            Double(n) => Ok(Val::Double(*n)),
            Currency(c) => Ok(Val::Currency(*c)),
            String(s) => Ok(Val::String(s.clone())),
            FixedString(b) => Ok(Val::String(latin1_decode(b))),
            Array(_) | Record(_) => Err(error!(TypeMismatch)),
        }
    }

    /// Store with conversion to this variable's own type. Fixed strings
    /// are truncated or space padded.
    pub fn set(&mut self, val: Val) -> Result<()> {
        use Variable::*;
        match self {
            Integer(n) => *n = val.to_i16()?,
            Long(n) => *n = val.to_i32()?,
            Single(n) => match val.convert(&DataType::Single)? {
                Val::Single(v) => *n = v,
                _ => return Err(error!(InternalError)),
            },
            Double(n) => *n = val.to_f64()?,
            Currency(c) => *c = val.to_currency()?,
            String(s) => match val {
                Val::String(v) => *s = v,
                _ => return Err(error!(TypeMismatch)),
            },
            FixedString(b) => match val {
                Val::String(v) => {
                    let len = b.len();
                    let mut bytes = latin1_encode(&v);
                    bytes.resize(len, b' ');
                    *b = bytes;
                }
                _ => return Err(error!(TypeMismatch)),
            },
            Array(_) | Record(_) => return Err(error!(TypeMismatch)),
        }
        Ok(())
    }

    /// Whole-value assignment between records of the same type.
    pub fn assign(&mut self, other: &Variable) -> Result<()> {
        match (&*self, other) {
            (Variable::Record(a), Variable::Record(b)) if a.id == b.id => {
                *self = other.clone();
                Ok(())
            }
            (Variable::Record(_), _) | (_, Variable::Record(_)) => Err(error!(TypeMismatch)),
            (Variable::Array(_), _) | (_, Variable::Array(_)) => Err(error!(TypeMismatch)),
            _ => self.set(other.get()?),
        }
    }

    pub fn field(&self, idx: usize) -> Result<&Variable> {
        match self {
            Variable::Record(r) => r.fields.get(idx).ok_or_else(|| error!(InternalError; "NO FIELD")),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn field_mut(&mut self, idx: usize) -> Result<&mut Variable> {
        match self {
            Variable::Record(r) => r
                .fields
                .get_mut(idx)
                .ok_or_else(|| error!(InternalError; "NO FIELD")),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Variable::Array(a) => Ok(a),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Array> {
        match self {
            Variable::Array(a) => Ok(a),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Bytes in the binary layout, or `None` for values without one.
    pub fn byte_size(&self) -> Option<usize> {
        use Variable::*;
        match self {
            Integer(_) => Some(2),
            Long(_) | Single(_) => Some(4),
            Double(_) | Currency(_) => Some(8),
            FixedString(b) => Some(b.len()),
            Record(r) => r.fields.iter().map(|f| f.byte_size()).sum(),
            String(_) | Array(_) => None,
        }
    }

    /// Write exactly `byte_size` little-endian bytes.
    pub fn serialize(&self, out: &mut [u8]) -> Result<()> {
        use Variable::*;
        let size = match self.byte_size() {
            Some(size) => size,
            None => return Err(error!(TypeMismatch)),
        };
        if out.len() != size {
            return Err(error!(InternalError; "SERIALIZE SIZE"));
        }
        match self {
            Integer(n) => out.copy_from_slice(&n.to_le_bytes()),
            Long(n) => out.copy_from_slice(&n.to_le_bytes()),
            Single(n) => out.copy_from_slice(&n.to_le_bytes()),
            Double(n) => out.copy_from_slice(&n.to_le_bytes()),
            Currency(c) => out.copy_from_slice(&c.0.to_le_bytes()),
            FixedString(b) => out.copy_from_slice(b),
            Record(r) => {
                let mut offset = 0;
                for f in &r.fields {
                    let len = f.byte_size().unwrap_or(0);
                    f.serialize(&mut out[offset..offset + len])?;
                    offset += len;
                }
            }
            String(_) | Array(_) => return Err(error!(TypeMismatch)),
        }
        Ok(())
    }

    /// Read exactly `byte_size` little-endian bytes.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        use std::convert::TryInto;
        use Variable::*;
        let size = match self.byte_size() {
            Some(size) => size,
            None => return Err(error!(TypeMismatch)),
        };
        if bytes.len() != size {
            return Err(error!(InternalError; "DESERIALIZE SIZE"));
        }
        let wrong = |_| error!(InternalError; "DESERIALIZE SIZE");
        match self {
            Integer(n) => *n = i16::from_le_bytes(bytes.try_into().map_err(wrong)?),
            Long(n) => *n = i32::from_le_bytes(bytes.try_into().map_err(wrong)?),
            Single(n) => *n = f32::from_le_bytes(bytes.try_into().map_err(wrong)?),
            Double(n) => *n = f64::from_le_bytes(bytes.try_into().map_err(wrong)?),
            Currency(c) => c.0 = i64::from_le_bytes(bytes.try_into().map_err(wrong)?),
            FixedString(b) => b.copy_from_slice(bytes),
            Record(r) => {
                let mut offset = 0;
                for f in r.fields.iter_mut() {
                    let len = f.byte_size().unwrap_or(0);
                    f.deserialize(&bytes[offset..offset + len])?;
                    offset += len;
                }
            }
            String(_) | Array(_) => return Err(error!(TypeMismatch)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_converts() {
        let mut v = Variable::Integer(0);
        v.set(Val::Single(2.5)).unwrap();
        assert_eq!(v, Variable::Integer(2));
        assert_eq!(v.set(Val::Double(1e9)).unwrap_err().code(), 6);
        assert_eq!(v.set(Val::String("1".into())).unwrap_err().code(), 13);
    }

    #[test]
    fn test_fixed_string_padding() {
        let mut v = Variable::new(&DataType::FixedString(4), &TypeTable::default());
        assert_eq!(v.get(), Ok(Val::String("\0\0\0\0".into())));
        v.set(Val::String("ab".into())).unwrap();
        assert_eq!(v.get(), Ok(Val::String("ab  ".into())));
        v.set(Val::String("abcdef".into())).unwrap();
        assert_eq!(v.get(), Ok(Val::String("abcd".into())));
    }

    #[test]
    fn test_record_layout() {
        let mut types = TypeTable::default();
        let id = types.declare(&"R".into()).unwrap();
        types
            .set_fields(
                id,
                vec![
                    ("A".into(), DataType::Integer),
                    ("C".into(), DataType::Currency),
                    ("S".into(), DataType::FixedString(3)),
                ],
            )
            .unwrap();
        types.resolve().unwrap();
        let mut r = Variable::new(&DataType::Record(id), &types);
        r.field_mut(0).unwrap().set(Val::Integer(-2)).unwrap();
        r.field_mut(1).unwrap().set(Val::Single(1.5)).unwrap();
        r.field_mut(2).unwrap().set(Val::String("hi".into())).unwrap();
        assert_eq!(r.byte_size(), Some(13));
        let mut bytes = vec![0; 13];
        r.serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[0..2], &[0xFE, 0xFF]);
        assert_eq!(&bytes[2..10], &15_000i64.to_le_bytes());
        assert_eq!(&bytes[10..13], b"hi ");
        let mut copy = Variable::new(&DataType::Record(id), &types);
        copy.deserialize(&bytes).unwrap();
        assert_eq!(copy, r);
    }
}
