use super::types::DataType;
use super::var::Variable;
use super::Val;
use crate::error;
use crate::lang::Error;
use std::collections::BTreeMap;

type Result<T> = std::result::Result<T, Error>;

/// Inclusive `(lower, upper)` bounds, one pair per dimension.
///
/// Linear order runs the first dimension fastest, so every step of the
/// last dimension appends one whole copy of the remaining sub-array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySubscripts(Vec<(i32, i32)>);

impl ArraySubscripts {
    pub fn new(bounds: Vec<(i32, i32)>) -> Result<ArraySubscripts> {
        if bounds.is_empty() || bounds.iter().any(|(lo, hi)| lo > hi) {
            return Err(error!(SubscriptOutOfRange));
        }
        let subs = ArraySubscripts(bounds);
        if subs.checked_count().is_none() {
            return Err(error!(OutOfMemory));
        }
        Ok(subs)
    }

    /// Default bounds for an array dimensioned by first use.
    pub fn auto(rank: usize) -> ArraySubscripts {
        ArraySubscripts(vec![(0, 10); rank.max(1)])
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn bounds(&self) -> &[(i32, i32)] {
        &self.0
    }

    fn checked_count(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, (lo, hi)| {
            let len = usize::try_from(*hi as i64 - *lo as i64 + 1).ok()?;
            acc.checked_mul(len)
        })
    }

    pub fn count(&self) -> usize {
        self.checked_count().unwrap_or(0)
    }

    pub fn offset(&self, indices: &[i32]) -> Result<usize> {
        if indices.len() != self.0.len() {
            return Err(error!(SubscriptOutOfRange));
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (idx, (lo, hi)) in indices.iter().zip(self.0.iter()) {
            if idx < lo || idx > hi {
                return Err(error!(SubscriptOutOfRange));
            }
            offset += (*idx as i64 - *lo as i64) as usize * stride;
            stride *= (*hi as i64 - *lo as i64 + 1) as usize;
        }
        Ok(offset)
    }
}

/// Which view of the elements is current. Exactly one is authoritative.
#[derive(Debug, Clone, PartialEq)]
enum Repr {
    /// Sparse elements; a missing entry is the zero value.
    Unpacked(BTreeMap<usize, Variable>),
    /// One fixed stride per element in the binary layout.
    Packed(Vec<u8>),
    /// Variable strings have no binary layout.
    PackedStrings(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    zero: Box<Variable>,
    rank: usize,
    subscripts: Option<ArraySubscripts>,
    repr: Repr,
}

impl Array {
    /// An undimensioned array. `zero` is the value of every element
    /// before it is first written.
    pub fn new(zero: Variable, rank: usize) -> Array {
        Array {
            zero: Box::new(zero),
            rank,
            subscripts: None,
            repr: Repr::Unpacked(BTreeMap::new()),
        }
    }

    pub fn element_type(&self) -> DataType {
        self.zero.data_type()
    }

    /// Declared rank, or the current one when declared without bounds.
    pub fn rank(&self) -> usize {
        match &self.subscripts {
            Some(s) => s.rank(),
            None => self.rank,
        }
    }

    pub fn subscripts(&self) -> Option<&ArraySubscripts> {
        self.subscripts.as_ref()
    }

    pub fn is_dimensioned(&self) -> bool {
        self.subscripts.is_some()
    }

    pub fn is_packed(&self) -> bool {
        !matches!(self.repr, Repr::Unpacked(_))
    }

    /// Bytes per element, or `None` for variable strings.
    pub fn element_size(&self) -> Option<usize> {
        self.zero.byte_size()
    }

    pub fn dimension(&mut self, subscripts: ArraySubscripts) -> Result<()> {
        if self.subscripts.is_some() {
            return Err(error!(DuplicateDefinition));
        }
        self.allocate(subscripts)
    }

    /// Fresh allocation. Old elements are discarded.
    pub fn redim(&mut self, subscripts: ArraySubscripts) -> Result<()> {
        self.allocate(subscripts)
    }

    fn allocate(&mut self, subscripts: ArraySubscripts) -> Result<()> {
        if self.rank != 0 && subscripts.rank() != self.rank {
            return Err(error!(SubscriptOutOfRange));
        }
        self.subscripts = Some(subscripts);
        self.repr = Repr::Unpacked(BTreeMap::new());
        Ok(())
    }

    /// Keep every element whose linear position survives. Only the
    /// upper or lower bound of the last dimension may change.
    pub fn redim_preserve(&mut self, subscripts: ArraySubscripts) -> Result<()> {
        let old = match &self.subscripts {
            Some(old) => old,
            None => return self.allocate(subscripts),
        };
        let n = old.rank();
        if subscripts.rank() != n || old.bounds()[..n - 1] != subscripts.bounds()[..n - 1] {
            return Err(error!(SubscriptOutOfRange));
        }
        let count = subscripts.count();
        match &mut self.repr {
            Repr::Unpacked(map) => {
                map.retain(|k, _| *k < count);
            }
            Repr::Packed(bytes) => {
                let size = self.zero.byte_size().unwrap_or(0);
                let mut fill = vec![0; size];
                self.zero.serialize(&mut fill)?;
                let keep = (bytes.len() / size.max(1)).min(count);
                bytes.truncate(keep * size);
                for _ in keep..count {
                    bytes.extend_from_slice(&fill);
                }
            }
            Repr::PackedStrings(strings) => strings.resize(count, String::new()),
        }
        self.subscripts = Some(subscripts);
        Ok(())
    }

    pub fn erase(&mut self) {
        self.subscripts = None;
        self.repr = Repr::Unpacked(BTreeMap::new());
    }

    /// Bounds of dimension `dim`, counting from 1.
    pub fn bounds(&self, dim: usize) -> Result<(i32, i32)> {
        match &self.subscripts {
            Some(s) if dim >= 1 && dim <= s.rank() => Ok(s.bounds()[dim - 1]),
            _ => Err(error!(SubscriptOutOfRange)),
        }
    }

    fn offset(&self, indices: &[i32]) -> Result<usize> {
        match &self.subscripts {
            Some(s) => s.offset(indices),
            None => Err(error!(SubscriptOutOfRange)),
        }
    }

    /// Read a scalar element.
    pub fn get(&self, indices: &[i32]) -> Result<Val> {
        let offset = self.offset(indices)?;
        match &self.repr {
            Repr::Unpacked(map) => match map.get(&offset) {
                Some(v) => v.get(),
                None => self.zero.get(),
            },
            Repr::Packed(bytes) => {
                let size = self.zero.byte_size().unwrap_or(0);
                let mut v = (*self.zero).clone();
                v.deserialize(&bytes[offset * size..(offset + 1) * size])?;
                v.get()
            }
            Repr::PackedStrings(strings) => Ok(Val::String(strings[offset].clone())),
        }
    }

    /// Write a scalar element with conversion to the element type.
    pub fn set(&mut self, indices: &[i32], val: Val) -> Result<()> {
        let offset = self.offset(indices)?;
        match &mut self.repr {
            Repr::Unpacked(map) => {
                let mut v = (*self.zero).clone();
                v.set(val)?;
                map.insert(offset, v);
            }
            Repr::Packed(bytes) => {
                let size = self.zero.byte_size().unwrap_or(0);
                let mut v = (*self.zero).clone();
                v.set(val)?;
                v.serialize(&mut bytes[offset * size..(offset + 1) * size])?;
            }
            Repr::PackedStrings(strings) => match val {
                Val::String(s) => strings[offset] = s,
                _ => return Err(error!(TypeMismatch)),
            },
        }
        Ok(())
    }

    /// A copy of any element, records included.
    pub fn element(&self, indices: &[i32]) -> Result<Variable> {
        let offset = self.offset(indices)?;
        match &self.repr {
            Repr::Unpacked(map) => Ok(map.get(&offset).unwrap_or(&self.zero).clone()),
            Repr::Packed(bytes) => {
                let size = self.zero.byte_size().unwrap_or(0);
                let mut v = (*self.zero).clone();
                v.deserialize(&bytes[offset * size..(offset + 1) * size])?;
                Ok(v)
            }
            Repr::PackedStrings(strings) => Ok(Variable::String(strings[offset].clone())),
        }
    }

    /// Mutable access to one element, materializing it. Switches the
    /// array to its unpacked view.
    pub fn element_mut(&mut self, indices: &[i32]) -> Result<&mut Variable> {
        let offset = self.offset(indices)?;
        self.unpack()?;
        let zero = &self.zero;
        match &mut self.repr {
            Repr::Unpacked(map) => Ok(map.entry(offset).or_insert_with(|| (**zero).clone())),
            _ => Err(error!(InternalError; "ARRAY NOT UNPACKED")),
        }
    }

    /// Switch to the flat view.
    pub fn pack(&mut self) -> Result<()> {
        let map = match &mut self.repr {
            Repr::Unpacked(map) => std::mem::take(map),
            _ => return Ok(()),
        };
        let count = self.subscripts.as_ref().map(|s| s.count()).unwrap_or(0);
        self.repr = match self.zero.byte_size() {
            Some(size) => {
                let mut bytes = vec![0; size * count];
                let mut fill = vec![0; size];
                self.zero.serialize(&mut fill)?;
                for i in 0..count {
                    let chunk = &mut bytes[i * size..(i + 1) * size];
                    match map.get(&i) {
                        Some(v) => v.serialize(chunk)?,
                        None => chunk.copy_from_slice(&fill),
                    }
                }
                Repr::Packed(bytes)
            }
            None => {
                let mut strings = vec![String::new(); count];
                for (i, v) in map {
                    if let Val::String(s) = v.get()? {
                        strings[i] = s;
                    }
                }
                Repr::PackedStrings(strings)
            }
        };
        Ok(())
    }

    /// Switch to the sparse view. All-zero elements stay implicit.
    pub fn unpack(&mut self) -> Result<()> {
        let mut map = BTreeMap::new();
        match &self.repr {
            Repr::Unpacked(_) => return Ok(()),
            Repr::Packed(bytes) => {
                let size = self.zero.byte_size().unwrap_or(0);
                if size > 0 {
                    for (i, chunk) in bytes.chunks_exact(size).enumerate() {
                        if chunk.iter().all(|b| *b == 0) {
                            continue;
                        }
                        let mut v = (*self.zero).clone();
                        v.deserialize(chunk)?;
                        map.insert(i, v);
                    }
                }
            }
            Repr::PackedStrings(strings) => {
                for (i, s) in strings.iter().enumerate() {
                    if !s.is_empty() {
                        map.insert(i, Variable::String(s.clone()));
                    }
                }
            }
        }
        self.repr = Repr::Unpacked(map);
        Ok(())
    }

    /// The packed byte image of every element.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.pack()?;
        match &self.repr {
            Repr::Packed(bytes) => Ok(bytes.clone()),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Replace every element from a packed image of the same size.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let size = match self.zero.byte_size() {
            Some(size) => size,
            None => return Err(error!(TypeMismatch)),
        };
        let count = match &self.subscripts {
            Some(s) => s.count(),
            None => return Err(error!(SubscriptOutOfRange)),
        };
        if bytes.len() != size * count {
            return Err(error!(TypeMismatch));
        }
        self.repr = Repr::Packed(bytes.to_vec());
        Ok(())
    }

    /// Variable string elements, in linear order.
    pub fn to_strings(&mut self) -> Result<Vec<String>> {
        self.pack()?;
        match &self.repr {
            Repr::PackedStrings(strings) => Ok(strings.clone()),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn load_strings(&mut self, strings: Vec<String>) -> Result<()> {
        let count = self.subscripts.as_ref().map(|s| s.count()).unwrap_or(0);
        if self.zero.byte_size().is_some() || strings.len() != count {
            return Err(error!(TypeMismatch));
        }
        self.repr = Repr::PackedStrings(strings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::currency::Currency;

    fn subs(b: &[(i32, i32)]) -> ArraySubscripts {
        ArraySubscripts::new(b.to_vec()).unwrap()
    }

    fn filled() -> Array {
        let mut a = Array::new(Variable::Integer(0), 2);
        a.dimension(subs(&[(1, 3), (1, 2)])).unwrap();
        let mut n = 1;
        for j in 1..=2 {
            for i in 1..=3 {
                a.set(&[i, j], Val::Integer(n)).unwrap();
                n += 1;
            }
        }
        a
    }

    #[test]
    fn test_last_dimension_outermost() {
        let s = subs(&[(1, 3), (1, 2)]);
        assert_eq!(s.offset(&[1, 1]), Ok(0));
        assert_eq!(s.offset(&[2, 1]), Ok(1));
        assert_eq!(s.offset(&[1, 2]), Ok(3));
        assert_eq!(s.offset(&[4, 1]).unwrap_err().code(), 9);
        assert_eq!(s.offset(&[1]).unwrap_err().code(), 9);
    }

    #[test]
    fn test_redim_preserve_last_dimension() {
        for packed in [false, true] {
            let mut a = filled();
            if packed {
                a.pack().unwrap();
            }
            a.redim_preserve(subs(&[(1, 3), (1, 4)])).unwrap();
            let mut n = 1;
            for j in 1..=2 {
                for i in 1..=3 {
                    assert_eq!(a.get(&[i, j]), Ok(Val::Integer(n)));
                    n += 1;
                }
            }
            for j in 3..=4 {
                for i in 1..=3 {
                    assert_eq!(a.get(&[i, j]), Ok(Val::Integer(0)));
                }
            }
        }
    }

    #[test]
    fn test_redim_preserve_other_dimension_fails() {
        let mut a = filled();
        let e = a.redim_preserve(subs(&[(1, 4), (1, 2)])).unwrap_err();
        assert_eq!(e.code(), 9);
        let e = a.redim_preserve(subs(&[(1, 3)])).unwrap_err();
        assert_eq!(e.code(), 9);
    }

    #[test]
    fn test_dimension_twice() {
        let mut a = filled();
        assert_eq!(a.dimension(subs(&[(0, 1), (0, 1)])).unwrap_err().code(), 10);
        a.erase();
        assert!(!a.is_dimensioned());
        assert_eq!(a.get(&[1, 1]).unwrap_err().code(), 9);
        a.dimension(subs(&[(0, 1), (0, 1)])).unwrap();
    }

    #[test]
    fn test_packed_round_trip() {
        let kinds = vec![
            (Variable::Integer(0), Val::Integer(-7)),
            (Variable::Long(0), Val::Long(70_000)),
            (Variable::Single(0.0), Val::Single(1.25)),
            (Variable::Double(0.0), Val::Double(-2.5e100)),
            (Variable::Currency(Currency(0)), Val::Currency(Currency(-12_345))),
            (Variable::FixedString(vec![0; 3]), Val::String("ab ".into())),
        ];
        for (zero, val) in kinds {
            let mut a = Array::new(zero.clone(), 1);
            a.dimension(subs(&[(-2, 2)])).unwrap();
            a.set(&[-1], val.clone()).unwrap();
            a.set(&[2], val.clone()).unwrap();
            let bytes = a.to_bytes().unwrap();
            let mut b = Array::new(zero, 1);
            b.dimension(subs(&[(-2, 2)])).unwrap();
            b.load_bytes(&bytes).unwrap();
            assert_eq!(b.to_bytes().unwrap(), bytes);
            b.unpack().unwrap();
            assert_eq!(b.get(&[-1]), Ok(val.clone()));
            assert_eq!(b.get(&[2]), Ok(val));
            assert_eq!(b.get(&[0]), a.get(&[0]));
        }
    }

    #[test]
    fn test_string_elements() {
        let mut a = Array::new(Variable::String(String::new()), 1);
        a.dimension(ArraySubscripts::auto(1)).unwrap();
        a.set(&[10], Val::String("x".into())).unwrap();
        a.pack().unwrap();
        assert_eq!(a.to_strings().unwrap()[10], "x");
        a.set(&[0], Val::String("y".into())).unwrap();
        a.unpack().unwrap();
        assert_eq!(a.get(&[0]), Ok(Val::String("y".into())));
        assert_eq!(a.to_bytes().unwrap_err().code(), 13);
    }

    #[test]
    fn test_bounds() {
        let a = filled();
        assert_eq!(a.bounds(2), Ok((1, 2)));
        assert_eq!(a.bounds(3).unwrap_err().code(), 9);
        assert_eq!(a.bounds(0).unwrap_err().code(), 9);
    }
}
