use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

pub type RecordId = usize;

/// The shape of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Integer,
    Long,
    Single,
    Double,
    Currency,
    String,
    FixedString(usize),
    /// Element type and rank. A rank of zero matches any rank.
    Array(Box<DataType>, usize),
    Record(RecordId),
}

impl DataType {
    pub fn from_suffix(c: char) -> Option<DataType> {
        match c {
            '%' => Some(DataType::Integer),
            '&' => Some(DataType::Long),
            '!' => Some(DataType::Single),
            '#' => Some(DataType::Double),
            '@' => Some(DataType::Currency),
            '$' => Some(DataType::String),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        use DataType::*;
        matches!(self, Integer | Long | Single | Double | Currency)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String | DataType::FixedString(_))
    }

    /// Values of these types fit in a `Val`.
    pub fn is_scalar(&self) -> bool {
        self.is_numeric() || self.is_string()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(..))
    }

    pub fn element(&self) -> Option<&DataType> {
        match self {
            DataType::Array(e, _) => Some(e),
            _ => None,
        }
    }

    /// Fixed strings behave as variable strings once loaded.
    pub fn value_type(&self) -> DataType {
        match self {
            DataType::FixedString(_) => DataType::String,
            t => t.clone(),
        }
    }

    /// Whether two declared types may alias one another by reference.
    pub fn accepts(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Array(a, 0), DataType::Array(b, _)) => a == b,
            (DataType::Array(a, n), DataType::Array(b, m)) => a == b && (n == m || *m == 0),
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use DataType::*;
        match self {
            Integer => write!(f, "INTEGER"),
            Long => write!(f, "LONG"),
            Single => write!(f, "SINGLE"),
            Double => write!(f, "DOUBLE"),
            Currency => write!(f, "CURRENCY"),
            String => write!(f, "STRING"),
            FixedString(n) => write!(f, "STRING * {}", n),
            Array(e, _) => write!(f, "{}()", e),
            Record(id) => write!(f, "TYPE #{}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Rc<str>,
    pub data_type: DataType,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: Rc<str>,
    pub fields: Vec<Field>,
    size: Option<usize>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name.eq_ignore_ascii_case(name))
    }
}

/// User-defined record types and their byte layouts.
///
/// Records are declared by name first so fields may refer to records
/// defined later in the source; `resolve` then lays them all out.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    records: Vec<RecordType>,
    names: HashMap<Rc<str>, RecordId>,
}

impl TypeTable {
    pub fn declare(&mut self, name: &Rc<str>) -> Result<RecordId> {
        if self.names.contains_key(name) {
            return Err(error!(DuplicateDefinition));
        }
        let id = self.records.len();
        self.records.push(RecordType {
            name: name.clone(),
            fields: vec![],
            size: None,
        });
        self.names.insert(name.clone(), id);
        Ok(id)
    }

    pub fn set_fields(&mut self, id: RecordId, fields: Vec<(Rc<str>, DataType)>) -> Result<()> {
        let record = match self.records.get_mut(id) {
            Some(r) => r,
            None => return Err(error!(InternalError; "UNKNOWN RECORD")),
        };
        let mut v: Vec<Field> = vec![];
        for (name, data_type) in fields {
            if v.iter().any(|f| f.name == name) {
                return Err(error!(DuplicateDefinition));
            }
            if data_type == DataType::String || data_type.is_array() {
                return Err(error!(StatementIllegalInTypeBlock));
            }
            v.push(Field {
                name,
                data_type,
                offset: 0,
            });
        }
        record.fields = v;
        record.size = None;
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<RecordId> {
        self.names.get(name).copied()
    }

    pub fn record(&self, id: RecordId) -> Option<&RecordType> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lay out every record: field offsets and total sizes. A record
    /// that contains itself, directly or through other records, is an
    /// internal error rather than endless recursion.
    pub fn resolve(&mut self) -> Result<()> {
        let mut visiting = vec![false; self.records.len()];
        for id in 0..self.records.len() {
            self.layout(id, &mut visiting)?;
        }
        Ok(())
    }

    fn layout(&mut self, id: RecordId, visiting: &mut Vec<bool>) -> Result<usize> {
        if let Some(size) = self.records[id].size {
            return Ok(size);
        }
        if visiting[id] {
            return Err(error!(InternalError; "RECORD CONTAINS ITSELF"));
        }
        visiting[id] = true;
        let mut offset = 0;
        for i in 0..self.records[id].fields.len() {
            let size = match self.records[id].fields[i].data_type.clone() {
                DataType::Record(inner) => self.layout(inner, visiting)?,
                t => scalar_size(&t),
            };
            self.records[id].fields[i].offset = offset;
            offset += size;
        }
        visiting[id] = false;
        self.records[id].size = Some(offset);
        Ok(offset)
    }

    /// Bytes occupied by one value of `data_type` in the binary layout.
    /// Variable strings and arrays are their 4 byte descriptors.
    pub fn byte_size(&self, data_type: &DataType) -> usize {
        match data_type {
            DataType::Record(id) => self.records.get(*id).and_then(|r| r.size).unwrap_or(0),
            t => scalar_size(t),
        }
    }

    /// Whether values of the type have a complete binary form.
    pub fn is_serializable(&self, data_type: &DataType) -> bool {
        match data_type {
            DataType::String | DataType::Array(..) => false,
            DataType::Record(id) => self
                .records
                .get(*id)
                .map(|r| r.fields.iter().all(|f| self.is_serializable(&f.data_type)))
                .unwrap_or(false),
            _ => true,
        }
    }
}

fn scalar_size(data_type: &DataType) -> usize {
    use DataType::*;
    match data_type {
        Integer => 2,
        Long | Single => 4,
        Double | Currency => 8,
        String | Array(..) => 4,
        FixedString(n) => *n,
        Record(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut t = TypeTable::default();
        let point = t.declare(&"POINT".into()).unwrap();
        let rec = t.declare(&"REC".into()).unwrap();
        t.set_fields(
            rec,
            vec![
                ("NAME".into(), DataType::FixedString(10)),
                ("AT".into(), DataType::Record(point)),
                ("COST".into(), DataType::Currency),
            ],
        )
        .unwrap();
        t.set_fields(
            point,
            vec![("X".into(), DataType::Integer), ("Y".into(), DataType::Single)],
        )
        .unwrap();
        t.resolve().unwrap();
        assert_eq!(t.byte_size(&DataType::Record(point)), 6);
        assert_eq!(t.byte_size(&DataType::Record(rec)), 24);
        let r = t.record(rec).unwrap();
        assert_eq!(r.field("cost").map(|(_, f)| f.offset), Some(16));
    }

    #[test]
    fn test_cycle_guard() {
        let mut t = TypeTable::default();
        let a = t.declare(&"A".into()).unwrap();
        let b = t.declare(&"B".into()).unwrap();
        t.set_fields(a, vec![("B".into(), DataType::Record(b))]).unwrap();
        t.set_fields(b, vec![("A".into(), DataType::Record(a))]).unwrap();
        assert_eq!(t.resolve().unwrap_err().code(), 51);
    }

    #[test]
    fn test_variable_string_field_rejected() {
        let mut t = TypeTable::default();
        let a = t.declare(&"A".into()).unwrap();
        let e = t.set_fields(a, vec![("S".into(), DataType::String)]).unwrap_err();
        assert_eq!(e.code(), 104);
    }
}
