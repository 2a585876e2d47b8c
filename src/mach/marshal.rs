//! Calls into procedures the host implements.
//!
//! A program declares them with `DECLARE SUB name LIB "host" (...)`. The
//! host registers a [`NativeProcedure`] under the same name. On first call
//! a [`Thunk`] pairs each declared parameter with the host's description
//! of it and keeps one converter per parameter for every later call.

use super::program::{ParamInfo, Routine, RoutineId};
use super::types::{DataType, RecordId, TypeTable};
use super::var::{latin1_decode, latin1_encode, Variable};
use super::Val;
use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::convert::TryInto;
use std::rc::Rc;
use tracing::debug;

type Result<T> = std::result::Result<T, Error>;

/// Element layout of an array handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeElement {
    Byte,
    Int16,
    Int32,
    Float32,
    Float64,
    Currency,
}

impl NativeElement {
    pub fn size(self) -> usize {
        match self {
            NativeElement::Byte => 1,
            NativeElement::Int16 => 2,
            NativeElement::Int32 | NativeElement::Float32 => 4,
            NativeElement::Float64 | NativeElement::Currency => 8,
        }
    }

    fn decode(self, chunk: &[u8]) -> Result<NativeValue> {
        let wrong = |_| error!(InternalError; "ELEMENT SIZE");
        Ok(match self {
            NativeElement::Byte => NativeValue::Bytes(chunk.to_vec()),
            NativeElement::Int16 => NativeValue::Int16(i16::from_le_bytes(chunk.try_into().map_err(wrong)?)),
            NativeElement::Int32 => NativeValue::Int32(i32::from_le_bytes(chunk.try_into().map_err(wrong)?)),
            NativeElement::Float32 => {
                NativeValue::Float32(f32::from_le_bytes(chunk.try_into().map_err(wrong)?))
            }
            NativeElement::Float64 => {
                NativeValue::Float64(f64::from_le_bytes(chunk.try_into().map_err(wrong)?))
            }
            NativeElement::Currency => {
                NativeValue::Currency(i64::from_le_bytes(chunk.try_into().map_err(wrong)?))
            }
        })
    }

    fn encode(self, value: &NativeValue, out: &mut Vec<u8>) -> Result<()> {
        match (self, value) {
            (NativeElement::Byte, NativeValue::Bytes(b)) => out.extend_from_slice(b),
            (NativeElement::Int16, NativeValue::Int16(n)) => out.extend_from_slice(&n.to_le_bytes()),
            (NativeElement::Int32, NativeValue::Int32(n)) => out.extend_from_slice(&n.to_le_bytes()),
            (NativeElement::Float32, NativeValue::Float32(n)) => out.extend_from_slice(&n.to_le_bytes()),
            (NativeElement::Float64, NativeValue::Float64(n)) => out.extend_from_slice(&n.to_le_bytes()),
            (NativeElement::Currency, NativeValue::Currency(n)) => out.extend_from_slice(&n.to_le_bytes()),
            _ => return Err(error!(TypeMismatch)),
        }
        Ok(())
    }
}

/// The host's view of one parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeType {
    Int16,
    Int32,
    Float32,
    Float64,
    /// Scaled by 10,000.
    Currency,
    Str,
    /// Latin-1 text of exactly `n` bytes.
    FixedChars(usize),
    FixedBytes(usize),
    Array(NativeElement),
    /// Fields are matched to the BASIC record by name.
    Record(Vec<(String, NativeType)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passing {
    ByValue,
    /// The host's changes are copied back into the caller's variable.
    ByRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeParam {
    pub name: String,
    pub native_type: NativeType,
    pub passing: Passing,
}

impl NativeParam {
    pub fn by_value(name: &str, native_type: NativeType) -> NativeParam {
        NativeParam {
            name: name.to_string(),
            native_type,
            passing: Passing::ByValue,
        }
    }

    pub fn by_ref(name: &str, native_type: NativeType) -> NativeParam {
        NativeParam {
            name: name.to_string(),
            native_type,
            passing: Passing::ByRef,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSignature {
    pub params: Vec<NativeParam>,
    pub returns: Option<NativeType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Int16(i16),
    Int32(i32),
    Float32(f32),
    Float64(f64),
    Currency(i64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<NativeValue>),
    Record(Vec<(String, NativeValue)>),
}

impl NativeValue {
    /// A field of a record value, by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&NativeValue> {
        match self {
            NativeValue::Record(fields) => fields
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut NativeValue> {
        match self {
            NativeValue::Record(fields) => fields
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    Failed(String),
    /// Raise this BASIC error number in the calling program.
    #[error("error {0}")]
    Code(u16),
}

impl From<HostError> for Error {
    fn from(e: HostError) -> Error {
        match e {
            HostError::Failed(msg) => error!(IllegalFunctionCall; msg),
            HostError::Code(code) => Error::numbered(code),
        }
    }
}

/// A procedure the host makes callable from BASIC.
pub trait NativeProcedure {
    fn signature(&self) -> NativeSignature;

    /// `args` holds one value per parameter; `ByRef` ones may be changed.
    fn invoke(&mut self, args: &mut [NativeValue]) -> std::result::Result<Option<NativeValue>, HostError>;
}

/// Wraps a closure with a fixed signature.
pub struct NativeFn<F> {
    signature: NativeSignature,
    f: F,
}

impl<F> NativeFn<F>
where
    F: FnMut(&mut [NativeValue]) -> std::result::Result<Option<NativeValue>, HostError>,
{
    pub fn new(signature: NativeSignature, f: F) -> NativeFn<F> {
        NativeFn { signature, f }
    }
}

impl<F> NativeProcedure for NativeFn<F>
where
    F: FnMut(&mut [NativeValue]) -> std::result::Result<Option<NativeValue>, HostError>,
{
    fn signature(&self) -> NativeSignature {
        self.signature.clone()
    }

    fn invoke(&mut self, args: &mut [NativeValue]) -> std::result::Result<Option<NativeValue>, HostError> {
        (self.f)(args)
    }
}

/// Moves one value between a BASIC variable and its host form.
trait Converter {
    fn to_native(&self, var: &mut Variable) -> Result<NativeValue>;
    fn from_native(&self, value: &NativeValue, var: &mut Variable) -> Result<()>;
}

fn fit(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
    bytes.resize(len, 0);
    bytes
}

struct ScalarConverter {
    native: NativeType,
}

impl Converter for ScalarConverter {
    fn to_native(&self, var: &mut Variable) -> Result<NativeValue> {
        let val = var.get()?;
        Ok(match &self.native {
            NativeType::Int16 => NativeValue::Int16(val.to_i16()?),
            NativeType::Int32 => NativeValue::Int32(val.to_i32()?),
            NativeType::Float32 => match val.convert(&DataType::Single)? {
                Val::Single(n) => NativeValue::Float32(n),
                _ => return Err(error!(InternalError)),
            },
            NativeType::Float64 => NativeValue::Float64(val.to_f64()?),
            NativeType::Currency => NativeValue::Currency(val.to_currency()?.raw()),
            NativeType::Str => match val {
                Val::String(s) => NativeValue::Str(s),
                _ => return Err(error!(TypeMismatch)),
            },
            NativeType::FixedChars(n) | NativeType::FixedBytes(n) => match var {
                Variable::FixedString(b) => NativeValue::Bytes(fit(b.clone(), *n)),
                Variable::String(s) => NativeValue::Bytes(fit(latin1_encode(s), *n)),
                _ => return Err(error!(TypeMismatch)),
            },
            NativeType::Array(_) | NativeType::Record(_) => return Err(error!(TypeMismatch)),
        })
    }

    fn from_native(&self, value: &NativeValue, var: &mut Variable) -> Result<()> {
        match (value, var) {
            (NativeValue::Int16(n), var) => var.set(Val::Integer(*n)),
            (NativeValue::Int32(n), var) => var.set(Val::Long(*n)),
            (NativeValue::Float32(n), var) => var.set(Val::Single(*n)),
            (NativeValue::Float64(n), var) => var.set(Val::Double(*n)),
            (NativeValue::Currency(n), var) => {
                var.set(Val::Currency(super::currency::Currency::from_raw(*n)))
            }
            (NativeValue::Str(s), var) => var.set(Val::String(s.clone())),
            (NativeValue::Bytes(b), Variable::FixedString(dest)) => {
                let len = dest.len();
                *dest = fit(b.clone(), len);
                Ok(())
            }
            (NativeValue::Bytes(b), Variable::String(dest)) => {
                let end = b.iter().position(|c| *c == 0).unwrap_or(b.len());
                *dest = latin1_decode(&b[..end]);
                Ok(())
            }
            _ => Err(error!(TypeMismatch)),
        }
    }
}

/// Whole arrays travel as their packed byte image, cut up by the
/// host's element size.
struct ArrayConverter {
    element: NativeElement,
}

impl Converter for ArrayConverter {
    fn to_native(&self, var: &mut Variable) -> Result<NativeValue> {
        let bytes = var.as_array_mut()?.to_bytes()?;
        let size = self.element.size();
        if bytes.len() % size != 0 {
            return Err(error!(TypeMismatch));
        }
        if self.element == NativeElement::Byte {
            return Ok(NativeValue::Array(vec![NativeValue::Bytes(bytes)]));
        }
        let elements = bytes
            .chunks_exact(size)
            .map(|chunk| self.element.decode(chunk))
            .collect::<Result<Vec<_>>>()?;
        Ok(NativeValue::Array(elements))
    }

    fn from_native(&self, value: &NativeValue, var: &mut Variable) -> Result<()> {
        let elements = match value {
            NativeValue::Array(elements) => elements,
            _ => return Err(error!(TypeMismatch)),
        };
        let mut bytes = vec![];
        for element in elements {
            self.element.encode(element, &mut bytes)?;
        }
        var.as_array_mut()?.load_bytes(&bytes)
    }
}

struct RecordConverter {
    id: RecordId,
    /// Host field name, BASIC field index and converter, in the host's
    /// declaration order.
    fields: Vec<(String, usize, Box<dyn Converter>)>,
}

impl Converter for RecordConverter {
    fn to_native(&self, var: &mut Variable) -> Result<NativeValue> {
        let mut fields = vec![];
        for (name, index, converter) in &self.fields {
            let value = converter.to_native(self.field_mut(var, *index)?)?;
            fields.push((name.clone(), value));
        }
        Ok(NativeValue::Record(fields))
    }

    fn from_native(&self, value: &NativeValue, var: &mut Variable) -> Result<()> {
        for (name, index, converter) in &self.fields {
            let field = value.field(name).ok_or_else(|| error!(TypeMismatch))?;
            converter.from_native(field, self.field_mut(var, *index)?)?;
        }
        Ok(())
    }
}

impl RecordConverter {
    fn field_mut<'a>(&self, var: &'a mut Variable, index: usize) -> Result<&'a mut Variable> {
        match var {
            Variable::Record(r) if r.id == self.id => r
                .fields
                .get_mut(index)
                .ok_or_else(|| error!(InternalError; "NO FIELD")),
            _ => Err(error!(TypeMismatch)),
        }
    }
}

fn converter(
    data_type: &DataType,
    native: &NativeType,
    types: &TypeTable,
) -> Result<Box<dyn Converter>> {
    let scalar = || -> Box<dyn Converter> {
        Box::new(ScalarConverter {
            native: native.clone(),
        })
    };
    match (data_type, native) {
        (DataType::Integer, NativeType::Int16)
        | (DataType::Long, NativeType::Int32)
        | (DataType::Single, NativeType::Float32)
        | (DataType::Double, NativeType::Float64)
        | (DataType::Currency, NativeType::Currency)
        | (DataType::String, NativeType::Str)
        | (DataType::FixedString(_), NativeType::Str)
        | (DataType::String, NativeType::FixedChars(_))
        | (DataType::String, NativeType::FixedBytes(_))
        | (DataType::FixedString(_), NativeType::FixedChars(_))
        | (DataType::FixedString(_), NativeType::FixedBytes(_)) => Ok(scalar()),
        (DataType::Array(element, _), NativeType::Array(e)) => {
            if !types.is_serializable(element) || element.is_array() {
                return Err(error!(TypeMismatch));
            }
            Ok(Box::new(ArrayConverter { element: *e }))
        }
        (DataType::Record(id), NativeType::Record(native_fields)) => {
            let record = types
                .record(*id)
                .ok_or_else(|| error!(InternalError; "UNKNOWN RECORD"))?;
            let mut fields = vec![];
            for (name, native_type) in native_fields {
                let (index, field) = record.field(name).ok_or_else(|| error!(TypeMismatch))?;
                fields.push((name.clone(), index, converter(&field.data_type, native_type, types)?));
            }
            Ok(Box::new(RecordConverter { id: *id, fields }))
        }
        _ => Err(error!(TypeMismatch)),
    }
}

struct ParamThunk {
    passing: Passing,
    converter: Box<dyn Converter>,
}

/// Converters for every parameter and the return value of one
/// declared procedure.
pub struct Thunk {
    params: Vec<ParamThunk>,
    returns: Option<(DataType, Box<dyn Converter>)>,
}

impl std::fmt::Debug for Thunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Thunk({} params)", self.params.len())
    }
}

impl Thunk {
    pub fn build(
        params: &[ParamInfo],
        return_type: Option<&DataType>,
        signature: &NativeSignature,
        types: &TypeTable,
    ) -> Result<Thunk> {
        if params.len() != signature.params.len() {
            return Err(error!(ArgumentCountMismatch));
        }
        let params = params
            .iter()
            .zip(&signature.params)
            .map(|(param, native)| {
                Ok(ParamThunk {
                    passing: native.passing,
                    converter: converter(&param.data_type, &native.native_type, types)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let returns = match (return_type, &signature.returns) {
            (None, None) => None,
            (Some(t), Some(native)) => Some((t.clone(), converter(t, native, types)?)),
            _ => return Err(error!(TypeMismatch)),
        };
        Ok(Thunk { params, returns })
    }

    /// Convert the arguments in, call the host, copy `ByRef` values
    /// back out and convert the result.
    pub fn call(
        &self,
        procedure: &mut dyn NativeProcedure,
        args: &mut [Variable],
        types: &TypeTable,
    ) -> Result<Option<Variable>> {
        if args.len() != self.params.len() {
            return Err(error!(ArgumentCountMismatch));
        }
        let mut values = vec![];
        for (param, arg) in self.params.iter().zip(args.iter_mut()) {
            values.push(param.converter.to_native(arg)?);
        }
        let result = procedure.invoke(&mut values)?;
        for ((param, arg), value) in self.params.iter().zip(args.iter_mut()).zip(&values) {
            if param.passing == Passing::ByRef {
                param.converter.from_native(value, arg)?;
            }
        }
        match (&self.returns, result) {
            (Some((data_type, converter)), Some(value)) => {
                let mut var = Variable::new(data_type, types);
                converter.from_native(&value, &mut var)?;
                Ok(Some(var))
            }
            (None, None) => Ok(None),
            _ => Err(error!(TypeMismatch)),
        }
    }
}

/// Thunks built so far, one per declared routine.
#[derive(Debug, Default)]
pub struct MarshalCache {
    thunks: HashMap<RoutineId, Rc<Thunk>>,
}

impl MarshalCache {
    pub fn thunk(
        &mut self,
        id: RoutineId,
        routine: &Routine,
        signature: &NativeSignature,
        types: &TypeTable,
    ) -> Result<Rc<Thunk>> {
        if let Some(thunk) = self.thunks.get(&id) {
            return Ok(thunk.clone());
        }
        let thunk = Rc::new(Thunk::build(
            &routine.params,
            routine.return_type.as_ref(),
            signature,
            types,
        )?);
        debug!(routine = &*routine.name, params = routine.params.len(), "built thunk");
        self.thunks.insert(id, thunk.clone());
        Ok(thunk)
    }

    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::array::ArraySubscripts;
    use crate::mach::currency::Currency;

    fn param(data_type: DataType) -> ParamInfo {
        ParamInfo {
            name: "P".into(),
            slot: 0,
            data_type,
            by_val: false,
        }
    }

    fn signature(params: Vec<NativeParam>, returns: Option<NativeType>) -> NativeSignature {
        NativeSignature { params, returns }
    }

    #[test]
    fn test_scalars_and_return() {
        let types = TypeTable::default();
        let sig = signature(
            vec![
                NativeParam::by_ref("a", NativeType::Currency),
                NativeParam::by_value("b", NativeType::FixedChars(4)),
            ],
            Some(NativeType::Int32),
        );
        let thunk = Thunk::build(
            &[param(DataType::Currency), param(DataType::String)],
            Some(&DataType::Long),
            &sig,
            &types,
        )
        .unwrap();
        let mut seen = vec![];
        let mut host = NativeFn::new(sig, |args: &mut [NativeValue]| {
            seen.push(args.to_vec());
            args[0] = NativeValue::Currency(25_000);
            Ok(Some(NativeValue::Int32(7)))
        });
        let mut args = vec![
            Variable::Currency(Currency::from_raw(15_000)),
            Variable::String("hello".into()),
        ];
        let result = thunk.call(&mut host, &mut args, &types).unwrap();
        assert_eq!(result, Some(Variable::Long(7)));
        assert_eq!(args[0], Variable::Currency(Currency::from_raw(25_000)));
        drop(host);
        assert_eq!(
            seen[0],
            vec![NativeValue::Currency(15_000), NativeValue::Bytes(b"hell".to_vec())]
        );
    }

    #[test]
    fn test_mismatches() {
        let types = TypeTable::default();
        let sig = signature(vec![NativeParam::by_value("a", NativeType::Int16)], None);
        let e = Thunk::build(&[param(DataType::Long)], None, &sig, &types).unwrap_err();
        assert_eq!(e.code(), 13);
        let e = Thunk::build(&[], None, &sig, &types).unwrap_err();
        assert_eq!(e.code(), 37);
        let e = Thunk::build(&[param(DataType::Integer)], Some(&DataType::Integer), &sig, &types)
            .unwrap_err();
        assert_eq!(e.code(), 13);
    }

    #[test]
    fn test_array_reinterpreted() {
        let types = TypeTable::default();
        let data_type = DataType::Array(Box::new(DataType::Long), 1);
        let sig = signature(vec![NativeParam::by_ref("a", NativeType::Array(NativeElement::Int16))], None);
        let thunk = Thunk::build(&[param(data_type.clone())], None, &sig, &types).unwrap();
        let mut var = Variable::new(&data_type, &types);
        {
            let array = var.as_array_mut().unwrap();
            array.dimension(ArraySubscripts::new(vec![(1, 2)]).unwrap()).unwrap();
            array.set(&[1], Val::Long(0x0002_0001)).unwrap();
        }
        let mut host = NativeFn::new(sig, |args: &mut [NativeValue]| {
            match &mut args[0] {
                NativeValue::Array(elements) => {
                    assert_eq!(elements.len(), 4);
                    assert_eq!(elements[0], NativeValue::Int16(1));
                    assert_eq!(elements[1], NativeValue::Int16(2));
                    elements[2] = NativeValue::Int16(-1);
                    elements[3] = NativeValue::Int16(-1);
                }
                other => panic!("{:?}", other),
            }
            Ok(None)
        });
        let mut args = vec![var];
        thunk.call(&mut host, &mut args, &types).unwrap();
        assert_eq!(args[0].as_array().unwrap().get(&[2]), Ok(Val::Long(-1)));
    }

    #[test]
    fn test_record_by_field_name() {
        let mut types = TypeTable::default();
        let inner = types.declare(&"INNER".into()).unwrap();
        let outer = types.declare(&"OUTER".into()).unwrap();
        types
            .set_fields(inner, vec![("N".into(), DataType::Integer)])
            .unwrap();
        types
            .set_fields(
                outer,
                vec![
                    ("NAME".into(), DataType::FixedString(4)),
                    ("PT".into(), DataType::Record(inner)),
                    ("TOTAL".into(), DataType::Double),
                ],
            )
            .unwrap();
        types.resolve().unwrap();
        let native = NativeType::Record(vec![
            ("total".into(), NativeType::Float64),
            (
                "pt".into(),
                NativeType::Record(vec![("n".into(), NativeType::Int16)]),
            ),
            ("name".into(), NativeType::FixedChars(4)),
        ]);
        let sig = signature(vec![NativeParam::by_ref("r", native)], None);
        let thunk = Thunk::build(&[param(DataType::Record(outer))], None, &sig, &types).unwrap();
        let mut var = Variable::new(&DataType::Record(outer), &types);
        var.field_mut(2).unwrap().set(Val::Double(1.5)).unwrap();
        let mut host = NativeFn::new(sig, |args: &mut [NativeValue]| {
            let record = &mut args[0];
            assert_eq!(record.field("TOTAL"), Some(&NativeValue::Float64(1.5)));
            *record.field_mut("name").unwrap() = NativeValue::Bytes(b"ab".to_vec());
            let pt = record.field_mut("pt").unwrap();
            *pt.field_mut("n").unwrap() = NativeValue::Int16(9);
            Ok(None)
        });
        let mut args = vec![var];
        thunk.call(&mut host, &mut args, &types).unwrap();
        let var = &args[0];
        assert_eq!(var.field(0).unwrap().get(), Ok(Val::String("ab\0\0".into())));
        assert_eq!(var.field(1).unwrap().field(0).unwrap().get(), Ok(Val::Integer(9)));

        let missing = NativeType::Record(vec![("nope".into(), NativeType::Int16)]);
        let sig = signature(vec![NativeParam::by_ref("r", missing)], None);
        let e = Thunk::build(&[param(DataType::Record(outer))], None, &sig, &types).unwrap_err();
        assert_eq!(e.code(), 13);
    }

    #[test]
    fn test_host_error_codes() {
        assert_eq!(Error::from(HostError::Code(53)).code(), 53);
        assert_eq!(Error::from(HostError::Failed("bad".into())).code(), 5);
    }
}
