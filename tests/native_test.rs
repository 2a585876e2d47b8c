mod common;
use common::*;
use pretty_assertions::assert_eq;
use qbx::mach::{
    Capture, HostError, NativeElement, NativeFn, NativeParam, NativeSignature, NativeType,
    NativeValue, Runtime,
};

const SOURCE: &str = r#"
TYPE Point
x AS INTEGER
y AS INTEGER
tag AS STRING * 4
END TYPE
DECLARE SUB Shift LIB "geo" (p AS Point, BYVAL dx AS INTEGER)
DECLARE FUNCTION Sum& LIB "geo" (values() AS LONG)
DIM pt AS Point
pt.x = 1
pt.y = 2
CALL Shift(pt, 5)
PRINT pt.x; pt.y; pt.tag
DIM v(1 TO 3) AS LONG
v(1) = 10
v(2) = 20
v(3) = 30
PRINT Sum&(v)
"#;

fn point() -> NativeType {
    NativeType::Record(vec![
        ("tag".into(), NativeType::FixedChars(4)),
        ("y".into(), NativeType::Int16),
        ("x".into(), NativeType::Int16),
    ])
}

fn shift() -> NativeFn<impl FnMut(&mut [NativeValue]) -> Result<Option<NativeValue>, HostError>> {
    let signature = NativeSignature {
        params: vec![
            NativeParam::by_ref("p", point()),
            NativeParam::by_value("dx", NativeType::Int16),
        ],
        returns: None,
    };
    NativeFn::new(signature, |args: &mut [NativeValue]| {
        let dx = match args[1] {
            NativeValue::Int16(n) => n,
            _ => return Err(HostError::Failed("bad dx".into())),
        };
        let p = &mut args[0];
        if let Some(NativeValue::Int16(x)) = p.field_mut("x") {
            *x += dx;
        }
        *p.field_mut("tag").ok_or(HostError::Code(5))? = NativeValue::Bytes(b"MOVD".to_vec());
        Ok(None)
    })
}

fn sum() -> NativeFn<impl FnMut(&mut [NativeValue]) -> Result<Option<NativeValue>, HostError>> {
    let signature = NativeSignature {
        params: vec![NativeParam::by_ref(
            "values",
            NativeType::Array(NativeElement::Int32),
        )],
        returns: Some(NativeType::Int32),
    };
    NativeFn::new(signature, |args: &mut [NativeValue]| match &args[0] {
        NativeValue::Array(values) => {
            let mut total = 0;
            for value in values {
                if let NativeValue::Int32(n) = value {
                    total += n;
                }
            }
            Ok(Some(NativeValue::Int32(total)))
        }
        _ => Err(HostError::Code(13)),
    })
}

#[test]
fn test_record_and_array_marshalling() {
    let capture = Capture::new();
    let mut runtime = Runtime::from_source(SOURCE, capture.clone()).unwrap();
    runtime.register_native("Shift", shift());
    runtime.register_native("sum", sum());
    assert_eq!(runtime.run(), Ok(0));
    assert_eq!(capture.output(), " 6  2 MOVD\n 60 \n");
}

#[test]
fn test_unregistered_native() {
    assert_eq!(code(&fail(SOURCE)), 5);
}

#[test]
fn test_signature_mismatch() {
    let capture = Capture::new();
    let mut runtime = Runtime::from_source(SOURCE, capture.clone()).unwrap();
    runtime.register_native("Shift", sum());
    let e = runtime.run().unwrap_err();
    assert_eq!(code(&e), 37);
}

#[test]
fn test_host_error_is_trappable() {
    let source = r#"
DECLARE SUB Fail LIB "host" (BYVAL n AS INTEGER)
ON ERROR GOTO handler
CALL Fail(53)
PRINT "after"
END
handler:
PRINT "host said"; ERR
RESUME NEXT
"#;
    let signature = NativeSignature {
        params: vec![NativeParam::by_value("n", NativeType::Int16)],
        returns: None,
    };
    let capture = Capture::new();
    let mut runtime = Runtime::from_source(source, capture.clone()).unwrap();
    runtime.register_native(
        "fail",
        NativeFn::new(signature, |args: &mut [NativeValue]| match args[0] {
            NativeValue::Int16(n) => Err(HostError::Code(n as u16)),
            _ => Ok(None),
        }),
    );
    assert_eq!(runtime.run(), Ok(0));
    assert_eq!(capture.output(), "host said 53 \nafter\n");
}
