mod common;
use common::*;
use pretty_assertions::assert_eq;
use qbx::mach::{Capture, Runtime, RuntimeConfig, Val, Variable};

#[test]
fn test_recursive_function() {
    let source = r#"
FUNCTION Fact& (n AS INTEGER)
IF n <= 1 THEN
Fact& = 1
ELSE
Fact& = n * Fact&(n - 1)
END IF
END FUNCTION
PRINT Fact&(10)
"#;
    assert_eq!(run(source), " 3628800 \n");
}

#[test]
fn test_dim_shared() {
    let source = r#"
DIM SHARED total AS LONG
SUB AddUp (n AS INTEGER)
total = total + n
END SUB
FOR i% = 1 TO 4
CALL AddUp(i%)
NEXT i%
PRINT total
"#;
    assert_eq!(run(source), " 10 \n");
}

#[test]
fn test_shared_statement() {
    let source = r#"
SUB Bump
SHARED count%
count% = count% + 1
END SUB
count% = 5
CALL Bump
CALL Bump
PRINT count%
"#;
    assert_eq!(run(source), " 7 \n");
}

#[test]
fn test_locals_are_private() {
    let source = r#"
SUB Show
x% = x% + 1
PRINT x%;
END SUB
x% = 100
CALL Show
CALL Show
PRINT x%
"#;
    assert_eq!(run(source), " 1  1  100 \n");
}

#[test]
fn test_by_reference_arguments() {
    let source = r#"
SUB Twice (x AS INTEGER)
x = x * 2
END SUB
SUB Ignore (BYVAL x AS INTEGER)
x = 0
END SUB
a% = 3
CALL Twice(a%)
DIM arr(3) AS INTEGER
arr(1) = 5
CALL Twice(arr(1))
CALL Twice(a% + 0)
CALL Ignore(a%)
PRINT a%; arr(1)
"#;
    assert_eq!(run(source), " 6  10 \n");
}

#[test]
fn test_array_parameter() {
    let source = r#"
FUNCTION Total& (values() AS LONG)
t& = 0
FOR i% = LBOUND(values) TO UBOUND(values)
t& = t& + values(i%)
NEXT i%
Total& = t&
END FUNCTION
SUB Fill (values() AS LONG)
FOR i% = LBOUND(values) TO UBOUND(values)
values(i%) = i% * 100
NEXT i%
END SUB
DIM v(1 TO 4) AS LONG
CALL Fill(v)
PRINT Total&(v)
"#;
    assert_eq!(run(source), " 1000 \n");
}

#[test]
fn test_exit_sub_and_function() {
    let source = r#"
FUNCTION Sign% (n AS INTEGER)
Sign% = 1
IF n >= 0 THEN EXIT FUNCTION
Sign% = -1
END FUNCTION
SUB Early
PRINT "in";
EXIT SUB
PRINT "never"
END SUB
CALL Early
PRINT Sign%(5); Sign%(-5)
"#;
    assert_eq!(run(source), "in 1 -1 \n");
}

#[test]
fn test_gosub_inside_sub() {
    let source = r#"
SUB Work
GOSUB inner
GOSUB inner
EXIT SUB
inner:
PRINT "inner"
RETURN
END SUB
CALL Work
"#;
    assert_eq!(run(source), "inner\ninner\n");
}

#[test]
fn test_host_call() {
    let source = r#"
FUNCTION Area! (w AS SINGLE, h AS SINGLE)
Area! = w * h
END FUNCTION
SUB Hello (who AS STRING)
PRINT "Hello, "; who
END SUB
"#;
    let capture = Capture::new();
    let mut runtime = Runtime::from_source(source, capture.clone()).unwrap();
    let area = runtime
        .call("Area", vec![Val::Single(2.5), Val::Integer(4)])
        .unwrap();
    assert_eq!(area, Variable::Single(10.0));
    let done = runtime.call("hello", vec![Val::String("host".into())]).unwrap();
    assert_eq!(done, Variable::Integer(0));
    assert_eq!(capture.output(), "Hello, host\n");
    let e = runtime.call("Area", vec![Val::Single(1.0)]).unwrap_err();
    assert_eq!(code(&e), 37);
}

#[test]
fn test_main_values_after_run() {
    let source = "x% = 6\ny$ = \"done\"\n";
    let mut runtime = Runtime::from_source(source, Capture::new()).unwrap();
    assert_eq!(runtime.run(), Ok(0));
    assert_eq!(runtime.main_value("x%"), Some(Val::Integer(6)));
    assert_eq!(runtime.main_value("y"), Some(Val::String("done".into())));
}

#[test]
fn test_call_depth_limit() {
    let source = r#"
SUB Forever (n AS INTEGER)
CALL Forever(n + 1)
END SUB
CALL Forever(1)
"#;
    let mut runtime = Runtime::from_source(source, Capture::new())
        .unwrap()
        .with_config(RuntimeConfig {
            max_depth: 20,
            ..RuntimeConfig::default()
        });
    assert_eq!(code(&runtime.run().unwrap_err()), 7);
}
