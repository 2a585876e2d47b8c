mod common;
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn test_global_handler_resume_next() {
    let source = r#"
ON ERROR GOTO handler
PRINT "A"
ERROR 5
PRINT "B"
END
handler:
PRINT "ERR"; ERR
RESUME NEXT
"#;
    assert_eq!(run(source), "A\nERR 5 \nB\n");
}

#[test]
fn test_err_and_erl() {
    let source = r#"
10 ON ERROR GOTO 100
20 Z% = 0
30 X% = 5 \ Z%
40 PRINT "after"; ERR
50 END
100 PRINT "ERR"; ERR; "ERL"; ERL
110 RESUME NEXT
"#;
    assert_eq!(run(source), "ERR 11 ERL 30 \nafter 0 \n");
}

#[test]
fn test_resume_next_in_place() {
    let source = r#"
ON ERROR RESUME NEXT
z% = 0
x% = 1 \ z%
PRINT ERR
"#;
    assert_eq!(run(source), " 11 \n");
}

#[test]
fn test_local_handler_retry() {
    let source = r#"
SUB Risky
ON LOCAL ERROR GOTO fix
d% = 0
r% = 10 \ d%
PRINT "r ="; r%
EXIT SUB
fix:
PRINT "fixing"
d% = 2
RESUME
END SUB
CALL Risky
"#;
    assert_eq!(run(source), "fixing\nr = 5 \n");
}

#[test]
fn test_retry_faults_again() {
    let source = r#"
ON ERROR GOTO fix
d% = 0
r% = 10 \ d%
PRINT "r ="; r%
END
fix:
tries% = tries% + 1
PRINT "fix"; tries%
IF tries% = 2 THEN d% = 5
RESUME
"#;
    assert_eq!(run(source), "fix 1 \nfix 2 \nr = 2 \n");
}

#[test]
fn test_handler_in_calling_frame() {
    let source = r#"
SUB Inner
PRINT "inner"
ERROR 9
PRINT "not reached"
END SUB
SUB Outer
ON LOCAL ERROR GOTO oops
CALL Inner
PRINT "after inner"
EXIT SUB
oops:
PRINT "caught"; ERR
RESUME NEXT
END SUB
CALL Outer
PRINT "done"
"#;
    assert_eq!(run(source), "inner\ncaught 9 \nafter inner\ndone\n");
}

#[test]
fn test_global_handler_for_sub_error() {
    let source = r#"
SUB Deep
ERROR 200
END SUB
ON ERROR GOTO trap
CALL Deep
PRINT "next"
END
trap:
PRINT "trapped"; ERR
RESUME NEXT
"#;
    assert_eq!(run(source), "trapped 200 \nnext\n");
}

#[test]
fn test_exit_sub_from_handler() {
    let source = r#"
SUB Inner
ERROR 5
END SUB
SUB Outer
ON LOCAL ERROR GOTO bail
CALL Inner
PRINT "unreachable"
EXIT SUB
bail:
PRINT "bailing"; ERR
EXIT SUB
END SUB
CALL Outer
PRINT "back"
"#;
    assert_eq!(run(source), "bailing 5 \nback\n");
}

#[test]
fn test_resume_to_label() {
    let source = r#"
ON ERROR GOTO handler
PRINT "start"
ERROR 6
PRINT "skipped"
resumed:
PRINT "resumed"
END
handler:
RESUME resumed
"#;
    assert_eq!(run(source), "start\nresumed\n");
}

#[test]
fn test_error_inside_handler_is_unhandled() {
    let source = r#"
ON ERROR GOTO handler
ERROR 5
END
handler:
ERROR 13
"#;
    assert_eq!(code(&fail(source)), 13);
}

#[test]
fn test_resume_only_in_handler_frame() {
    let source = r#"
SUB Recover
RESUME NEXT
END SUB
ON ERROR GOTO handler
ERROR 5
PRINT "not reached"
END
handler:
CALL Recover
"#;
    assert_eq!(code(&fail(source)), 20);
}

#[test]
fn test_handler_without_resume() {
    let source = r#"
ON ERROR GOTO handler
ERROR 5
END
handler:
PRINT "oops"
"#;
    assert_eq!(code(&fail(source)), 19);
}

#[test]
fn test_disable_handler() {
    let source = r#"
ON ERROR GOTO handler
ON ERROR GOTO 0
ERROR 9
END
handler:
RESUME NEXT
"#;
    assert_eq!(run(source), "SUBSCRIPT OUT OF RANGE IN 4\n");
}

#[test]
fn test_error_statement_range() {
    assert_eq!(code(&fail("ERROR 0\n")), 5);
    assert_eq!(code(&fail("ERROR 256\n")), 5);
    assert_eq!(run("ERROR 222\n"), "UNPRINTABLE ERROR 222 IN 1\n");
}
