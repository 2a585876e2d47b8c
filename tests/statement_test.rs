mod common;
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn test_arithmetic_promotion() {
    assert_eq!(run("PRINT 7 / 2; 7 \\ 2; 7 MOD 3; 2 ^ 10\n"), " 3.5  3  1  1024 \n");
    assert_eq!(run("a% = 30000\nb& = a% + 40000\nPRINT b&\n"), " 70000 \n");
    assert_eq!(run("x# = 1 / 3#\nPRINT x#\n"), " .3333333333333333 \n");
}

#[test]
fn test_integer_overflow() {
    assert_eq!(run("x% = 32767\nx% = x% + 1\n"), "OVERFLOW IN 2\n");
    let e = fail("x% = 200 * 200\n");
    assert!(matches!(e, qbx::RunError::Compile(_)));
    assert_eq!(code(&e), 6);
}

#[test]
fn test_strings() {
    let source = r#"
a$ = "Hello"
PRINT LEFT$(a$, 2) + MID$(a$, 4); LEN(a$)
PRINT UCASE$("mix"); STR$(-3); "|"
"#;
    assert_eq!(run(source), "Helo 5 \nMIX-3|\n");
}

#[test]
fn test_block_if_chain() {
    let source = r#"
FOR i% = 1 TO 3
IF i% = 1 THEN
PRINT "one"
ELSEIF i% = 2 THEN
PRINT "two"
ELSE
PRINT "many"
END IF
NEXT i%
"#;
    assert_eq!(run(source), "one\ntwo\nmany\n");
}

#[test]
fn test_compound_next() {
    let source = r#"
FOR i% = 1 TO 2
FOR j% = 1 TO 2
PRINT i% * 10 + j%;
NEXT j%, i%
PRINT
"#;
    assert_eq!(run(source), " 11  12  21  22 \n");
}

#[test]
fn test_for_step_and_exit() {
    let source = r#"
FOR i% = 10 TO 1 STEP -3
PRINT i%;
NEXT i%
PRINT
FOR i% = 1 TO 100
IF i% = 4 THEN EXIT FOR
NEXT i%
PRINT i%
FOR i% = 5 TO 1
PRINT "never"
NEXT i%
"#;
    assert_eq!(run(source), " 10  7  4  1 \n 4 \n");
}

#[test]
fn test_loops() {
    let source = r#"
n% = 0
DO WHILE n% < 3
n% = n% + 1
LOOP
DO
n% = n% - 1
IF n% = 1 THEN EXIT DO
LOOP UNTIL n% < 0
PRINT n%
WHILE n% < 4
n% = n% + 1
WEND
PRINT n%
"#;
    assert_eq!(run(source), " 1 \n 4 \n");
}

#[test]
fn test_gosub_from_nested_blocks() {
    let source = r#"
FOR i% = 1 TO 3
IF i% = 2 THEN
GOSUB show
END IF
NEXT i%
PRINT "end"
END
show:
PRINT "two"
RETURN
"#;
    assert_eq!(run(source), "two\nend\n");
    assert_eq!(run("RETURN\n"), "RETURN WITHOUT GOSUB IN 1\n");
}

#[test]
fn test_goto_into_running_for() {
    let source = r#"
FOR i% = 1 TO 3
IF i% = 2 THEN GOTO again
PRINT "a"; i%
again:
PRINT "b"; i%
NEXT i%
"#;
    assert_eq!(run(source), "a 1 \nb 1 \nb 2 \na 3 \nb 3 \n");
}

#[test]
fn test_goto_into_idle_for() {
    let source = r#"GOTO inside
FOR i% = 1 TO 2
inside:
PRINT i%
NEXT i%
"#;
    assert_eq!(code(&fail(source)), 1);
}

#[test]
fn test_on_goto_and_line_numbers() {
    let source = r#"
10 FOR k% = 0 TO 3
20 ON k% GOTO 100, 200
30 PRINT "none"
40 NEXT k%
50 END
100 PRINT "one"
110 GOTO 40
200 PRINT "two"
210 GOTO 40
"#;
    assert_eq!(run(source), "none\none\ntwo\nnone\n");
}

#[test]
fn test_swap_and_records() {
    let source = r#"
TYPE Point
x AS INTEGER
y AS INTEGER
END TYPE
DIM p AS Point
DIM q AS Point
p.x = 3
p.y = 4
q = p
q.x = 10
SWAP p.x, q.y
PRINT p.x; p.y; q.x; q.y
"#;
    assert_eq!(run(source), " 4  4  10  3 \n");
}

#[test]
fn test_read_data_restore() {
    let source = r#"
DATA 1, 2, "three"
start:
DATA 4
READ a%, b%, c$
PRINT a% + b%; c$
READ d%
PRINT d%
RESTORE start
READ e%
PRINT e%
READ f%
"#;
    assert_eq!(run(source), " 3 three\n 4 \n 4 \nOUT OF DATA IN 12\n");
}

#[test]
fn test_input_redo() {
    let source = "INPUT \"Values\"; a%, b$\nPRINT a% * 2; b$\n";
    assert_eq!(
        run_with_input(source, vec!["x, y", "21, hello"]),
        "Values? x, y\n?Redo from start\nValues? 21, hello\n 42 hello\n"
    );
    let source = "LINE INPUT \"Name: \"; n$\nPRINT n$\nINPUT z\n";
    assert_eq!(
        run_with_input(source, vec!["Ada, Lovelace"]),
        "Name: Ada, Lovelace\nAda, Lovelace\n? INPUT PAST END OF FILE IN 3\n"
    );
}

#[test]
fn test_end_and_stop() {
    assert_eq!(run("PRINT 1\nEND\nPRINT 2\n"), " 1 \n");
    assert_eq!(run("PRINT 1\nSTOP\nPRINT 2\n"), " 1 \n");
}
