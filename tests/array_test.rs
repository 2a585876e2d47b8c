mod common;
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn test_auto_dimension() {
    assert_eq!(run("c(10) = 1.5\nPRINT c(10); c(0)\n"), " 1.5  0 \n");
    assert_eq!(run("c(11) = 1\n"), "SUBSCRIPT OUT OF RANGE IN 1\n");
}

#[test]
fn test_dim_bounds() {
    let source = r#"
DIM grid(1 TO 3, -2 TO 2) AS INTEGER
grid(3, -2) = 7
PRINT LBOUND(grid, 2); UBOUND(grid, 2); UBOUND(grid); grid(3, -2)
grid(0, 0) = 1
"#;
    assert_eq!(run(source), "-2  2  3  7 \nSUBSCRIPT OUT OF RANGE IN 5\n");
}

#[test]
fn test_redim_preserve() {
    let source = r#"
REDIM a%(1 TO 3)
FOR i% = 1 TO 3
a%(i%) = i% * 10
NEXT i%
REDIM PRESERVE a%(1 TO 5)
PRINT LBOUND(a%); UBOUND(a%); a%(3); a%(5)
REDIM a%(2)
PRINT a%(1); UBOUND(a%)
"#;
    assert_eq!(run(source), " 1  5  30  0 \n 0  2 \n");
}

#[test]
fn test_erase() {
    let source = r#"
REDIM b$(2)
b$(1) = "x"
ERASE b$
PRINT UBOUND(b$)
"#;
    assert_eq!(code(&fail(source)), 9);
}

#[test]
fn test_record_arrays() {
    let source = r#"
TYPE Item
label AS STRING * 3
qty AS INTEGER
END TYPE
DIM stock(1 TO 2) AS Item
stock(1).label = "pencil"
stock(1).qty = 12
stock(2) = stock(1)
stock(2).qty = stock(2).qty + 1
PRINT stock(1).label; stock(1).qty; stock(2).qty
"#;
    assert_eq!(run(source), "pen 12  13 \n");
}

#[test]
fn test_nested_records() {
    let source = r#"
TYPE Inner
n AS LONG
END TYPE
TYPE Outer
tag AS STRING * 2
core AS Inner
END TYPE
DIM o AS Outer
o.core.n = 70000
o.tag = "ok"
PRINT o.tag; o.core.n
"#;
    assert_eq!(run(source), "ok 70000 \n");
}
