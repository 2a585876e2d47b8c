//! Statements as they appear on a source line.
//!
//! Block statements are flat here: `FOR` and `NEXT` are two separate
//! statements and the compiler pairs them up.

use super::Column;
pub use super::Ident;
use std::rc::Rc;

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Call(Column, Ident, Vec<Expression>),
    Const(Column, Vec<(Ident, Expression)>),
    Data(Column, Vec<Expression>),
    Declare(Column, Procedure),
    DefType(Column, TypeName, Vec<(char, char)>),
    Dim(Column, bool, Vec<Declaration>),
    Do(Column, Option<Condition>),
    Else(Column),
    ElseIf(Column, Expression),
    End(Column),
    EndFunction(Column),
    EndIf(Column),
    EndSub(Column),
    EndType(Column),
    Erase(Column, Vec<Ident>),
    Error(Column, Expression),
    Exit(Column, ExitKind),
    Field(Column, Ident, TypeName),
    For(Column, Ident, Expression, Expression, Option<Expression>),
    Function(Column, Procedure),
    Gosub(Column, Target),
    Goto(Column, Target),
    If(Column, Expression, Vec<Statement>, Vec<Statement>),
    IfBlock(Column, Expression),
    Input(Column, Option<Rc<str>>, bool, Vec<Variable>),
    Let(Column, Variable, Expression),
    LineInput(Column, Option<Rc<str>>, Variable),
    Loop(Column, Option<Condition>),
    Next(Column, Vec<Ident>),
    OnError(Column, bool, OnError),
    OnGosub(Column, Expression, Vec<Target>),
    OnGoto(Column, Expression, Vec<Target>),
    Print(Column, Vec<PrintItem>),
    Randomize(Column, Option<Expression>),
    Read(Column, Vec<Variable>),
    Redim(Column, bool, bool, Vec<Declaration>),
    Restore(Column, Option<Target>),
    Resume(Column, Resume),
    Return(Column),
    Shared(Column, Vec<Declaration>),
    Stop(Column),
    Sub(Column, Procedure),
    Swap(Column, Variable, Variable),
    Type(Column, Ident),
    Wend(Column),
    While(Column, Expression),
}

impl Statement {
    pub fn column(&self) -> Column {
        use Statement::*;
        match self {
            Call(c, ..) | Const(c, ..) | Data(c, ..) | Declare(c, ..) | DefType(c, ..)
            | Dim(c, ..) | Do(c, ..) | Else(c) | ElseIf(c, ..) | End(c) | EndFunction(c)
            | EndIf(c) | EndSub(c) | EndType(c) | Erase(c, ..) | Error(c, ..) | Exit(c, ..)
            | Field(c, ..) | For(c, ..) | Function(c, ..) | Gosub(c, ..) | Goto(c, ..)
            | If(c, ..) | IfBlock(c, ..) | Input(c, ..) | Let(c, ..) | LineInput(c, ..)
            | Loop(c, ..) | Next(c, ..) | OnError(c, ..) | OnGosub(c, ..) | OnGoto(c, ..)
            | Print(c, ..) | Randomize(c, ..) | Read(c, ..) | Redim(c, ..) | Restore(c, ..)
            | Resume(c, ..) | Return(c) | Shared(c, ..) | Stop(c) | Sub(c, ..) | Swap(c, ..)
            | Type(c, ..) | Wend(c) | While(c, ..) => c.clone(),
        }
    }
}

/// Something that can be assigned to.
#[derive(Debug, PartialEq, Clone)]
pub enum Variable {
    Unary(Column, Ident),
    Array(Column, Ident, Vec<Expression>),
    Field(Column, Box<Variable>, Ident),
}

impl Variable {
    pub fn column(&self) -> Column {
        match self {
            Variable::Unary(c, _) | Variable::Array(c, ..) | Variable::Field(c, ..) => c.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Single(Column, f32),
    Double(Column, f64),
    Integer(Column, i16),
    Long(Column, i32),
    /// Scaled by 10,000.
    Currency(Column, i64),
    String(Column, Rc<str>),
    UnaryVar(Column, Ident),
    Function(Column, Ident, Vec<Expression>),
    Field(Column, Box<Expression>, Ident),
    Negation(Column, Box<Expression>),
    Not(Column, Box<Expression>),
    Power(Column, Box<Expression>, Box<Expression>),
    Multiply(Column, Box<Expression>, Box<Expression>),
    Divide(Column, Box<Expression>, Box<Expression>),
    DivideInt(Column, Box<Expression>, Box<Expression>),
    Modulus(Column, Box<Expression>, Box<Expression>),
    Add(Column, Box<Expression>, Box<Expression>),
    Subtract(Column, Box<Expression>, Box<Expression>),
    Equal(Column, Box<Expression>, Box<Expression>),
    NotEqual(Column, Box<Expression>, Box<Expression>),
    Less(Column, Box<Expression>, Box<Expression>),
    LessEqual(Column, Box<Expression>, Box<Expression>),
    Greater(Column, Box<Expression>, Box<Expression>),
    GreaterEqual(Column, Box<Expression>, Box<Expression>),
    And(Column, Box<Expression>, Box<Expression>),
    Or(Column, Box<Expression>, Box<Expression>),
    Xor(Column, Box<Expression>, Box<Expression>),
    Imp(Column, Box<Expression>, Box<Expression>),
    Eqv(Column, Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn column(&self) -> Column {
        use Expression::*;
        match self {
            Single(c, _) | Double(c, _) | Integer(c, _) | Long(c, _) | Currency(c, _)
            | String(c, _) | UnaryVar(c, _) | Function(c, ..) | Field(c, ..)
            | Negation(c, _) | Not(c, _) | Power(c, ..) | Multiply(c, ..) | Divide(c, ..)
            | DivideInt(c, ..) | Modulus(c, ..) | Add(c, ..) | Subtract(c, ..) | Equal(c, ..)
            | NotEqual(c, ..) | Less(c, ..) | LessEqual(c, ..) | Greater(c, ..)
            | GreaterEqual(c, ..) | And(c, ..) | Or(c, ..) | Xor(c, ..) | Imp(c, ..)
            | Eqv(c, ..) => c.clone(),
        }
    }

    /// The assignable form of this expression, if it has one.
    pub fn to_variable(&self) -> Option<Variable> {
        match self {
            Expression::UnaryVar(c, ident) => Some(Variable::Unary(c.clone(), ident.clone())),
            Expression::Function(c, ident, args) => {
                Some(Variable::Array(c.clone(), ident.clone(), args.clone()))
            }
            Expression::Field(c, base, field) => Some(Variable::Field(
                c.clone(),
                Box::new(base.to_variable()?),
                field.clone(),
            )),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum TypeName {
    Integer,
    Long,
    Single,
    Double,
    Currency,
    String,
    FixedString(usize),
    Named(Ident),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Declaration {
    pub col: Column,
    pub ident: Ident,
    /// `None` for a scalar, `Some(vec![])` for `name()`.
    pub bounds: Option<Vec<(Option<Expression>, Expression)>>,
    pub as_type: Option<TypeName>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Param {
    pub col: Column,
    pub ident: Ident,
    pub array: bool,
    pub as_type: Option<TypeName>,
    pub by_val: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Procedure {
    pub name: Ident,
    pub function: bool,
    pub params: Vec<Param>,
    pub as_type: Option<TypeName>,
    pub lib: Option<Rc<str>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Target {
    Label(Rc<str>),
    Line(u32),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Target::Label(s) => write!(f, "{}", s),
            Target::Line(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum PrintItem {
    Expression(Expression),
    Comma,
    Semicolon,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Condition {
    While(Expression),
    Until(Expression),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ExitKind {
    For,
    Do,
    Sub,
    Function,
}

#[derive(Debug, PartialEq, Clone)]
pub enum OnError {
    Goto(Target),
    Disable,
    ResumeNext,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Resume {
    Retry,
    Next,
    Target(Target),
}
