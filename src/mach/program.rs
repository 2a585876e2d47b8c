use super::function::Builtin;
use super::operation::{BinaryOp, UnaryOp};
use super::path::{StatementPath, Target};
use super::types::{DataType, TypeTable};
use super::Val;
use std::collections::HashMap;
use std::rc::Rc;

pub type RoutineId = usize;
pub type Slot = usize;
pub type LoopId = usize;
/// Index into the module's jump target table.
pub type JumpId = usize;

/// The main program's routine id.
pub const MAIN: RoutineId = 0;

/// Everything compiled from one source unit.
#[derive(Debug, Clone)]
pub struct Module {
    pub routines: Vec<Routine>,
    pub types: TypeTable,
    pub data: Vec<Val>,
    pub targets: Vec<Target>,
    /// Physical source lines, for listings and the debugger.
    pub source: Vec<String>,
}

impl Module {
    pub fn routine(&self, id: RoutineId) -> Option<&Routine> {
        self.routines.get(id)
    }

    pub fn target(&self, id: JumpId) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn find(&self, name: &str) -> Option<RoutineId> {
        let name = name.to_ascii_uppercase();
        self.routines.iter().position(|r| {
            let routine_name: &str = &r.name;
            routine_name == name || routine_name.trim_end_matches(|c| "%&!#@$".contains(c)) == name
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineKind {
    Main,
    Sub,
    Function,
    /// Implemented by the host, declared with `DECLARE ... LIB`.
    Native { lib: Rc<str> },
}

#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub name: Rc<str>,
    pub data_type: DataType,
    /// Arrays dimensioned `0 TO 10` per dimension on frame entry.
    pub auto_dim: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: Rc<str>,
    pub slot: Slot,
    pub data_type: DataType,
    pub by_val: bool,
}

#[derive(Debug, Clone)]
pub struct Routine {
    pub name: Rc<str>,
    pub kind: RoutineKind,
    pub body: Sequence,
    pub slots: Vec<SlotInfo>,
    /// `(local, root)` pairs aliasing the main program's variables.
    pub shared: Vec<(Slot, Slot)>,
    pub params: Vec<ParamInfo>,
    pub return_slot: Option<Slot>,
    pub return_type: Option<DataType>,
    pub labels: HashMap<Rc<str>, StatementPath>,
    /// Source line of the routine's closing statement.
    pub end_line: usize,
}

impl Routine {
    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, RoutineKind::Native { .. })
    }
}

pub type Sequence = Vec<Statement>;

#[derive(Debug, Clone)]
pub struct Statement {
    /// Physical source line.
    pub line: usize,
    /// Most recent BASIC line number, which `ERL` reports.
    pub erl: u32,
    pub exec: Executable,
}

#[derive(Debug, Clone)]
pub enum Executable {
    Assign(Place, Expr),
    /// Whole record assignment.
    Copy(Place, Place),
    Print(Vec<PrintOp>),
    Input {
        prompt: String,
        places: Vec<Place>,
    },
    LineInput {
        prompt: String,
        place: Place,
    },
    If {
        cond: Expr,
        then: Sequence,
        r#else: Sequence,
    },
    For {
        id: LoopId,
        counter: Place,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Sequence,
    },
    While {
        cond: Expr,
        body: Sequence,
    },
    Do {
        pre: Option<LoopTest>,
        post: Option<LoopTest>,
        body: Sequence,
    },
    Goto(JumpId),
    Gosub(JumpId),
    Return,
    OnGoto(Expr, Vec<JumpId>),
    OnGosub(Expr, Vec<JumpId>),
    Call(RoutineId, Vec<Argument>),
    Dim(Slot, Vec<(Expr, Expr)>),
    Redim {
        slot: Slot,
        bounds: Vec<(Expr, Expr)>,
        preserve: bool,
    },
    Erase(Vec<Slot>),
    OnError {
        local: bool,
        handler: Handler,
    },
    Resume(ResumeKind),
    Error(Expr),
    Exit(ExitKind),
    Read(Vec<Place>),
    Restore(usize),
    Swap(Place, Place),
    Randomize(Option<Expr>),
    Stop,
    End,
}

#[derive(Debug, Clone)]
pub struct LoopTest {
    pub until: bool,
    pub cond: Expr,
}

#[derive(Debug, Clone)]
pub enum PrintOp {
    Value(Expr),
    /// Advance to the next 14 column zone.
    Zone,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    Off,
    SkipStatement,
    /// Run the handler at a label of the installing routine, or of
    /// the main program for the global handler.
    Execute(JumpId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeKind {
    Retry,
    Next,
    To(JumpId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    For,
    Do,
    Routine,
}

/// Storage an assignment can write to.
#[derive(Debug, Clone)]
pub enum Place {
    Slot(Slot),
    Element(Slot, Vec<Expr>),
    Field(Box<Place>, usize),
}

impl Place {
    /// The frame slot this place is rooted in.
    pub fn slot(&self) -> Slot {
        match self {
            Place::Slot(s) | Place::Element(s, _) => *s,
            Place::Field(p, _) => p.slot(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Argument {
    /// Alias the caller's whole variable.
    Alias(Slot),
    /// Copy in, then write back when the call returns.
    Ref(Place),
    Value(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Val),
    Load(Place),
    Unary(UnaryOp, Box<Expr>),
    /// Operands are already converted to their promoted types.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Convert to the expression's own data type.
    Convert(Box<Expr>),
    Builtin(Builtin, Vec<Expr>),
    Call(RoutineId, Vec<Argument>),
    Bound {
        upper: bool,
        slot: Slot,
        dim: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn literal(val: Val) -> Expr {
        Expr {
            data_type: val.data_type(),
            kind: ExprKind::Literal(val),
        }
    }

    pub fn as_literal(&self) -> Option<&Val> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }
}
