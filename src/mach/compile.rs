use super::function::{Builtin, Context, Function};
use super::operation::{BinaryOp, Operation, UnaryOp};
use super::path::{StatementPath, Target};
use super::program::{
    Argument, Executable, ExitKind, Expr, ExprKind, Handler, JumpId, LoopId, LoopTest, Module,
    ParamInfo, Place, PrintOp, ResumeKind, Routine, RoutineId, RoutineKind, Sequence, Slot,
    Statement, MAIN,
};
use super::currency::Currency;
use super::scope::{DefTypes, Scope};
use super::types::{DataType, TypeTable};
use super::Val;
use crate::error;
use crate::lang::ast::{self, Expression, TypeName};
use crate::lang::{Column, Error, ErrorCode, Ident, Line};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;

type Result<T> = std::result::Result<T, Error>;

/// Compile a whole program.
pub fn compile(source: &str) -> Result<Module> {
    Compiler::default().compile(source)
}

enum Entry {
    Label {
        line: usize,
        name: Rc<str>,
        number: Option<u32>,
    },
    Statement {
        line: usize,
        statement: ast::Statement,
    },
}

struct Proc {
    id: RoutineId,
    line: usize,
    col: Column,
    procedure: ast::Procedure,
    deftypes: DefTypes,
    entries: Vec<Entry>,
    end_line: usize,
}

struct TypeBlock {
    line: usize,
    col: Column,
    name: Ident,
    fields: Vec<(usize, Column, Ident, TypeName)>,
}

struct Native {
    id: RoutineId,
    line: usize,
    procedure: ast::Procedure,
    deftypes: DefTypes,
}

#[derive(Debug, Clone)]
struct ParamSig {
    data_type: DataType,
    by_val: bool,
}

#[derive(Debug, Clone)]
struct Signature {
    name: Rc<str>,
    kind: RoutineKind,
    params: Vec<ParamSig>,
    return_type: Option<DataType>,
}

struct Fixup {
    id: JumpId,
    routine: RoutineId,
    name: Rc<str>,
    line: usize,
    col: Column,
}

enum BlockKind {
    If {
        cond: Expr,
        chained: bool,
        single: bool,
    },
    For {
        id: LoopId,
        slot: Slot,
        counter: Place,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    While {
        cond: Expr,
    },
    Do {
        pre: Option<LoopTest>,
    },
}

/// An open block statement collecting its bodies.
struct Block {
    kind: BlockKind,
    /// Where the finished statement lands in the enclosing body.
    index: usize,
    body: usize,
    bodies: Vec<Sequence>,
    line: usize,
    erl: u32,
    col: Column,
}

impl Block {
    fn unterminated(&self) -> Error {
        let code = match self.kind {
            BlockKind::If { .. } => ErrorCode::BlockIfWithoutEndIf,
            BlockKind::For { .. } => ErrorCode::ForWithoutNext,
            BlockKind::While { .. } => ErrorCode::WhileWithoutWend,
            BlockKind::Do { .. } => ErrorCode::DoWithoutLoop,
        };
        Error::new(code)
            .in_line(Some(self.line))
            .in_column(&self.col)
    }
}

/// Pure builtins never call back into the context.
struct Folding;

impl Context for Folding {
    fn rnd(&mut self, _arg: Option<f64>) -> f32 {
        0.0
    }
    fn timer(&self) -> f64 {
        0.0
    }
    fn err(&self) -> u16 {
        0
    }
    fn erl(&self) -> u32 {
        0
    }
}

#[derive(Default)]
struct Compiler {
    types: TypeTable,
    signatures: Vec<Signature>,
    names: HashMap<String, RoutineId>,
    routines: Vec<Option<Routine>>,
    labels: Vec<HashMap<Rc<str>, StatementPath>>,
    targets: Vec<Target>,
    fixups: Vec<Fixup>,
    data: Vec<Val>,
    data_labels: HashMap<Rc<str>, usize>,
    loops: LoopId,
    main: Scope,
    // The routine being compiled.
    routine: RoutineId,
    kind: Option<RoutineKind>,
    local: Option<Scope>,
    function: Option<(String, Slot)>,
    root: Sequence,
    blocks: Vec<Block>,
    line: usize,
    erl: u32,
}

fn label_name(target: &ast::Target) -> Rc<str> {
    match target {
        ast::Target::Label(s) => s.clone(),
        ast::Target::Line(n) => n.to_string().into(),
    }
}

fn load(place: Place, data_type: DataType) -> Expr {
    Expr {
        kind: ExprKind::Load(place),
        data_type,
    }
}

/// Convert a scalar expression, folding literals.
fn convert(expr: Expr, to: &DataType) -> Result<Expr> {
    let to = to.value_type();
    let from = expr.data_type.value_type();
    if !to.is_scalar() || !from.is_scalar() || to.is_string() != from.is_string() {
        return Err(error!(TypeMismatch));
    }
    if from == to {
        return Ok(expr);
    }
    if let Some(val) = expr.as_literal() {
        return Ok(Expr::literal(val.clone().convert(&to)?));
    }
    Ok(Expr {
        kind: ExprKind::Convert(Box::new(expr)),
        data_type: to,
    })
}

fn numeric(expr: Expr) -> Result<Expr> {
    if expr.data_type.is_numeric() {
        Ok(expr)
    } else {
        Err(error!(TypeMismatch))
    }
}

fn data_item(expr: &Expression) -> Result<Val> {
    match expr {
        Expression::Integer(_, n) => Ok(Val::Integer(*n)),
        Expression::Long(_, n) => Ok(Val::Long(*n)),
        Expression::Single(_, n) => Ok(Val::Single(*n)),
        Expression::Double(_, n) => Ok(Val::Double(*n)),
        Expression::Currency(_, n) => Ok(Val::Currency(Currency::from_raw(*n))),
        Expression::String(_, s) => Ok(Val::String(s.to_string())),
        Expression::UnaryVar(_, ident) => Ok(Val::String(ident.name().to_string())),
        Expression::Negation(_, e) => Operation::unary(UnaryOp::Negate, data_item(e)?),
        e => Err(error!(SyntaxError, ..&e.column())),
    }
}

impl Compiler {
    fn compile(mut self, source: &str) -> Result<Module> {
        let entries = self.entries(source)?;
        let (main, procs, types, natives) = self.split(entries)?;
        debug!(
            procedures = procs.len(),
            natives = natives.len(),
            types = types.len(),
            "split program"
        );
        self.define_types(types)?;
        self.declare_routines(&procs, &natives)?;
        self.routines = vec![None; self.signatures.len()];
        self.labels = vec![HashMap::new(); self.signatures.len()];
        self.share(&main)?;
        for proc in procs {
            self.compile_proc(proc)?;
        }
        for native in &natives {
            let sig = &self.signatures[native.id];
            let params = sig
                .params
                .iter()
                .zip(&native.procedure.params)
                .enumerate()
                .map(|(slot, (param, ast_param))| ParamInfo {
                    name: ast_param.ident.name().clone(),
                    slot,
                    data_type: param.data_type.clone(),
                    by_val: param.by_val,
                })
                .collect();
            self.routines[native.id] = Some(Routine {
                name: sig.name.clone(),
                kind: sig.kind.clone(),
                body: vec![],
                slots: vec![],
                shared: vec![],
                params,
                return_slot: None,
                return_type: sig.return_type.clone(),
                labels: HashMap::new(),
                end_line: native.line,
            });
        }
        let end_line = source.lines().count();
        self.begin(MAIN, RoutineKind::Main, None, None);
        self.unit(main)?;
        let routine = self.end("", end_line, vec![], None);
        self.routines[MAIN] = Some(routine);
        self.resolve_jumps()?;
        let routines = self
            .routines
            .into_iter()
            .collect::<Option<Vec<Routine>>>()
            .ok_or_else(|| error!(InternalError; "ROUTINE NOT COMPILED"))?;
        debug!(routines = routines.len(), data = self.data.len(), "compiled");
        Ok(Module {
            routines,
            types: self.types,
            data: self.data,
            targets: self.targets,
            source: source.lines().map(String::from).collect(),
        })
    }

    /// Parse every line, pulling out DATA and checking labels are unique.
    fn entries(&mut self, source: &str) -> Result<Vec<Entry>> {
        let mut entries = vec![];
        let mut seen = HashSet::new();
        for (index, text) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = Line::new(line_no, text);
            let name: Option<Rc<str>> = match (line.number(), line.label()) {
                (Some(n), _) => Some(n.to_string().into()),
                (None, Some(label)) => Some(label.clone()),
                _ => None,
            };
            if let Some(name) = name {
                if !seen.insert(name.clone()) {
                    return Err(error!(DuplicateLabel, Some(line_no)));
                }
                self.data_labels.insert(name.clone(), self.data.len());
                entries.push(Entry::Label {
                    line: line_no,
                    name,
                    number: line.number(),
                });
            }
            if line.is_empty() {
                continue;
            }
            for statement in line.ast()? {
                match statement {
                    ast::Statement::Data(_, items) => {
                        for item in &items {
                            self.data
                                .push(data_item(item).map_err(|e| e.in_line(Some(line_no)))?);
                        }
                    }
                    statement => entries.push(Entry::Statement {
                        line: line_no,
                        statement,
                    }),
                }
            }
        }
        Ok(entries)
    }

    #[allow(clippy::type_complexity)]
    fn split(
        &mut self,
        entries: Vec<Entry>,
    ) -> Result<(Vec<Entry>, Vec<Proc>, Vec<TypeBlock>, Vec<Native>)> {
        let mut main = vec![];
        let mut procs = vec![];
        let mut types = vec![];
        let mut natives = vec![];
        let mut current: Option<Proc> = None;
        let mut in_type: Option<TypeBlock> = None;
        let mut deftypes = DefTypes::default();
        let mut next_id = MAIN + 1;
        for entry in entries {
            if let Some(mut block) = in_type.take() {
                match entry {
                    Entry::Label { .. } => in_type = Some(block),
                    Entry::Statement {
                        line,
                        statement: ast::Statement::Field(col, ident, type_name),
                    } => {
                        block.fields.push((line, col, ident, type_name));
                        in_type = Some(block);
                    }
                    Entry::Statement {
                        statement: ast::Statement::EndType(_),
                        ..
                    } => types.push(block),
                    Entry::Statement { line, statement } => {
                        return Err(error!(
                            StatementIllegalInTypeBlock,
                            Some(line),
                            ..&statement.column()
                        ))
                    }
                }
                continue;
            }
            let (line, statement) = match entry {
                Entry::Statement { line, statement } => (line, statement),
                label => {
                    match &mut current {
                        Some(proc) => proc.entries.push(label),
                        None => main.push(label),
                    }
                    continue;
                }
            };
            let end_function = matches!(statement, ast::Statement::EndFunction(_));
            match statement {
                ast::Statement::Type(col, name) => {
                    if current.is_some() {
                        return Err(error!(IllegalInSubFunction, Some(line), ..&col));
                    }
                    in_type = Some(TypeBlock {
                        line,
                        col,
                        name,
                        fields: vec![],
                    });
                }
                ast::Statement::EndType(col) => {
                    return Err(error!(EndTypeWithoutType, Some(line), ..&col));
                }
                ast::Statement::Sub(col, procedure) | ast::Statement::Function(col, procedure) => {
                    if current.is_some() {
                        return Err(error!(IllegalInSubFunction, Some(line), ..&col));
                    }
                    current = Some(Proc {
                        id: next_id,
                        line,
                        col,
                        procedure,
                        deftypes: deftypes.clone(),
                        entries: vec![],
                        end_line: line,
                    });
                    next_id += 1;
                }
                ast::Statement::EndSub(col) | ast::Statement::EndFunction(col) => {
                    match current.take() {
                        None => return Err(error!(IllegalOutsideSubFunction, Some(line), ..&col)),
                        Some(proc) if proc.procedure.function != end_function => {
                            let code = if proc.procedure.function {
                                ErrorCode::FunctionWithoutEndFunction
                            } else {
                                ErrorCode::SubWithoutEndSub
                            };
                            return Err(Error::new(code)
                                .in_line(Some(proc.line))
                                .in_column(&proc.col));
                        }
                        Some(mut proc) => {
                            proc.end_line = line;
                            procs.push(proc);
                        }
                    }
                }
                ast::Statement::Declare(col, procedure) => {
                    if current.is_some() {
                        return Err(error!(IllegalInSubFunction, Some(line), ..&col));
                    }
                    if procedure.lib.is_some() {
                        natives.push(Native {
                            id: next_id,
                            line,
                            procedure,
                            deftypes: deftypes.clone(),
                        });
                        next_id += 1;
                    }
                }
                ast::Statement::Field(col, ..) => {
                    return Err(error!(SyntaxError, Some(line), ..&col));
                }
                statement => {
                    if let (None, ast::Statement::DefType(_, type_name, ranges)) =
                        (&current, &statement)
                    {
                        let data_type = self
                            .data_type(type_name)
                            .map_err(|e| e.in_line(Some(line)))?;
                        for (from, to) in ranges {
                            deftypes.set(*from, *to, data_type.clone());
                        }
                    }
                    let entry = Entry::Statement { line, statement };
                    match &mut current {
                        Some(proc) => proc.entries.push(entry),
                        None => main.push(entry),
                    }
                }
            }
        }
        if let Some(block) = in_type {
            return Err(error!(TypeWithoutEndType, Some(block.line), ..&block.col));
        }
        if let Some(proc) = current {
            let code = if proc.procedure.function {
                ErrorCode::FunctionWithoutEndFunction
            } else {
                ErrorCode::SubWithoutEndSub
            };
            return Err(Error::new(code)
                .in_line(Some(proc.line))
                .in_column(&proc.col));
        }
        Ok((main, procs, types, natives))
    }

    fn data_type(&self, type_name: &TypeName) -> Result<DataType> {
        Ok(match type_name {
            TypeName::Integer => DataType::Integer,
            TypeName::Long => DataType::Long,
            TypeName::Single => DataType::Single,
            TypeName::Double => DataType::Double,
            TypeName::Currency => DataType::Currency,
            TypeName::String => DataType::String,
            TypeName::FixedString(0) => return Err(error!(IllegalNumber)),
            TypeName::FixedString(n) => DataType::FixedString(*n),
            TypeName::Named(ident) => match self.types.lookup(ident.name()) {
                Some(id) => DataType::Record(id),
                None => return Err(error!(TypeMismatch)),
            },
        })
    }

    fn define_types(&mut self, blocks: Vec<TypeBlock>) -> Result<()> {
        let mut ids = vec![];
        for block in &blocks {
            let id = self
                .types
                .declare(block.name.name())
                .map_err(|e| e.in_line(Some(block.line)).in_column(&block.col))?;
            ids.push(id);
        }
        for (block, id) in blocks.into_iter().zip(ids) {
            let mut fields = vec![];
            for (line, col, ident, type_name) in block.fields {
                let data_type = self
                    .data_type(&type_name)
                    .map_err(|e| e.in_line(Some(line)).in_column(&col))?;
                fields.push((ident.name().clone(), data_type));
            }
            self.types
                .set_fields(id, fields)
                .map_err(|e| e.in_line(Some(block.line)).in_column(&block.col))?;
        }
        self.types.resolve()
    }

    fn signature(
        &self,
        procedure: &ast::Procedure,
        deftypes: &DefTypes,
        kind: RoutineKind,
    ) -> Result<Signature> {
        let mut params = vec![];
        for param in &procedure.params {
            let element = match &param.as_type {
                Some(t) => self.data_type(t).map_err(|e| e.in_column(&param.col))?,
                None => deftypes.of(&param.ident),
            };
            let data_type = if param.array {
                DataType::Array(Box::new(element), 0)
            } else {
                element
            };
            params.push(ParamSig {
                data_type,
                by_val: param.by_val,
            });
        }
        let return_type = match (procedure.function, &procedure.as_type) {
            (false, _) => None,
            (true, Some(t)) => Some(self.data_type(t)?),
            (true, None) => Some(deftypes.of(&procedure.name)),
        };
        Ok(Signature {
            name: procedure.name.name().clone(),
            kind,
            params,
            return_type,
        })
    }

    fn declare_routines(&mut self, procs: &[Proc], natives: &[Native]) -> Result<()> {
        let count = 1 + procs.len() + natives.len();
        let mut signatures: Vec<Option<Signature>> = vec![None; count];
        signatures[MAIN] = Some(Signature {
            name: "".into(),
            kind: RoutineKind::Main,
            params: vec![],
            return_type: None,
        });
        let mut names = HashMap::new();
        for proc in procs {
            let kind = if proc.procedure.function {
                RoutineKind::Function
            } else {
                RoutineKind::Sub
            };
            let sig = self
                .signature(&proc.procedure, &proc.deftypes, kind)
                .map_err(|e| e.in_line(Some(proc.line)).in_column(&proc.col))?;
            if names
                .insert(proc.procedure.name.base().to_string(), proc.id)
                .is_some()
            {
                return Err(error!(DuplicateDefinition, Some(proc.line), ..&proc.col));
            }
            signatures[proc.id] = Some(sig);
        }
        for native in natives {
            let lib = native.procedure.lib.clone().unwrap_or_else(|| "".into());
            let sig = self
                .signature(&native.procedure, &native.deftypes, RoutineKind::Native { lib })
                .map_err(|e| e.in_line(Some(native.line)))?;
            if names
                .insert(native.procedure.name.base().to_string(), native.id)
                .is_some()
            {
                return Err(error!(DuplicateDefinition, Some(native.line)));
            }
            signatures[native.id] = Some(sig);
        }
        self.signatures = signatures
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| error!(InternalError; "MISSING SIGNATURE"))?;
        self.names = names;
        Ok(())
    }

    /// Declare the main program's `DIM SHARED` variables up front so every
    /// routine can see them.
    fn share(&mut self, main: &[Entry]) -> Result<()> {
        for entry in main {
            let (line, statement) = match entry {
                Entry::Statement { line, statement } => (*line, statement),
                _ => continue,
            };
            match statement {
                ast::Statement::DefType(_, type_name, ranges) => {
                    let data_type = self.data_type(type_name)?;
                    for (from, to) in ranges {
                        self.main.deftypes.set(*from, *to, data_type.clone());
                    }
                }
                ast::Statement::Dim(_, true, decls) | ast::Statement::Redim(_, _, true, decls) => {
                    for decl in decls {
                        let as_type = match &decl.as_type {
                            Some(t) => Some(self.data_type(t)?),
                            None => None,
                        };
                        let rank = decl.bounds.as_ref().map(|b| b.len());
                        if self.main.find(&decl.ident, rank.is_some())?.is_some() {
                            continue;
                        }
                        let slot = self
                            .main
                            .declare(&decl.ident, as_type, rank, false)
                            .map_err(|e| e.in_line(Some(line)).in_column(&decl.col))?;
                        self.main.make_global(slot);
                    }
                }
                _ => {}
            }
        }
        self.main.deftypes = DefTypes::default();
        Ok(())
    }

    fn begin(
        &mut self,
        routine: RoutineId,
        kind: RoutineKind,
        local: Option<Scope>,
        function: Option<(String, Slot)>,
    ) {
        self.routine = routine;
        self.kind = Some(kind);
        self.local = local;
        self.function = function;
        self.root = vec![];
        self.blocks = vec![];
        self.line = 0;
        self.erl = 0;
    }

    fn end(
        &mut self,
        name: &str,
        end_line: usize,
        params: Vec<ParamInfo>,
        return_slot: Option<Slot>,
    ) -> Routine {
        let sig = &self.signatures[self.routine];
        let scope = match self.local.take() {
            Some(scope) => scope,
            None => std::mem::take(&mut self.main),
        };
        let (slots, shared) = scope.into_parts();
        debug!(routine = name, slots = slots.len(), "compiled routine");
        Routine {
            name: if name.is_empty() {
                "<main>".into()
            } else {
                sig.name.clone()
            },
            kind: sig.kind.clone(),
            body: std::mem::take(&mut self.root),
            slots,
            shared,
            params,
            return_slot,
            return_type: sig.return_type.clone(),
            labels: std::mem::take(&mut self.labels[self.routine]),
            end_line,
        }
    }

    fn compile_proc(&mut self, proc: Proc) -> Result<()> {
        let sig = self.signatures[proc.id].clone();
        let mut scope = Scope::new(proc.deftypes.clone());
        let mut params = vec![];
        for (param, ast_param) in sig.params.iter().zip(&proc.procedure.params) {
            let (as_type, rank) = match (&param.data_type, &ast_param.as_type) {
                (DataType::Array(e, _), Some(_)) => (Some((**e).clone()), Some(0)),
                (DataType::Array(..), None) => (None, Some(0)),
                (t, Some(_)) => (Some(t.clone()), None),
                (_, None) => (None, None),
            };
            let slot = scope
                .declare(&ast_param.ident, as_type, rank, false)
                .map_err(|e| e.in_line(Some(proc.line)).in_column(&ast_param.col))?;
            params.push(ParamInfo {
                name: ast_param.ident.name().clone(),
                slot,
                data_type: param.data_type.clone(),
                by_val: param.by_val,
            });
        }
        let return_slot = sig
            .return_type
            .as_ref()
            .map(|t| scope.add_hidden(&sig.name, t.clone()));
        let function = return_slot.map(|s| (proc.procedure.name.base().to_string(), s));
        self.begin(proc.id, sig.kind.clone(), Some(scope), function);
        self.unit(proc.entries)?;
        let routine = self.end(&sig.name, proc.end_line, params, return_slot);
        self.routines[proc.id] = Some(routine);
        Ok(())
    }

    fn unit(&mut self, entries: Vec<Entry>) -> Result<()> {
        for entry in entries {
            match entry {
                Entry::Label { line, name, number } => {
                    self.line = line;
                    if let Some(n) = number {
                        self.erl = n;
                    }
                    let here = self.here();
                    self.labels[self.routine].insert(name, here);
                }
                Entry::Statement { line, statement } => {
                    self.line = line;
                    let col = statement.column();
                    self.statement(statement)
                        .map_err(|e| e.in_line(Some(line)).in_column(&col))?;
                }
            }
        }
        match self.blocks.last() {
            Some(block) => Err(block.unterminated()),
            None => Ok(()),
        }
    }

    fn resolve_jumps(&mut self) -> Result<()> {
        for fixup in &self.fixups {
            let routine = self.routines[fixup.routine]
                .as_ref()
                .ok_or_else(|| error!(InternalError))?;
            match routine.labels.get(&fixup.name) {
                Some(path) => self.targets[fixup.id] = Target::at(path.clone()),
                None => {
                    return Err(error!(LabelNotDefined, Some(fixup.line), ..&fixup.col));
                }
            }
        }
        Ok(())
    }

    // Block structure

    fn body(&self) -> &Sequence {
        match self.blocks.last() {
            Some(block) => &block.bodies[block.body],
            None => &self.root,
        }
    }

    fn body_mut(&mut self) -> &mut Sequence {
        match self.blocks.last_mut() {
            Some(block) => {
                let i = block.body;
                &mut block.bodies[i]
            }
            None => &mut self.root,
        }
    }

    /// The path the next emitted statement will have.
    fn here(&self) -> StatementPath {
        let mut segments = vec![];
        for block in &self.blocks {
            segments.push(block.index);
            segments.push(block.body);
        }
        segments.push(self.body().len());
        StatementPath::new(segments)
    }

    fn emit(&mut self, exec: Executable) {
        let statement = Statement {
            line: self.line,
            erl: self.erl,
            exec,
        };
        self.body_mut().push(statement);
    }

    fn open(&mut self, kind: BlockKind, col: &Column) {
        let bodies = match kind {
            BlockKind::If { .. } => 2,
            _ => 1,
        };
        let index = self.body().len();
        self.blocks.push(Block {
            kind,
            index,
            body: 0,
            bodies: vec![vec![]; bodies],
            line: self.line,
            erl: self.erl,
            col: col.clone(),
        });
    }

    fn close(&mut self, post: Option<LoopTest>) -> Result<()> {
        let block = self.blocks.pop().ok_or_else(|| error!(InternalError))?;
        let mut bodies = block.bodies.into_iter();
        let mut next = || bodies.next().unwrap_or_default();
        let exec = match block.kind {
            BlockKind::If { cond, .. } => Executable::If {
                cond,
                then: next(),
                r#else: next(),
            },
            BlockKind::For {
                id,
                counter,
                from,
                to,
                step,
                ..
            } => Executable::For {
                id,
                counter,
                from,
                to,
                step,
                body: next(),
            },
            BlockKind::While { cond } => Executable::While { cond, body: next() },
            BlockKind::Do { pre } => Executable::Do {
                pre,
                post,
                body: next(),
            },
        };
        let statement = Statement {
            line: block.line,
            erl: block.erl,
            exec,
        };
        self.body_mut().push(statement);
        Ok(())
    }

    /// Check that a closing statement matches the innermost open block.
    fn expect(&self, matches: fn(&BlockKind) -> bool, without: ErrorCode) -> Result<()> {
        match self.blocks.last() {
            Some(block) if matches(&block.kind) => Ok(()),
            Some(block) if self.blocks.iter().any(|b| matches(&b.kind)) => {
                Err(block.unterminated())
            }
            _ => Err(Error::new(without)),
        }
    }

    fn is_block_if(kind: &BlockKind) -> bool {
        matches!(kind, BlockKind::If { single: false, .. })
    }

    // Names

    fn scope(&self) -> &Scope {
        self.local.as_ref().unwrap_or(&self.main)
    }

    fn scope_mut(&mut self) -> &mut Scope {
        match &mut self.local {
            Some(scope) => scope,
            None => &mut self.main,
        }
    }

    fn slot_type(&self, slot: Slot) -> DataType {
        self.scope().slot_type(slot)
    }

    /// An existing variable, aliasing a `DIM SHARED` one from a routine.
    fn lookup(&mut self, ident: &Ident, array: bool) -> Result<Option<Slot>> {
        match &mut self.local {
            None => self.main.find(ident, array),
            Some(local) => {
                if let Some(slot) = local.find(ident, array)? {
                    return Ok(Some(slot));
                }
                match self.main.find(ident, array)? {
                    Some(root) if self.main.is_global(root) => {
                        let data_type = self.main.slot_type(root);
                        Ok(Some(local.alias(ident, data_type, root)?))
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    fn variable(&mut self, ident: &Ident, rank: Option<usize>) -> Result<Slot> {
        match self.lookup(ident, rank.is_some())? {
            Some(slot) => Ok(slot),
            None => self.scope_mut().resolve(ident, rank),
        }
    }

    fn get_const(&self, ident: &Ident) -> Option<Val> {
        self.scope()
            .get_const(ident)
            .or_else(|| self.main.get_const(ident))
            .cloned()
    }

    fn routine_named(&self, ident: &Ident) -> Option<RoutineId> {
        self.names.get(ident.base()).copied()
    }

    fn is_return_slot(&self, ident: &Ident) -> Option<Slot> {
        match &self.function {
            Some((name, slot)) if name == ident.base() => Some(*slot),
            _ => None,
        }
    }

    /// A dotted name whose first segment is a record variable.
    fn record_head(&mut self, ident: &Ident) -> Result<Option<Slot>> {
        let base = ident.base();
        let head = match base.find('.') {
            Some(i) => Ident::from_name(&base[..i]),
            None => return Ok(None),
        };
        match self.lookup(&head, false)? {
            Some(slot) if matches!(self.slot_type(slot), DataType::Record(_)) => Ok(Some(slot)),
            _ => Ok(None),
        }
    }

    fn field(
        &self,
        place: Place,
        data_type: &DataType,
        name: &str,
    ) -> Result<Option<(Place, DataType)>> {
        let id = match data_type {
            DataType::Record(id) => *id,
            _ => return Err(error!(TypeMismatch)),
        };
        let record = self.types.record(id).ok_or_else(|| error!(InternalError))?;
        let ident = Ident::from_name(name);
        let (index, field) = match record.field(ident.base()) {
            Some(found) => found,
            None => return Ok(None),
        };
        if let Some(c) = ident.suffix() {
            if DataType::from_suffix(c) != Some(field.data_type.value_type()) {
                return Err(error!(TypeMismatch));
            }
        }
        Ok(Some((Place::Field(Box::new(place), index), field.data_type.clone())))
    }

    fn unary_place(&mut self, ident: &Ident) -> Result<(Place, DataType)> {
        if let Some(slot) = self.is_return_slot(ident) {
            return Ok((Place::Slot(slot), self.slot_type(slot)));
        }
        if self.get_const(ident).is_some() {
            return Err(error!(DuplicateDefinition));
        }
        if self.lookup(ident, false)?.is_none() {
            if let Some(slot) = self.record_head(ident)? {
                let name = ident.name().clone();
                let mut place = Place::Slot(slot);
                let mut data_type = self.slot_type(slot);
                for part in name.split('.').skip(1) {
                    match self.field(place, &data_type, part)? {
                        Some((p, t)) => {
                            place = p;
                            data_type = t;
                        }
                        None => return Err(error!(IdentifierCannotIncludePeriod)),
                    }
                }
                return Ok((place, data_type));
            }
        }
        let slot = self.variable(ident, None)?;
        Ok((Place::Slot(slot), self.slot_type(slot)))
    }

    fn element(&mut self, ident: &Ident, args: &[Expression]) -> Result<(Place, DataType)> {
        let slot = self.variable(ident, Some(args.len()))?;
        let (element, rank) = match self.slot_type(slot) {
            DataType::Array(e, rank) => (*e, rank),
            _ => return Err(error!(TypeMismatch)),
        };
        if rank != 0 && rank != args.len() {
            return Err(error!(SubscriptOutOfRange));
        }
        let mut indices = vec![];
        for arg in args {
            let index = self.expr(arg)?;
            indices.push(numeric(index).map_err(|e| e.in_column(&arg.column()))?);
        }
        Ok((Place::Element(slot, indices), element))
    }

    fn place(&mut self, var: &ast::Variable) -> Result<(Place, DataType)> {
        let col = var.column();
        let result = match var {
            ast::Variable::Unary(_, ident) => self.unary_place(ident),
            ast::Variable::Array(_, ident, args) => self.element(ident, args),
            ast::Variable::Field(_, base, name) => {
                let (place, data_type) = self.place(base)?;
                match self.field(place, &data_type, name.name())? {
                    Some(found) => Ok(found),
                    None => Err(error!(TypeMismatch)),
                }
            }
        };
        result.map_err(|e| e.in_column(&col))
    }

    fn scalar_place(&mut self, var: &ast::Variable) -> Result<(Place, DataType)> {
        let (place, data_type) = self.place(var)?;
        if !data_type.is_scalar() {
            return Err(error!(TypeMismatch, ..&var.column()));
        }
        Ok((place, data_type))
    }

    // Expressions

    fn expr(&mut self, expr: &Expression) -> Result<Expr> {
        let col = expr.column();
        self.expression(expr).map_err(|e| e.in_column(&col))
    }

    fn expression(&mut self, expr: &Expression) -> Result<Expr> {
        use Expression as E;
        match expr {
            E::Single(_, n) => Ok(Expr::literal(Val::Single(*n))),
            E::Double(_, n) => Ok(Expr::literal(Val::Double(*n))),
            E::Integer(_, n) => Ok(Expr::literal(Val::Integer(*n))),
            E::Long(_, n) => Ok(Expr::literal(Val::Long(*n))),
            E::Currency(_, n) => Ok(Expr::literal(Val::Currency(Currency::from_raw(*n)))),
            E::String(_, s) => Ok(Expr::literal(Val::String(s.to_string()))),
            E::UnaryVar(_, ident) => self.unary_var(ident),
            E::Function(_, ident, args) => self.function(ident, args),
            E::Field(col, ..) => {
                let var = expr.to_variable().ok_or_else(|| error!(SyntaxError, ..col))?;
                let (place, data_type) = self.place(&var)?;
                Ok(load(place, data_type))
            }
            E::Negation(_, a) => self.unary(UnaryOp::Negate, a),
            E::Not(_, a) => self.unary(UnaryOp::Not, a),
            E::Power(_, l, r) => self.binary(BinaryOp::Power, l, r),
            E::Multiply(_, l, r) => self.binary(BinaryOp::Multiply, l, r),
            E::Divide(_, l, r) => self.binary(BinaryOp::Divide, l, r),
            E::DivideInt(_, l, r) => self.binary(BinaryOp::DivideInt, l, r),
            E::Modulus(_, l, r) => self.binary(BinaryOp::Modulus, l, r),
            E::Add(_, l, r) => self.binary(BinaryOp::Add, l, r),
            E::Subtract(_, l, r) => self.binary(BinaryOp::Subtract, l, r),
            E::Equal(_, l, r) => self.binary(BinaryOp::Equal, l, r),
            E::NotEqual(_, l, r) => self.binary(BinaryOp::NotEqual, l, r),
            E::Less(_, l, r) => self.binary(BinaryOp::Less, l, r),
            E::LessEqual(_, l, r) => self.binary(BinaryOp::LessEqual, l, r),
            E::Greater(_, l, r) => self.binary(BinaryOp::Greater, l, r),
            E::GreaterEqual(_, l, r) => self.binary(BinaryOp::GreaterEqual, l, r),
            E::And(_, l, r) => self.binary(BinaryOp::And, l, r),
            E::Or(_, l, r) => self.binary(BinaryOp::Or, l, r),
            E::Xor(_, l, r) => self.binary(BinaryOp::Xor, l, r),
            E::Imp(_, l, r) => self.binary(BinaryOp::Imp, l, r),
            E::Eqv(_, l, r) => self.binary(BinaryOp::Eqv, l, r),
        }
    }

    fn unary_var(&mut self, ident: &Ident) -> Result<Expr> {
        if let Some(val) = self.get_const(ident) {
            return Ok(Expr::literal(val));
        }
        if let Some(id) = self.routine_named(ident) {
            return self.call_expr(id, &[]);
        }
        if let Some((builtin, arity)) = Function::lookup(ident.name()) {
            if arity.contains(&0) {
                return self.builtin(builtin, &[]);
            }
        }
        let (place, data_type) = self.unary_place(ident)?;
        Ok(load(place, data_type))
    }

    fn function(&mut self, ident: &Ident, args: &[Expression]) -> Result<Expr> {
        if let Some(id) = self.routine_named(ident) {
            return self.call_expr(id, args);
        }
        match &**ident.name() {
            "LBOUND" | "UBOUND" => return self.bound(ident.name().starts_with('U'), args),
            "LEN" if args.len() == 1 => {
                if let Some(size) = self.byte_len(&args[0])? {
                    return Ok(Expr::literal(Val::Integer(size)));
                }
            }
            _ => {}
        }
        if let Some((builtin, arity)) = Function::lookup(ident.name()) {
            if !arity.contains(&args.len()) {
                return Err(error!(ArgumentCountMismatch));
            }
            return self.builtin(builtin, args);
        }
        let (place, data_type) = self.element(ident, args)?;
        Ok(load(place, data_type))
    }

    /// `LEN` of a numeric or record variable is its storage size.
    fn byte_len(&mut self, arg: &Expression) -> Result<Option<i16>> {
        let data_type = match arg {
            Expression::UnaryVar(_, ident) => {
                if self.get_const(ident).is_some() || self.routine_named(ident).is_some() {
                    return Ok(None);
                }
                match self.lookup(ident, false)? {
                    Some(slot) => self.slot_type(slot),
                    None => return Ok(None),
                }
            }
            Expression::Field(..) => match arg.to_variable() {
                Some(var) => self.place(&var)?.1,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        if data_type.is_numeric()
            || matches!(data_type, DataType::Record(_) | DataType::FixedString(_))
        {
            let size = i16::try_from(self.types.byte_size(&data_type))
                .map_err(|_| error!(Overflow))?;
            return Ok(Some(size));
        }
        Ok(None)
    }

    fn bound(&mut self, upper: bool, args: &[Expression]) -> Result<Expr> {
        let ident = match args {
            [Expression::UnaryVar(_, ident)] | [Expression::UnaryVar(_, ident), _] => ident,
            [_] | [_, _] => return Err(error!(TypeMismatch)),
            _ => return Err(error!(ArgumentCountMismatch)),
        };
        let slot = self
            .lookup(ident, true)?
            .ok_or_else(|| error!(ArrayNotDefined, ..&args[0].column()))?;
        let dim = match args.get(1) {
            Some(arg) => {
                let dim = numeric(self.expr(arg)?)?;
                Some(Box::new(convert(dim, &DataType::Integer)?))
            }
            None => None,
        };
        Ok(Expr {
            kind: ExprKind::Bound { upper, slot, dim },
            data_type: DataType::Long,
        })
    }

    fn builtin(&mut self, builtin: Builtin, args: &[Expression]) -> Result<Expr> {
        let mut compiled = vec![];
        for arg in args {
            compiled.push(self.expr(arg)?);
        }
        let types: Vec<DataType> = compiled.iter().map(|e| e.data_type.value_type()).collect();
        let data_type = Function::return_type(builtin, &types)?;
        if Function::is_pure(builtin) && compiled.iter().all(|e| e.as_literal().is_some()) {
            let vals = compiled.iter().filter_map(|e| e.as_literal().cloned()).collect();
            let val = Function::call(builtin, vals, &mut Folding)?;
            return Ok(Expr {
                kind: ExprKind::Literal(val.convert(&data_type)?),
                data_type,
            });
        }
        Ok(Expr {
            kind: ExprKind::Builtin(builtin, compiled),
            data_type,
        })
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expression) -> Result<Expr> {
        let operand = self.expr(operand)?;
        let data_type = Operation::unary_type(op, &operand.data_type.value_type())?;
        if let Some(val) = operand.as_literal() {
            return Ok(Expr::literal(Operation::unary(op, val.clone())?));
        }
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            data_type,
        })
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expression, rhs: &Expression) -> Result<Expr> {
        let lhs = self.expr(lhs)?;
        let rhs = self.expr(rhs)?;
        let p = Operation::promote(op, &lhs.data_type.value_type(), &rhs.data_type.value_type())?;
        let lhs = convert(lhs, &p.lhs)?;
        let rhs = convert(rhs, &p.rhs)?;
        if let (Some(l), Some(r)) = (lhs.as_literal(), rhs.as_literal()) {
            let val = Operation::apply(op, l.clone(), r.clone())?;
            return Ok(Expr::literal(val));
        }
        Ok(Expr {
            kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
            data_type: p.result,
        })
    }

    fn call_expr(&mut self, id: RoutineId, args: &[Expression]) -> Result<Expr> {
        let data_type = match &self.signatures[id].return_type {
            Some(t) => t.clone(),
            None => return Err(error!(TypeMismatch)),
        };
        let args = self.arguments(id, args)?;
        Ok(Expr {
            kind: ExprKind::Call(id, args),
            data_type,
        })
    }

    // Calls

    fn arguments(&mut self, id: RoutineId, args: &[Expression]) -> Result<Vec<Argument>> {
        let params = self.signatures[id].params.clone();
        if params.len() != args.len() {
            return Err(error!(ArgumentCountMismatch));
        }
        let mut compiled = vec![];
        for (param, arg) in params.iter().zip(args) {
            let argument = self
                .argument(param, arg)
                .map_err(|e| e.in_column(&arg.column()))?;
            compiled.push(argument);
        }
        Ok(compiled)
    }

    /// Whether an argument names storage rather than computing a value.
    fn is_variable(&self, arg: &Expression) -> bool {
        match arg {
            Expression::UnaryVar(_, ident) => {
                self.get_const(ident).is_none()
                    && self.routine_named(ident).is_none()
                    && !matches!(Function::lookup(ident.name()), Some((_, a)) if a.contains(&0))
            }
            Expression::Function(_, ident, _) => {
                self.routine_named(ident).is_none()
                    && Function::lookup(ident.name()).is_none()
                    && !matches!(&**ident.name(), "LBOUND" | "UBOUND")
            }
            Expression::Field(_, base, _) => self.is_variable(base),
            _ => false,
        }
    }

    fn argument(&mut self, param: &ParamSig, arg: &Expression) -> Result<Argument> {
        if param.data_type.is_array() {
            let ident = match arg {
                Expression::UnaryVar(_, ident) => ident,
                Expression::Function(_, ident, args) if args.is_empty() => ident,
                _ => return Err(error!(ParameterTypeMismatch)),
            };
            let slot = self
                .lookup(ident, true)?
                .ok_or_else(|| error!(ArrayNotDefined))?;
            if !param.data_type.accepts(&self.slot_type(slot)) {
                return Err(error!(ParameterTypeMismatch));
            }
            return Ok(Argument::Alias(slot));
        }
        if !param.by_val && self.is_variable(arg) {
            if let Some(var) = arg.to_variable() {
                let (place, data_type) = self.place(&var)?;
                if data_type == param.data_type {
                    return Ok(match place {
                        Place::Slot(slot) => Argument::Alias(slot),
                        place => Argument::Ref(place),
                    });
                }
                // A fixed string may still be copied into a STRING parameter.
                if !(data_type.is_string() && param.data_type.is_string()) {
                    return Err(error!(ParameterTypeMismatch));
                }
            }
        }
        if !param.data_type.is_scalar() {
            return Err(error!(ParameterTypeMismatch));
        }
        let value = self.expr(arg)?;
        Ok(Argument::Value(convert(value, &param.data_type)?))
    }

    // Statements

    fn condition(&mut self, expr: &Expression) -> Result<Expr> {
        let cond = self.expr(expr)?;
        numeric(cond).map_err(|e| e.in_column(&expr.column()))
    }

    fn loop_test(&mut self, condition: Option<ast::Condition>) -> Result<Option<LoopTest>> {
        Ok(match condition {
            None => None,
            Some(ast::Condition::While(e)) => Some(LoopTest {
                until: false,
                cond: self.condition(&e)?,
            }),
            Some(ast::Condition::Until(e)) => Some(LoopTest {
                until: true,
                cond: self.condition(&e)?,
            }),
        })
    }

    fn jump(&mut self, routine: RoutineId, target: &ast::Target, col: &Column) -> JumpId {
        let id = self.targets.len();
        self.targets.push(Target::at(StatementPath::default()));
        self.fixups.push(Fixup {
            id,
            routine,
            name: label_name(target),
            line: self.line,
            col: col.clone(),
        });
        id
    }

    fn on_jump(
        &mut self,
        col: &Column,
        expr: &Expression,
        targets: &[ast::Target],
    ) -> Result<(Expr, Vec<JumpId>)> {
        let index = numeric(self.expr(expr)?)?;
        let ids = targets
            .iter()
            .map(|t| self.jump(self.routine, t, col))
            .collect();
        Ok((index, ids))
    }

    fn bounds(
        &mut self,
        bounds: &[(Option<Expression>, Expression)],
    ) -> Result<Vec<(Expr, Expr)>> {
        let mut compiled = vec![];
        for (lower, upper) in bounds {
            let lower = match lower {
                Some(e) => self.expr(e)?,
                None => Expr::literal(Val::Long(0)),
            };
            let upper = self.expr(upper)?;
            compiled.push((convert(lower, &DataType::Long)?, convert(upper, &DataType::Long)?));
        }
        Ok(compiled)
    }

    fn as_type(&self, decl: &ast::Declaration) -> Result<Option<DataType>> {
        match &decl.as_type {
            Some(t) => Ok(Some(self.data_type(t).map_err(|e| e.in_column(&decl.col))?)),
            None => Ok(None),
        }
    }

    fn dim(&mut self, shared: bool, decls: Vec<ast::Declaration>) -> Result<()> {
        if shared && self.local.is_some() {
            return Err(error!(IllegalInSubFunction));
        }
        for decl in decls {
            let as_type = self.as_type(&decl)?;
            if self.record_head(&decl.ident)?.is_some() {
                return Err(error!(IdentifierCannotIncludePeriod, ..&decl.col));
            }
            let rank = decl.bounds.as_ref().map(|b| b.len());
            let existing = if shared {
                self.main
                    .find(&decl.ident, rank.is_some())?
                    .filter(|s| self.main.is_global(*s))
            } else {
                None
            };
            let slot = match existing {
                Some(slot) => slot,
                None => {
                    let slot = self
                        .scope_mut()
                        .declare(&decl.ident, as_type, rank, false)
                        .map_err(|e| e.in_column(&decl.col))?;
                    if shared {
                        self.main.make_global(slot);
                    }
                    slot
                }
            };
            if let Some(bounds) = &decl.bounds {
                if !bounds.is_empty() {
                    let bounds = self.bounds(bounds)?;
                    self.emit(Executable::Dim(slot, bounds));
                }
            }
        }
        Ok(())
    }

    fn redim(&mut self, preserve: bool, shared: bool, decls: Vec<ast::Declaration>) -> Result<()> {
        if shared && self.local.is_some() {
            return Err(error!(IllegalInSubFunction));
        }
        for decl in decls {
            let as_type = self.as_type(&decl)?;
            let bounds = match &decl.bounds {
                Some(b) if !b.is_empty() => b.clone(),
                _ => return Err(error!(SyntaxError, ..&decl.col)),
            };
            let slot = match self.lookup(&decl.ident, true)? {
                Some(slot) => slot,
                None => {
                    let slot = self
                        .scope_mut()
                        .declare(&decl.ident, as_type, Some(bounds.len()), false)
                        .map_err(|e| e.in_column(&decl.col))?;
                    if shared {
                        self.main.make_global(slot);
                    }
                    slot
                }
            };
            match self.slot_type(slot) {
                DataType::Array(_, rank) if rank == 0 || rank == bounds.len() => {}
                _ => return Err(error!(SubscriptOutOfRange, ..&decl.col)),
            }
            let bounds = self.bounds(&bounds)?;
            self.emit(Executable::Redim {
                slot,
                bounds,
                preserve,
            });
        }
        Ok(())
    }

    fn shared(&mut self, decls: Vec<ast::Declaration>) -> Result<()> {
        if self.local.is_none() {
            return Err(error!(IllegalOutsideSubFunction));
        }
        for decl in decls {
            let as_type = self.as_type(&decl)?;
            let array = decl.bounds.is_some();
            let root = match self.main.find(&decl.ident, array)? {
                Some(root) => root,
                None => self
                    .main
                    .declare(&decl.ident, as_type, if array { Some(0) } else { None }, false)
                    .map_err(|e| e.in_column(&decl.col))?,
            };
            let data_type = self.main.slot_type(root);
            self.scope_mut()
                .alias(&decl.ident, data_type, root)
                .map_err(|e| e.in_column(&decl.col))?;
        }
        Ok(())
    }

    fn next(&mut self, idents: Vec<Ident>) -> Result<()> {
        let is_for = |kind: &BlockKind| matches!(kind, BlockKind::For { .. });
        if idents.is_empty() {
            self.expect(is_for, ErrorCode::NextWithoutFor)?;
            return self.close(None);
        }
        for ident in idents {
            self.expect(is_for, ErrorCode::NextWithoutFor)?;
            let slot = self.variable(&ident, None)?;
            let matched = matches!(
                self.blocks.last(),
                Some(Block { kind: BlockKind::For { slot: s, .. }, .. }) if *s == slot
            );
            if !matched {
                return Err(error!(NextWithoutFor));
            }
            self.close(None)?;
        }
        Ok(())
    }

    fn exit(&mut self, kind: ast::ExitKind) -> Result<()> {
        let routine = self.kind.clone();
        let exit = match kind {
            ast::ExitKind::For => {
                if !self.blocks.iter().any(|b| matches!(b.kind, BlockKind::For { .. })) {
                    return Err(error!(ExitWithoutBlock));
                }
                ExitKind::For
            }
            ast::ExitKind::Do => {
                if !self.blocks.iter().any(|b| matches!(b.kind, BlockKind::Do { .. })) {
                    return Err(error!(ExitWithoutBlock));
                }
                ExitKind::Do
            }
            ast::ExitKind::Sub if routine == Some(RoutineKind::Sub) => ExitKind::Routine,
            ast::ExitKind::Function if routine == Some(RoutineKind::Function) => ExitKind::Routine,
            _ => return Err(error!(ExitWithoutBlock)),
        };
        self.emit(Executable::Exit(exit));
        Ok(())
    }

    fn input_places(&mut self, vars: &[ast::Variable]) -> Result<Vec<Place>> {
        let mut places = vec![];
        for var in vars {
            places.push(self.scalar_place(var)?.0);
        }
        Ok(places)
    }

    fn statement(&mut self, statement: ast::Statement) -> Result<()> {
        use ast::Statement as S;
        match statement {
            S::Let(_, var, expr) => {
                let (place, data_type) = self.place(&var)?;
                if let DataType::Record(_) = data_type {
                    let source = match expr.to_variable() {
                        Some(v) if self.is_variable(&expr) => self.place(&v)?,
                        _ => return Err(error!(TypeMismatch, ..&expr.column())),
                    };
                    if source.1 != data_type {
                        return Err(error!(TypeMismatch, ..&expr.column()));
                    }
                    self.emit(Executable::Copy(place, source.0));
                } else {
                    let value = self.expr(&expr)?;
                    let value = convert(value, &data_type).map_err(|e| e.in_column(&expr.column()))?;
                    self.emit(Executable::Assign(place, value));
                }
            }
            S::Print(_, items) => {
                let mut ops = vec![];
                let mut newline = true;
                for item in items {
                    match item {
                        ast::PrintItem::Expression(e) => {
                            let value = self.expr(&e)?;
                            if !value.data_type.is_scalar() {
                                return Err(error!(TypeMismatch, ..&e.column()));
                            }
                            ops.push(PrintOp::Value(value));
                            newline = true;
                        }
                        ast::PrintItem::Comma => {
                            ops.push(PrintOp::Zone);
                            newline = false;
                        }
                        ast::PrintItem::Semicolon => newline = false,
                    }
                }
                if newline {
                    ops.push(PrintOp::Newline);
                }
                self.emit(Executable::Print(ops));
            }
            S::Input(_, prompt, question, vars) => {
                let prompt = match (prompt, question) {
                    (None, _) => "? ".to_string(),
                    (Some(p), true) => format!("{}? ", p),
                    (Some(p), false) => p.to_string(),
                };
                let places = self.input_places(&vars)?;
                self.emit(Executable::Input { prompt, places });
            }
            S::LineInput(_, prompt, var) => {
                let (place, data_type) = self.place(&var)?;
                if !data_type.is_string() {
                    return Err(error!(TypeMismatch, ..&var.column()));
                }
                let prompt = prompt.map(|p| p.to_string()).unwrap_or_default();
                self.emit(Executable::LineInput { prompt, place });
            }
            S::Read(_, vars) => {
                let places = self.input_places(&vars)?;
                self.emit(Executable::Read(places));
            }
            S::Restore(col, target) => {
                let index = match target {
                    None => 0,
                    Some(target) => *self
                        .data_labels
                        .get(&label_name(&target))
                        .ok_or_else(|| error!(LabelNotDefined, ..&col))?,
                };
                self.emit(Executable::Restore(index));
            }
            S::Swap(_, a, b) => {
                let (a, ta) = self.scalar_place(&a)?;
                let (b, tb) = self.scalar_place(&b)?;
                if ta.value_type() != tb.value_type() {
                    return Err(error!(TypeMismatch));
                }
                self.emit(Executable::Swap(a, b));
            }
            S::IfBlock(col, cond) => {
                let cond = self.condition(&cond)?;
                self.open(
                    BlockKind::If {
                        cond,
                        chained: false,
                        single: false,
                    },
                    &col,
                );
            }
            S::ElseIf(col, cond) => {
                self.expect(Compiler::is_block_if, ErrorCode::ElseWithoutIf)?;
                let block = self.blocks.last_mut().ok_or_else(|| error!(InternalError))?;
                if block.body != 0 {
                    return Err(error!(ElseWithoutIf));
                }
                block.body = 1;
                let cond = self.condition(&cond)?;
                self.open(
                    BlockKind::If {
                        cond,
                        chained: true,
                        single: false,
                    },
                    &col,
                );
            }
            S::Else(_) => {
                self.expect(Compiler::is_block_if, ErrorCode::ElseWithoutIf)?;
                let block = self.blocks.last_mut().ok_or_else(|| error!(InternalError))?;
                if block.body != 0 {
                    return Err(error!(ElseWithoutIf));
                }
                block.body = 1;
            }
            S::EndIf(_) => {
                self.expect(Compiler::is_block_if, ErrorCode::EndIfWithoutBlockIf)?;
                loop {
                    let chained = matches!(
                        self.blocks.last(),
                        Some(Block {
                            kind: BlockKind::If { chained: true, .. },
                            ..
                        })
                    );
                    self.close(None)?;
                    if !chained {
                        break;
                    }
                }
            }
            S::If(col, cond, then, r#else) => {
                let cond = self.condition(&cond)?;
                self.open(
                    BlockKind::If {
                        cond,
                        chained: false,
                        single: true,
                    },
                    &col,
                );
                let depth = self.blocks.len();
                for (body, statements) in [then, r#else].into_iter().enumerate() {
                    self.blocks[depth - 1].body = body;
                    for statement in statements {
                        let col = statement.column();
                        self.statement(statement).map_err(|e| e.in_column(&col))?;
                    }
                    if let Some(block) = self.blocks.get(depth) {
                        return Err(block.unterminated());
                    }
                }
                self.close(None)?;
            }
            S::For(col, ident, from, to, step) => {
                let slot = self.variable(&ident, None)?;
                let data_type = self.slot_type(slot);
                if !data_type.is_numeric() {
                    return Err(error!(TypeMismatch));
                }
                let from = convert(self.expr(&from)?, &data_type)?;
                let to = convert(self.expr(&to)?, &data_type)?;
                let step = match step {
                    Some(step) => Some(convert(self.expr(&step)?, &data_type)?),
                    None => None,
                };
                let id = self.loops;
                self.loops += 1;
                self.open(
                    BlockKind::For {
                        id,
                        slot,
                        counter: Place::Slot(slot),
                        from,
                        to,
                        step,
                    },
                    &col,
                );
            }
            S::Next(_, idents) => self.next(idents)?,
            S::While(col, cond) => {
                let cond = self.condition(&cond)?;
                self.open(BlockKind::While { cond }, &col);
            }
            S::Wend(_) => {
                self.expect(
                    |k| matches!(k, BlockKind::While { .. }),
                    ErrorCode::WendWithoutWhile,
                )?;
                self.close(None)?;
            }
            S::Do(col, condition) => {
                let pre = self.loop_test(condition)?;
                self.open(BlockKind::Do { pre }, &col);
            }
            S::Loop(_, condition) => {
                self.expect(|k| matches!(k, BlockKind::Do { .. }), ErrorCode::LoopWithoutDo)?;
                let post = self.loop_test(condition)?;
                if let (
                    Some(_),
                    Some(Block {
                        kind: BlockKind::Do { pre: Some(_) },
                        ..
                    }),
                ) = (&post, self.blocks.last())
                {
                    return Err(error!(SyntaxError));
                }
                self.close(post)?;
            }
            S::Exit(_, kind) => self.exit(kind)?,
            S::Goto(col, target) => {
                let id = self.jump(self.routine, &target, &col);
                self.emit(Executable::Goto(id));
            }
            S::Gosub(col, target) => {
                let id = self.jump(self.routine, &target, &col);
                self.emit(Executable::Gosub(id));
            }
            S::Return(_) => self.emit(Executable::Return),
            S::OnGoto(col, expr, targets) => {
                let (index, ids) = self.on_jump(&col, &expr, &targets)?;
                self.emit(Executable::OnGoto(index, ids));
            }
            S::OnGosub(col, expr, targets) => {
                let (index, ids) = self.on_jump(&col, &expr, &targets)?;
                self.emit(Executable::OnGosub(index, ids));
            }
            S::Call(_, ident, args) => {
                let id = self
                    .routine_named(&ident)
                    .ok_or_else(|| error!(SubprogramNotDefined))?;
                if self.signatures[id].return_type.is_some() {
                    return Err(error!(SubprogramNotDefined));
                }
                let args = self.arguments(id, &args)?;
                self.emit(Executable::Call(id, args));
            }
            S::Dim(_, shared, decls) => self.dim(shared, decls)?,
            S::Redim(_, preserve, shared, decls) => self.redim(preserve, shared, decls)?,
            S::Shared(_, decls) => self.shared(decls)?,
            S::Erase(_, idents) => {
                let mut slots = vec![];
                for ident in idents {
                    let slot = self
                        .lookup(&ident, true)?
                        .ok_or_else(|| error!(ArrayNotDefined))?;
                    slots.push(slot);
                }
                self.emit(Executable::Erase(slots));
            }
            S::Const(_, consts) => {
                for (ident, expr) in consts {
                    let value = self.expr(&expr)?;
                    let value = match ident.suffix().and_then(DataType::from_suffix) {
                        Some(t) => convert(value, &t)?,
                        None => value,
                    };
                    let val = value
                        .as_literal()
                        .cloned()
                        .ok_or_else(|| error!(InvalidConstant, ..&expr.column()))?;
                    self.scope_mut().set_const(&ident, val)?;
                }
            }
            S::DefType(_, type_name, ranges) => {
                let data_type = self.data_type(&type_name)?;
                for (from, to) in ranges {
                    self.scope_mut().deftypes.set(from, to, data_type.clone());
                }
            }
            S::OnError(col, local, on_error) => {
                let handler = match on_error {
                    ast::OnError::Goto(target) => {
                        let routine = if local { self.routine } else { MAIN };
                        Handler::Execute(self.jump(routine, &target, &col))
                    }
                    ast::OnError::Disable => Handler::Off,
                    ast::OnError::ResumeNext => Handler::SkipStatement,
                };
                self.emit(Executable::OnError { local, handler });
            }
            S::Resume(col, resume) => {
                let kind = match resume {
                    ast::Resume::Retry => ResumeKind::Retry,
                    ast::Resume::Next => ResumeKind::Next,
                    ast::Resume::Target(target) => {
                        ResumeKind::To(self.jump(self.routine, &target, &col))
                    }
                };
                self.emit(Executable::Resume(kind));
            }
            S::Error(_, expr) => {
                let code = numeric(self.expr(&expr)?)?;
                self.emit(Executable::Error(code));
            }
            S::Randomize(_, seed) => {
                let seed = match seed {
                    Some(e) => Some(numeric(self.expr(&e)?)?),
                    None => None,
                };
                self.emit(Executable::Randomize(seed));
            }
            S::Stop(_) => self.emit(Executable::Stop),
            S::End(_) => self.emit(Executable::End),
            S::Data(..)
            | S::Declare(..)
            | S::EndFunction(_)
            | S::EndSub(_)
            | S::EndType(_)
            | S::Field(..)
            | S::Function(..)
            | S::Sub(..)
            | S::Type(..) => return Err(error!(SyntaxError)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(source: &str) -> u16 {
        compile(source).unwrap_err().code()
    }

    fn main_body(source: &str) -> Sequence {
        let module = compile(source).unwrap();
        module.routines[MAIN].body.clone()
    }

    #[test]
    fn test_block_errors() {
        assert_eq!(code("IF 1 THEN\nPRINT 1\n"), 100);
        assert_eq!(code("ELSE\n"), 101);
        assert_eq!(code("END IF\n"), 102);
        assert_eq!(code("FOR I = 1 TO 2\n"), 26);
        assert_eq!(code("FOR I = 1 TO 2\nNEXT J\n"), 1);
        assert_eq!(code("WEND\n"), 30);
        assert_eq!(code("DO\nPRINT 1\n"), 110);
        assert_eq!(code("LOOP\n"), 111);
        assert_eq!(code("EXIT FOR\n"), 112);
        assert_eq!(code("WHILE 1\nFOR I = 1 TO 2\nWEND\n"), 26);
    }

    #[test]
    fn test_procedure_errors() {
        assert_eq!(code("SUB A\nPRINT 1\n"), 106);
        assert_eq!(code("FUNCTION F\nF = 1\n"), 107);
        assert_eq!(code("SUB A\nSUB B\nEND SUB\n"), 108);
        assert_eq!(code("END SUB\n"), 109);
        assert_eq!(code("SUB A (X)\nEND SUB\nA 1, 2\n"), 37);
        assert_eq!(code("CALL NOWHERE\n"), 35);
        assert_eq!(code("SUB A\nEND SUB\nSUB A\nEND SUB\n"), 10);
        assert_eq!(code("SUB A\nEXIT FUNCTION\nEND SUB\n"), 112);
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(code("TYPE P\nX AS INTEGER\n"), 103);
        assert_eq!(code("TYPE P\nPRINT 1\nEND TYPE\n"), 104);
        assert_eq!(code("END TYPE\n"), 105);
        assert_eq!(code("TYPE P\nX AS NOPE\nEND TYPE\n"), 13);
        assert_eq!(code("A$ = 1\n"), 13);
        let dotted = "TYPE P\nX AS INTEGER\nEND TYPE\nDIM R AS P\nR.Y = 1\n";
        assert_eq!(code(dotted), 115);
    }

    #[test]
    fn test_folding_errors() {
        let err = compile("PRINT 1\nX% = 40000\n").unwrap_err();
        assert_eq!(err.code(), 6);
        assert_eq!(err.line(), Some(2));
        assert_eq!(code("PRINT 1 / 0\n"), 11);
        assert_eq!(code("CONST A = B\n"), 114);
        assert_eq!(code("GOTO 100\n"), 8);
    }

    #[test]
    fn test_constant_folding() {
        let body = main_body("X = 2 + 3 * 4\n");
        match &body[0].exec {
            Executable::Assign(Place::Slot(_), expr) => {
                assert_eq!(expr.as_literal(), Some(&Val::Single(14.0)));
            }
            other => panic!("{:?}", other),
        }
        let body = main_body("CONST N% = 10\nPRINT N% * 2\n");
        match &body[0].exec {
            Executable::Print(ops) => match &ops[0] {
                PrintOp::Value(e) => assert_eq!(e.as_literal(), Some(&Val::Integer(20))),
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_block_if_chain() {
        let body = main_body("IF A THEN\nX = 1\nELSEIF B THEN\nX = 2\nELSE\nX = 3\nEND IF\n");
        assert_eq!(body.len(), 1);
        match &body[0].exec {
            Executable::If { then, r#else, .. } => {
                assert_eq!(then.len(), 1);
                assert_eq!(r#else.len(), 1);
                match &r#else[0].exec {
                    Executable::If { then, r#else, .. } => {
                        assert_eq!(then.len(), 1);
                        assert_eq!(r#else.len(), 1);
                    }
                    other => panic!("{:?}", other),
                }
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_compound_next_and_labels() {
        let source = "FOR I = 1 TO 2\nFOR J = 1 TO 2\nagain:\nPRINT J\nNEXT J, I\n";
        let module = compile(source).unwrap();
        let main = &module.routines[MAIN];
        assert_eq!(main.body.len(), 1);
        match &main.body[0].exec {
            Executable::For { body, .. } => {
                assert!(matches!(body[0].exec, Executable::For { .. }));
            }
            other => panic!("{:?}", other),
        }
        let path = main.labels.get("AGAIN").unwrap();
        assert_eq!(path.segments(), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_arguments() {
        let source = "\
SUB S (A%, B() AS INTEGER, BYVAL C%)
END SUB
DIM X(5) AS INTEGER
S N%, X, N%
S X(1), X, 2
";
        let body = main_body(source);
        match &body[1].exec {
            Executable::Call(_, args) => {
                assert!(matches!(args[0], Argument::Alias(_)));
                assert!(matches!(args[1], Argument::Alias(_)));
                assert!(matches!(args[2], Argument::Value(_)));
            }
            other => panic!("{:?}", other),
        }
        match &body[2].exec {
            Executable::Call(_, args) => assert!(matches!(args[0], Argument::Ref(_))),
            other => panic!("{:?}", other),
        }
        assert_eq!(code("SUB S (B() AS LONG)\nEND SUB\nDIM X(5) AS INTEGER\nS X\n"), 116);
        assert_eq!(code("SUB S (A AS LONG)\nEND SUB\nN% = 1\nS N%\n"), 116);
        assert!(compile("SUB S (A AS LONG)\nEND SUB\nS 1\nS N% + 0\n").is_ok());
    }
}
