use super::array::ArraySubscripts;
use super::debug::{Debugger, FrameInfo, PauseReason};
use super::frame::{Cell, Frame, FrameView, LoopState};
use super::function::{Context, Function};
use super::host::{Console, Host};
use super::marshal::{MarshalCache, NativeProcedure};
use super::operation::{BinaryOp, Operation};
use super::path::{StatementPath, Target};
use super::program::{
    Argument, Executable, ExitKind, Expr, ExprKind, Handler, JumpId, LoopId, LoopTest, Module,
    Place, PrintOp, ResumeKind, Routine, RoutineId, Statement, MAIN,
};
use super::var::Variable;
use super::Val;
use crate::error;
use crate::lang::{Error, ErrorCode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace, warn};

type Result<T> = std::result::Result<T, Error>;

/// Why a run or call did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Compile(Error),
    /// No handler caught the error and no debugger took it.
    #[error("{0}")]
    Unhandled(Error),
    #[error("TERMINATED")]
    Terminated,
    #[error("{0}")]
    Internal(Error),
}

impl RunError {
    /// The BASIC error behind this failure, if there is one.
    pub fn error(&self) -> Option<&Error> {
        match self {
            RunError::Compile(e) | RunError::Unhandled(e) | RunError::Internal(e) => Some(e),
            RunError::Terminated => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Nested routine calls before `OUT OF MEMORY`.
    pub max_depth: usize,
    /// Nested GOSUBs per frame before `OUT OF MEMORY`.
    pub max_gosub: usize,
    /// With a debugger attached, pause on an unhandled error and retry
    /// the statement when resumed instead of ending the run.
    pub pause_on_fault: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_depth: 128,
            max_gosub: 255,
            pause_on_fault: true,
        }
    }
}

/// Where control goes after a statement.
#[derive(Debug, Clone, PartialEq)]
enum Signal {
    Continue,
    /// Carry on at `path` in the frame with id `frame`.
    Jump { path: StatementPath, frame: usize },
    ExitLoop(ExitKind),
    ExitRoutine(usize),
    Resume(ResumeKind),
    EndProgram(i32),
}

/// Everything that leaves a statement other than a plain signal.
#[derive(Debug)]
enum Flow {
    Fault(Error),
    /// A signal passing through frames that are not its target.
    Unwind(Signal),
    Terminated,
    Fatal(Error),
}

impl From<Error> for Flow {
    fn from(e: Error) -> Flow {
        Flow::Fault(e)
    }
}

type Exec<T> = std::result::Result<T, Flow>;

/// How the faulting statement continues once its error is dealt with.
enum Outcome {
    Retry,
    Next,
    Signal(Signal),
}

#[derive(Debug, Clone)]
enum Step {
    Index(Vec<i32>),
    Field(usize),
}

/// A resolved place: a variable cell and the path into it.
#[derive(Debug, Clone)]
struct Location {
    cell: Cell,
    steps: Vec<Step>,
}

enum Store {
    Val(Val),
    Var(Variable),
}

fn read_val(var: &Variable, steps: &[Step]) -> Result<Val> {
    match steps.split_first() {
        None => var.get(),
        Some((Step::Field(i), rest)) => read_val(var.field(*i)?, rest),
        Some((Step::Index(idx), [])) => var.as_array()?.get(idx),
        Some((Step::Index(idx), rest)) => read_val(&var.as_array()?.element(idx)?, rest),
    }
}

fn read_var(var: &Variable, steps: &[Step]) -> Result<Variable> {
    match steps.split_first() {
        None => Ok(var.clone()),
        Some((Step::Field(i), rest)) => read_var(var.field(*i)?, rest),
        Some((Step::Index(idx), rest)) => read_var(&var.as_array()?.element(idx)?, rest),
    }
}

fn store(var: &mut Variable, steps: &[Step], value: Store) -> Result<()> {
    match (steps.split_first(), value) {
        (None, Store::Val(v)) => var.set(v),
        (None, Store::Var(v)) => var.assign(&v),
        (Some((Step::Field(i), rest)), value) => store(var.field_mut(*i)?, rest, value),
        (Some((Step::Index(idx), [])), Store::Val(v)) => var.as_array_mut()?.set(idx, v),
        (Some((Step::Index(idx), rest)), value) => {
            store(var.as_array_mut()?.element_mut(idx)?, rest, value)
        }
    }
}

impl Location {
    fn get(&self) -> Result<Val> {
        read_val(&self.cell.borrow(), &self.steps)
    }

    fn variable(&self) -> Result<Variable> {
        read_var(&self.cell.borrow(), &self.steps)
    }

    fn store(&self, value: Store) -> Result<()> {
        store(&mut self.cell.borrow_mut(), &self.steps, value)
    }

    fn is_string(&self) -> Result<bool> {
        Ok(matches!(
            self.variable()?,
            Variable::String(_) | Variable::FixedString(_)
        ))
    }
}

/// How one argument reaches the called routine.
enum Binding {
    Alias(Cell),
    /// A private copy, written back to the location after the call.
    Copy(Variable, Option<Location>),
}

/// Split an INPUT line on commas outside double quotes.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = vec![];
    let mut field = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                field.push(c);
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn parse_number(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return Some(0.0);
    }
    let upper = field.to_ascii_uppercase();
    if upper.starts_with("&H") || upper.starts_with("&O") {
        return Some(super::function::parse_val(&upper));
    }
    upper.replace('D', "E").parse::<f64>().ok()
}

fn unquote(field: &str) -> String {
    let field = field.trim();
    match field.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"').unwrap_or(rest).to_string(),
        None => field.to_string(),
    }
}

fn native_key(name: &str) -> String {
    name.trim_end_matches(|c| "%&!#@$".contains(c))
        .to_ascii_uppercase()
}

/// Executes a compiled [`Module`].
///
/// The runtime owns every frame and variable; nothing in it is shared
/// with other threads. A [`Debugger`] attached with
/// [`attach_debugger`](Runtime::attach_debugger) is the only way to
/// reach a running program from outside.
pub struct Runtime {
    module: Rc<Module>,
    host: Box<dyn Host>,
    config: RuntimeConfig,
    frames: Vec<Frame>,
    current: usize,
    next_id: usize,
    handler: Handler,
    handling: bool,
    /// Frame index whose handler is running, where RESUME is legal.
    resuming: Option<usize>,
    err: u16,
    erl: u32,
    data_pos: usize,
    rng: StdRng,
    last_rnd: f32,
    column: usize,
    debugger: Option<Debugger>,
    watchpoint: Option<Box<dyn FnMut(&FrameView) -> bool>>,
    natives: HashMap<String, Box<dyn NativeProcedure>>,
    marshal: MarshalCache,
}

impl Runtime {
    pub fn new(module: Module) -> Runtime {
        Runtime::with_host(module, Console::default())
    }

    pub fn with_host<H: Host + 'static>(module: Module, host: H) -> Runtime {
        Runtime {
            module: Rc::new(module),
            host: Box::new(host),
            config: RuntimeConfig::default(),
            frames: vec![],
            current: 0,
            next_id: 0,
            handler: Handler::Off,
            handling: false,
            resuming: None,
            err: 0,
            erl: 0,
            data_pos: 0,
            rng: StdRng::seed_from_u64(0),
            last_rnd: 0.0,
            column: 0,
            debugger: None,
            watchpoint: None,
            natives: HashMap::new(),
            marshal: MarshalCache::default(),
        }
    }

    /// Compile `source` and wrap it in a runtime.
    pub fn from_source<H: Host + 'static>(
        source: &str,
        host: H,
    ) -> std::result::Result<Runtime, RunError> {
        let module = super::compile(source).map_err(RunError::Compile)?;
        Ok(Runtime::with_host(module, host))
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Runtime {
        self.config = config;
        self
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn attach_debugger(&mut self, debugger: &Debugger) {
        self.debugger = Some(debugger.clone());
    }

    /// Pause whenever `predicate` returns true at a statement boundary.
    /// Only consulted while a debugger is attached.
    pub fn set_watchpoint<F>(&mut self, predicate: F)
    where
        F: FnMut(&FrameView) -> bool + 'static,
    {
        self.watchpoint = Some(Box::new(predicate));
    }

    pub fn clear_watchpoint(&mut self) {
        self.watchpoint = None;
    }

    /// Make a host procedure available to `DECLARE ... LIB` routines of
    /// the same name.
    pub fn register_native<P: NativeProcedure + 'static>(&mut self, name: &str, procedure: P) {
        self.natives.insert(native_key(name), Box::new(procedure));
    }

    /// A scalar variable of the main program, after or during a run.
    pub fn main_value(&self, name: &str) -> Option<Val> {
        let frame = self.frames.first()?;
        FrameView {
            routine: self.module.routine(MAIN)?,
            frame,
        }
        .value(name)
    }

    /// Run the main program from the top. Returns the exit code.
    pub fn run(&mut self) -> std::result::Result<i32, RunError> {
        self.reset().map_err(RunError::Internal)?;
        if let Some(debugger) = &self.debugger {
            debugger.reset();
        }
        debug!(routines = self.module.routines.len(), "run");
        let started = self.host.ticks();
        let module = self.module.clone();
        let result = match module.routine(MAIN) {
            Some(main) => self.run_body(main, &[]),
            None => Err(Flow::Fatal(error!(InternalError; "NO MAIN PROGRAM"))),
        };
        let outcome = match result {
            Ok(Signal::EndProgram(code)) | Err(Flow::Unwind(Signal::EndProgram(code))) => Ok(code),
            Ok(Signal::Continue) => Ok(0),
            Ok(_) => Err(RunError::Internal(error!(InternalError; "CONTROL ESCAPED THE PROGRAM"))),
            Err(flow) => Err(self.run_error(flow)),
        };
        self.frames.truncate(1);
        self.current = 0;
        if let Some(debugger) = &self.debugger {
            debugger.finish();
        }
        debug!(ticks = self.host.ticks().saturating_sub(started), ok = outcome.is_ok(), "finished");
        outcome
    }

    /// Call a SUB or FUNCTION from the host. A SUB returns `Integer(0)`.
    pub fn call(&mut self, name: &str, args: Vec<Val>) -> std::result::Result<Variable, RunError> {
        let id = self
            .module
            .find(name)
            .ok_or_else(|| RunError::Unhandled(error!(SubprogramNotDefined)))?;
        if self.frames.is_empty() {
            self.reset().map_err(RunError::Internal)?;
        }
        let module = self.module.clone();
        let routine = module
            .routine(id)
            .ok_or_else(|| RunError::Internal(error!(InternalError)))?;
        if routine.params.len() != args.len() {
            return Err(RunError::Unhandled(error!(ArgumentCountMismatch)));
        }
        let mut arguments = vec![];
        for (param, val) in routine.params.iter().zip(args) {
            let val = val
                .convert(&param.data_type)
                .map_err(RunError::Unhandled)?;
            arguments.push(Argument::Value(Expr::literal(val)));
        }
        self.current = self.frames.len() - 1;
        let saved = self.current;
        let result = self.call_routine(id, &arguments);
        self.current = saved;
        match result {
            Ok(Some(var)) => Ok(var),
            Ok(None) => Ok(Variable::Integer(0)),
            Err(Flow::Unwind(Signal::EndProgram(_))) => Ok(Variable::Integer(0)),
            Err(flow) => Err(self.run_error(flow)),
        }
    }

    fn reset(&mut self) -> Result<()> {
        let module = self.module.clone();
        let main = module
            .routine(MAIN)
            .ok_or_else(|| error!(InternalError; "NO MAIN PROGRAM"))?;
        self.frames.clear();
        self.frames.push(Frame::new(
            0,
            MAIN,
            main,
            &module.types,
            None,
            self.config.max_gosub,
        )?);
        self.next_id = 1;
        self.current = 0;
        self.handler = Handler::Off;
        self.handling = false;
        self.resuming = None;
        self.err = 0;
        self.erl = 0;
        self.data_pos = 0;
        self.column = 0;
        Ok(())
    }

    fn run_error(&self, flow: Flow) -> RunError {
        match flow {
            Flow::Terminated => RunError::Terminated,
            Flow::Fatal(e) if e.is(ErrorCode::InternalError) => RunError::Internal(e),
            Flow::Fatal(e) | Flow::Fault(e) => RunError::Unhandled(e),
            Flow::Unwind(signal) => RunError::Internal(
                error!(InternalError; format!("UNCAUGHT {:?}", signal)),
            ),
        }
    }

    fn frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    fn snapshot(&self) -> Vec<FrameInfo> {
        self.frames
            .iter()
            .map(|f| FrameInfo {
                routine: self
                    .module
                    .routine(f.routine)
                    .map(|r| r.name.to_string())
                    .unwrap_or_default(),
                line: f.line,
            })
            .collect()
    }

    fn print(&mut self, s: &str) {
        match s.rfind('\n') {
            Some(i) => self.column = s[i + 1..].chars().count(),
            None => self.column += s.chars().count(),
        }
        self.host.print(s);
    }

    // Control flow

    /// Run a routine's root sequence from `entry`, taking every jump
    /// aimed at this frame by descending again from the root.
    fn run_body(&mut self, routine: &Routine, entry: &[usize]) -> Exec<Signal> {
        let id = self.frame().id;
        let mut entry = entry.to_vec();
        loop {
            let path = match self.sequence(&routine.body, &entry) {
                Ok(Signal::Jump { path, frame }) if frame == id => path,
                Err(Flow::Unwind(Signal::Jump { path, frame })) if frame == id => path,
                other => return other,
            };
            trace!(%path, routine = &*routine.name, "jump");
            entry = path.segments().to_vec();
        }
    }

    /// Run statements from `resume`, whose first segment is the index
    /// to start at and whose rest continues into that statement.
    fn sequence(&mut self, seq: &[Statement], resume: &[usize]) -> Exec<Signal> {
        let (mut index, mut rest) = match resume.split_first() {
            Some((i, rest)) => (*i, rest),
            None => (0, &[][..]),
        };
        let depth = self.frame().path.len();
        self.frame_mut().path.push(index);
        let result = loop {
            let statement = match seq.get(index) {
                Some(s) => s,
                None => break Ok(Signal::Continue),
            };
            self.frame_mut().path[depth] = index;
            match self.statement(statement, rest) {
                Ok(Signal::Continue) => {}
                other => break other,
            }
            rest = &[];
            index += 1;
        };
        self.frame_mut().path.truncate(depth);
        result
    }

    /// One child body of the statement at the end of the frame's path.
    fn body(&mut self, body: usize, seq: &[Statement], resume: &[usize]) -> Exec<Signal> {
        self.frame_mut().path.push(body);
        let result = self.sequence(seq, resume);
        self.frame_mut().path.pop();
        result
    }

    fn statement(&mut self, statement: &Statement, resume: &[usize]) -> Exec<Signal> {
        let mut resume = resume;
        loop {
            self.frame_mut().line = statement.line;
            if resume.is_empty() {
                self.boundary(statement.line)?;
            }
            trace!(line = statement.line, "statement");
            match self.execute(statement, resume) {
                Err(Flow::Fault(error)) => {
                    let error = error.in_line(Some(statement.line));
                    match self.dispatch(error, statement)? {
                        Outcome::Retry => resume = &[],
                        Outcome::Next => return Ok(Signal::Continue),
                        Outcome::Signal(signal) => return Err(Flow::Unwind(signal)),
                    }
                }
                other => return other,
            }
        }
    }

    /// Give an attached debugger its chance to pause.
    fn boundary(&mut self, line: usize) -> Exec<()> {
        let debugger = match &self.debugger {
            Some(d) => d.clone(),
            None => return Ok(()),
        };
        let watch = match self.watchpoint.as_mut() {
            Some(predicate) => {
                let frame = &self.frames[self.current];
                match self.module.routines.get(frame.routine) {
                    Some(routine) => predicate(&FrameView { routine, frame }),
                    None => false,
                }
            }
            None => false,
        };
        debugger
            .statement_boundary(line, watch, || self.snapshot())
            .map_err(|_| Flow::Terminated)
    }

    // Errors

    /// Find a handler for `error`, searching the calling frames from the
    /// innermost out and then the global handler.
    fn dispatch(&mut self, error: Error, statement: &Statement) -> Exec<Outcome> {
        if error.is(ErrorCode::InternalError) {
            return Err(Flow::Fatal(error));
        }
        let mut index = Some(self.current);
        let mut found = None;
        while let Some(i) = index {
            let frame = &self.frames[i];
            if frame.handler != Handler::Off && !frame.handling {
                found = Some((i, frame.handler.clone(), false));
                break;
            }
            index = frame.caller;
        }
        if found.is_none() && self.handler != Handler::Off && !self.handling {
            found = Some((0, self.handler.clone(), true));
        }
        match found {
            None => self.unhandled(error),
            Some((_, Handler::SkipStatement, _)) => {
                trace!(%error, "skipped");
                self.err = error.code();
                self.erl = statement.erl;
                Ok(Outcome::Next)
            }
            Some((k, Handler::Execute(target), global)) => {
                self.run_handler(k, target, global, error, statement.erl)
            }
            Some((_, Handler::Off, _)) => Err(Flow::Fatal(error!(InternalError))),
        }
    }

    fn unhandled(&mut self, error: Error) -> Exec<Outcome> {
        warn!(%error, "unhandled error");
        match self.debugger.clone() {
            Some(debugger) if self.config.pause_on_fault => {
                let line = error.line().unwrap_or(self.frame().line);
                debugger
                    .report(PauseReason::Fault(error), line, self.snapshot())
                    .map_err(|_| Flow::Terminated)?;
                Ok(Outcome::Retry)
            }
            _ => Err(Flow::Fatal(error)),
        }
    }

    /// Run the handler at `target` in frame `k` and turn the way it ends
    /// into an outcome for the faulting statement.
    fn run_handler(
        &mut self,
        k: usize,
        target: JumpId,
        global: bool,
        error: Error,
        erl: u32,
    ) -> Exec<Outcome> {
        let module = self.module.clone();
        let entry = module
            .target(target)
            .map(Target::resolved)
            .ok_or_else(|| Flow::Fatal(error!(InternalError; "NO HANDLER TARGET")))?;
        let routine = module
            .routine(self.frames[k].routine)
            .ok_or_else(|| Flow::Fatal(error!(InternalError)))?;
        debug!(%error, routine = &*routine.name, "handling error");
        self.err = error.code();
        self.erl = erl;
        if global {
            self.handling = true;
        } else {
            self.frames[k].handling = true;
        }
        let faulting = self.current;
        let saved_path = std::mem::take(&mut self.frames[k].path);
        let saved_resuming = self.resuming.replace(k);
        self.current = k;
        let result = self.run_body(routine, entry.segments());
        self.current = faulting;
        self.resuming = saved_resuming;
        if global {
            self.handling = false;
        } else {
            self.frames[k].handling = false;
        }
        let here = StatementPath::new(saved_path.clone());
        self.frames[k].path = saved_path;
        let frame = self.frames[k].id;
        let kind = match result {
            Ok(Signal::Resume(kind)) | Err(Flow::Unwind(Signal::Resume(kind))) => kind,
            Ok(Signal::Continue) => return self.unhandled(error!(NoResume, Some(routine.end_line))),
            Ok(signal) | Err(Flow::Unwind(signal)) => return Ok(Outcome::Signal(signal)),
            Err(flow) => return Err(flow),
        };
        self.err = 0;
        let local = k == faulting;
        Ok(match kind {
            ResumeKind::Retry if local => Outcome::Retry,
            ResumeKind::Next if local => Outcome::Next,
            ResumeKind::Retry => Outcome::Signal(Signal::Jump { path: here, frame }),
            ResumeKind::Next => Outcome::Signal(Signal::Jump {
                path: here.next_sibling(),
                frame,
            }),
            ResumeKind::To(jump) => {
                let path = module
                    .target(jump)
                    .map(Target::resolved)
                    .ok_or_else(|| Flow::Fatal(error!(InternalError; "NO RESUME TARGET")))?;
                Outcome::Signal(Signal::Jump { path, frame })
            }
        })
    }

    // Statements

    fn execute(&mut self, statement: &Statement, resume: &[usize]) -> Exec<Signal> {
        match &statement.exec {
            Executable::Assign(place, expr) => {
                let val = self.eval(expr)?;
                self.locate(place)?.store(Store::Val(val))?;
            }
            Executable::Copy(to, from) => {
                let var = self.locate(from)?.variable()?;
                self.locate(to)?.store(Store::Var(var))?;
            }
            Executable::Print(ops) => self.print_ops(ops)?,
            Executable::Input { prompt, places } => self.input(prompt, places)?,
            Executable::LineInput { prompt, place } => {
                let line = self
                    .host
                    .input(prompt)
                    .ok_or_else(|| error!(InputPastEnd))?;
                self.column = 0;
                self.locate(place)?.store(Store::Val(Val::String(line)))?;
            }
            Executable::If { cond, then, r#else } => {
                if let Some((body, rest)) = resume.split_first() {
                    let seq = if *body == 0 { then } else { r#else };
                    return self.body(*body, seq, rest);
                }
                return if self.eval(cond)?.is_true()? {
                    self.body(0, then, &[])
                } else {
                    self.body(1, r#else, &[])
                };
            }
            Executable::For {
                id,
                counter,
                from,
                to,
                step,
                body,
            } => return self.for_loop(*id, counter, from, to, step.as_ref(), body, resume),
            Executable::While { cond, body } => {
                let mut entry = resume;
                loop {
                    let signal = match entry.split_first() {
                        Some((b, rest)) => self.body(*b, body, rest)?,
                        None => {
                            if !self.eval(cond)?.is_true()? {
                                break;
                            }
                            self.body(0, body, &[])?
                        }
                    };
                    entry = &[];
                    if signal != Signal::Continue {
                        return Ok(signal);
                    }
                }
            }
            Executable::Do { pre, post, body } => {
                let mut entry = resume;
                loop {
                    let signal = match entry.split_first() {
                        Some((b, rest)) => self.body(*b, body, rest)?,
                        None => {
                            if let Some(test) = pre {
                                if !self.test(test)? {
                                    break;
                                }
                            }
                            self.body(0, body, &[])?
                        }
                    };
                    entry = &[];
                    match signal {
                        Signal::Continue => {}
                        Signal::ExitLoop(ExitKind::Do) => break,
                        other => return Ok(other),
                    }
                    if let Some(test) = post {
                        if !self.test(test)? {
                            break;
                        }
                    }
                }
            }
            Executable::Goto(target) => return self.jump(*target),
            Executable::Gosub(target) => return self.gosub(*target),
            Executable::Return => {
                let path = self
                    .frame_mut()
                    .gosubs
                    .pop()
                    .ok_or_else(|| error!(ReturnWithoutGosub))?;
                let frame = self.frame().id;
                return Ok(Signal::Jump { path, frame });
            }
            Executable::OnGoto(index, targets) => {
                return match self.choose(index, targets)? {
                    Some(target) => self.jump(target),
                    None => Ok(Signal::Continue),
                };
            }
            Executable::OnGosub(index, targets) => {
                return match self.choose(index, targets)? {
                    Some(target) => self.gosub(target),
                    None => Ok(Signal::Continue),
                };
            }
            Executable::Call(id, args) => {
                self.call_routine(*id, args)?;
            }
            Executable::Dim(slot, bounds) => {
                let subscripts = self.subscripts(bounds)?;
                let cell = self.frame().cell(*slot)?;
                cell.borrow_mut().as_array_mut()?.dimension(subscripts)?;
            }
            Executable::Redim {
                slot,
                bounds,
                preserve,
            } => {
                let subscripts = self.subscripts(bounds)?;
                let cell = self.frame().cell(*slot)?;
                let mut var = cell.borrow_mut();
                let array = var.as_array_mut()?;
                if *preserve {
                    array.redim_preserve(subscripts)?;
                } else {
                    array.redim(subscripts)?;
                }
            }
            Executable::Erase(slots) => {
                for slot in slots {
                    let cell = self.frame().cell(*slot)?;
                    cell.borrow_mut().as_array_mut()?.erase();
                }
            }
            Executable::OnError { local, handler } => {
                if *local {
                    self.frame_mut().handler = handler.clone();
                } else {
                    self.handler = handler.clone();
                }
            }
            Executable::Resume(kind) => {
                if self.resuming != Some(self.current) {
                    return Err(error!(ResumeWithoutError).into());
                }
                return Ok(Signal::Resume(kind.clone()));
            }
            Executable::Error(code) => {
                let code = self.eval(code)?.to_i64()?;
                if !(1..=255).contains(&code) {
                    return Err(error!(IllegalFunctionCall).into());
                }
                return Err(Flow::Fault(Error::numbered(code as u16)));
            }
            Executable::Exit(ExitKind::Routine) => {
                return Ok(Signal::ExitRoutine(self.frame().id));
            }
            Executable::Exit(kind) => return Ok(Signal::ExitLoop(*kind)),
            Executable::Read(places) => self.read(places)?,
            Executable::Restore(index) => self.data_pos = *index,
            Executable::Swap(a, b) => {
                let a = self.locate(a)?;
                let b = self.locate(b)?;
                let (va, vb) = (a.get()?, b.get()?);
                a.store(Store::Val(vb))?;
                b.store(Store::Val(va))?;
            }
            Executable::Randomize(seed) => {
                let seed = match seed {
                    Some(e) => self.eval(e)?.to_f64()?,
                    None => self.host.timer(),
                };
                self.rng = StdRng::seed_from_u64(seed.to_bits());
            }
            Executable::Stop => match self.debugger.clone() {
                Some(debugger) => {
                    debugger
                        .report(PauseReason::Stop, statement.line, self.snapshot())
                        .map_err(|_| Flow::Terminated)?;
                }
                None => return Ok(Signal::EndProgram(0)),
            },
            Executable::End => return Ok(Signal::EndProgram(0)),
        }
        Ok(Signal::Continue)
    }

    #[allow(clippy::too_many_arguments)]
    fn for_loop(
        &mut self,
        id: LoopId,
        counter: &Place,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &[Statement],
        resume: &[usize],
    ) -> Exec<Signal> {
        let counter = self.locate(counter)?;
        if resume.is_empty() {
            let start = self.eval(from)?;
            let end = self.eval(to)?;
            let step = match step {
                Some(e) => self.eval(e)?,
                None => Val::Integer(1).convert(&end.data_type())?,
            };
            counter.store(Store::Val(start))?;
            self.frame_mut()
                .loops
                .insert(id, LoopState { to: end, step });
        } else if !self.frame().loops.contains_key(&id) {
            return Err(error!(NextWithoutFor).into());
        }
        let mut entry = resume;
        loop {
            let state = self
                .frame()
                .loops
                .get(&id)
                .cloned()
                .ok_or_else(|| error!(NextWithoutFor))?;
            let signal = match entry.split_first() {
                Some((b, rest)) => self.body(*b, body, rest)?,
                None => {
                    let op = if state.step.to_f64()? < 0.0 {
                        BinaryOp::GreaterEqual
                    } else {
                        BinaryOp::LessEqual
                    };
                    if !Operation::apply(op, counter.get()?, state.to.clone())?.is_true()? {
                        break;
                    }
                    self.body(0, body, &[])?
                }
            };
            entry = &[];
            match signal {
                Signal::Continue => {}
                Signal::ExitLoop(ExitKind::For) => break,
                other => return Ok(other),
            }
            let next = Operation::apply(BinaryOp::Add, counter.get()?, state.step)?;
            counter.store(Store::Val(next))?;
        }
        self.frame_mut().loops.remove(&id);
        Ok(Signal::Continue)
    }

    fn test(&mut self, test: &LoopTest) -> Exec<bool> {
        Ok(self.eval(&test.cond)?.is_true()? != test.until)
    }

    fn jump(&mut self, target: JumpId) -> Exec<Signal> {
        let path = self
            .module
            .target(target)
            .map(Target::resolved)
            .ok_or_else(|| error!(InternalError; "NO JUMP TARGET"))?;
        Ok(Signal::Jump {
            path,
            frame: self.frame().id,
        })
    }

    fn gosub(&mut self, target: JumpId) -> Exec<Signal> {
        let back = Target::after(self.frame().statement_path()).resolved();
        self.frame_mut().gosubs.push(back)?;
        self.jump(target)
    }

    /// The target an `ON ... GOTO` index picks, if any.
    fn choose(&mut self, index: &Expr, targets: &[JumpId]) -> Exec<Option<JumpId>> {
        let n = self.eval(index)?.to_i64()?;
        if !(0..=255).contains(&n) {
            return Err(error!(IllegalFunctionCall).into());
        }
        Ok(match n {
            0 => None,
            n => targets.get(n as usize - 1).copied(),
        })
    }

    fn subscripts(&mut self, bounds: &[(Expr, Expr)]) -> Exec<ArraySubscripts> {
        let mut pairs = vec![];
        for (lower, upper) in bounds {
            pairs.push((self.eval(lower)?.to_i32()?, self.eval(upper)?.to_i32()?));
        }
        Ok(ArraySubscripts::new(pairs)?)
    }

    fn print_ops(&mut self, ops: &[PrintOp]) -> Exec<()> {
        for op in ops {
            match op {
                PrintOp::Value(expr) => {
                    let s = self.eval(expr)?.print_string();
                    self.print(&s);
                }
                PrintOp::Zone => {
                    let next = (self.column / 14 + 1) * 14;
                    let pad = " ".repeat(next - self.column);
                    self.print(&pad);
                }
                PrintOp::Newline => self.print("\n"),
            }
        }
        Ok(())
    }

    fn input(&mut self, prompt: &str, places: &[Place]) -> Exec<()> {
        let mut locations = vec![];
        for place in places {
            locations.push(self.locate(place)?);
        }
        'redo: loop {
            let line = self
                .host
                .input(prompt)
                .ok_or_else(|| error!(InputPastEnd))?;
            self.column = 0;
            let fields = split_fields(&line);
            if fields.len() != locations.len() {
                self.print("?Redo from start\n");
                continue;
            }
            let mut values = vec![];
            for (field, location) in fields.iter().zip(&locations) {
                if location.is_string()? {
                    values.push(Val::String(unquote(field)));
                } else {
                    match parse_number(field) {
                        Some(n) => values.push(Val::Double(n)),
                        None => {
                            self.print("?Redo from start\n");
                            continue 'redo;
                        }
                    }
                }
            }
            for (value, location) in values.into_iter().zip(&locations) {
                location.store(Store::Val(value))?;
            }
            return Ok(());
        }
    }

    fn read(&mut self, places: &[Place]) -> Exec<()> {
        for place in places {
            let location = self.locate(place)?;
            let item = self
                .module
                .data
                .get(self.data_pos)
                .cloned()
                .ok_or_else(|| error!(OutOfData))?;
            self.data_pos += 1;
            let value = match (location.is_string()?, item) {
                (true, Val::String(s)) => Val::String(s),
                (true, n) => Val::String(n.to_string()),
                (false, Val::String(_)) => return Err(error!(SyntaxError).into()),
                (false, n) => n,
            };
            location.store(Store::Val(value))?;
        }
        Ok(())
    }

    // Values

    fn locate(&mut self, place: &Place) -> Exec<Location> {
        match place {
            Place::Slot(slot) => Ok(Location {
                cell: self.frame().cell(*slot)?,
                steps: vec![],
            }),
            Place::Element(slot, indices) => {
                let mut evaluated = vec![];
                for index in indices {
                    evaluated.push(self.eval(index)?.to_i32()?);
                }
                Ok(Location {
                    cell: self.frame().cell(*slot)?,
                    steps: vec![Step::Index(evaluated)],
                })
            }
            Place::Field(place, index) => {
                let mut location = self.locate(place)?;
                location.steps.push(Step::Field(*index));
                Ok(location)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Exec<Val> {
        Ok(match &expr.kind {
            ExprKind::Literal(val) => val.clone(),
            ExprKind::Load(place) => self.locate(place)?.get()?,
            ExprKind::Unary(op, operand) => {
                let val = self.eval(operand)?;
                Operation::unary(*op, val)?
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Operation::apply(*op, lhs, rhs)?
            }
            ExprKind::Convert(operand) => self.eval(operand)?.convert(&expr.data_type)?,
            ExprKind::Builtin(builtin, args) => {
                let mut vals = vec![];
                for arg in args {
                    vals.push(self.eval(arg)?);
                }
                Function::call(*builtin, vals, self)?
            }
            ExprKind::Call(id, args) => match self.call_routine(*id, args)? {
                Some(var) => var.get()?,
                None => return Err(Flow::Fatal(error!(InternalError; "SUB USED AS FUNCTION"))),
            },
            ExprKind::Bound { upper, slot, dim } => {
                let dim = match dim {
                    Some(e) => self.eval(e)?.to_i64()?,
                    None => 1,
                };
                let cell = self.frame().cell(*slot)?;
                let var = cell.borrow();
                let (lower, upper_bound) = var.as_array()?.bounds(dim.max(0) as usize)?;
                Val::Long(if *upper { upper_bound } else { lower })
            }
        })
    }

    // Calls

    fn bind_arguments(&mut self, routine: &Routine, args: &[Argument]) -> Exec<Vec<Binding>> {
        if args.len() != routine.params.len() {
            return Err(error!(ArgumentCountMismatch).into());
        }
        let mut bindings = vec![];
        for (param, arg) in routine.params.iter().zip(args) {
            bindings.push(match arg {
                Argument::Alias(slot) => Binding::Alias(self.frame().cell(*slot)?),
                Argument::Ref(place) => {
                    let location = self.locate(place)?;
                    Binding::Copy(location.variable()?, Some(location))
                }
                Argument::Value(expr) => {
                    let val = self.eval(expr)?;
                    let mut var = Variable::new(&param.data_type, &self.module.types);
                    var.set(val)?;
                    Binding::Copy(var, None)
                }
            });
        }
        Ok(bindings)
    }

    fn call_routine(&mut self, id: RoutineId, args: &[Argument]) -> Exec<Option<Variable>> {
        let module = self.module.clone();
        let routine = module
            .routine(id)
            .ok_or_else(|| error!(InternalError; "NO SUCH ROUTINE"))?;
        if routine.is_native() {
            return self.call_native(id, routine, args);
        }
        if self.frames.len() >= self.config.max_depth {
            return Err(error!(OutOfMemory; "CALLS NESTED TOO DEEPLY").into());
        }
        let bindings = self.bind_arguments(routine, args)?;
        let caller = self.current;
        let frame_id = self.next_id;
        self.next_id += 1;
        let mut frame = Frame::new(
            frame_id,
            id,
            routine,
            &module.types,
            Some(caller),
            self.config.max_gosub,
        )?;
        for (local, root) in &routine.shared {
            frame.bind(*local, self.frames[0].cell(*root)?)?;
        }
        let mut write_back = vec![];
        for (param, binding) in routine.params.iter().zip(bindings) {
            match binding {
                Binding::Alias(cell) => frame.bind(param.slot, cell)?,
                Binding::Copy(var, location) => {
                    let cell = Rc::new(RefCell::new(var));
                    if let Some(location) = location {
                        write_back.push((location, cell.clone()));
                    }
                    frame.bind(param.slot, cell)?;
                }
            }
        }
        debug!(routine = &*routine.name, depth = self.frames.len(), "enter");
        self.frames.push(frame);
        self.current = self.frames.len() - 1;
        if let Some(debugger) = &self.debugger {
            debugger.enter_routine();
        }
        let result = self.run_body(routine, &[]);
        if let Some(debugger) = &self.debugger {
            debugger.leave_routine();
        }
        let frame = self.frames.pop();
        self.current = caller;
        debug!(routine = &*routine.name, "leave");
        match result {
            Ok(Signal::Continue) => {}
            Ok(Signal::ExitRoutine(f)) | Err(Flow::Unwind(Signal::ExitRoutine(f))) if f == frame_id => {}
            Ok(signal) => return Err(Flow::Unwind(signal)),
            Err(flow) => return Err(flow),
        }
        for (location, cell) in write_back {
            let value = cell.borrow().clone();
            location.store(Store::Var(value))?;
        }
        Ok(match (frame, routine.return_slot) {
            (Some(frame), Some(slot)) => Some(frame.cell(slot)?.borrow().clone()),
            _ => None,
        })
    }

    fn call_native(
        &mut self,
        id: RoutineId,
        routine: &Routine,
        args: &[Argument],
    ) -> Exec<Option<Variable>> {
        let bindings = self.bind_arguments(routine, args)?;
        let module = self.module.clone();
        let procedure = self
            .natives
            .get_mut(&native_key(&routine.name))
            .ok_or_else(|| error!(IllegalFunctionCall; "NATIVE PROCEDURE NOT REGISTERED"))?;
        let thunk = self
            .marshal
            .thunk(id, routine, &procedure.signature(), &module.types)?;
        let mut vars: Vec<Variable> = bindings
            .iter()
            .map(|b| match b {
                Binding::Alias(cell) => cell.borrow().clone(),
                Binding::Copy(var, _) => var.clone(),
            })
            .collect();
        trace!(routine = &*routine.name, "native call");
        let result = thunk.call(procedure.as_mut(), &mut vars, &module.types)?;
        for (binding, var) in bindings.into_iter().zip(vars) {
            match binding {
                Binding::Alias(cell) => *cell.borrow_mut() = var,
                Binding::Copy(_, Some(location)) => location.store(Store::Var(var))?,
                Binding::Copy(_, None) => {}
            }
        }
        Ok(result)
    }
}

impl Context for Runtime {
    fn rnd(&mut self, arg: Option<f64>) -> f32 {
        match arg {
            Some(n) if n < 0.0 => {
                self.rng = StdRng::seed_from_u64(n.to_bits());
                self.last_rnd = self.rng.gen();
            }
            Some(n) if n == 0.0 => {}
            _ => self.last_rnd = self.rng.gen(),
        }
        self.last_rnd
    }

    fn timer(&self) -> f64 {
        self.host.timer()
    }

    fn err(&self) -> u16 {
        self.err
    }

    fn erl(&self) -> u32 {
        self.erl
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("frames", &self.frames.len())
            .field("current", &self.current)
            .field("err", &self.err)
            .field("natives", &self.natives.len())
            .field("thunks", &self.marshal.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::host::Capture;

    fn run(source: &str) -> (String, std::result::Result<i32, RunError>) {
        let capture = Capture::new();
        let mut runtime = Runtime::from_source(source, capture.clone()).unwrap();
        let result = runtime.run();
        (capture.output(), result)
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("1, \"a,b\" ,3"), vec!["1", " \"a,b\" ", "3"]);
        assert_eq!(unquote(" \"a,b\" "), "a,b");
        assert_eq!(parse_number(" 12 "), Some(12.0));
        assert_eq!(parse_number("1D2"), Some(100.0));
        assert_eq!(parse_number("x"), None);
    }

    #[test]
    fn test_print_zones() {
        let (out, _) = run("PRINT 1, \"AB\"; \"C\"\nPRINT \"X\",\n");
        assert_eq!(out, format!(" 1 {}ABC\nX{}", " ".repeat(11), " ".repeat(13)));
    }

    #[test]
    fn test_end_code_and_unhandled() {
        let (out, result) = run("PRINT 1\nEND\nPRINT 2\n");
        assert_eq!(out, " 1 \n");
        assert_eq!(result, Ok(0));
        let (_, result) = run("X% = 1\nY% = X% / 0\n");
        let e = result.unwrap_err();
        assert_eq!(e.error().map(|e| e.code()), Some(11));
        assert_eq!(e.error().and_then(|e| e.line()), Some(2));
    }

    #[test]
    fn test_resume_without_error() {
        let (_, result) = run("RESUME NEXT\n");
        assert_eq!(result.unwrap_err().error().map(|e| e.code()), Some(20));
    }

    #[test]
    fn test_call_from_host() {
        let mut runtime = Runtime::from_source(
            "FUNCTION TWICE%(N AS INTEGER)\nTWICE% = N * 2\nEND FUNCTION\n",
            Capture::new(),
        )
        .unwrap();
        assert_eq!(runtime.call("twice", vec![Val::Integer(21)]), Ok(Variable::Integer(42)));
        let e = runtime.call("nope", vec![]).unwrap_err();
        assert_eq!(e.error().map(|e| e.code()), Some(35));
    }

    #[test]
    fn test_depth_limit() {
        let source = "SUB R\nCALL R\nEND SUB\nCALL R\n";
        let capture = Capture::new();
        let mut runtime = Runtime::from_source(source, capture)
            .unwrap()
            .with_config(RuntimeConfig {
                max_depth: 16,
                ..RuntimeConfig::default()
            });
        let e = runtime.run().unwrap_err();
        assert_eq!(e.error().map(|e| e.code()), Some(7));
    }
}
