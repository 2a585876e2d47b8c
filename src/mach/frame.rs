use super::array::ArraySubscripts;
use super::path::StatementPath;
use super::program::{Handler, LoopId, Routine, RoutineId, Slot};
use super::stack::Stack;
use super::types::TypeTable;
use super::var::Variable;
use super::Val;
use crate::error;
use crate::lang::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// Shared storage for one variable. Aliased slots hold the same cell.
pub type Cell = Rc<RefCell<Variable>>;

/// Saved bounds of a running FOR loop, so a jump back into its body
/// can carry on counting.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub to: Val,
    pub step: Val,
}

/// Activation record of one routine call.
#[derive(Debug)]
pub struct Frame {
    pub id: usize,
    pub routine: RoutineId,
    /// Index of the calling frame.
    pub caller: Option<usize>,
    pub slots: Vec<Cell>,
    pub gosubs: Stack<StatementPath>,
    pub loops: HashMap<LoopId, LoopState>,
    pub handler: Handler,
    pub handling: bool,
    /// Statement and body indices down to the executing statement.
    pub path: Vec<usize>,
    pub line: usize,
}

impl Frame {
    pub fn new(
        id: usize,
        routine_id: RoutineId,
        routine: &Routine,
        types: &TypeTable,
        caller: Option<usize>,
        gosub_limit: usize,
    ) -> Result<Frame> {
        let mut slots = Vec::with_capacity(routine.slots.len());
        for info in &routine.slots {
            let mut var = Variable::new(&info.data_type, types);
            if let Some(rank) = info.auto_dim {
                var.as_array_mut()?.dimension(ArraySubscripts::auto(rank))?;
            }
            slots.push(Rc::new(RefCell::new(var)));
        }
        Ok(Frame {
            id,
            routine: routine_id,
            caller,
            slots,
            gosubs: Stack::new(gosub_limit, "GOSUB NESTED TOO DEEPLY"),
            loops: HashMap::new(),
            handler: Handler::Off,
            handling: false,
            path: vec![],
            line: 0,
        })
    }

    pub fn cell(&self, slot: Slot) -> Result<Cell> {
        self.slots
            .get(slot)
            .cloned()
            .ok_or_else(|| error!(InternalError; "NO SUCH SLOT"))
    }

    /// Make `slot` an alias of another frame's variable.
    pub fn bind(&mut self, slot: Slot, cell: Cell) -> Result<()> {
        match self.slots.get_mut(slot) {
            Some(s) => {
                *s = cell;
                Ok(())
            }
            None => Err(error!(InternalError; "NO SUCH SLOT")),
        }
    }

    pub fn statement_path(&self) -> StatementPath {
        StatementPath::new(self.path.clone())
    }
}

/// Read-only look at a frame for watchpoints.
pub struct FrameView<'a> {
    pub(crate) routine: &'a Routine,
    pub(crate) frame: &'a Frame,
}

impl<'a> FrameView<'a> {
    pub fn routine(&self) -> &str {
        &self.routine.name
    }

    pub fn line(&self) -> usize {
        self.frame.line
    }

    /// Current value of a scalar variable. The suffix may be left off
    /// when it is unambiguous.
    pub fn value(&self, name: &str) -> Option<Val> {
        let name = name.to_ascii_uppercase();
        let slot = self
            .routine
            .slots
            .iter()
            .position(|s| *s.name == *name && s.data_type.is_scalar())
            .or_else(|| {
                self.routine.slots.iter().position(|s| {
                    s.data_type.is_scalar()
                        && s.name.trim_end_matches(|c| "%&!#@$".contains(c)) == name
                })
            })?;
        self.frame.slots.get(slot)?.borrow().get().ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::mach::compile;

    use super::*;

    #[test]
    fn test_new_frame() {
        let module = compile("DIM A(3) AS INTEGER\nB(2) = 1\nC$ = \"X\"\n").unwrap();
        let main = &module.routines[0];
        let frame = Frame::new(0, 0, main, &module.types, None, 10).unwrap();
        let auto = main
            .slots
            .iter()
            .position(|s| s.auto_dim.is_some())
            .unwrap();
        let cell = frame.cell(auto).unwrap();
        let bounds = cell.borrow().as_array().unwrap().bounds(1).unwrap();
        assert_eq!(bounds, (0, 10));
        assert!(frame.cell(99).is_err());
        let view = FrameView {
            routine: main,
            frame: &frame,
        };
        assert_eq!(view.value("c$"), Some(Val::String(String::new())));
        assert_eq!(view.value("C"), Some(Val::String(String::new())));
        assert_eq!(view.value("missing"), None);
    }
}
