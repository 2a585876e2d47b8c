//! Pausing a running program from another thread.
//!
//! The execution thread reports at every statement boundary and at routine
//! entry and exit. A controller thread steers it with the methods on
//! [`Debugger`]. Each pause bumps a generation counter; the controller
//! remembers the last generation it saw, so waiting right after a
//! `continue_execution` never returns the pause it just released.

use crate::lang::Error;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    Break,
    Step,
    Breakpoint,
    Watchpoint,
    Stop,
    /// An error no handler caught. The statement is retried on resume.
    Fault(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    Paused { reason: PauseReason, line: usize },
    Finished,
    Terminated,
}

/// One entry of a stack snapshot, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub routine: String,
    pub line: usize,
}

/// The controller asked for the program to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    Break,
    Step,
    /// Pause once the call depth is back to this or shallower.
    StepOver(usize),
}

#[derive(Debug)]
struct State {
    mode: Mode,
    generation: u64,
    observed: u64,
    paused: bool,
    depth: usize,
    breakpoints: HashSet<usize>,
    terminated: bool,
    finished: bool,
    interruption: Option<Interruption>,
    stack: Vec<FrameInfo>,
    error: Option<Error>,
}

struct Shared {
    state: Mutex<State>,
    signal: Condvar,
}

/// Handle shared by the runtime and its controller.
#[derive(Clone)]
pub struct Debugger {
    shared: Arc<Shared>,
}

impl Default for Debugger {
    fn default() -> Self {
        Debugger::new()
    }
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.shared.state.lock())
    }
}

impl Debugger {
    pub fn new() -> Debugger {
        Debugger {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    mode: Mode::Run,
                    generation: 0,
                    observed: 0,
                    paused: false,
                    depth: 0,
                    breakpoints: HashSet::new(),
                    terminated: false,
                    finished: false,
                    interruption: None,
                    stack: vec![],
                    error: None,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    fn resume(&self, mode: Mode) {
        let mut state = self.shared.state.lock();
        state.mode = mode;
        state.paused = false;
        state.error = None;
        self.shared.signal.notify_all();
    }

    pub fn continue_execution(&self) {
        self.resume(Mode::Run);
    }

    pub fn execute_one_statement(&self) {
        self.resume(Mode::Step);
    }

    /// Run until the next statement at the current call depth or above,
    /// skipping over any routine called in between.
    pub fn step_over_next_routine(&self) {
        let depth = self.shared.state.lock().depth;
        self.resume(Mode::StepOver(depth));
    }

    /// Pause at the next statement boundary.
    pub fn break_(&self) {
        self.shared.state.lock().mode = Mode::Break;
    }

    /// Stop the program for good. Safe to call from any thread.
    pub fn terminate(&self) {
        let mut state = self.shared.state.lock();
        state.terminated = true;
        state.paused = false;
        self.shared.signal.notify_all();
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Block until the program pauses, finishes or is terminated.
    pub fn wait_for_interruption(&self) -> Interruption {
        let mut state = self.shared.state.lock();
        loop {
            if state.terminated {
                return Interruption::Terminated;
            }
            if state.generation > state.observed {
                state.observed = state.generation;
                return state.interruption.clone().unwrap_or(Interruption::Finished);
            }
            if state.finished {
                return Interruption::Finished;
            }
            self.shared.signal.wait(&mut state);
        }
    }

    pub fn stack(&self) -> Vec<FrameInfo> {
        self.shared.state.lock().stack.clone()
    }

    pub fn current_error(&self) -> Option<Error> {
        self.shared.state.lock().error.clone()
    }

    pub fn set_breakpoint(&self, line: usize) {
        self.shared.state.lock().breakpoints.insert(line);
    }

    pub fn clear_breakpoint(&self, line: usize) {
        self.shared.state.lock().breakpoints.remove(&line);
    }

    // Execution thread

    pub(crate) fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.depth = 0;
        state.finished = false;
        state.paused = false;
        state.stack.clear();
        state.error = None;
    }

    pub(crate) fn enter_routine(&self) {
        self.shared.state.lock().depth += 1;
    }

    pub(crate) fn leave_routine(&self) {
        let mut state = self.shared.state.lock();
        state.depth = state.depth.saturating_sub(1);
    }

    /// Called before every statement. Blocks while paused.
    pub(crate) fn statement_boundary<F>(
        &self,
        line: usize,
        watch: bool,
        stack: F,
    ) -> Result<(), Terminated>
    where
        F: FnOnce() -> Vec<FrameInfo>,
    {
        let mut state = self.shared.state.lock();
        if state.terminated {
            return Err(Terminated);
        }
        let reason = if state.breakpoints.contains(&line) {
            PauseReason::Breakpoint
        } else if watch {
            PauseReason::Watchpoint
        } else {
            match state.mode {
                Mode::Run => return Ok(()),
                Mode::StepOver(depth) if state.depth > depth => return Ok(()),
                Mode::Break => PauseReason::Break,
                Mode::Step | Mode::StepOver(_) => PauseReason::Step,
            }
        };
        state.stack = stack();
        self.pause(state, reason, line)
    }

    /// Pause on an unhandled fault or a `STOP` statement.
    pub(crate) fn report(
        &self,
        reason: PauseReason,
        line: usize,
        stack: Vec<FrameInfo>,
    ) -> Result<(), Terminated> {
        let mut state = self.shared.state.lock();
        if state.terminated {
            return Err(Terminated);
        }
        state.stack = stack;
        self.pause(state, reason, line)
    }

    fn pause(
        &self,
        mut state: parking_lot::MutexGuard<State>,
        reason: PauseReason,
        line: usize,
    ) -> Result<(), Terminated> {
        debug!(line, ?reason, "paused");
        if let PauseReason::Fault(error) = &reason {
            state.error = Some(error.clone());
        }
        state.mode = Mode::Run;
        state.paused = true;
        state.generation += 1;
        state.interruption = Some(Interruption::Paused { reason, line });
        self.shared.signal.notify_all();
        while state.paused && !state.terminated {
            self.shared.signal.wait(&mut state);
        }
        if state.terminated {
            Err(Terminated)
        } else {
            Ok(())
        }
    }

    pub(crate) fn finish(&self) {
        let mut state = self.shared.state.lock();
        state.finished = true;
        state.generation += 1;
        state.interruption = Some(Interruption::Finished);
        self.shared.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_generation_counter() {
        let debugger = Debugger::new();
        debugger.break_();
        let worker = debugger.clone();
        let handle = thread::spawn(move || {
            worker.statement_boundary(1, false, Vec::new).unwrap();
            worker.statement_boundary(2, false, Vec::new).unwrap();
            worker.finish();
        });
        assert_eq!(
            debugger.wait_for_interruption(),
            Interruption::Paused {
                reason: PauseReason::Break,
                line: 1
            }
        );
        debugger.continue_execution();
        assert_eq!(debugger.wait_for_interruption(), Interruption::Finished);
        handle.join().unwrap();
    }

    #[test]
    fn test_step_over_depth() {
        let debugger = Debugger::new();
        debugger.set_breakpoint(1);
        let worker = debugger.clone();
        let handle = thread::spawn(move || {
            worker.statement_boundary(1, false, Vec::new).unwrap();
            worker.enter_routine();
            worker.statement_boundary(10, false, Vec::new).unwrap();
            worker.leave_routine();
            worker.statement_boundary(2, false, Vec::new).unwrap();
            worker.finish();
        });
        assert!(matches!(
            debugger.wait_for_interruption(),
            Interruption::Paused { line: 1, .. }
        ));
        debugger.step_over_next_routine();
        assert_eq!(
            debugger.wait_for_interruption(),
            Interruption::Paused {
                reason: PauseReason::Step,
                line: 2
            }
        );
        debugger.continue_execution();
        assert_eq!(debugger.wait_for_interruption(), Interruption::Finished);
        handle.join().unwrap();
    }

    #[test]
    fn test_terminate_while_paused() {
        let debugger = Debugger::new();
        debugger.break_();
        let worker = debugger.clone();
        let handle = thread::spawn(move || worker.statement_boundary(5, false, Vec::new));
        assert!(matches!(
            debugger.wait_for_interruption(),
            Interruption::Paused { line: 5, .. }
        ));
        debugger.terminate();
        assert_eq!(handle.join().unwrap(), Err(Terminated));
        assert_eq!(debugger.wait_for_interruption(), Interruption::Terminated);
    }
}
