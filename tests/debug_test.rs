use pretty_assertions::assert_eq;
use qbx::mach::{Capture, Debugger, FrameView, Interruption, PauseReason, RunError, Runtime, Val};
use std::thread;

/// Run `source` on its own thread under `debugger`.
fn spawn(
    source: &'static str,
    debugger: &Debugger,
    capture: &Capture,
) -> thread::JoinHandle<Result<i32, RunError>> {
    let debugger = debugger.clone();
    let capture = capture.clone();
    thread::spawn(move || {
        let mut runtime = Runtime::from_source(source, capture).unwrap();
        runtime.attach_debugger(&debugger);
        runtime.run()
    })
}

const NESTED: &str = "SUB C
PRINT \"c\"
END SUB
SUB B
CALL C
END SUB
SUB A
CALL B
END SUB
PRINT \"start\"
CALL A
PRINT \"end\"
";

#[test]
fn test_step_over_nested_calls() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    debugger.set_breakpoint(11);
    let handle = spawn(NESTED, &debugger, &capture);
    assert_eq!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Breakpoint,
            line: 11
        }
    );
    assert_eq!(capture.output(), "start\n");
    debugger.step_over_next_routine();
    assert_eq!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Step,
            line: 12
        }
    );
    assert_eq!(capture.output(), "start\nc\n");
    debugger.continue_execution();
    assert_eq!(debugger.wait_for_interruption(), Interruption::Finished);
    assert_eq!(handle.join().unwrap(), Ok(0));
    assert_eq!(capture.output(), "start\nc\nend\n");
}

#[test]
fn test_stack_snapshot_and_single_step() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    debugger.set_breakpoint(2);
    let handle = spawn(NESTED, &debugger, &capture);
    assert!(matches!(
        debugger.wait_for_interruption(),
        Interruption::Paused { line: 2, .. }
    ));
    let stack: Vec<(String, usize)> = debugger
        .stack()
        .into_iter()
        .map(|f| (f.routine.to_ascii_uppercase(), f.line))
        .collect();
    assert_eq!(
        stack,
        vec![
            ("<MAIN>".to_string(), 11),
            ("A".to_string(), 8),
            ("B".to_string(), 5),
            ("C".to_string(), 2),
        ]
    );
    debugger.clear_breakpoint(2);
    debugger.execute_one_statement();
    assert_eq!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Step,
            line: 12
        }
    );
    debugger.continue_execution();
    assert_eq!(debugger.wait_for_interruption(), Interruption::Finished);
    assert_eq!(handle.join().unwrap(), Ok(0));
}

#[test]
fn test_terminate_while_paused() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    let handle = spawn("DO\nn& = n& + 1\nLOOP\n", &debugger, &capture);
    debugger.break_();
    assert!(matches!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Break,
            ..
        }
    ));
    debugger.terminate();
    assert_eq!(handle.join().unwrap(), Err(RunError::Terminated));
    assert_eq!(debugger.wait_for_interruption(), Interruption::Terminated);
    assert!(debugger.is_terminated());
}

#[test]
fn test_fault_pauses_and_retries() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    let handle = spawn("d% = 0\nx% = 10 \\ d%\nPRINT x%\n", &debugger, &capture);
    match debugger.wait_for_interruption() {
        Interruption::Paused {
            reason: PauseReason::Fault(error),
            line,
        } => {
            assert_eq!(error.code(), 11);
            assert_eq!(line, 2);
        }
        other => panic!("{:?}", other),
    }
    assert_eq!(debugger.current_error().map(|e| e.code()), Some(11));
    debugger.continue_execution();
    assert!(matches!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Fault(_),
            line: 2
        }
    ));
    debugger.terminate();
    assert_eq!(handle.join().unwrap(), Err(RunError::Terminated));
}

#[test]
fn test_stop_statement() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    let handle = spawn("PRINT 1\nSTOP\nPRINT 2\n", &debugger, &capture);
    assert_eq!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Stop,
            line: 2
        }
    );
    debugger.continue_execution();
    assert_eq!(debugger.wait_for_interruption(), Interruption::Finished);
    assert_eq!(handle.join().unwrap(), Ok(0));
    assert_eq!(capture.output(), " 1 \n 2 \n");
}

#[test]
fn test_watchpoint() {
    let debugger = Debugger::new();
    let capture = Capture::new();
    let worker = debugger.clone();
    let handle = thread::spawn(move || {
        let source = "FOR i% = 1 TO 10\ntotal% = total% + i%\nNEXT i%\n";
        let mut runtime = Runtime::from_source(source, capture).unwrap();
        runtime.attach_debugger(&worker);
        runtime.set_watchpoint(|view: &FrameView| {
            matches!(view.value("total%"), Some(Val::Integer(n)) if n > 10)
        });
        let result = runtime.run();
        (result, runtime.main_value("i%"))
    });
    assert_eq!(
        debugger.wait_for_interruption(),
        Interruption::Paused {
            reason: PauseReason::Watchpoint,
            line: 2
        }
    );
    debugger.terminate();
    let (result, i) = handle.join().unwrap();
    assert_eq!(result, Err(RunError::Terminated));
    assert_eq!(i, Some(Val::Integer(6)));
}
