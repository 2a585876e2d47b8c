#![allow(dead_code)]

use qbx::mach::{Capture, RunError, Runtime};

/// Run a program and return what it printed. A run that fails appends
/// the error on its own line.
pub fn run(source: &str) -> String {
    run_with_input(source, Vec::<&str>::new())
}

pub fn run_with_input(source: &str, input: Vec<&str>) -> String {
    let capture = Capture::with_input(input);
    let mut runtime = match Runtime::from_source(source, capture.clone()) {
        Ok(runtime) => runtime,
        Err(error) => return format!("{}\n", error),
    };
    let result = runtime.run();
    let mut s = capture.output();
    if let Err(error) = result {
        s.push_str(&format!("{}\n", error));
    }
    s
}

/// The error a failing program stops with.
pub fn fail(source: &str) -> RunError {
    let mut runtime = match Runtime::from_source(source, Capture::new()) {
        Ok(runtime) => runtime,
        Err(error) => return error,
    };
    match runtime.run() {
        Ok(code) => panic!("program ended with {}", code),
        Err(error) => error,
    }
}

pub fn code(error: &RunError) -> u16 {
    error.error().map(|e| e.code()).unwrap_or(0)
}
