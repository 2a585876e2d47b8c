use ansi_term::Style;
use qbx::error;
use qbx::lang::Error;
use qbx::mach::{Console, Debugger, Interruption, PauseReason, RunError, Runtime, RuntimeConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("usage: qbx [--trace] file.bas");
    std::process::exit(2);
}

fn load(filename: &str) -> Result<String, Error> {
    std::fs::read(filename)
        .map(|bytes| qbx::mach::latin1_decode(&bytes))
        .map_err(|error| {
            let msg = error.to_string();
            match error.kind() {
                std::io::ErrorKind::NotFound => error!(FileNotFound; msg),
                _ => error!(InternalError; msg),
            }
        })
}

fn report(message: &str) {
    eprintln!("{}", Style::new().bold().paint(message));
}

fn main() {
    let mut trace = false;
    let mut filename = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trace" => trace = true,
            _ if arg.starts_with("--") => usage(),
            _ if filename.is_none() => filename = Some(arg),
            _ => usage(),
        }
    }
    let filename = filename.unwrap_or_else(|| usage());

    let filter = if trace {
        EnvFilter::new("qbx=trace")
    } else {
        EnvFilter::try_from_env("QBX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let source = match load(&filename) {
        Ok(source) => source,
        Err(error) => {
            report(&error.to_string());
            std::process::exit(1);
        }
    };
    let mut runtime = match Runtime::from_source(&source, Console::default()) {
        Ok(runtime) => runtime.with_config(RuntimeConfig {
            pause_on_fault: false,
            ..RuntimeConfig::default()
        }),
        Err(error) => {
            report(&error.to_string());
            std::process::exit(1);
        }
    };

    let debugger = Debugger::new();
    runtime.attach_debugger(&debugger);
    let presses = AtomicUsize::new(0);
    let interrupt = debugger.clone();
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            interrupt.break_();
        } else {
            interrupt.terminate();
        }
    })
    .expect("Error setting Ctrl-C handler");

    let controller = debugger.clone();
    thread::spawn(move || loop {
        match controller.wait_for_interruption() {
            Interruption::Paused { reason, line } => {
                match reason {
                    PauseReason::Fault(error) => report(&error.to_string()),
                    PauseReason::Stop => report(&format!("STOP IN {}", line)),
                    _ => report(&format!("BREAK IN {}", line)),
                }
                controller.terminate();
            }
            Interruption::Finished | Interruption::Terminated => break,
        }
    });

    let code = match runtime.run() {
        Ok(code) => code,
        Err(RunError::Terminated) => 130,
        Err(error) => {
            report(&error.to_string());
            1
        }
    };
    std::process::exit(code);
}
