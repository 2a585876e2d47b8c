use chrono::{Local, Timelike};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

/// Services the interpreter borrows from its surroundings.
pub trait Host {
    fn print(&mut self, s: &str);

    /// One line of input without its line ending, or `None` at end of input.
    fn input(&mut self, prompt: &str) -> Option<String>;

    /// Seconds since midnight.
    fn timer(&self) -> f64 {
        let now = Local::now();
        now.num_seconds_from_midnight() as f64 + now.nanosecond() as f64 / 1e9
    }

    /// Monotonic clock ticks at 18.2 per second.
    fn ticks(&self) -> u64;
}

/// Standard input and output.
#[derive(Debug)]
pub struct Console {
    started: Instant,
}

impl Default for Console {
    fn default() -> Console {
        Console {
            started: Instant::now(),
        }
    }
}

impl Host for Console {
    fn print(&mut self, s: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(s.as_bytes());
        let _ = lock.flush();
    }

    fn input(&mut self, prompt: &str) -> Option<String> {
        self.print(prompt);
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
        }
    }

    fn ticks(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() * 18.2) as u64
    }
}

/// Records output and replays queued input lines. Clones share state,
/// so one copy can be handed to a runtime and another inspected.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    output: Arc<Mutex<String>>,
    input: Arc<Mutex<VecDeque<String>>>,
}

impl Capture {
    pub fn new() -> Capture {
        Capture::default()
    }

    pub fn with_input<I, S>(lines: I) -> Capture
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capture = Capture::default();
        capture.input.lock().extend(lines.into_iter().map(Into::into));
        capture
    }

    pub fn output(&self) -> String {
        self.output.lock().clone()
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock())
    }
}

impl Host for Capture {
    fn print(&mut self, s: &str) {
        self.output.lock().push_str(s);
    }

    fn input(&mut self, prompt: &str) -> Option<String> {
        let line = self.input.lock().pop_front();
        let mut output = self.output.lock();
        output.push_str(prompt);
        if let Some(line) = &line {
            output.push_str(line);
            output.push('\n');
        }
        line
    }

    fn timer(&self) -> f64 {
        0.0
    }

    /// The clock stands still so output stays reproducible.
    fn ticks(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture() {
        let capture = Capture::with_input(vec!["42"]);
        let mut host = capture.clone();
        host.print("HI\n");
        assert_eq!(host.input("? "), Some("42".to_string()));
        assert_eq!(host.input("? "), None);
        assert_eq!(capture.output(), "HI\n? 42\n? ");
        assert_eq!(capture.take_output().len(), 10);
        assert!(capture.output().is_empty());
    }

    #[test]
    fn test_console_ticks_never_go_back() {
        let console = Console::default();
        let first = console.ticks();
        std::thread::sleep(std::time::Duration::from_millis(120));
        let second = console.ticks();
        assert!(second >= first);
        assert!(second >= 1);
    }
}
