//! # QBX BASIC
//!
//! A compiler and interpreter for the QuickBASIC dialect of BASIC:
//! typed variables, user defined `TYPE` records, block `IF`, `SUB` and
//! `FUNCTION` procedures, structured error handling, and host supplied
//! native procedures declared with `DECLARE ... LIB`.
//!
//! ```
//! use qbx::mach::{Capture, Runtime};
//!
//! let capture = Capture::new();
//! let mut runtime = Runtime::from_source("PRINT 6 * 7\n", capture.clone()).unwrap();
//! runtime.run().unwrap();
//! assert_eq!(capture.output(), " 42 \n");
//! ```
//!
//! Programs run on the calling thread. A [`mach::Debugger`] handle can be
//! cloned into other threads to break, step and terminate a running
//! program.

pub mod lang;
pub mod mach;

pub use mach::{compile, RunError, Runtime, RuntimeConfig};
