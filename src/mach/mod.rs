/*!
## Rust Machine Module

This Rust module compiles parsed BASIC into a tree of executable
statements and runs it.

[`compile`] turns source into a [`Module`]. A [`Runtime`] executes the
module against a [`Host`], optionally under a [`Debugger`] driven from
another thread. Routines declared with `DECLARE ... LIB` are served by
[`NativeProcedure`]s registered on the runtime.

*/

mod array;
mod compile;
mod currency;
mod debug;
mod frame;
mod function;
mod host;
mod marshal;
mod operation;
mod path;
mod program;
mod runtime;
mod scope;
mod stack;
mod types;
mod val;
mod var;

pub use array::{Array, ArraySubscripts};
pub use compile::compile;
pub use currency::Currency;
pub use debug::{Debugger, FrameInfo, Interruption, PauseReason};
pub use frame::FrameView;
pub use function::{Builtin, Function};
pub use host::{Capture, Console, Host};
pub use marshal::{
    HostError, NativeElement, NativeFn, NativeParam, NativeProcedure, NativeSignature,
    NativeType, NativeValue, Passing,
};
pub use operation::{BinaryOp, Operation, UnaryOp};
pub use path::StatementPath;
pub use program::{Module, Routine, RoutineKind};
pub use runtime::{RunError, Runtime, RuntimeConfig};
pub use stack::Stack;
pub use types::{DataType, TypeTable};
pub use val::Val;
pub use var::{latin1_decode, latin1_encode, Variable};
