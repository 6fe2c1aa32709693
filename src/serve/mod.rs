//! Script serving on top of an external execution engine.
//!
//! The engine itself is not part of this crate. [`Executor`] is the seam:
//! it receives a document root, a script name, the variable map and the
//! original request, and returns a response.

mod executor;
mod handler;

pub use executor::{ExecRequest, Executor};
pub use handler::ScriptHandler;
