//! Boundary to the execution engine.

use std::path::PathBuf;

use bytes::Bytes;
use http::{Request, Response};

use crate::error::Result;
use crate::request::EnvVars;

/// Everything the execution engine needs to run one script.
///
/// `document_root` always exists and `script_name` always names a regular
/// file directly beneath it. The environment map never overrides the script
/// filename: routing happens through these two paths only.
#[derive(Debug)]
pub struct ExecRequest {
    /// Directory containing the script.
    pub document_root: PathBuf,
    /// `/` + script file name.
    pub script_name: String,
    /// Prefixed variables for the script.
    pub env: EnvVars,
    /// The inbound request, with its URI path replaced by `script_name`.
    pub request: Request<Bytes>,
}

impl ExecRequest {
    /// Physical path of the script.
    pub fn script_path(&self) -> PathBuf {
        self.document_root.join(self.script_name.trim_start_matches('/'))
    }
}

/// A runtime that executes a script in a prepared environment.
///
/// Implementations wrap engine failures in [`Error::Execution`](crate::Error::Execution).
pub trait Executor: Send + Sync {
    /// Response body type produced by the engine.
    type Body;

    /// Execute the script described by `request`.
    fn execute(&self, request: ExecRequest) -> Result<Response<Self::Body>>;
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    type Body = E::Body;

    fn execute(&self, request: ExecRequest) -> Result<Response<Self::Body>> {
        (**self).execute(request)
    }
}
