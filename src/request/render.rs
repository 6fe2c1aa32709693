//! Render callbacks keyed by route pattern.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method, Uri};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::BoxError;

/// What a render callback sees of the request.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request URI.
    pub uri: &'a Uri,
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Path parameters extracted from the matched route.
    pub params: &'a BTreeMap<String, String>,
}

/// Callback producing extra variables for one route.
///
/// Each returned entry becomes `<PREFIX>_VAR_<name>`.
pub type RenderFn =
    Arc<dyn Fn(&RenderContext<'_>) -> Result<Map<String, Value>, BoxError> + Send + Sync>;

/// Registry of render callbacks, owned by the serving component.
#[derive(Default)]
pub struct RenderRegistry {
    callbacks: RwLock<FxHashMap<String, RenderFn>>,
}

impl RenderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `pattern`, replacing any previous one.
    pub fn register<F>(&self, pattern: impl Into<String>, callback: F)
    where
        F: Fn(&RenderContext<'_>) -> Result<Map<String, Value>, BoxError> + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        tracing::debug!(pattern = %pattern, "registered render callback");
        self.callbacks.write().insert(pattern, Arc::new(callback));
    }

    /// Remove the callback for `pattern`. Returns whether one was registered.
    pub fn unregister(&self, pattern: &str) -> bool {
        self.callbacks.write().remove(pattern).is_some()
    }

    /// The callback for `pattern`.
    pub fn get(&self, pattern: &str) -> Option<RenderFn> {
        self.callbacks.read().get(pattern).cloned()
    }

    /// Registered patterns, sorted.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.callbacks.read().keys().cloned().collect();
        patterns.sort();
        patterns
    }

    /// Get the number of callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRegistry")
            .field("patterns", &self.patterns())
            .finish()
    }
}
