//! Request handler wiring the VFS, the environment cache and an executor.
//!
//! ```text
//! Request<Bytes> + MatchedRoute
//!     │
//!     ├─► VirtualFs::environment_for(script)     resolve + refresh
//!     ├─► verify script file                     one rebuild on miss
//!     ├─► Translator::translate(request, render) variables
//!     └─► Executor::execute(ExecRequest)         URI path = script name
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response};

use super::executor::{ExecRequest, Executor};
use crate::config::Config;
use crate::env::{Environment, EnvironmentCache};
use crate::error::{Error, Result};
use crate::request::{MatchedRoute, RenderRegistry, Translator};
use crate::vfs::VirtualFs;

/// Serves matched requests by executing their script in its environment.
///
/// # Example
///
/// ```ignore
/// let handler = ScriptHandler::from_config(&config, engine)?;
/// handler.vfs().add_source_directory("/srv/app/**/*.php", "/")?;
///
/// let mut request = incoming;
/// MatchedRoute::new("GET /users/{id}", "/api/users.get.php").attach(&mut request);
/// let response = handler.handle_or_status(request);
/// ```
pub struct ScriptHandler<E> {
    vfs: Arc<VirtualFs>,
    cache: Arc<EnvironmentCache>,
    translator: Translator,
    registry: Arc<RenderRegistry>,
    executor: E,
}

impl<E: Executor> ScriptHandler<E> {
    /// Wire an existing VFS and cache to `executor`.
    pub fn new(vfs: Arc<VirtualFs>, cache: Arc<EnvironmentCache>, executor: E) -> Self {
        Self {
            vfs,
            cache,
            translator: Translator::default(),
            registry: Arc::new(RenderRegistry::new()),
            executor,
        }
    }

    /// Build a VFS and a cache from `config`.
    ///
    /// The cache treats the VFS scratch directory as its embedded root, so
    /// embedded and virtual scripts get single-file environments.
    pub fn from_config(config: &Config, executor: E) -> Result<Self> {
        let vfs = Arc::new(VirtualFs::new(config)?);
        let cache = Arc::new(EnvironmentCache::new(config)?.with_embedded_root(vfs.scratch_dir()));
        Ok(Self::new(vfs, cache, executor).with_translator(Translator::from_config(config)))
    }

    /// Use `translator` for variable naming.
    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    /// Share `registry` for render callbacks.
    pub fn with_registry(mut self, registry: Arc<RenderRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The virtual filesystem.
    pub fn vfs(&self) -> &Arc<VirtualFs> {
        &self.vfs
    }

    /// The environment cache.
    pub fn cache(&self) -> &Arc<EnvironmentCache> {
        &self.cache
    }

    /// The render callback registry.
    pub fn registry(&self) -> &Arc<RenderRegistry> {
        &self.registry
    }

    /// The execution engine.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Serve `request`, which must carry a [`MatchedRoute`].
    pub fn handle(&self, request: Request<Bytes>) -> Result<Response<E::Body>> {
        let route = MatchedRoute::of(&request).cloned().ok_or(Error::NoRoute)?;
        let env = self.vfs.environment_for(route.script(), &self.cache)?;
        let env = self.ensure_script(env)?;

        let render = self.registry.get(route.pattern());
        let vars = self.translator.translate(&request, render.as_ref())?;

        let script_name = env.script_name();
        let request = rewrite_path(request, &script_name)?;
        tracing::debug!(
            pattern = %route.pattern(),
            script = %script_name,
            root = %env.document_root().display(),
            "executing script"
        );
        self.executor.execute(ExecRequest {
            document_root: env.document_root(),
            script_name,
            env: vars,
            request,
        })
    }

    /// Serve `request`, turning any error into an empty response with its status.
    pub fn handle_or_status(&self, request: Request<Bytes>) -> Response<E::Body>
    where
        E::Body: Default,
    {
        let path = request.uri().path().to_string();
        match self.handle(request) {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                tracing::error!(
                    path = %path,
                    status = status.as_u16(),
                    error = %e,
                    "request failed"
                );
                let mut response = Response::new(E::Body::default());
                *response.status_mut() = status;
                response
            }
        }
    }

    /// Rebuild once if the script vanished from its environment.
    fn ensure_script(&self, env: Arc<Environment>) -> Result<Arc<Environment>> {
        if env.script_path().is_file() {
            return Ok(env);
        }
        tracing::warn!(key = %env.endpoint_key(), "script missing from environment, rebuilding");
        let env = self.cache.rebuild(env.endpoint_key())?;
        if env.script_path().is_file() {
            Ok(env)
        } else {
            Err(Error::ScriptMissing {
                key: env.endpoint_key().to_string(),
                script: env.script_path(),
            })
        }
    }

    /// Stop watching, remove every environment and empty the VFS scratch root.
    pub fn shutdown(&self) -> Result<()> {
        self.vfs.stop_watching();
        self.cache.cleanup()?;
        self.vfs.shutdown()
    }
}

/// Replace the URI path of `request` with `script_name`, keeping the query.
fn rewrite_path(request: Request<Bytes>, script_name: &str) -> Result<Request<Bytes>> {
    let (mut parts, body) = request.into_parts();
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{script_name}?{query}"),
        None => script_name.to_string(),
    };
    let mut uri_parts = parts.uri.into_parts();
    uri_parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|_| Error::invalid_path(script_name, "script name is not a valid URI path"))?,
    );
    parts.uri = Uri::from_parts(uri_parts)
        .map_err(|_| Error::invalid_path(script_name, "script name is not a valid URI path"))?;
    Ok(Request::from_parts(parts, body))
}

impl<E> std::fmt::Debug for ScriptHandler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("vfs", &self.vfs)
            .field("cache", &self.cache)
            .field("translator", &self.translator)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records what it was asked to run and echoes the script.
    #[derive(Default)]
    struct EchoExecutor {
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Executor for EchoExecutor {
        type Body = String;

        fn execute(&self, request: ExecRequest) -> Result<Response<String>> {
            let script = fs::read_to_string(request.script_path())
                .map_err(|e| Error::Execution(e.into()))?;
            self.seen
                .lock()
                .push((request.script_name.clone(), request.request.uri().to_string()));
            Ok(Response::new(script))
        }
    }

    fn handler(tmp: &TempDir) -> ScriptHandler<EchoExecutor> {
        let config = Config::builder().temp_root(tmp.path().join("scratch")).build();
        ScriptHandler::from_config(&config, EchoExecutor::default()).unwrap()
    }

    fn routed(uri: &str, pattern: &str, script: &str) -> Request<Bytes> {
        let mut request = Request::builder().uri(uri).body(Bytes::new()).unwrap();
        MatchedRoute::new(pattern, script).attach(&mut request);
        request
    }

    #[test]
    fn test_rewrite_path_keeps_query() {
        let request = Request::builder()
            .uri("http://localhost/users/7?tab=a")
            .body(Bytes::new())
            .unwrap();
        let request = rewrite_path(request, "/users.php").unwrap();
        assert_eq!(request.uri().path(), "/users.php");
        assert_eq!(request.uri().query(), Some("tab=a"));
        assert_eq!(request.uri().host(), Some("localhost"));
    }

    #[test]
    fn test_handle_virtual_script() {
        let tmp = TempDir::new().unwrap();
        let handler = handler(&tmp);
        handler.vfs().create_virtual_file("/api/ping.php", "<?php echo 'pong';").unwrap();

        let response = handler
            .handle(routed("/ping?x=1", "GET /ping", "/api/ping.php"))
            .unwrap();
        assert_eq!(response.body(), "<?php echo 'pong';");

        let seen = handler.executor().seen.lock();
        assert_eq!(seen[0], ("/ping.php".to_string(), "/ping.php?x=1".to_string()));
    }

    #[test]
    fn test_script_deleted_out_of_band_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let handler = handler(&tmp);
        handler.vfs().create_virtual_file("/a.php", "a").unwrap();
        handler.handle(routed("/a", "/a", "/a.php")).unwrap();

        let env = handler.vfs().environment_for("/a.php", handler.cache()).unwrap();
        fs::remove_file(env.script_path()).unwrap();

        assert_eq!(handler.handle(routed("/a", "/a", "/a.php")).unwrap().body(), "a");
        assert_eq!(env.info().builds, 2);
    }

    #[test]
    fn test_handle_or_status() {
        let tmp = TempDir::new().unwrap();
        let handler = handler(&tmp);

        let response = handler.handle_or_status(routed("/nope", "/nope", "/nope.php"));
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);

        let request = Request::builder().uri("/x").body(Bytes::new()).unwrap();
        assert_eq!(handler.handle_or_status(request).status(), http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_render_callback_is_used() {
        let tmp = TempDir::new().unwrap();
        let handler = handler(&tmp);
        handler.vfs().create_virtual_file("/p.php", "p").unwrap();
        handler
            .registry()
            .register("/p", |_: &crate::request::RenderContext<'_>| Err("boom".into()));

        let err = handler.handle(routed("/p", "/p", "/p.php")).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn test_shutdown_removes_environments() {
        let tmp = TempDir::new().unwrap();
        let handler = handler(&tmp);
        handler.vfs().create_virtual_file("/a.php", "a").unwrap();
        handler.handle(routed("/a", "/a", "/a.php")).unwrap();
        assert_eq!(handler.cache().len(), 1);

        handler.shutdown().unwrap();
        assert!(handler.cache().is_empty());
        assert!(handler.vfs().is_empty());
        assert!(!handler.vfs().is_watching());
    }
}
