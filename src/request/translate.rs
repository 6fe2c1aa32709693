//! Inbound request to environment-variable map.
//!
//! # Merge Order
//!
//! ```text
//! URL path + segments ─┐
//! path params ─────────┤
//! query (first value) ─┤
//! form  (first value) ─┼──► EnvVars
//! JSON body fields ────┤
//! headers ─────────────┤
//! render callback ─────┘   (VAR_*, may overwrite)
//! ```
//!
//! Every category lives under its own key infix, so only repeated names
//! within one category collide. The first value wins.

use http::Request;

use super::body::parse_body;
use super::render::{RenderContext, RenderFn};
use super::route::{MatchedRoute, path_segments};
use super::vars::{self, EnvVars, header_suffix, json_scalar};
use crate::config::Config;
use crate::error::{Error, Result};

/// Builds [`EnvVars`] from a request and the route it matched.
#[derive(Debug, Clone)]
pub struct Translator {
    prefix: String,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_VAR_PREFIX)
    }
}

impl Translator {
    /// A translator emitting keys prefixed with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// A translator using the configured prefix.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.var_prefix.clone())
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Translate `request` into a variable map.
    ///
    /// The request must carry a [`MatchedRoute`]. `render`, when given, runs
    /// last and its values are written as `VAR_<name>`.
    pub fn translate<B: AsRef<[u8]>>(
        &self,
        request: &Request<B>,
        render: Option<&RenderFn>,
    ) -> Result<EnvVars> {
        let route = MatchedRoute::of(request).ok_or(Error::NoRoute)?;
        let path = request.uri().path();
        let mut env = EnvVars::new(self.prefix.clone());

        // Path
        env.set(vars::URL_PATH, path);
        let segments = path_segments(path);
        for (i, segment) in segments.iter().enumerate() {
            env.set(&format!("{}{i}", vars::URL_SEGMENT), *segment);
        }
        env.set(vars::URL_SEGMENT_COUNT, segments.len().to_string());

        // Path parameters
        let params = route.params(path);
        let params_json = serde_json::to_string(&params).map_err(|e| Error::Body(e.to_string()))?;
        env.set(vars::PATH_PARAMS_JSON, params_json);
        for (name, value) in &params {
            env.set_if_absent(&format!("{}{name}", vars::PARAM), value.as_str());
        }

        // Query
        if let Some(query) = request.uri().query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                env.set_if_absent(&format!("{}{name}", vars::QUERY), value);
            }
        }

        // Body
        let body = parse_body(request.headers(), request.body().as_ref())?;
        for (name, value) in body.form {
            env.set_if_absent(&format!("{}{name}", vars::FORM), value);
        }
        if let Some((json, raw)) = body.json {
            if let serde_json::Value::Object(fields) = &json {
                for (name, value) in fields {
                    env.set_if_absent(&format!("{}{name}", vars::JSON), json_scalar(value));
                }
            }
            env.set(vars::JSON_BODY, raw);
        }

        // Headers
        for name in request.headers().keys() {
            let joined = request
                .headers()
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            env.set(&format!("{}{}", vars::HEADER, header_suffix(name.as_str())), joined);
        }

        // Render data
        if let Some(render) = render {
            let ctx = RenderContext {
                method: request.method(),
                uri: request.uri(),
                headers: request.headers(),
                params: &params,
            };
            let data = render(&ctx).map_err(|source| Error::Render {
                pattern: route.pattern().to_string(),
                source,
            })?;
            for (name, value) in &data {
                env.set_json(&format!("{}{name}", vars::VAR), value);
            }
        }

        tracing::debug!(
            pattern = %route.pattern(),
            path,
            vars = env.len(),
            "translated request"
        );
        Ok(env)
    }
}
