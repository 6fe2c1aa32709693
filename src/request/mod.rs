//! Request translation.
//!
//! Turns an inbound HTTP request and the route it matched into the flat
//! string map an executed script reads its inputs from. Non-string values
//! (JSON body fields, render data) are serialized as JSON; the script decodes
//! them back.
//!
//! # Example
//!
//! ```
//! use php_vfs::request::{MatchedRoute, Translator};
//!
//! let request = http::Request::builder()
//!     .uri("/users/42?tab=posts")
//!     .extension(MatchedRoute::new("GET /users/{id}", "/users.php"))
//!     .body(Vec::<u8>::new())
//!     .unwrap();
//!
//! let vars = Translator::new("APP").translate(&request, None).unwrap();
//! assert_eq!(vars.get("PARAM_id"), Some("42"));
//! assert_eq!(vars.get("QUERY_tab"), Some("posts"));
//! ```

mod body;
mod render;
mod route;
mod translate;
mod vars;

pub use render::{RenderContext, RenderFn, RenderRegistry};
pub use route::{MatchedRoute, extract_params, path_segments};
pub use translate::Translator;
pub use vars::{EnvVars, header_suffix, json_scalar};
