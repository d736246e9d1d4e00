//! # onion
//!
//! A thin layer between an HTTP server and your callbacks.
//!
//! Every callback receives one [`Data`]: the incoming request and the
//! outgoing response, with a handful of operations on top. Status codes,
//! plain-text bodies, redirects, path parameters, and JSON in both
//! directions. Routing, connections and HTTP itself are somebody else's job:
//! [`matchit`] matches patterns, hyper and tokio do the rest.
//!
//! ## The JSON contract
//!
//! - [`Data::json`] decodes **exactly one** JSON value and rejects object
//!   keys the target type does not declare, at any depth. Failures answer
//!   `400` and are logged unless [`LogLevel::None`] is configured.
//!   Fields marked `#[serde(flatten)]` and internally tagged or untagged
//!   enums are the exception: serde buffers them, so unknown keys there
//!   are accepted.
//! - [`Data::write_json`] failures answer `500` and are always logged with
//!   the offending value.
//! - [`Data::error`] answers `500` and is always logged.
//!
//! Logging goes through `tracing` with the target `onion`; see [`logging`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use onion::{Data, LogLevel, Logging, Router, Server};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Deserialize, Serialize)]
//! struct User { id: u64, name: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     onion::logging::init();
//!
//!     let app = Router::with_logging(Logging::new(LogLevel::All))
//!         .route("GET /users/{id}", get_user)
//!         .route("POST /users",     create_user)
//!         .route("GET /old",        |d| d.redirect("/users/1", 301));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn get_user(d: &mut Data<'_>) {
//!     let Ok(id) = d.param("id").parse() else {
//!         d.status(404);
//!         return;
//!     };
//!     let _ = d.write_json(&User { id, name: "alice".into() });
//! }
//!
//! fn create_user(d: &mut Data<'_>) {
//!     let Ok(user) = d.json::<User>() else { return };
//!     d.set_header("location", &format!("/users/{}", user.id));
//!     d.status(201);
//!     let _ = d.write_json(&user);
//! }
//! ```

mod data;
mod error;
mod redirect;
mod request;
mod response;
mod router;
mod server;
mod strict;
mod value;

pub mod logging;

pub use data::Data;
pub use error::{Error, JsonError};
pub use logging::{LogLevel, Logging};
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use value::{List, Map, Value, json};
