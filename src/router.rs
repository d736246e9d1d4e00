//! Route registration and dispatch.
//!
//! Patterns are `"[METHOD ]PATH"`. The path goes to [`matchit`] untouched:
//! `{name}` binds one segment, `{*name}` the rest of the path. One radix
//! tree per method plus one for routes without a method.

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::data::Data;
use crate::logging::{Logging, TARGET};
use crate::request::Request;
use crate::response::{self, HttpResponse, ResponseWriter};

/// A registered callback, shared by every request that matches its route.
pub(crate) type Callback = Arc<dyn Fn(&mut Data<'_>) + Send + Sync + 'static>;

/// The application router.
///
/// Build it once at startup, then hand it to [`Server::serve`](crate::Server::serve)
/// or drive it directly with [`Router::handle`]. The [`Logging`] it carries
/// is lent to every request context it creates.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Callback>>,
    any: MatchitRouter<Callback>,
    logging: Logging,
}

enum Lookup<'r> {
    Found(&'r Callback, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self::with_logging(Logging::default())
    }

    pub fn with_logging(logging: Logging) -> Self {
        Self { routes: HashMap::new(), any: MatchitRouter::new(), logging }
    }

    pub fn logging(&self) -> &Logging {
        &self.logging
    }

    /// Registers `callback` for `pattern`. Returns `self` for chaining.
    ///
    /// A method prefix limits the route to that method (`GET` also answers
    /// `HEAD`); without one the route answers every method. Each matching
    /// request builds one [`Data`] and calls `callback` with it once.
    ///
    /// ```rust,no_run
    /// # use onion::{Data, Router};
    /// # fn get_user(_: &mut Data<'_>) {}
    /// # fn create_user(_: &mut Data<'_>) {}
    /// Router::new()
    ///     .route("GET /users/{id}", get_user)
    ///     .route("POST /users",     create_user)
    ///     .route("/ping",           |d| d.write("pong"));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the method is not a valid HTTP token, or if `matchit`
    /// rejects the path (bad syntax, or a conflict with an existing route).
    pub fn route<F>(mut self, pattern: &str, callback: F) -> Self
    where
        F: Fn(&mut Data<'_>) + Send + Sync + 'static,
    {
        let (method, path) = split_pattern(pattern);
        let tree = match method {
            Some(method) => self.routes.entry(method).or_default(),
            None => &mut self.any,
        };
        let callback: Callback = Arc::new(callback);
        tree.insert(path, callback)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }

    /// Dispatches one fully buffered request.
    ///
    /// Unmatched paths get `404`; paths that only match under other methods
    /// get `405` with an `allow` header.
    pub fn handle(&self, req: http::Request<Bytes>) -> HttpResponse {
        let (parts, body) = req.into_parts();

        match self.lookup(&parts.method, parts.uri.path()) {
            Lookup::Found(callback, params) => {
                let request = Request::new(parts, body, params);
                let mut response = ResponseWriter::new();
                callback(&mut Data::new(&request, &mut response, &self.logging));
                response.into_http()
            }
            Lookup::MethodNotAllowed(allowed) => {
                let mut response =
                    response::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                if let Ok(allow) = HeaderValue::try_from(allow) {
                    response.headers_mut().insert(ALLOW, allow);
                }
                response
            }
            Lookup::NotFound => {
                debug!(target: TARGET, method = %parts.method, path = parts.uri.path(), "no route");
                response::text(StatusCode::NOT_FOUND, "404 page not found")
            }
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let head_fallback = if *method == Method::HEAD {
            self.routes.get(&Method::GET)
        } else {
            None
        };
        let trees = self.routes.get(method)
            .into_iter()
            .chain(head_fallback)
            .chain(iter::once(&self.any));

        for tree in trees {
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), decode_param(v)))
                    .collect();
                return Lookup::Found(matched.value, params);
            }
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Splits `"GET /users/{id}"` into the method and the path.
fn split_pattern(pattern: &str) -> (Option<Method>, &str) {
    let pattern = pattern.trim();
    match pattern.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((method, path)) => {
            let method = Method::from_bytes(method.as_bytes())
                .unwrap_or_else(|_| panic!("invalid method in route `{pattern}`"));
            (Some(method), path.trim_start())
        }
        None => (None, pattern),
    }
}

/// Path segments arrive percent-encoded. Undecodable values are kept as-is.
fn decode_param(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), |v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_split_on_first_space() {
        assert_eq!(split_pattern("GET /users/{id}"), (Some(Method::GET), "/users/{id}"));
        assert_eq!(split_pattern("  POST   /users "), (Some(Method::POST), "/users"));
        assert_eq!(split_pattern("/health"), (None, "/health"));
    }

    #[test]
    fn extension_methods_are_accepted() {
        let (method, _) = split_pattern("PURGE /cache/{key}");
        assert_eq!(method.unwrap().as_str(), "PURGE");
    }

    #[test]
    #[should_panic(expected = "invalid method")]
    fn bad_method_panics() {
        let _ = Router::new().route("G(T /x", |_| {});
    }

    #[test]
    #[should_panic(expected = "invalid route `GET /users/{id}`")]
    fn conflicting_routes_panic() {
        let _ = Router::new()
            .route("GET /users/{id}", |_| {})
            .route("GET /users/{id}", |_| {});
    }

    #[test]
    fn same_path_under_different_methods_is_fine() {
        let router = Router::new()
            .route("GET /users/{id}", |_| {})
            .route("DELETE /users/{id}", |_| {})
            .route("/users/{id}/avatar", |_| {});
        assert!(matches!(router.lookup(&Method::DELETE, "/users/1"), Lookup::Found(..)));
        assert!(matches!(router.lookup(&Method::HEAD, "/users/1"), Lookup::Found(..)));
        assert!(matches!(router.lookup(&Method::PATCH, "/users/1/avatar"), Lookup::Found(..)));
    }

    #[test]
    fn other_methods_yield_405_with_sorted_allow() {
        let router = Router::new()
            .route("POST /users/{id}", |_| {})
            .route("GET /users/{id}", |_| {});
        match router.lookup(&Method::PUT, "/users/1") {
            Lookup::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::GET, Method::HEAD, Method::POST]);
            }
            _ => panic!("expected 405"),
        }
        assert!(matches!(router.lookup(&Method::PUT, "/nope"), Lookup::NotFound));
    }

    #[test]
    fn params_are_percent_decoded() {
        let router = Router::new().route("GET /files/{name}", |_| {});
        match router.lookup(&Method::GET, "/files/annual%20report") {
            Lookup::Found(_, params) => assert_eq!(params["name"], "annual report"),
            _ => panic!("expected a match"),
        }
        assert_eq!(decode_param("%FF"), "%FF");
    }
}
