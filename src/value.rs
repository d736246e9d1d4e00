//! Ad-hoc JSON containers.
//!
//! For payloads that don't deserve their own struct:
//!
//! ```rust
//! use onion::{json, List, Map, Value};
//!
//! let mut user = Map::new();
//! user.insert("id".into(), Value::from(42));
//! user.insert("tags".into(), Value::Array(List::from([json!("admin")])));
//! ```

pub use serde_json::{Value, json};

/// String-keyed JSON object.
pub type Map = serde_json::Map<String, Value>;

/// Ordered JSON array.
pub type List = Vec<Value>;
