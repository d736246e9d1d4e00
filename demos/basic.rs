//! Minimal onion example: CRUD-style JSON endpoints over an in-memory store.
//!
//! Run with:
//!   RUST_LOG=onion=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/1
//!   curl -X POST http://localhost:3000/users \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users \
//!        -d '{"name":"alice","admin":true}'      # 400: unknown field
//!   curl -X DELETE http://localhost:3000/users/1
//!   curl -i http://localhost:3000/me               # 302 to /users/1

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use onion::{Data, LogLevel, Logging, Map, Router, Server, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Clone, Debug, Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Default)]
struct Store {
    next_id: u64,
    users: BTreeMap<u64, User>,
}

type Shared = Arc<Mutex<Store>>;

#[tokio::main]
async fn main() {
    onion::logging::init();

    let store: Shared = Arc::default();

    let app = Router::with_logging(Logging::new(LogLevel::All))
        .route("GET /users", {
            let store = Arc::clone(&store);
            move |d| list_users(d, &store)
        })
        .route("GET /users/{id}", {
            let store = Arc::clone(&store);
            move |d| get_user(d, &store)
        })
        .route("POST /users", {
            let store = Arc::clone(&store);
            move |d| create_user(d, &store)
        })
        .route("DELETE /users/{id}", {
            let store = Arc::clone(&store);
            move |d| delete_user(d, &store)
        })
        .route("GET /me", |d| d.redirect("/users/1", 302))
        .route("GET /healthz", |d| d.write("ok"));

    if let Err(e) = Server::bind("0.0.0.0:3000").serve(app).await {
        eprintln!("server error: {e}");
    }
}

fn user_id(d: &mut Data<'_>) -> Option<u64> {
    match d.param("id").parse() {
        Ok(id) => Some(id),
        Err(_) => {
            d.status(400);
            None
        }
    }
}

// GET /users → {"count":N,"users":[...]}
fn list_users(d: &mut Data<'_>, store: &Shared) {
    let Ok(store) = store.lock() else {
        d.error("user store poisoned");
        return;
    };

    let mut body = Map::new();
    body.insert("count".into(), Value::from(store.users.len()));
    body.insert(
        "users".into(),
        store.users.values().map(|u| serde_json::json!({ "id": u.id, "name": u.name })).collect(),
    );
    let _ = d.write_json(&body);
}

// GET /users/{id}
fn get_user(d: &mut Data<'_>, store: &Shared) {
    let Some(id) = user_id(d) else { return };
    let Ok(store) = store.lock() else {
        d.error("user store poisoned");
        return;
    };

    match store.users.get(&id) {
        Some(user) => {
            let _ = d.write_json(user);
        }
        None => d.status(404),
    }
}

// POST /users → 201 with a location header
fn create_user(d: &mut Data<'_>, store: &Shared) {
    let Ok(new) = d.json::<NewUser>() else { return };
    let Ok(mut store) = store.lock() else {
        d.error("user store poisoned");
        return;
    };

    store.next_id += 1;
    let user = User { id: store.next_id, name: new.name };
    store.users.insert(user.id, user.clone());

    d.set_header("location", &format!("/users/{}", user.id));
    d.status(201);
    let _ = d.write_json(&user);
}

// DELETE /users/{id} → 204 No Content
fn delete_user(d: &mut Data<'_>, store: &Shared) {
    let Some(id) = user_id(d) else { return };
    let Ok(mut store) = store.lock() else {
        d.error("user store poisoned");
        return;
    };

    match store.users.remove(&id) {
        Some(_) => d.status(204),
        None => d.status(404),
    }
}
