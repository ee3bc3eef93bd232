//! Persistence Module
//!
//! Mirrors an LRU engine into a key/value storage backend and rebuilds it
//! from there on startup.
//!
//! # Storage Layout
//! - Manifest: `<namespace><id>.l`, a JSON object of key to marker
//! - Items: `<namespace><id>.i.<key>`, one serialized value each

mod bridge;
mod keys;
mod manifest;

pub use bridge::{Bound, PersistOptions, PersistentLru, Put};
pub use keys::KeySpace;
pub use manifest::Manifest;
