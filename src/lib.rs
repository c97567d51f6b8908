//! Optimistic editing of a mirror server's repository list.
//!
//! [`store::ListStore`] holds the list for a session and applies every edit
//! locally before the server confirms it, restoring a snapshot when the server
//! refuses or cannot be reached. [`sync::http::HttpSyncClient`] is the client
//! for the server's JSON API.

pub mod store;
pub mod sync;
pub mod types;
