//! Protocol server for konsol REPL sessions.
//!
//! This crate turns the pure session/evaluation core from the `konsol`
//! crate into a byte-stream server: `Content-Length` framing, the
//! camelCase/snake_case boundary translation, the closed method and
//! error-kind enumerations, the session registry, and the single-threaded
//! read -> dispatch -> write loop. The binary entry point in `main.rs` wires
//! the loop to stdin/stdout and OS signals.

pub mod framing;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod sessions;
pub mod wire;
