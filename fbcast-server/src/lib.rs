//! # fbcast-server: frame-buffer viewer service
//!
//! Serves a demo paint canvas to browsers. A plain `GET /` returns the
//! viewer page; the page upgrades to a WebSocket on the same path,
//! receives every flushed region and sends its pointer back.
//!
//! ## Modes
//!
//! - **Run**: serve on the configured port until Ctrl-C.
//! - **Generate config**: print the default TOML (`--gen-config`).

pub mod config;
pub mod engine;
