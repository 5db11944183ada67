//! Shared pieces of the `herald` binary: CLI, WebSocket server and demo feed

pub mod common;
pub mod demo;
pub mod ws;
