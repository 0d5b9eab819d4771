// Library interface for storygen modules
// This allows tests and the binary to import modules

pub mod auth;
pub mod content;
pub mod handler;
pub mod server;
pub mod storage;
