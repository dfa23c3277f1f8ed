//! HTTP stream API and SSE

pub mod handlers;
pub mod server;

pub use server::{build_router, run, serve, AppContext};
