//! Graceful HTTP adapter.
//!
//! [`HttpServer`] is a [`Runnable`](crate::Runnable) over a TCP listener.
//! Halting it drains: new connections are answered with `503` for a grace
//! period, then the listener closes and in-flight requests get until the
//! shutdown deadline to finish.

mod codec;
mod handler;
mod inflight;
mod server;
#[cfg(test)]
pub(crate) mod test_utils;

pub use self::codec::{CodecError, Request, Response};
pub use self::handler::{RequestHandler, UnavailableHandler};
pub use self::server::{HttpServer, HttpServerConfig, HttpServerUnit, ServerState};

const HTTP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");
