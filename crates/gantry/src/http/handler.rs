//! Request handling strategies for the graceful server.

use super::codec::{Request, Response};

/// Produces a response for one request.
///
/// Handlers run on per-connection threads and must tolerate concurrent calls.
pub trait RequestHandler: Send + Sync {
    /// Handles a single request. Implementations should avoid panicking; a
    /// panic is contained and answered with `500`.
    fn handle(&self, request: &Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    fn handle(&self, request: &Request) -> Response {
        self(request)
    }
}

/// Handler installed while draining; answers `503` so load balancers stop
/// routing to the instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableHandler;

impl RequestHandler for UnavailableHandler {
    fn handle(&self, _request: &Request) -> Response {
        Response::text(503, "service unavailable\n")
    }
}

pub(crate) fn bad_request(reason: &str) -> Response {
    Response::text(400, format!("bad request: {reason}\n"))
}

pub(crate) fn content_too_large() -> Response {
    Response::text(413, "request exceeds 64 KiB\n")
}

pub(crate) fn internal_error() -> Response {
    Response::text(500, "internal server error\n")
}
