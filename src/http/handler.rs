use std::fmt;
use std::sync::Arc;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// Callback invoked for a matching request. Returning `Err` turns into a 500.
pub type RequestCallback = Arc<dyn Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync>;

/// One registered route: an exact method and path plus the code that serves it.
#[derive(Clone)]
pub struct RequestHandler {
    method: Method,
    path: String,
    callback: RequestCallback,
}

impl RequestHandler {
    pub fn new<F>(method: Method, path: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            method,
            path: path.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True iff both the method and the path equal the request's exactly.
    pub fn should_execute_for(&self, request: &Request) -> bool {
        request.method() == self.method && request.path() == self.path
    }

    /// Runs the callback. Containing a failure is up to the caller.
    pub fn execute(&self, request: &Request, response: &mut Response) -> anyhow::Result<()> {
        (self.callback)(request, response)
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
