use std::fmt;

/// An HTTP status code.
///
/// Any three-digit code can be sent; the common ones have constants and a
/// reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    pub const fn new(code: u16) -> Self {
        StatusCode(code)
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchyard::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard reason phrase, or an empty string for codes
    /// without one.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchyard::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::new(299).reason_phrase(), "");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            413 => "Payload Too Large",
            426 => "Upgrade Required",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An HTTP reply under construction.
///
/// Handlers receive `&mut Response` and fill it in; the connection serializes
/// it once the handler returns. Builder methods return `&mut Self` so calls
/// can be chained:
///
/// ```
/// # use switchyard::http::response::Response;
/// let mut res = Response::new();
/// res.status(201).header("Content-Type", "text/plain").append("created");
/// assert_eq!(res.status_code().as_u16(), 201);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Response {
    status: Option<StatusCode>,
    headers: Vec<(String, String)>,
    output: Vec<u8>,
}

impl Response {
    /// An empty response: no status (sent as 200), no headers, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl AsRef<[u8]>) -> Self {
        let mut res = Self::new();
        res.status = Some(StatusCode::OK);
        res.write(body);
        res
    }

    /// Creates a 404 Not Found response with an empty body.
    pub fn not_found() -> Self {
        Self {
            status: Some(StatusCode::NOT_FOUND),
            ..Self::default()
        }
    }

    /// Creates a 400 Bad Request response.
    pub fn bad_request(reason: &str) -> Self {
        let mut res = Self {
            status: Some(StatusCode::BAD_REQUEST),
            ..Self::default()
        };
        res.header("Content-Type", "text/plain").write(reason);
        res
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self {
            status: Some(StatusCode::INTERNAL_SERVER_ERROR),
            ..Self::default()
        }
    }

    /// Adds or replaces a header. Names compare case-insensitively; the
    /// spelling of the latest call is the one sent.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    /// Overwrites the status code.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = Some(StatusCode(code));
        self
    }

    /// Inserts `data` in front of everything written so far.
    pub fn prepend(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        let data = data.as_ref();
        self.output.splice(0..0, data.iter().copied());
        self
    }

    /// Adds `data` after everything written so far.
    pub fn append(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.output.extend_from_slice(data.as_ref());
        self
    }

    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        self.output.extend_from_slice(data.as_ref());
    }

    /// Status that will be sent; 200 when none was set.
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Body bytes accumulated so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub(crate) fn into_parts(self) -> (StatusCode, Vec<(String, String)>, Vec<u8>) {
        (self.status_code(), self.headers, self.output)
    }
}
