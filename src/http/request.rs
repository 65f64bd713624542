use std::collections::HashMap;
use std::fmt;

/// Request methods a route can be registered for.
///
/// Only the verbs that map onto create/read/update/delete are accepted. Any
/// other token in the request line fails parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Method {
    /// Maps a request-line token to a method.
    ///
    /// Matching is case-sensitive, as the request line requires.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchyard::http::request::Method;
    /// assert_eq!(Method::from_str("PATCH"), Some(Method::PATCH));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("HEAD"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "PATCH" => Some(Method::PATCH),
            "DELETE" => Some(Method::DELETE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed HTTP request.
///
/// Built once per connection and read-only afterwards. Header names are
/// stored lowercased so lookups ignore case.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    version: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Request target as it appears on the request line; a `?query` suffix
    /// is split off at build time.
    pub fn path(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let method = self.method.ok_or("method missing")?;
        let target = self.target.ok_or("path missing")?;

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };

        // First occurrence of a repeated header wins.
        let mut headers = HashMap::with_capacity(self.headers.len());
        for (key, value) in self.headers {
            headers.entry(key.to_ascii_lowercase()).or_insert(value);
        }

        Ok(Request {
            method,
            path,
            query,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers,
            body: self.body,
        })
    }
}

impl Request {
    /// The HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The path component of the request target, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP version from the request line (e.g. `HTTP/1.1`).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Raw query string, if the target carried one.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of a percent-decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Retrieves a header value by name, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchyard::http::request::{Method, RequestBuilder};
    /// let req = RequestBuilder::new()
    ///     .method(Method::GET)
    ///     .path("/")
    ///     .header("Content-Type", "text/plain")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(req.header("content-type"), Some("text/plain"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// All headers, keyed by lowercased name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Bytes received after the head, as announced by `Content-Length`.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// True when the client asked to switch to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .map(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
            })
            .unwrap_or(false)
    }
}
