//! Request-scoped values kept per thread.
//!
//! A request handler stores the caller's language and tracing headers at the
//! start of a request and clears them at the end; code further down the call
//! chain reads them without threading them through every signature.

use std::cell::RefCell;
use std::collections::HashMap;

/// Header carrying the caller's language.
pub const LANGUAGE_HEADER_NAME: &str = "LANGUAGE";
/// Header carrying the tenant.
pub const TENANT_HEADER_NAME: &str = "TENANT";
/// Tenant used when a request carries none.
pub const TENANT_DEFAULT: &str = "sgv";

/// Request id header forwarded for tracing.
pub const REQUEST_ID: &str = "x-request-id";
/// Prefix of the B3 propagation headers.
pub const REQUEST_B3_PREFIX: &str = "x-b3-";

/// Returns `true` for headers that belong to the tracing context.
///
/// The request id matches in any case; the B3 prefix only in lower case.
///
/// ```
/// use stepflag::context::is_tracing_header;
///
/// assert!(is_tracing_header("X-Request-Id"));
/// assert!(is_tracing_header("x-b3-traceid"));
/// assert!(!is_tracing_header("X-B3-TraceId"));
/// assert!(!is_tracing_header("authorization"));
/// ```
pub fn is_tracing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(REQUEST_ID) || name.starts_with(REQUEST_B3_PREFIX)
}

/// Values of the request currently handled by this thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    language: Option<String>,
    tracing_headers: HashMap<String, Vec<String>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_tracing_headers(&mut self, headers: HashMap<String, Vec<String>>) {
        self.tracing_headers = headers;
    }

    pub fn tracing_headers(&self) -> &HashMap<String, Vec<String>> {
        &self.tracing_headers
    }

    /// Keeps the tracing headers among `headers` and replaces the stored ones.
    pub fn capture_tracing_headers<I, N, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let captured: HashMap<String, Vec<String>> = headers
            .into_iter()
            .map(|(name, values)| (Into::<String>::into(name), values))
            .filter(|(name, _)| is_tracing_header(name))
            .map(|(name, values)| (name, values.into_iter().map(Into::into).collect()))
            .collect();

        tracing::trace!(headers = ?captured, "registering tracing headers");
        self.tracing_headers = captured;
    }
}

thread_local! {
    static CURRENT: RefCell<RequestContext> = RefCell::new(RequestContext::default());
}

/// Stores the language of the current request.
pub fn set_language(language: impl Into<String>) {
    let language = language.into();
    CURRENT.with(|ctx| ctx.borrow_mut().set_language(language));
}

/// Returns the language of the current request.
pub fn language() -> Option<String> {
    CURRENT.with(|ctx| ctx.borrow().language().map(str::to_string))
}

/// Replaces the tracing headers of the current request.
pub fn set_tracing_headers(headers: HashMap<String, Vec<String>>) {
    CURRENT.with(|ctx| ctx.borrow_mut().set_tracing_headers(headers));
}

/// Returns the tracing headers of the current request.
pub fn tracing_headers() -> HashMap<String, Vec<String>> {
    CURRENT.with(|ctx| ctx.borrow().tracing_headers().clone())
}

/// Filters `headers` down to the tracing ones and stores them for the current request.
///
/// ```
/// use stepflag::context;
///
/// context::capture_tracing_headers(vec![
///     ("x-request-id", vec!["42"]),
///     ("accept", vec!["*/*"]),
/// ]);
///
/// let headers = context::tracing_headers();
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers["x-request-id"], vec!["42".to_string()]);
/// context::clear();
/// ```
pub fn capture_tracing_headers<I, N, V>(headers: I)
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    CURRENT.with(|ctx| ctx.borrow_mut().capture_tracing_headers(headers));
}

/// Returns a copy of the whole context of the current request.
pub fn current() -> RequestContext {
    CURRENT.with(|ctx| ctx.borrow().clone())
}

/// Forgets every value stored for the current request.
pub fn clear() {
    CURRENT.with(|ctx| *ctx.borrow_mut() = RequestContext::default());
}
