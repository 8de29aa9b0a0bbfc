//! Boundary with the web layer.
//!
//! The registry never parses requests. It asks a [`SessionConfig`] to find
//! the inbound session id and to record outbound id changes on a
//! [`RequestContext`], which the web layer builds per request and turns
//! back into response headers afterwards.

use std::collections::HashMap;

use crate::record::SessionRecord;

/// Default cookie name used by [`CookieSessionConfig`].
pub const DEFAULT_COOKIE_NAME: &str = "session";

/// Instruction for a cookie on the outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCookie {
    /// Send the cookie with this value.
    Set(String),
    /// Tell the client to drop the cookie.
    Clear,
}

/// Per-request state shared between the web layer and the registry.
#[derive(Debug, Default)]
pub struct RequestContext {
    request_cookies: HashMap<String, String>,
    response_cookies: HashMap<String, OutboundCookie>,
    new_session: Option<SessionRecord>,
}

impl RequestContext {
    /// Create a context with no inbound cookies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inbound cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_cookies.insert(name.into(), value.into());
        self
    }

    /// Value of an inbound cookie.
    pub fn request_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies.get(name).map(String::as_str)
    }

    /// Outbound instruction recorded for a cookie.
    pub fn response_cookie(&self, name: &str) -> Option<&OutboundCookie> {
        self.response_cookies.get(name)
    }

    /// All outbound cookie instructions.
    pub fn response_cookies(&self) -> &HashMap<String, OutboundCookie> {
        &self.response_cookies
    }

    /// Record an outbound cookie value.
    pub fn set_response_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_cookies
            .insert(name.into(), OutboundCookie::Set(value.into()));
    }

    /// Record that a cookie should be dropped by the client.
    pub fn clear_response_cookie(&mut self, name: impl Into<String>) {
        self.response_cookies
            .insert(name.into(), OutboundCookie::Clear);
    }

    /// Session created earlier in this request, if any.
    pub fn new_session(&self) -> Option<&SessionRecord> {
        self.new_session.as_ref()
    }

    pub(crate) fn attach_new_session(&mut self, session: SessionRecord) {
        self.new_session = Some(session);
    }

    pub(crate) fn detach_new_session(&mut self, id: &str) {
        if self
            .new_session
            .as_ref()
            .is_some_and(|session| session.id() == id)
        {
            self.new_session = None;
        }
    }
}

/// Extracts and injects session ids at the transport boundary.
pub trait SessionConfig: Send + Sync {
    /// The session id carried by this request, if any.
    fn find_session_id(&self, ctx: &RequestContext) -> Option<String>;

    /// Tell the client to use `id` from now on.
    fn set_session_id(&self, ctx: &mut RequestContext, id: &str);

    /// Tell the client to forget `id`.
    fn clear_session(&self, ctx: &mut RequestContext, id: &str);
}

/// Carries the session id in a named cookie.
#[derive(Debug, Clone)]
pub struct CookieSessionConfig {
    cookie_name: String,
}

impl CookieSessionConfig {
    /// Use the cookie called `cookie_name`.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    /// Name of the cookie.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

impl Default for CookieSessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME)
    }
}

impl SessionConfig for CookieSessionConfig {
    fn find_session_id(&self, ctx: &RequestContext) -> Option<String> {
        // An id issued earlier in this request wins over the inbound cookie.
        match ctx.response_cookie(&self.cookie_name) {
            Some(OutboundCookie::Set(id)) => Some(id.clone()),
            Some(OutboundCookie::Clear) => None,
            None => ctx.request_cookie(&self.cookie_name).map(str::to_string),
        }
    }

    fn set_session_id(&self, ctx: &mut RequestContext, id: &str) {
        ctx.set_response_cookie(self.cookie_name.clone(), id);
    }

    fn clear_session(&self, ctx: &mut RequestContext, _id: &str) {
        ctx.clear_response_cookie(self.cookie_name.clone());
    }
}
