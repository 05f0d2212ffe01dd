//! Pattern-based request router (§4.10), grounded on
//! `original_source/src/protocol/http/http_mux.{cpp,h}`'s entry table and
//! longest-prefix match, reimplemented as a [`Handler`] so it drops into
//! [`ServerBuilder::handler`](crate::ServerBuilder::handler) with no
//! changes to the connection/server plumbing.
//!
//! `Handler::handle` isn't dyn-safe (it returns `impl Future`), so routes
//! registered on the mux are boxed behind [`DynHandler`] - a small manual
//! vtable instead of pulling in an `async-trait`-style macro crate for one
//! call site.
use crate::{ConnectionData, Handled, Handler, Request, Response, StatusCode};
use std::{future::Future, marker::PhantomData, pin::Pin};

trait DynHandler<S>: Send + Sync {
    fn call<'a>(
        &'a self,
        data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
    ) -> Pin<Box<dyn Future<Output = Handled> + Send + 'a>>;
}

impl<S: ConnectionData, H: Handler<S>> DynHandler<S> for H {
    fn call<'a>(
        &'a self,
        data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
    ) -> Pin<Box<dyn Future<Output = Handled> + Send + 'a>> {
        Box::pin(Handler::handle(self, data, request, response))
    }
}

struct Entry<S> {
    pattern: Box<[u8]>,
    explicit_match: bool,
    enabled: bool,
    handler: Box<dyn DynHandler<S>>,
}

/// A request router matching on path prefix, with optional virtual-host
/// scoping (§4.10).
///
/// Patterns ending in `/` match as a prefix; any other pattern must match
/// the candidate path exactly. A pattern whose first segment doesn't
/// start with `/` is treated as `host/path` and only matches requests
/// whose `Host` header equals that segment.
pub struct HttpMux<S = ()> {
    entries: Vec<Entry<S>>,
    vhosts: Vec<Box<[u8]>>,
}

impl<S: ConnectionData> Default for HttpMux<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ConnectionData> HttpMux<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            vhosts: Vec::new(),
        }
    }

    /// Registers `handler` under `pattern`.
    ///
    /// Fails with [`crate::errors::ErrorKind::HttpPatternEmpty`] on an
    /// empty pattern, or [`crate::errors::ErrorKind::HttpPatternDuplicated`]
    /// if `pattern` already has an explicit registration.
    ///
    /// A pattern ending in `/` (other than exactly `"/"`) additionally
    /// installs a 302 redirect from the same pattern without its trailing
    /// slash, unless that shorter path already has an explicit handler of
    /// its own.
    pub fn handle<P: AsRef<[u8]>, H: Handler<S>>(
        &mut self,
        pattern: P,
        handler: H,
    ) -> Result<&mut Self, crate::errors::ErrorKind> {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            return Err(crate::errors::ErrorKind::HttpPatternEmpty);
        }

        if self
            .entries
            .iter()
            .any(|e| e.explicit_match && &*e.pattern == pattern)
        {
            return Err(crate::errors::ErrorKind::HttpPatternDuplicated);
        }

        if pattern[0] != b'/' {
            let host = match pattern.iter().position(|&b| b == b'/') {
                Some(idx) => &pattern[..idx],
                None => pattern,
            };
            if !self.vhosts.iter().any(|v| &**v == host) {
                self.vhosts.push(host.to_vec().into_boxed_slice());
            }
        }

        self.upsert(pattern, true, Box::new(handler));

        if pattern.len() > 1 && pattern.last() == Some(&b'/') {
            let short = &pattern[..pattern.len() - 1];
            let replace_ok = match self.entries.iter().find(|e| &*e.pattern == short) {
                Some(existing) => !existing.explicit_match,
                None => true,
            };
            if replace_ok {
                let redirect = RedirectHandler {
                    location: pattern.to_vec().into_boxed_slice(),
                    _marker: PhantomData,
                };
                self.upsert(short, false, Box::new(redirect));
            }
        }

        Ok(self)
    }

    /// Enables or disables a previously-registered pattern; disabled
    /// entries are skipped by [`HttpMux::match_path`] but stay registered
    /// (§4.10's `enabled` flag on each entry).
    pub fn set_enabled<P: AsRef<[u8]>>(&mut self, pattern: P, enabled: bool) -> bool {
        let pattern = pattern.as_ref();
        match self.entries.iter_mut().find(|e| &*e.pattern == pattern) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn upsert(&mut self, pattern: &[u8], explicit_match: bool, handler: Box<dyn DynHandler<S>>) {
        match self.entries.iter_mut().find(|e| &*e.pattern == pattern) {
            Some(entry) => {
                entry.explicit_match = explicit_match;
                entry.enabled = true;
                entry.handler = handler;
            }
            None => self.entries.push(Entry {
                pattern: pattern.to_vec().into_boxed_slice(),
                explicit_match,
                enabled: true,
                handler,
            }),
        }
    }

    /// Finds the longest registered pattern matching `path`, optionally
    /// scoped to `host` when this mux has any virtual hosts registered.
    fn match_path(&self, host: Option<&[u8]>, path: &[u8]) -> Option<&Entry<S>> {
        let scoped;
        let candidate: &[u8] = match host {
            Some(host) if self.vhosts.iter().any(|v| &**v == host) => {
                scoped = [host, path].concat();
                &scoped
            }
            _ => path,
        };

        self.entries
            .iter()
            .filter(|e| e.enabled)
            .filter(|e| pattern_matches(&e.pattern, candidate))
            .max_by_key(|e| e.pattern.len())
    }

    /// Matches `request` against the registered routes and invokes the
    /// winning handler, falling back to a fixed 404 when nothing matches
    /// and rejecting any path containing `..` (§4.10).
    pub(crate) async fn serve_http(
        &self,
        data: &mut S,
        request: &Request,
        response: &mut Response,
    ) -> Handled {
        let path = request.url().path();
        if path.windows(2).any(|w| w == b"..") {
            return response
                .status(StatusCode::BadRequest)
                .body("request path is not clean");
        }

        let host = request.header(b"host");
        match self.match_path(host, path) {
            Some(entry) => entry.handler.call(data, request, response).await,
            None => not_found(response),
        }
    }
}

impl<S: ConnectionData> Handler<S> for HttpMux<S> {
    async fn handle(&self, data: &mut S, request: &Request, response: &mut Response) -> Handled {
        self.serve_http(data, request, response).await
    }
}

fn pattern_matches(pattern: &[u8], candidate: &[u8]) -> bool {
    match pattern.last() {
        Some(b'/') => candidate.len() >= pattern.len() && &candidate[..pattern.len()] == pattern,
        _ => candidate == pattern,
    }
}

fn not_found(response: &mut Response) -> Handled {
    response.status(StatusCode::NotFound).body("404 not found")
}

struct RedirectHandler<S> {
    location: Box<[u8]>,
    _marker: PhantomData<fn(&mut S)>,
}

impl<S: ConnectionData> Handler<S> for RedirectHandler<S> {
    async fn handle(&self, _: &mut S, _: &Request, response: &mut Response) -> Handled {
        response
            .status(StatusCode::Found)
            .header("location", &*self.location)
            .body("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::request::Parser,
        limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits},
        server::connection::HttpConnection,
    };
    use std::sync::Arc;

    struct Ok200;
    impl Handler<()> for Ok200 {
        async fn handle(&self, _: &mut (), _: &Request, response: &mut Response) -> Handled {
            response.status(StatusCode::Ok).body("hit")
        }
    }

    /// Parses a raw request line + headers into a real [`Request`] by
    /// driving the same [`HttpConnection`] parsing path the server uses -
    /// there is no standalone request parser to call directly.
    fn parse_request(raw: String) -> Request {
        let req_limits = ReqLimits::default().precalculate();
        let limits = (
            ServerLimits::default(),
            ConnLimits::default(),
            req_limits.clone(),
            RespLimits::default(),
        );

        let mut conn = HttpConnection::<Ok200, ()>::new(Arc::new(Ok200), limits);
        conn.parser = Parser::from(&req_limits, raw);
        conn.parse().unwrap();
        conn.request.clone()
    }

    fn request(path: &str) -> Request {
        parse_request(format!("GET {path} HTTP/1.1\r\nhost: example.com\r\n\r\n"))
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let mut mux: HttpMux<()> = HttpMux::new();
        let err = mux.handle("", Ok200).unwrap_err();
        assert_eq!(err, crate::errors::ErrorKind::HttpPatternEmpty);
    }

    #[test]
    fn duplicate_pattern_is_rejected() {
        let mut mux: HttpMux<()> = HttpMux::new();
        mux.handle("/a", Ok200).unwrap();
        let err = mux.handle("/a", Ok200).unwrap_err();
        assert_eq!(err, crate::errors::ErrorKind::HttpPatternDuplicated);
    }

    #[tokio::test]
    async fn trailing_slash_pattern_matches_as_prefix() {
        let mut mux: HttpMux<()> = HttpMux::new();
        mux.handle("/static/", Ok200).unwrap();

        let req = request("/static/app.js");
        let mut resp = Response::new(&RespLimits::default());
        let mut data = ();
        mux.serve_http(&mut data, &req, &mut resp).await;
        assert!(resp.buffer().starts_with(b"HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn unmatched_path_gets_404() {
        let mux: HttpMux<()> = HttpMux::new();
        let req = request("/nope");
        let mut resp = Response::new(&RespLimits::default());
        let mut data = ();
        mux.serve_http(&mut data, &req, &mut resp).await;
        assert!(resp.buffer().starts_with(b"HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn dotdot_path_is_rejected() {
        let mux: HttpMux<()> = HttpMux::new();
        let req = request("/a/../b");
        let mut resp = Response::new(&RespLimits::default());
        let mut data = ();
        mux.serve_http(&mut data, &req, &mut resp).await;
        assert!(resp.buffer().starts_with(b"HTTP/1.1 400"));
    }
}
