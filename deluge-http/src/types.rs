use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use super::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

type BodyFuture = Pin<Box<dyn Future<Output = Result<Bytes>> + Send>>;

/// A response whose head (status and headers) has been received while the body is
/// still on the wire.
pub struct PendingResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: BodyFuture,
}

impl PendingResponse {
    pub fn new<F>(status: u16, headers: Vec<(String, String)>, body: F) -> Self
    where
        F: Future<Output = Result<Bytes>> + Send + 'static,
    {
        Self {
            status,
            headers,
            body: Box::pin(body),
        }
    }

    /// A response with a body that is already available.
    pub fn ready(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self::new(status, headers, std::future::ready(Ok(body)))
    }

    pub async fn into_response(self) -> Result<HttpResponse> {
        let body = self.body.await?;
        Ok(HttpResponse {
            status: self.status,
            body,
            headers: self.headers,
        })
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Bounds the wait for the response head.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self::new(http::Method::GET, url.to_string())
    }

    pub fn post(url: &str, body: Bytes) -> Self {
        let mut req = Self::new(http::Method::POST, url.to_string());
        req.body = body;
        req
    }

    pub fn new(method: http::Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_response_yields_its_body() -> Result<()> {
        let pending = PendingResponse::ready(
            201,
            vec![("x-a".to_string(), "1".to_string())],
            Bytes::from_static(b"ok"),
        );
        assert_eq!(pending.status, 201);

        let res = pending.into_response().await?;
        assert_eq!(res.status, 201);
        assert_eq!(res.body_utf8(), Some("ok"));
        assert_eq!(res.headers, vec![("x-a".to_string(), "1".to_string())]);
        Ok(())
    }

    #[test]
    fn request_builders_set_method_and_body() {
        let req = HttpRequest::post("http://localhost/", Bytes::from_static(b"ping"))
            .with_header("x-test", "1");
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.body.as_ref(), b"ping");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(HttpRequest::get("http://h/").method, http::Method::GET);
    }
}
