use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::{Error, HttpRequest, HttpResponse, PendingResponse, Result};

/// HTTP/1 client shared by every simulated user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // Unreachable targets would otherwise hang a user for the OS connect timeout.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Sends the request and resolves as soon as the response head arrives.
    ///
    /// `req.timeout` bounds the wait for the head only; the body is read later through
    /// [`PendingResponse::into_response`].
    pub async fn send(&self, req: HttpRequest) -> Result<PendingResponse> {
        let timeout = req.timeout;
        let call = self.inner.request(to_hyper(req)?);

        let res = match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => call.await?,
        };

        let (parts, body) = res.into_parts();
        Ok(PendingResponse::new(
            parts.status.as_u16(),
            flatten_headers(&parts.headers),
            async move { Ok::<_, Error>(body.collect().await?.to_bytes()) },
        ))
    }

    /// Sends the request and reads the whole body.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.send(req).await?.into_response().await
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

/// Validates the target and headers. `Host` and `Content-Length` are left to hyper.
fn to_hyper(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(Error::UnsupportedScheme(req.url)),
        None => return Err(Error::InvalidUrl(req.url)),
    }
    if uri.host().is_none() {
        return Err(Error::InvalidUrl(req.url));
    }

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    for (name, value) in &req.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::invalid_header(name, e))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| Error::invalid_header(name, e))?;
        headers.append(header_name, header_value);
    }

    let mut out = Request::new(Full::new(req.body));
    *out.method_mut() = req.method;
    *out.uri_mut() = uri;
    *out.headers_mut() = headers;
    Ok(out)
}

/// One entry per header name, sorted; repeated values are joined with ", ".
fn flatten_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}
