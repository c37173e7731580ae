use async_trait::async_trait;
use deluge_http::{HttpClient, HttpRequest, PendingResponse};

/// Performs the network part of the `http` builtin.
///
/// Resolves once the response head is available; the body stays in the returned
/// [`PendingResponse`]. One executor is shared by every simulated user of a run.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn send(&self, req: HttpRequest) -> deluge_http::Result<PendingResponse>;
}

#[async_trait]
impl HttpExecutor for HttpClient {
    async fn send(&self, req: HttpRequest) -> deluge_http::Result<PendingResponse> {
        HttpClient::send(self, req).await
    }
}
