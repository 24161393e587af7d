use crate::error::{RemoteError, RemoteResult};
use crate::remote::RemoteStore;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use storysync_engine::{
    ConflictReport, Document, SaveAccepted, SaveRequest, SaveResponse, SnapshotInfo, Version,
    VersionSnapshot,
};

/// Remote store reached over the storysync HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpRemote {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Append `segments` to the base url, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        Ok(self.authorize(request).send().await?)
    }

    async fn expect_json<T: DeserializeOwned>(&self, response: Response, id: &str) -> RemoteResult<T> {
        match response.status() {
            status if status.is_success() => decode(response).await,
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.to_string())),
            _ => Err(status_error(response).await),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

async fn status_error(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    RemoteError::Status { status, message }
}

impl RemoteStore for HttpRemote {
    async fn get_document(&self, id: &str) -> RemoteResult<Document> {
        let response = self
            .send(self.client.get(self.url(&["documents", id])?))
            .await?;
        self.expect_json(response, id).await
    }

    async fn create_document(&self, document: &Document) -> RemoteResult<Document> {
        let response = self
            .send(self.client.post(self.url(&["documents"])?).json(document))
            .await?;
        self.expect_json(response, &document.id).await
    }

    async fn put_document(&self, request: &SaveRequest) -> RemoteResult<SaveResponse> {
        let id = &request.document.id;
        let response = self
            .send(self.client.put(self.url(&["documents", id.as_str()])?).json(request))
            .await?;

        match response.status() {
            StatusCode::OK => Ok(SaveResponse::Accepted(decode::<SaveAccepted>(response).await?)),
            StatusCode::CONFLICT => Ok(SaveResponse::Conflict(
                decode::<ConflictReport>(response).await?,
            )),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(id.clone())),
            _ => Err(status_error(response).await),
        }
    }

    async fn record_snapshot(&self, id: &str) -> RemoteResult<SnapshotInfo> {
        let response = self
            .send(self.client.post(self.url(&["documents", id, "snapshots"])?))
            .await?;
        self.expect_json(response, id).await
    }

    async fn list_snapshots(&self, id: &str) -> RemoteResult<Vec<SnapshotInfo>> {
        let response = self
            .send(self.client.get(self.url(&["documents", id, "snapshots"])?))
            .await?;
        self.expect_json(response, id).await
    }

    async fn get_snapshot(&self, id: &str, version: Version) -> RemoteResult<VersionSnapshot> {
        let version_segment = version.to_string();
        let url = self.url(&["documents", id, "snapshots", version_segment.as_str()])?;
        let response = self.send(self.client.get(url)).await?;
        self.expect_json(response, &format!("{id}@{version}")).await
    }
}
