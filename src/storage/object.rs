//! Client for a hosted object storage REST API (Supabase storage dialect).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::BelegError;

use super::{DownloadHandle, StorageBackend};

/// Page size for listing requests.
const LIST_LIMIT: u32 = 1000;

/// Object storage backend speaking the Supabase storage API.
#[derive(Debug, Clone)]
pub struct ObjectStorageBackend {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    signed_url_ttl: Duration,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    prefixes: [&'a str; 1],
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl ObjectStorageBackend {
    /// `endpoint` is the storage API base, e.g. `https://project.example.co/storage/v1`.
    pub fn new(
        endpoint: &str,
        bucket: &str,
        service_key: &str,
        signed_url_ttl: Duration,
        request_timeout: Duration,
    ) -> Result<Self, BelegError> {
        if endpoint.trim().is_empty() || bucket.trim().is_empty() {
            return Err(BelegError::Config(
                "object storage needs an endpoint and a bucket".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {service_key}"))
                .map_err(|e| BelegError::Config(format!("invalid service key header value: {e}")))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(service_key)
                .map_err(|e| BelegError::Config(format!("invalid service key header value: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BelegError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            signed_url_ttl,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, path)
    }

    async fn send(&self, action: &str, request: reqwest::RequestBuilder) -> Result<Response, BelegError> {
        request.send().await.map_err(|e| {
            warn!(action, error = %e, "object storage request failed");
            BelegError::StorageUnavailable(format!("{action}: {e}"))
        })
    }
}

/// Map a non-success response onto the error taxonomy.
async fn status_error(action: &str, path: &str, response: Response) -> BelegError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => {
            BelegError::ArtifactTooLarge(format!("{action} '{path}': HTTP {status}"))
        }
        StatusCode::NOT_FOUND => BelegError::NotFound(format!("artifact '{path}'")),
        _ => BelegError::StorageUnavailable(format!("{action} '{path}': HTTP {status}: {body}")),
    }
}

fn content_type(path: &str) -> &'static str {
    if path.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl StorageBackend for ObjectStorageBackend {
    fn name(&self) -> &'static str {
        "object"
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), BelegError> {
        let request = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type(path))
            .header("x-upsert", "true")
            .body(bytes.to_vec());
        let response = self.send("upload", request).await?;
        if !response.status().is_success() {
            return Err(status_error("upload", path, response).await);
        }
        debug!(bucket = %self.bucket, path, size = bytes.len(), "object uploaded");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, BelegError> {
        let request = self
            .client
            .get(format!("{}/object/authenticated/{}/{}", self.endpoint, self.bucket, path));
        let response = self.send("download", request).await?;
        if !response.status().is_success() {
            return Err(status_error("download", path, response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BelegError::StorageUnavailable(format!("download '{path}': {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<(), BelegError> {
        let request = self
            .client
            .delete(format!("{}/object/{}", self.endpoint, self.bucket))
            .json(&DeleteRequest { prefixes: [path] });
        let response = self.send("delete", request).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(bucket = %self.bucket, path, "object deleted");
            return Ok(());
        }
        Err(status_error("delete", path, response).await)
    }

    async fn exists(&self, path: &str) -> Result<bool, BelegError> {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
        Ok(self.list(dir).await?.iter().any(|n| n == name))
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, BelegError> {
        let mut names = Vec::new();
        let mut offset = 0;
        loop {
            let request = self
                .client
                .post(format!("{}/object/list/{}", self.endpoint, self.bucket))
                .json(&ListRequest {
                    prefix: dir,
                    limit: LIST_LIMIT,
                    offset,
                });
            let response = self.send("list", request).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(names);
            }
            if !response.status().is_success() {
                return Err(status_error("list", dir, response).await);
            }
            let page: Vec<ListEntry> = response
                .json()
                .await
                .map_err(|e| BelegError::StorageUnavailable(format!("list '{dir}': {e}")))?;
            let count = page.len() as u32;
            names.extend(page.into_iter().map(|e| e.name));
            if count < LIST_LIMIT {
                return Ok(names);
            }
            offset += count;
        }
    }

    async fn download_handle(&self, path: &str) -> Result<DownloadHandle, BelegError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.signed_url_ttl)
                .map_err(|e| BelegError::Config(format!("signed URL lifetime: {e}")))?;
        let request = self
            .client
            .post(format!("{}/object/sign/{}/{}", self.endpoint, self.bucket, path))
            .json(&SignRequest {
                expires_in: self.signed_url_ttl.as_secs(),
            });
        let response = self.send("sign", request).await?;
        if !response.status().is_success() {
            return Err(status_error("sign", path, response).await);
        }
        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| BelegError::StorageUnavailable(format!("sign '{path}': {e}")))?;

        let url = if signed.signed_url.starts_with("http") {
            signed.signed_url
        } else {
            format!("{}/{}", self.endpoint, signed.signed_url.trim_start_matches('/'))
        };
        Ok(DownloadHandle::SignedUrl { url, expires_at })
    }
}
