//! Presigned-URL upload for captured images.

use std::time::Duration;

use crate::version::SNAPLET_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("upload rejected with status {0}")]
    Status(u16),
}

/// PUTs image bytes to caller-supplied presigned URLs.
pub struct Uploader {
    client: reqwest::Client,
}

impl Uploader {
    pub fn new() -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = format!("snaplet/{}", SNAPLET_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub async fn put_presigned(
        &self,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadError> {
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "presigned upload rejected");
        Err(UploadError::Status(status.as_u16()))
    }
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn put_presigned_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/shot.png"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = Uploader::new();
        let url = format!("{}/bucket/shot.png", server.uri());
        uploader
            .put_presigned(&url, b"png".to_vec(), "image/png")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn put_presigned_surfaces_rejection_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("expired"))
            .mount(&server)
            .await;

        let uploader = Uploader::new();
        let err = uploader
            .put_presigned(&server.uri(), b"jpg".to_vec(), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Status(403)));
    }
}
