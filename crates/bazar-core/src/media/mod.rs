//! Image upload to the external media host.
//!
//! One unsigned multipart POST per image; the host answers with a durable
//! public URL that is stored on the listing.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::util::{compact_text, normalize_base_url};
use crate::{Error, Result};

pub const DEFAULT_MEDIA_API_URL: &str = "https://api.cloudinary.com";

/// An image picked by the user, not yet uploaded
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Content type guessed from the file extension.
    #[must_use]
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Anything that can turn image bytes into a public URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload_image(&self, image: &ImageFile) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

/// Unsigned-preset uploader for a Cloudinary-compatible host.
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    upload_url: String,
    upload_preset: String,
    client: reqwest::Client,
}

impl CloudinaryUploader {
    pub fn new(api_url: &str, cloud_name: &str, upload_preset: &str) -> Result<Self> {
        let base = normalize_base_url(api_url, "Media API URL").map_err(Error::Validation)?;
        let cloud_name = cloud_name.trim();
        if cloud_name.is_empty() {
            return Err(Error::validation("Media cloud name must not be empty"));
        }
        let upload_preset = upload_preset.trim();
        if upload_preset.is_empty() {
            return Err(Error::validation("Media upload preset must not be empty"));
        }

        Ok(Self {
            upload_url: format!(
                "{base}/v1_1/{}/image/upload",
                urlencoding::encode(cloud_name)
            ),
            upload_preset: upload_preset.to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload_image(&self, image: &ImageFile) -> Result<String> {
        if image.bytes.is_empty() {
            return Err(Error::validation("Image file is empty"));
        }

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type())?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        tracing::debug!(file = %image.file_name, size = image.bytes.len(), "Uploading image");
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| Error::Media(format!("Upload request failed: {error}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Media(format!(
                "Upload failed with HTTP {status}: {}",
                compact_text(&body)
            )));
        }

        let payload = response
            .json::<UploadResponse>()
            .await
            .map_err(|error| Error::Media(format!("Failed to parse upload response: {error}")))?;
        payload
            .secure_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Media("Upload response did not include a secure_url".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png() -> ImageFile {
        ImageFile::new("bike.png", vec![0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(png().content_type(), "image/png");
        assert_eq!(
            ImageFile::new("blob", vec![1]).content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn new_requires_cloud_and_preset() {
        assert!(CloudinaryUploader::new(DEFAULT_MEDIA_API_URL, " ", "p").is_err());
        assert!(CloudinaryUploader::new(DEFAULT_MEDIA_API_URL, "demo", "").is_err());
        let uploader = CloudinaryUploader::new("https://api.cloudinary.com/", "demo", "p").unwrap();
        assert_eq!(
            uploader.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }

    #[tokio::test]
    async fn upload_returns_secure_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secure_url": "https://res.cloudinary.com/demo/bike.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = CloudinaryUploader::new(&server.uri(), "demo", "unsigned").unwrap();
        let url = uploader.upload_image(&png()).await.unwrap();
        assert_eq!(url, "https://res.cloudinary.com/demo/bike.png");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"upload_preset\""));
        assert!(body.contains("unsigned"));
        assert!(body.contains("filename=\"bike.png\""));
    }

    #[tokio::test]
    async fn missing_secure_url_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "public_id": "x" })))
            .mount(&server)
            .await;

        let uploader = CloudinaryUploader::new(&server.uri(), "demo", "unsigned").unwrap();
        let error = uploader.upload_image(&png()).await.unwrap_err();
        assert!(matches!(error, Error::Media(_)));
    }

    #[tokio::test]
    async fn rejected_upload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Upload preset not found"))
            .mount(&server)
            .await;

        let uploader = CloudinaryUploader::new(&server.uri(), "demo", "missing").unwrap();
        let error = uploader.upload_image(&png()).await.unwrap_err();
        assert!(error.to_string().contains("preset not found"));
    }
}
