#![forbid(unsafe_code)]

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Host whose delivery URLs support path-embedded transformation directives.
const DELIVERY_HOST: &str = "cloudinary.com";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image exceeds {} MB limit", MAX_UPLOAD_SIZE / (1024 * 1024))]
    TooLarge(usize),
    #[error("image host unreachable: {0}")]
    Transport(String),
    #[error("image host returned status {0}")]
    Status(u16),
    #[error("image host returned an unexpected payload")]
    InvalidResponse,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub upload_preset: String,
    pub folder: String,
    pub timeout: Duration,
}

impl MediaConfig {
    #[must_use]
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            folder: folder.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Uploads measurement photos to the hosted image CDN. Uploads go through a
/// fixed unsigned preset into a fixed folder; the returned URL is durable.
pub struct MediaClient {
    config: MediaConfig,
    http: reqwest::Client,
}

impl MediaClient {
    #[must_use]
    pub fn new(config: MediaConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, http }
    }

    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String, MediaError> {
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(MediaError::TooLarge(bytes.len()));
        }

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        );
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_owned());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("folder", self.config.folder.clone());

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| MediaError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status(status.as_u16()));
        }

        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|_| MediaError::InvalidResponse)?;
        Ok(body.secure_url)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

// ---------------------------------------------------------------------------
// Delivery URL transformation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Auto,
    Fixed(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Auto,
    Jpg,
    Png,
    Webp,
}

impl ImageFormat {
    fn directive(self) -> &'static str {
        match self {
            ImageFormat::Auto => "f_auto",
            ImageFormat::Jpg => "f_jpg",
            ImageFormat::Png => "f_png",
            ImageFormat::Webp => "f_webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Quality,
    pub format: ImageFormat,
}

/// Derives a transformed delivery URL by inserting width/height/quality/format
/// directives into the path after `/upload/`. URLs from any other origin pass
/// through unchanged, as do known-host URLs without an upload segment.
#[must_use]
pub fn delivery_url(url: &str, options: &DeliveryOptions) -> String {
    if !url.contains(DELIVERY_HOST) {
        return url.to_owned();
    }

    let Some((prefix, suffix)) = url.split_once("/upload/") else {
        return url.to_owned();
    };

    let mut directives = Vec::new();
    if let Some(width) = options.width {
        directives.push(format!("w_{width}"));
    }
    if let Some(height) = options.height {
        directives.push(format!("h_{height}"));
    }
    directives.push(match options.quality {
        Quality::Auto => "q_auto".to_owned(),
        Quality::Fixed(value) => format!("q_{value}"),
    });
    directives.push(options.format.directive().to_owned());

    format!("{prefix}/upload/{}/{suffix}", directives.join(","))
}

#[cfg(test)]
mod tests {
    use super::{delivery_url, DeliveryOptions, ImageFormat, Quality};

    const HOSTED: &str = "https://res.cloudinary.com/demo/image/upload/v1/cota/wall.jpg";

    #[test]
    fn foreign_urls_pass_through() {
        let url = "https://images.example/photo.jpg";
        assert_eq!(delivery_url(url, &DeliveryOptions::default()), url);
    }

    #[test]
    fn default_options_apply_auto_quality_and_format() {
        assert_eq!(
            delivery_url(HOSTED, &DeliveryOptions::default()),
            "https://res.cloudinary.com/demo/image/upload/q_auto,f_auto/v1/cota/wall.jpg"
        );
    }

    #[test]
    fn width_and_height_come_before_quality() {
        let options = DeliveryOptions {
            width: Some(640),
            height: Some(480),
            quality: Quality::Fixed(80),
            format: ImageFormat::Webp,
        };
        assert_eq!(
            delivery_url(HOSTED, &options),
            "https://res.cloudinary.com/demo/image/upload/w_640,h_480,q_80,f_webp/v1/cota/wall.jpg"
        );
    }

    #[test]
    fn known_host_without_upload_segment_passes_through() {
        let url = "https://res.cloudinary.com/demo/raw/fetch/sample.jpg";
        assert_eq!(delivery_url(url, &DeliveryOptions::default()), url);
    }

    #[tokio::test]
    async fn upload_rejects_oversized_payloads_without_network() {
        let client = super::MediaClient::new(super::MediaConfig::new("demo", "preset", "cota"));
        let oversized = vec![0_u8; super::MAX_UPLOAD_SIZE + 1];
        let error = client
            .upload(oversized, "big.jpg")
            .await
            .expect_err("oversized upload should fail");
        assert!(matches!(error, super::MediaError::TooLarge(_)));
    }
}
