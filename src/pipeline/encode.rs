//! Image intake: client base64 string → validated [`ImagePayload`].
//!
//! Clients send screenshots as bare base64 strings, sometimes with a
//! `data:image/...;base64,` prefix still attached. Both providers want the
//! image again, the OCR endpoint as a data URI and the vision chat as an
//! attachment, so the string is validated and its format sniffed once here.
//! The format comes from the decoded magic bytes, not the client's prefix;
//! unrecognised payloads are labelled JPEG, which is what phone cameras send.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use tracing::debug;

use crate::error::AssistError;

/// A validated base64-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    base64: String,
    mime_type: &'static str,
}

impl ImagePayload {
    /// Validate a client-supplied base64 image.
    ///
    /// # Errors
    /// [`AssistError::InvalidRequest`] when the string is empty or not base64.
    pub fn from_client(raw: &str) -> Result<Self, AssistError> {
        let body = strip_data_uri_prefix(raw.trim());
        let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if body.is_empty() {
            return Err(AssistError::invalid_request("image data is empty"));
        }

        let bytes = STANDARD.decode(&body).map_err(|e| {
            AssistError::invalid_request(format!("image data is not valid base64: {e}"))
        })?;

        let mime_type = sniff_mime_type(&bytes);
        debug!("Accepted {} image, {} bytes base64", mime_type, body.len());

        Ok(Self {
            base64: body,
            mime_type,
        })
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// `data:<mime>;base64,<payload>` for URL-style image fields.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    /// Attachment form for multimodal chat messages.
    ///
    /// `detail: "high"` keeps small print legible; problem statements and
    /// code snippets in screenshots are exactly that.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), self.mime_type).with_detail("high")
    }
}

fn strip_data_uri_prefix(s: &str) -> &str {
    if s.starts_with("data:") {
        if let Some((_, rest)) = s.split_once(";base64,") {
            return rest;
        }
    }
    s
}

fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "image/jpeg",
    }
}
