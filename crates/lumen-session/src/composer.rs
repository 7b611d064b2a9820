//! Message composer and image attachment staging.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lumen_ai::ChatStreamRequest;
use tracing::warn;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Encoded image bytes staged for upload.
pub struct ImagePayload {
    bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Accepts bare base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(encoded: &str) -> Result<Self, SessionError> {
        let trimmed = encoded.trim();
        let payload = match trimmed.strip_prefix("data:") {
            Some(data_url) => data_url
                .split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| SessionError::InvalidImage("data URL has no payload".to_string()))?,
            None => trimmed,
        };
        let cleaned = payload
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect::<String>();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|error| SessionError::InvalidImage(error.to_string()))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

#[async_trait]
/// Downscales an image before it is staged.
pub trait ImageResizer: Send + Sync {
    async fn resize(&self, payload: &ImagePayload) -> Result<ImagePayload, SessionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Everything taken out of the composer by one submit.
pub struct Submission {
    pub message: String,
    pub images: Vec<ImagePayload>,
}

impl Submission {
    pub fn to_request(&self, persona_id: Option<&str>) -> ChatStreamRequest {
        ChatStreamRequest {
            message: self.message.clone(),
            images: self.images.iter().map(ImagePayload::to_base64).collect(),
            persona_id: persona_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
/// Owns the pending attachment list. Input is disabled while an exchange
/// is in flight.
pub struct Composer {
    pending: Vec<ImagePayload>,
    enabled: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            enabled: true,
        }
    }

    /// Stages `payload` and returns its index.
    pub fn attach(&mut self, payload: ImagePayload) -> usize {
        self.pending.push(payload);
        self.pending.len() - 1
    }

    /// Resizes then stages `payload`. A failed resize stages the original.
    pub async fn attach_resized(
        &mut self,
        resizer: &dyn ImageResizer,
        payload: ImagePayload,
    ) -> usize {
        let staged = match resizer.resize(&payload).await {
            Ok(resized) => resized,
            Err(error) => {
                warn!(%error, "image resize failed; staging original payload");
                payload
            }
        };
        self.attach(staged)
    }

    pub fn remove(&mut self, index: usize) -> Option<ImagePayload> {
        if index < self.pending.len() {
            Some(self.pending.remove(index))
        } else {
            None
        }
    }

    pub fn pending(&self) -> &[ImagePayload] {
        &self.pending
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Takes the message and every pending image in one step. Returns `None`
    /// and leaves the composer untouched when there is nothing to send.
    pub fn take_submission(&mut self, text: &str) -> Option<Submission> {
        let message = text.trim();
        if message.is_empty() && self.pending.is_empty() {
            return None;
        }
        Some(Submission {
            message: message.to_string(),
            images: std::mem::take(&mut self.pending),
        })
    }
}
