//! Speech provider gateway (Speechify API)
//!
//! This module contains the HTTP client for the external voice provider:
//! - `clone_voice`: upload a voice sample, get back a voice id
//! - `synthesize`: turn text into audio bytes using a cloned voice
//!
//! Transport failures and 5xx responses are retryable (`Unavailable`) and
//! must never consume user quota; 4xx responses carry the provider's own
//! `message` verbatim (`Rejected`).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::config;

/// Errors returned by the speech provider gateway.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Provider is unreachable, timed out or answered 5xx. Retryable,
    /// no counters may be mutated on this path.
    #[error("speech provider unavailable: {0}")]
    Unavailable(String),

    /// Provider rejected the request (bad audio, oversize file, malformed
    /// consent). The message is the provider's own, relayed to the user.
    #[error("speech provider rejected the request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        SpeechError::Unavailable(err.to_string())
    }
}

/// Result of a successful voice-clone call.
#[derive(Debug, Clone)]
pub struct ClonedVoice {
    pub voice_id: String,
    pub status: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    input: &'a str,
    voice_id: &'a str,
    output_format: &'a str,
    model: &'a str,
}

/// HTTP client for the Speechify voice API.
#[derive(Clone)]
pub struct SpeechClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SpeechClient {
    /// Creates a client with an explicit key and base URL (used by tests).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config::speech::timeout())
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Creates a client from SPEECHIFY_API_KEY / SPEECHIFY_API_URL.
    pub fn from_env() -> Self {
        Self::new(config::speech::API_KEY.clone(), config::speech::API_URL.clone())
    }

    /// Turns an error response into the right taxonomy bucket.
    ///
    /// 5xx is transient (the provider said so, not the user), 4xx carries a
    /// human-readable `message` we relay verbatim when present.
    async fn error_from_response(resp: reqwest::Response) -> SpeechError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.clone()
                }
            });

        if status.is_server_error() {
            SpeechError::Unavailable(message)
        } else {
            SpeechError::Rejected(message)
        }
    }

    /// Synthesizes `text` with the given cloned voice, returning mp3 bytes.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SpeechError> {
        let payload = SynthesizeRequest {
            input: text,
            voice_id,
            output_format: "mp3",
            model: "simba-multilingual",
        };

        let resp = self
            .http
            .post(format!("{}/v1/audio/stream", self.base_url))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let bytes = resp.bytes().await?;
        log::info!(
            "Synthesized {} chars into {} bytes with voice {}",
            text.chars().count(),
            bytes.len(),
            voice_id
        );
        Ok(bytes.to_vec())
    }

    /// Clones a voice from a raw audio sample.
    ///
    /// The provider requires an explicit consent record alongside the sample;
    /// we fill it from the user's display name.
    pub async fn clone_voice(&self, display_name: &str, sample: Vec<u8>) -> Result<ClonedVoice, SpeechError> {
        let consent = serde_json::json!({
            "fullName": display_name,
            "email": "",
        })
        .to_string();

        let part = reqwest::multipart::Part::bytes(sample)
            .file_name("sample.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| SpeechError::Rejected(format!("bad sample mime: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("name", display_name.to_string())
            .text("consent", consent)
            .part("sample", part);

        let resp = self
            .http
            .post(format!("{}/v1/voices", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let body: Value = resp.json().await?;
        let voice_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SpeechError::Rejected("provider response has no voice id".to_string()))?
            .to_string();
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("active")
            .to_string();

        log::info!("Voice cloned: id={}, status={}", voice_id, status);
        Ok(ClonedVoice { voice_id, status })
    }
}
