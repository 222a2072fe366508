//! HTTP client for the voice host's `/health`, `/asr`, `/tts` surface
//! (`spec.md` §6), grounded in the teacher's `SidecarService` HTTP
//! dispatch style (`reqwest::Client` with a bounded timeout, JSON/bytes
//! response handling).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state_machine::SpeechClient;
use super::VoiceError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
pub struct TtsRequest {
    pub text: String,
    pub request_id: String,
    pub engine: String,
    pub model_id: Option<String>,
    pub voice_id: Option<String>,
    pub voice: Option<String>,
    pub format: String,
    pub sample_rate: u32,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TtsJsonBody {
    #[serde(alias = "audioBase64", alias = "audio", alias = "data")]
    audio_base64: Option<String>,
}

pub struct VoiceHostClient {
    http: Client,
    base_url: String,
}

impl VoiceHostClient {
    /// `base_url` MUST be loopback http (`spec.md` §6); enforced here, not
    /// left to the caller.
    pub fn new(base_url: impl Into<String>) -> Result<Self, VoiceError> {
        let base_url = base_url.into();
        validate_loopback(&base_url)?;
        Ok(Self {
            http: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
        })
    }

    /// `POST {base}/asr` with a multipart body. Returns the transcript
    /// text, accepting any of `text`/`transcript`/`result`/`output` JSON
    /// keys, or a plain-text body.
    pub async fn asr(
        &self,
        audio_wav: Vec<u8>,
        session_id: &str,
        engine: &str,
        model_id: Option<&str>,
        language: Option<&str>,
    ) -> Result<String, VoiceError> {
        let request_id = Uuid::new_v4().to_string();
        let mut form = reqwest::multipart::Form::new()
            .part(
                "audio",
                reqwest::multipart::Part::bytes(audio_wav).file_name("clip.wav"),
            )
            .text("sessionId", session_id.to_string())
            .text("engine", engine.to_string())
            .text("requestId", request_id.clone());
        if let Some(model_id) = model_id {
            form = form.text("modelId", model_id.to_string());
        }
        if let Some(language) = language {
            form = form.text("sttLanguage", language.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/asr", self.base_url))
            .header("X-Request-Id", &request_id)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::Transport(format!(
                "voice host /asr returned status {}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            let body: Value = resp
                .json()
                .await
                .map_err(|e| VoiceError::Transport(e.to_string()))?;
            for key in ["text", "transcript", "result", "output"] {
                if let Some(text) = body.get(key).and_then(|v| v.as_str()) {
                    return Ok(text.to_string());
                }
            }
            return Err(VoiceError::Transport(
                "voice host /asr JSON body had no text field".to_string(),
            ));
        }

        resp.text()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    /// `POST {base}/tts`. Returns raw audio bytes, accepting either a
    /// binary `audio/*` response or a JSON body with a base64 field.
    pub async fn tts(&self, request: TtsRequest) -> Result<Vec<u8>, VoiceError> {
        let resp = self
            .http
            .post(format!("{}/tts", self.base_url))
            .header("X-Request-Id", &request.request_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::Transport(format!(
                "voice host /tts returned status {}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("audio/") {
            return resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| VoiceError::Transport(e.to_string()));
        }

        let body: TtsJsonBody = resp
            .json()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        let encoded = body
            .audio_base64
            .ok_or_else(|| VoiceError::Transport("voice host /tts body had no audio".to_string()))?;
        decode_base64(&encoded).map_err(VoiceError::Transport)
    }
}

/// Binds a [`VoiceHostClient`] to fixed ASR/TTS engine and voice settings
/// so it can satisfy the state machine's narrow [`SpeechClient`] contract.
pub struct VoiceHostSpeechClient {
    client: VoiceHostClient,
    asr_engine: String,
    asr_model_id: Option<String>,
    asr_language: Option<String>,
    tts_engine: String,
    tts_model_id: Option<String>,
    tts_voice_id: Option<String>,
    sample_rate: u32,
}

impl VoiceHostSpeechClient {
    pub fn new(
        client: VoiceHostClient,
        asr_engine: impl Into<String>,
        tts_engine: impl Into<String>,
        tts_voice_id: Option<String>,
    ) -> Self {
        Self {
            client,
            asr_engine: asr_engine.into(),
            asr_model_id: None,
            asr_language: None,
            tts_engine: tts_engine.into(),
            tts_model_id: None,
            tts_voice_id,
            sample_rate: 24_000,
        }
    }
}

#[async_trait]
impl SpeechClient for VoiceHostSpeechClient {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        session_id: &str,
        _preview: bool,
    ) -> Result<String, VoiceError> {
        self.client
            .asr(
                audio,
                session_id,
                &self.asr_engine,
                self.asr_model_id.as_deref(),
                self.asr_language.as_deref(),
            )
            .await
    }

    async fn synthesize(&self, text: &str, session_id: &str) -> Result<Vec<u8>, VoiceError> {
        let request = TtsRequest {
            text: text.to_string(),
            request_id: Uuid::new_v4().to_string(),
            engine: self.tts_engine.clone(),
            model_id: self.tts_model_id.clone(),
            voice_id: self.tts_voice_id.clone(),
            voice: None,
            format: "pcm_s16le".to_string(),
            sample_rate: self.sample_rate,
            session_id: session_id.to_string(),
        };
        self.client.tts(request).await
    }
}

fn validate_loopback(base_url: &str) -> Result<(), VoiceError> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| VoiceError::InvalidHostUrl(format!("{base_url}: {e}")))?;
    if url.scheme() != "http" {
        return Err(VoiceError::InvalidHostUrl(format!(
            "{base_url}: scheme must be http"
        )));
    }
    match url.host_str() {
        Some("127.0.0.1") | Some("localhost") => Ok(()),
        Some(other) => Err(VoiceError::InvalidHostUrl(format!(
            "{base_url}: host '{other}' is not loopback"
        ))),
        None => Err(VoiceError::InvalidHostUrl(base_url.to_string())),
    }
}

fn decode_base64(input: &str) -> Result<Vec<u8>, String> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input)
        .map_err(|e| format!("invalid base64: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_127_is_accepted() {
        assert!(VoiceHostClient::new("http://127.0.0.1:8799").is_ok());
    }

    #[test]
    fn loopback_localhost_is_accepted() {
        assert!(VoiceHostClient::new("http://localhost:8799").is_ok());
    }

    #[test]
    fn non_loopback_host_is_rejected() {
        let err = VoiceHostClient::new("http://example.com:8799").unwrap_err();
        assert!(matches!(err, VoiceError::InvalidHostUrl(_)));
    }

    #[test]
    fn https_scheme_is_rejected() {
        let err = VoiceHostClient::new("https://127.0.0.1:8799").unwrap_err();
        assert!(matches!(err, VoiceError::InvalidHostUrl(_)));
    }

    #[test]
    fn base64_round_trips() {
        use base64::Engine;
        let original = b"hello world, this is a wav-shaped blob!";
        let encoded = base64::engine::general_purpose::STANDARD.encode(original);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(decode_base64("not valid base64!!!").is_err());
    }
}
