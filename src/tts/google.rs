//! Google Cloud Text-to-Speech client (REST, API-key authenticated).

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serenity::async_trait;
use tracing::{debug, error, info};
use url::Url;

use super::{AudioResource, SpeechSynthesizer, SynthesisError, SynthesisRequest};

const SYNTHESIZE_PATH: &str = "v1/text:synthesize";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: TextInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

pub struct GoogleTts {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl GoogleTts {
    /// Create a client. `timeout` bounds each synthesis call end to end.
    pub fn new(endpoint: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self, SynthesisError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    fn synthesize_url(&self) -> Result<Url, SynthesisError> {
        self.endpoint
            .join(SYNTHESIZE_PATH)
            .map_err(|e| SynthesisError::Decode(format!("bad endpoint: {e}")))
    }
}

/// Pull the human readable message out of a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResource, SynthesisError> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let body = SynthesizeBody {
            input: TextInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.language_code,
                ssml_gender: request.voice_gender.as_api_str(),
            },
            audio_config: AudioConfig {
                audio_encoding: request.audio_encoding.as_api_str(),
                speaking_rate: request.speaking_rate,
            },
        };

        debug!(
            "Requesting synthesis of {} chars in {}",
            request.text.chars().count(),
            request.language_code
        );

        let response = self
            .client
            .post(self.synthesize_url()?)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text);
            error!("Speech synthesis failed with {}: {}", status, message);
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: SynthesizeResponse = response.json().await?;
        let bytes = BASE64
            .decode(payload.audio_content.as_bytes())
            .map_err(|e| SynthesisError::Decode(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SynthesisError::Decode("empty audio content".to_string()));
        }

        info!("Synthesized {} bytes of {:?} audio", bytes.len(), request.audio_encoding);
        Ok(AudioResource::new(bytes, request.audio_encoding))
    }
}
