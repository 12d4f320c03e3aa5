//! TTS providers for podcast synthesis (spec §4.1, §4.11). Two concrete
//! backends mirror scenario E's mixed-provider requirement: a custom-voice
//! provider (ElevenLabs-style cloning) and a preset-voice provider
//! (OpenAI-style named voices).

use async_trait::async_trait;
use ragflow_core::{AudioFormat, ProviderError, ProviderErrorKind, TextToSpeech};

fn format_mime(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "audio/mpeg",
        AudioFormat::Wav => "audio/wav",
        AudioFormat::Ogg => "audio/ogg",
        AudioFormat::Flac => "audio/flac",
    }
}

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
}

impl ElevenLabsTts {
    pub fn new(api_key: String) -> Self {
        Self { client: reqwest::Client::new(), api_key }
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn clone_voice(
        &self,
        sample_bytes: &[u8],
        name: &str,
        description: Option<&str>,
    ) -> Result<String, ProviderError> {
        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .text("description", description.unwrap_or_default().to_string())
            .part("files", reqwest::multipart::Part::bytes(sample_bytes.to_vec()));
        let response = self
            .client
            .post("https://api.elevenlabs.io/v1/voices/add")
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Transient,
                format!("voice clone failed: {}", response.status()),
            ));
        }
        #[derive(serde::Deserialize)]
        struct VoiceIdResponse {
            voice_id: String,
        }
        let parsed: VoiceIdResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadRequest, e.to_string()))?;
        Ok(parsed.voice_id)
    }

    async fn synthesize_turn(
        &self,
        voice_id: &str,
        text: &str,
        speed: f32,
        _pitch: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, ProviderError> {
        let _ = format_mime(format);
        let response = self
            .client
            .post(format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}"))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "voice_settings": { "speed": speed },
            }))
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Transient,
                format!("synthesis failed: {}", response.status()),
            ));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))
    }

    async fn delete_voice(&self, provider_voice_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete(format!("https://api.elevenlabs.io/v1/voices/{provider_voice_id}"))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "elevenlabs"
    }

    async fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::Auth, "empty API key"));
        }
        Ok(())
    }
}

pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiTts {
    pub fn new(api_key: String) -> Self {
        Self { client: reqwest::Client::new(), api_key }
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn clone_voice(
        &self,
        _sample_bytes: &[u8],
        _name: &str,
        _description: Option<&str>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::new(
            ProviderErrorKind::Permanent,
            "this provider only serves preset voices",
        ))
    }

    async fn synthesize_turn(
        &self,
        voice_id: &str,
        text: &str,
        speed: f32,
        _pitch: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": "tts-1",
                "voice": voice_id,
                "input": text,
                "speed": speed,
                "response_format": format_mime(format).trim_start_matches("audio/"),
            }))
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Transient,
                format!("synthesis failed: {}", response.status()),
            ));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))
    }

    async fn delete_voice(&self, _provider_voice_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::Auth, "empty API key"));
        }
        Ok(())
    }
}
