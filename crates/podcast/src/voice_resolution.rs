//! Voice ID resolution (spec §4.11, §6): a UUID-shaped id denotes a
//! user-owned custom [`Voice`] that must be `READY`; anything else is a
//! preset name on the default TTS provider.

use std::sync::Arc;
use uuid::Uuid;

use ragflow_core::{Error, Result, TextToSpeech, VoiceStatus};
use ragflow_llm::ProviderRegistry;
use ragflow_persistence::VoiceStore;

pub const DEFAULT_TTS_PROVIDER: &str = "openai";

/// A resolved voice: the provider instance to call, and the id that
/// provider expects (a preset name, or the custom voice's
/// `provider_voice_id`).
pub struct ResolvedVoice {
    pub provider: Arc<dyn TextToSpeech>,
    pub provider_voice_id: String,
}

pub async fn resolve(
    registry: &ProviderRegistry,
    voices: &dyn VoiceStore,
    user_id: Uuid,
    voice_id: &str,
) -> Result<ResolvedVoice> {
    if let Ok(id) = Uuid::parse_str(voice_id) {
        let voice = voices
            .get(user_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("voice {voice_id}")))?;
        if voice.status != VoiceStatus::Ready {
            return Err(Error::Validation(format!("voice {voice_id} is not READY")));
        }
        let provider_voice_id = voice
            .provider_voice_id
            .clone()
            .ok_or_else(|| Error::Validation(format!("voice {voice_id} has no provider voice id")))?;
        let provider = registry
            .get_tts(&voice.provider_name)
            .await
            .map_err(|e| Error::ProviderPermanent(e.message))?;
        return Ok(ResolvedVoice { provider, provider_voice_id });
    }

    let provider =
        registry.get_tts(DEFAULT_TTS_PROVIDER).await.map_err(|e| Error::ProviderPermanent(e.message))?;
    Ok(ResolvedVoice { provider, provider_voice_id: voice_id.to_string() })
}

/// Submission-time validation of voice id shape and ownership, without
/// resolving a provider (spec §4.11 "voice IDs must validate").
pub async fn validate(voices: &dyn VoiceStore, user_id: Uuid, voice_id: &str) -> Result<()> {
    if let Ok(id) = Uuid::parse_str(voice_id) {
        let voice = voices
            .get(user_id, id)
            .await?
            .ok_or_else(|| Error::Validation(format!("voice {voice_id} not found")))?;
        if voice.status != VoiceStatus::Ready {
            return Err(Error::Validation(format!("voice {voice_id} is not READY")));
        }
    }
    // Non-UUID strings are accepted unchecked as preset names; the TTS
    // provider itself is the source of truth for which presets exist.
    Ok(())
}
