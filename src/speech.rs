//! # Speech Module
//!
//! Text-to-speech announcements played over the music through the
//! [`InterruptOverlay`].
//!
//! Synthesis goes through [`SpeechProvider`]. Two implementations ship: an
//! OpenAI-compatible `/audio/speech` client and an ElevenLabs client. Each
//! guild may pick one through its `tts_provider` setting; `TTS_PROVIDER` is
//! the default:
//!
//! ```env
//! TTS_PROVIDER=OPENAI         # OPENAI | ELEVENLABS
//! TTS_API_KEY=sk-...
//! TTS_BASE_URL=https://api.openai.com/v1
//! TTS_MODEL=gpt-4o-mini-tts
//! TTS_VOICE=fable
//! ELEVENLABS_API_KEY=...
//! ELEVENLABS_MODEL=eleven_multilingual_v2
//! ELEVENLABS_VOICE_ID=N2lVS1w4EtoT3dr4eOWO
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, error};

use crate::{
    audio::{InterruptOverlay, SpeechHandle},
    error::PlaybackError,
    sources::PlayableSource,
    storage::GuildConfigProvider,
    voice::GuildRef,
};

static EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{1F600}-\x{1F6FF}]").expect("regex válida"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").expect("regex válida"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ ]{2,}").expect("regex válida"));

/// Limpia el texto antes de sintetizarlo
pub fn clean_message(text: &str) -> String {
    let text = EMOJI.replace_all(text, "");
    let text = BLANK_LINES.replace_all(&text, "\n");
    let text = SPACES.replace_all(&text, " ");
    text.trim().to_string()
}

/// Servicio de voz sintetizada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TtsProvider {
    #[serde(rename = "OPENAI")]
    OpenAi,
    #[serde(rename = "ELEVENLABS")]
    ElevenLabs,
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtsProvider::OpenAi => write!(f, "OPENAI"),
            TtsProvider::ElevenLabs => write!(f, "ELEVENLABS"),
        }
    }
}

impl FromStr for TtsProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPENAI" => Ok(TtsProvider::OpenAi),
            "ELEVENLABS" => Ok(TtsProvider::ElevenLabs),
            other => anyhow::bail!("proveedor de voz desconocido: {}", other),
        }
    }
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Sintetiza `text`; `voice` reemplaza la voz por defecto del proveedor
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes, PlaybackError>;
}

async fn audio_bytes(response: reqwest::Response, service: &str) -> Result<Bytes, PlaybackError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!("❌ {} API error: {} - {}", service, status, error_text);
        return Err(PlaybackError::PlaybackStartFailed(format!("{} {}: {}", service, status, error_text)));
    }

    response
        .bytes()
        .await
        .map_err(|e| PlaybackError::PlaybackStartFailed(format!("{}: {}", service, e)))
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// Cliente para endpoints compatibles con OpenAI
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: String, base_url: &str, model: String, voice: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            voice,
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes, PlaybackError> {
        let request = SpeechRequest {
            model: &self.model,
            voice: voice.unwrap_or(&self.voice),
            input: text,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PlaybackError::PlaybackStartFailed(format!("OpenAI TTS: {}", e)))?;

        audio_bytes(response, "OpenAI TTS").await
    }
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Debug, Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Cliente de ElevenLabs; la voz es un voice id
pub struct ElevenLabsSpeech {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice_id: String,
}

impl ElevenLabsSpeech {
    pub const BASE_URL: &'static str = "https://api.elevenlabs.io/v1";

    pub fn new(api_key: String, model: String, voice_id: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            voice_id,
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes, PlaybackError> {
        let voice_id = voice.unwrap_or(&self.voice_id);
        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.7,
                similarity_boost: 0.8,
                style: 0.25,
                use_speaker_boost: true,
            },
        };

        let response = self
            .client
            .post(format!("{}/text-to-speech/{}", Self::BASE_URL, voice_id))
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| PlaybackError::PlaybackStartFailed(format!("ElevenLabs: {}", e)))?;

        audio_bytes(response, "ElevenLabs").await
    }
}

/// Anuncios hablados por guild
pub struct Announcer {
    providers: HashMap<TtsProvider, Arc<dyn SpeechProvider>>,
    default_provider: TtsProvider,
    overlay: Arc<InterruptOverlay>,
    guild_config: Arc<dyn GuildConfigProvider>,
}

impl Announcer {
    pub fn new(
        default_provider: TtsProvider,
        overlay: Arc<InterruptOverlay>,
        guild_config: Arc<dyn GuildConfigProvider>,
    ) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
            overlay,
            guild_config,
        }
    }

    pub fn with_provider(mut self, kind: TtsProvider, provider: Arc<dyn SpeechProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Sintetiza y reproduce `text` sobre la música de la guild
    pub async fn say(&self, guild: &GuildRef, text: &str) -> Result<SpeechHandle, PlaybackError> {
        let cleaned = clean_message(text);
        if cleaned.is_empty() {
            return Err(PlaybackError::PlaybackStartFailed("no hay texto para pronunciar".into()));
        }

        let settings = self.guild_config.settings(guild.guild_id);
        let kind = settings.tts_provider.unwrap_or(self.default_provider);
        let provider = self.providers.get(&kind).ok_or_else(|| {
            PlaybackError::PlaybackStartFailed(format!("el proveedor de voz {} no está configurado", kind))
        })?;
        debug!("🗣️ Texto a pronunciar en guild {} ({}): {}", guild.guild_id, kind, cleaned);

        let data = provider.synthesize(&cleaned, settings.speech_voice.as_deref()).await?;

        self.overlay
            .speak(
                guild,
                PlayableSource::Bytes {
                    data,
                    content_type: Some("audio/mpeg".into()),
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::{GuildSettings, JsonStorage},
        voice::{fake::FakeGateway, VoiceSession},
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::all::{ChannelId, GuildId};

    #[test]
    fn cleanup_strips_emoji_and_spacing() {
        assert_eq!(clean_message("  Hola 😀   mundo 🚀 \n\n\nadiós  "), "Hola mundo \nadiós");
        assert_eq!(clean_message("🙂🙃"), "");
        // Fuera del rango: se conserva
        assert_eq!(clean_message("ok 👍"), "ok 👍");
    }

    #[derive(Default)]
    struct RecordingSpeech {
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl SpeechProvider for RecordingSpeech {
        async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes, PlaybackError> {
            self.requests
                .lock()
                .push((text.to_string(), voice.map(str::to_string)));
            Ok(Bytes::from_static(b"mp3"))
        }
    }

    /// Guild 8 prefers ElevenLabs with its own voice
    struct Settings;

    impl GuildConfigProvider for Settings {
        fn settings(&self, guild_id: GuildId) -> GuildSettings {
            let mut settings = GuildSettings {
                guild_id: guild_id.get(),
                ..GuildSettings::default()
            };
            if guild_id == GuildId::new(8) {
                settings.tts_provider = Some(TtsProvider::ElevenLabs);
                settings.speech_voice = Some("voz-8".into());
            }
            settings
        }
    }

    fn overlay() -> (Arc<FakeGateway>, Arc<InterruptOverlay>) {
        let gateway = Arc::new(FakeGateway::new().with_channel(ChannelId::new(1), 1));
        let voice = Arc::new(VoiceSession::new(gateway.clone(), Duration::from_secs(60)));
        (gateway, Arc::new(InterruptOverlay::new(voice)))
    }

    fn announcer(provider: Arc<RecordingSpeech>) -> (Arc<FakeGateway>, Announcer) {
        let (gateway, overlay) = overlay();
        let announcer = Announcer::new(TtsProvider::OpenAi, overlay, Arc::new(JsonStorage::empty("./data".into())))
            .with_provider(TtsProvider::OpenAi, provider);
        (gateway, announcer)
    }

    #[tokio::test]
    async fn synthesizes_cleaned_text_and_plays_it() {
        let provider = Arc::new(RecordingSpeech::default());
        let (gateway, announcer) = announcer(provider.clone());
        let guild = GuildRef::new(GuildId::new(4));

        let handle = announcer.say(&guild, "Hola  😀 todos").await.unwrap();
        assert_eq!(*provider.requests.lock(), vec![("Hola todos".to_string(), None)]);

        let overlay = gateway.last_connection().unwrap().1.players()[1].clone();
        assert_eq!(overlay.played(), vec!["bytes:3(audio/mpeg)"]);
        overlay.finish();
        handle.finished().await;
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_synthesis() {
        let provider = Arc::new(RecordingSpeech::default());
        let (_, announcer) = announcer(provider.clone());

        let result = announcer.say(&GuildRef::new(GuildId::new(4)), " 😀 ").await;
        assert!(result.is_err());
        assert!(provider.requests.lock().is_empty());
    }

    #[test]
    fn provider_names_parse_like_the_settings_files() {
        assert_eq!("elevenlabs".parse::<TtsProvider>().unwrap(), TtsProvider::ElevenLabs);
        assert_eq!(" OPENAI ".parse::<TtsProvider>().unwrap(), TtsProvider::OpenAi);
        assert!("polly".parse::<TtsProvider>().is_err());

        let parsed: TtsProvider = serde_json::from_str(r#""ELEVENLABS""#).unwrap();
        assert_eq!(parsed, TtsProvider::ElevenLabs);
    }

    #[tokio::test]
    async fn guild_setting_picks_the_provider() {
        let openai = Arc::new(RecordingSpeech::default());
        let eleven = Arc::new(RecordingSpeech::default());
        let (gateway, overlay) = overlay();
        let announcer = Announcer::new(TtsProvider::OpenAi, overlay, Arc::new(Settings))
            .with_provider(TtsProvider::OpenAi, openai.clone())
            .with_provider(TtsProvider::ElevenLabs, eleven.clone());

        let handle = announcer.say(&GuildRef::new(GuildId::new(8)), "hola").await.unwrap();
        assert_eq!(*eleven.requests.lock(), vec![("hola".to_string(), Some("voz-8".to_string()))]);
        assert!(openai.requests.lock().is_empty());

        gateway.last_connection().unwrap().1.players()[1].finish();
        handle.finished().await;
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_error() {
        let (_, overlay) = overlay();
        let announcer = Announcer::new(TtsProvider::OpenAi, overlay, Arc::new(Settings))
            .with_provider(TtsProvider::OpenAi, Arc::new(RecordingSpeech::default()));

        let err = announcer
            .say(&GuildRef::new(GuildId::new(8)), "hola")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ELEVENLABS"));
    }
}
