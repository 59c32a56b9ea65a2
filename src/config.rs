use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::speech::TtsProvider;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub local_audio_dir: PathBuf,

    // Caché de medios
    pub cache_max_age: Duration,
    pub cache_sweep_interval: Duration,
    pub download_timeout: Duration,

    // Voz
    pub voice_idle_timeout: Duration,
    pub voice_sweep_interval: Duration,

    // Límites
    pub max_queue_size: usize,
    pub search_results: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,

    // Voz sintetizada
    pub tts_provider: TtsProvider,
    pub tts_api_key: Option<String>,
    pub tts_base_url: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_model: String,
    pub elevenlabs_voice_id: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Paths
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            cache_dir: env_or("CACHE_DIR", defaults.cache_dir),
            local_audio_dir: env_or("LOCAL_AUDIO_DIR", defaults.local_audio_dir),

            // Duraciones en formato humano ("4h", "90s", "60m")
            cache_max_age: env_duration("CACHE_MAX_AGE", defaults.cache_max_age)?,
            cache_sweep_interval: env_duration("CACHE_SWEEP_INTERVAL", defaults.cache_sweep_interval)?,
            download_timeout: env_duration("DOWNLOAD_TIMEOUT", defaults.download_timeout)?,
            voice_idle_timeout: env_duration("VOICE_IDLE_TIMEOUT", defaults.voice_idle_timeout)?,
            voice_sweep_interval: env_duration("VOICE_SWEEP_INTERVAL", defaults.voice_sweep_interval)?,

            // Límites
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| defaults.max_queue_size.to_string())
                .parse()?,
            search_results: std::env::var("SEARCH_RESULTS")
                .unwrap_or_else(|_| defaults.search_results.to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: std::env::var("YTDLP_COOKIES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            tts_provider: match std::env::var("TTS_PROVIDER") {
                Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
                _ => defaults.tts_provider,
            },
            tts_api_key: std::env::var("TTS_API_KEY").ok().filter(|s| !s.trim().is_empty()),
            tts_base_url: std::env::var("TTS_BASE_URL").unwrap_or(defaults.tts_base_url),
            tts_model: std::env::var("TTS_MODEL").unwrap_or(defaults.tts_model),
            tts_voice: std::env::var("TTS_VOICE")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.tts_voice),
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            elevenlabs_model: std::env::var("ELEVENLABS_MODEL").unwrap_or(defaults.elevenlabs_model),
            elevenlabs_voice_id: std::env::var("ELEVENLABS_VOICE_ID").unwrap_or(defaults.elevenlabs_voice_id),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Sweep intervals and timeouts must be non-zero
    /// - The cache must keep files for at least one sweep interval
    /// - Queue and search limits must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_age.is_zero() {
            anyhow::bail!("CACHE_MAX_AGE must be greater than 0");
        }

        if self.cache_sweep_interval.is_zero() || self.voice_sweep_interval.is_zero() {
            anyhow::bail!("Sweep intervals must be greater than 0");
        }

        if self.voice_idle_timeout.is_zero() {
            anyhow::bail!("VOICE_IDLE_TIMEOUT must be greater than 0");
        }

        if self.download_timeout < Duration::from_secs(5) {
            anyhow::bail!(
                "DOWNLOAD_TIMEOUT too low, minimum 5s, got: {}",
                humantime::format_duration(self.download_timeout)
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.search_results == 0 || self.search_results > 50 {
            anyhow::bail!("SEARCH_RESULTS must be between 1 and 50, got: {}", self.search_results);
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and API keys are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Cache: {} (max age {}, sweep {}, download timeout {})\n  \
            Voice: idle timeout {}, sweep {}\n  \
            Limits: {} queue, {} search results\n  \
            Speech: {} (OpenAI: {}, ElevenLabs: {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.cache_dir.display(),
            humantime::format_duration(self.cache_max_age),
            humantime::format_duration(self.cache_sweep_interval),
            humantime::format_duration(self.download_timeout),
            humantime::format_duration(self.voice_idle_timeout),
            humantime::format_duration(self.voice_sweep_interval),
            self.max_queue_size,
            self.search_results,
            self.tts_provider,
            if self.tts_api_key.is_some() { self.tts_model.as_str() } else { "disabled" },
            if self.elevenlabs_api_key.is_some() { self.elevenlabs_model.as_str() } else { "disabled" },
        )
    }
}

fn env_or(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{} inválido: {}", key, raw)),
        _ => Ok(default),
    }
}

/// Default configuration values.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            data_dir: "./data".into(),
            cache_dir: "./temp".into(),
            local_audio_dir: "./assets/mp3".into(),

            cache_max_age: Duration::from_secs(4 * 60 * 60),
            cache_sweep_interval: Duration::from_secs(60 * 60),
            download_timeout: Duration::from_secs(5 * 60),

            voice_idle_timeout: Duration::from_secs(60 * 60),
            voice_sweep_interval: Duration::from_secs(60 * 60),

            max_queue_size: 500,
            search_results: 10,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,

            tts_provider: TtsProvider::OpenAi,
            tts_api_key: None,
            tts_base_url: "https://api.openai.com/v1".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            tts_voice: "fable".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_model: "eleven_multilingual_v2".to_string(),
            elevenlabs_voice_id: "N2lVS1w4EtoT3dr4eOWO".to_string(),
        }
    }
}
