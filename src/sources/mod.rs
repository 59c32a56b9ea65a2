//! # Sources Module
//!
//! Media resolution for the playback engine: turns a song request into a
//! [`SongRef`] (search) and a [`SongRef`] into a [`PlayableSource`] (resolve).
//!
//! Each provider implements [`MusicSource`] and is registered in the
//! [`MediaResolver`] under its [`Provider`] tag, so adding a provider never
//! touches the controller:
//!
//! - [`youtube`] - remote video audio through yt-dlp, backed by the on-disk cache
//! - [`local_file`] - audio files from a fixed local directory
//! - [`generated`] - finished AI-generated tracks with a direct stream URL

pub mod generated;
pub mod local_file;
pub mod youtube;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc, time::Duration};
use tracing::debug;

use crate::error::PlaybackError;

pub use generated::GeneratedTrackSource;
pub use local_file::LocalFileSource;
pub use youtube::{RemoteVideoSource, YtDlpClient};

/// Origen de una canción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Provider {
    RemoteVideo,
    LocalFile,
    GeneratedTrack,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::RemoteVideo => "youtube",
            Provider::LocalFile => "mp3",
            Provider::GeneratedTrack => "generated",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Referencia inmutable a una canción.
///
/// El título nunca está vacío: si viene en blanco se usa el locator. La cola
/// las mueve o clona, nunca las modifica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongRef {
    provider: Provider,
    title: String,
    locator: String,
    thumbnail: Option<String>,
    duration_hint: Option<Duration>,
}

impl SongRef {
    pub fn new(provider: Provider, title: impl Into<String>, locator: impl Into<String>) -> Self {
        let locator = locator.into();
        let title = title.into().trim().to_string();
        let title = if !title.is_empty() {
            title
        } else if !locator.trim().is_empty() {
            locator.trim().to_string()
        } else {
            "Sin título".to_string()
        };

        Self {
            provider,
            title,
            locator,
            thumbnail: None,
            duration_hint: None,
        }
    }

    // Getters
    pub fn provider(&self) -> Provider {
        self.provider
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    /// URL, local file key or generation-result URL depending on the provider.
    pub fn locator(&self) -> &str {
        &self.locator
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn duration_hint(&self) -> Option<Duration> {
        self.duration_hint
    }

    // Builders
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        let thumbnail = thumbnail.into();
        if !thumbnail.is_empty() {
            self.thumbnail = Some(thumbnail);
        }
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }
}

/// Handle de audio que un reproductor puede consumir
#[derive(Debug, Clone)]
pub enum PlayableSource {
    /// A file on disk (cache entry or local audio).
    File(PathBuf),
    /// A direct HTTP stream.
    Url(String),
    /// An in-memory stream, e.g. synthesized speech.
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
}

impl PlayableSource {
    pub fn describe(&self) -> String {
        match self {
            PlayableSource::File(path) => format!("file:{}", path.display()),
            PlayableSource::Url(url) => format!("url:{}", url),
            PlayableSource::Bytes { data, content_type } => format!(
                "bytes:{}({})",
                data.len(),
                content_type.as_deref().unwrap_or("desconocido")
            ),
        }
    }
}

/// Trait común para todas las fuentes de música
#[async_trait]
pub trait MusicSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Busca canciones. Zero matches is `Ok(vec![])`, not an error.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SongRef>, PlaybackError>;

    /// Obtiene el audio reproducible de una canción
    async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError>;
}

/// Registro de fuentes indexado por proveedor
#[derive(Clone)]
pub struct MediaResolver {
    sources: HashMap<Provider, Arc<dyn MusicSource>>,
    default_max_results: usize,
}

impl MediaResolver {
    pub fn new(default_max_results: usize) -> Self {
        Self {
            sources: HashMap::new(),
            default_max_results,
        }
    }

    pub fn register(mut self, source: Arc<dyn MusicSource>) -> Self {
        self.sources.insert(source.provider(), source);
        self
    }

    fn source(&self, provider: Provider) -> Result<&Arc<dyn MusicSource>, PlaybackError> {
        self.sources.get(&provider).ok_or_else(|| {
            PlaybackError::PlaybackStartFailed(format!("proveedor {} no registrado", provider))
        })
    }

    pub async fn search(
        &self,
        provider: Provider,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<SongRef>, PlaybackError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let limit = max_results.unwrap_or(self.default_max_results).max(1);
        let results = self.source(provider)?.search(query, limit).await?;
        debug!("🔍 {} resultados de {} para: {}", results.len(), provider, query);
        Ok(results)
    }

    pub async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError> {
        self.source(song.provider())?.resolve(song).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSource;

    #[async_trait]
    impl MusicSource for EchoSource {
        fn provider(&self) -> Provider {
            Provider::GeneratedTrack
        }

        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SongRef>, PlaybackError> {
            Ok((0..max_results)
                .map(|i| SongRef::new(Provider::GeneratedTrack, format!("{} {}", query, i), "x"))
                .collect())
        }

        async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError> {
            Ok(PlayableSource::Url(song.locator().to_string()))
        }
    }

    #[test]
    fn blank_title_falls_back_to_locator() {
        let song = SongRef::new(Provider::RemoteVideo, "   ", "https://youtu.be/abc");
        assert_eq!(song.title(), "https://youtu.be/abc");

        let song = SongRef::new(Provider::LocalFile, "", "");
        assert!(!song.title().is_empty());
    }

    #[tokio::test]
    async fn resolver_dispatches_by_provider() {
        let resolver = MediaResolver::new(3).register(Arc::new(EchoSource));

        let found = resolver.search(Provider::GeneratedTrack, "tema", None).await.unwrap();
        assert_eq!(found.len(), 3);

        let err = resolver.search(Provider::LocalFile, "tema", None).await.unwrap_err();
        assert!(matches!(err, PlaybackError::PlaybackStartFailed(_)));

        let source = resolver.resolve(&found[0]).await.unwrap();
        assert!(matches!(source, PlayableSource::Url(url) if url == "x"));
    }

    #[tokio::test]
    async fn blank_query_is_zero_matches() {
        let resolver = MediaResolver::new(3).register(Arc::new(EchoSource));
        let found = resolver.search(Provider::GeneratedTrack, "  ", Some(5)).await.unwrap();
        assert!(found.is_empty());
    }
}
