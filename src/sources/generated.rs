use async_trait::async_trait;
use url::Url;

use super::{MusicSource, PlayableSource, Provider, SongRef};
use crate::error::PlaybackError;

/// Canciones ya generadas por el servicio externo.
///
/// El servicio de generación entrega [`SongRef`]s terminados cuyo locator es
/// una URL de stream directa; aquí no hay nada que buscar.
#[derive(Default)]
pub struct GeneratedTrackSource;

impl GeneratedTrackSource {
    pub fn song(title: impl Into<String>, stream_url: impl Into<String>) -> SongRef {
        SongRef::new(Provider::GeneratedTrack, title, stream_url)
    }
}

#[async_trait]
impl MusicSource for GeneratedTrackSource {
    fn provider(&self) -> Provider {
        Provider::GeneratedTrack
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SongRef>, PlaybackError> {
        Ok(Vec::new())
    }

    async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError> {
        let url = Url::parse(song.locator())
            .map_err(|e| PlaybackError::PlaybackStartFailed(format!("URL inválida: {}", e)))?;

        match url.scheme() {
            "http" | "https" => Ok(PlayableSource::Url(url.into())),
            other => Err(PlaybackError::PlaybackStartFailed(format!(
                "esquema no soportado: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_to_stream_url() {
        let song = GeneratedTrackSource::song("Canción IA", "https://cdn.example.com/a.mp3");
        let resolved = GeneratedTrackSource.resolve(&song).await.unwrap();
        assert!(matches!(resolved, PlayableSource::Url(u) if u == "https://cdn.example.com/a.mp3"));
    }

    #[tokio::test]
    async fn rejects_non_http_locators() {
        let song = GeneratedTrackSource::song("x", "file:///etc/passwd");
        assert!(GeneratedTrackSource.resolve(&song).await.is_err());
        assert!(GeneratedTrackSource.search("x", 5).await.unwrap().is_empty());
    }
}
