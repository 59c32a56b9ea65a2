use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{MusicSource, PlayableSource, Provider, SongRef};
use crate::{cache::MediaCache, error::PlaybackError};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/|playlist\?)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex válida")
});

/// Metadata de un video tal como la entrega el proveedor
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
}

impl VideoMetadata {
    fn into_song(self) -> SongRef {
        let mut song = SongRef::new(Provider::RemoteVideo, self.title, self.url);
        if let Some(thumbnail) = self.thumbnail {
            song = song.with_thumbnail(thumbnail);
        }
        if let Some(duration) = self.duration {
            song = song.with_duration(duration);
        }
        song
    }

    fn is_unavailable(&self) -> bool {
        matches!(self.title.as_str(), "[Private video]" | "[Deleted video]")
    }
}

/// Operaciones del proveedor de video remoto
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Búsqueda de texto, en orden de relevancia
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoMetadata>, PlaybackError>;

    /// Metadata de un enlace directo; `playlist` expands every entry.
    async fn fetch(&self, url: &str, playlist: bool) -> Result<Vec<VideoMetadata>, PlaybackError>;

    /// Descarga el audio en `<staging_base>.<ext>`
    async fn download(&self, url: &str, staging_base: &Path) -> Result<(), PlaybackError>;
}

/// Enlace directo reconocido
#[derive(Debug, Clone, PartialEq)]
pub struct VideoLink {
    /// Link without the playlist parameters when `playlist` is `None`.
    pub url: String,
    pub playlist: Option<String>,
}

impl VideoLink {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !YOUTUBE_URL.is_match(input) {
            return None;
        }

        let with_scheme = if input.starts_with("http") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };
        let mut url = Url::parse(&with_scheme).ok()?;

        let playlist = url
            .query_pairs()
            .find(|(k, v)| k == "list" && !v.is_empty())
            .map(|(_, v)| v.into_owned());

        if playlist.is_none() {
            // Sin playlist: quitar parámetros de posición que no aportan
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "index" && k != "list")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(kept);
            }
        }

        Some(Self {
            url: url.to_string(),
            playlist,
        })
    }
}

/// Clasifica la salida de error del descargador
pub fn classify_failure(stderr: &str) -> PlaybackError {
    let lower = stderr.to_lowercase();
    let denied = [
        "sign in to confirm",
        "confirm your age",
        "age-restricted",
        "inappropriate for some users",
        "members-only",
        "private video",
    ];

    let detail = stderr.trim().lines().last().unwrap_or("error desconocido").to_string();
    if denied.iter().any(|marker| lower.contains(marker)) {
        PlaybackError::ProviderAccessDenied(detail)
    } else {
        PlaybackError::DownloadFailed(detail)
    }
}

/// Cliente del proveedor usando el ejecutable yt-dlp
pub struct YtDlpClient {
    binary: String,
    cookies: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YtDlpThumbnail>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct YtDlpPayload {
    entries: Option<Vec<YtDlpEntry>>,
    #[serde(flatten)]
    single: YtDlpEntry,
}

impl YtDlpEntry {
    fn into_metadata(self, fallback_url: Option<&str>) -> Option<VideoMetadata> {
        let url = self
            .webpage_url
            .or(self.url)
            .or_else(|| self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={}", id)))
            .or_else(|| fallback_url.map(str::to_string))?;

        Some(VideoMetadata {
            title: self.title.unwrap_or_default(),
            url,
            thumbnail: self.thumbnail.or_else(|| self.thumbnails.into_iter().last().map(|t| t.url)),
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(Duration::from_secs_f64),
        })
    }
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, cookies: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cookies,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--no-warnings", "--no-check-certificates"]);
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<String, PlaybackError> {
        let output = cmd
            .output()
            .await
            .map_err(|e| PlaybackError::DownloadFailed(format!("no se pudo ejecutar {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} no puede ejecutarse correctamente", self.binary);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VideoProvider for YtDlpClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoMetadata>, PlaybackError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let mut cmd = self.command();
        cmd.args(["--dump-json", "--flat-playlist", "--skip-download"])
            .arg(format!("ytsearch{}:{}", limit, query));

        let stdout = self.run(cmd).await?;
        Ok(stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
            .filter_map(|entry| entry.into_metadata(None))
            .collect())
    }

    async fn fetch(&self, url: &str, playlist: bool) -> Result<Vec<VideoMetadata>, PlaybackError> {
        debug!("📊 Obteniendo info de: {} (playlist: {})", url, playlist);

        let mut cmd = self.command();
        cmd.args(["--dump-single-json", "--skip-download"]);
        if playlist {
            cmd.arg("--flat-playlist");
        } else {
            cmd.arg("--no-playlist");
        }
        cmd.arg("--").arg(url);

        let stdout = self.run(cmd).await?;
        let payload: YtDlpPayload = serde_json::from_str(stdout.trim())
            .map_err(|e| PlaybackError::DownloadFailed(format!("respuesta de yt-dlp inválida: {}", e)))?;

        Ok(match payload.entries {
            Some(entries) => entries
                .into_iter()
                .filter_map(|entry| entry.into_metadata(None))
                .collect(),
            None => payload.single.into_metadata(Some(url)).into_iter().collect(),
        })
    }

    async fn download(&self, url: &str, staging_base: &Path) -> Result<(), PlaybackError> {
        info!("⬇️ Descargando audio: {}", url);

        let template = format!("{}.%(ext)s", staging_base.display());
        let mut cmd = self.command();
        cmd.args(["--extract-audio", "--audio-quality", "0", "--no-playlist", "--quiet"])
            .arg("--output")
            .arg(template)
            .arg("--")
            .arg(url);

        self.run(cmd).await.map(|_| ())
    }
}

/// Fuente de video remoto con caché en disco
pub struct RemoteVideoSource {
    provider: Arc<dyn VideoProvider>,
    cache: Arc<MediaCache>,
    download_timeout: Duration,
}

impl RemoteVideoSource {
    pub fn new(provider: Arc<dyn VideoProvider>, cache: Arc<MediaCache>, download_timeout: Duration) -> Self {
        Self {
            provider,
            cache,
            download_timeout,
        }
    }

    async fn download_into_cache(&self, song: &SongRef, key: &str) -> Result<PathBuf, PlaybackError> {
        let staging = self.cache.staging_base(key);

        let outcome = tokio::time::timeout(
            self.download_timeout,
            self.provider.download(song.locator(), &staging),
        )
        .await;

        match outcome {
            Ok(Ok(())) => Ok(self.cache.commit(&staging, key).await?.file_path),
            Ok(Err(e)) => {
                self.cache.discard(&staging).await;
                Err(e)
            }
            Err(_) => {
                self.cache.discard(&staging).await;
                warn!("⏰ Timeout descargando {}", song.title());
                Err(PlaybackError::DownloadFailed(format!(
                    "la descarga superó {}",
                    humantime::format_duration(self.download_timeout)
                )))
            }
        }
    }
}

#[async_trait]
impl MusicSource for RemoteVideoSource {
    fn provider(&self) -> Provider {
        Provider::RemoteVideo
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SongRef>, PlaybackError> {
        let metadata = match VideoLink::parse(query) {
            Some(VideoLink { url, playlist: Some(list) }) => {
                info!("📋 Expandiendo playlist {}", list);
                self.provider.fetch(&url, true).await?
            }
            Some(VideoLink { url, playlist: None }) => self.provider.fetch(&url, false).await?,
            None => self.provider.search(query, max_results).await?,
        };

        let mut seen = HashSet::new();
        Ok(metadata
            .into_iter()
            .filter(|meta| !meta.is_unavailable())
            .filter(|meta| seen.insert(meta.url.clone()))
            .map(VideoMetadata::into_song)
            .collect())
    }

    async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError> {
        let key = MediaCache::key_for(song.title());

        // Una sola descarga por clave aunque varias guilds pidan la misma canción
        let _guard = self.cache.lock_key(&key).await;

        if let Some(entry) = self.cache.lookup(&key).await {
            debug!("📦 Usando caché para: {}", song.title());
            return Ok(PlayableSource::File(entry.file_path));
        }

        let path = self.download_into_cache(song, &key).await?;
        Ok(PlayableSource::File(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(title: &str, url: &str) -> VideoMetadata {
        VideoMetadata {
            title: title.to_string(),
            url: url.to_string(),
            thumbnail: None,
            duration: None,
        }
    }

    fn write_staged(staging: &Path, ext: &str) {
        std::fs::write(format!("{}.{}", staging.display(), ext), b"audio").unwrap();
    }

    #[test]
    fn test_youtube_url_detection() {
        assert!(VideoLink::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_some());
        assert!(VideoLink::parse("https://youtu.be/dQw4w9WgXcQ").is_some());
        assert!(VideoLink::parse("music.youtube.com/watch?v=test").is_some());
        assert!(VideoLink::parse("https://example.com/video").is_none());
        assert!(VideoLink::parse("never gonna give you up").is_none());
    }

    #[test]
    fn playlist_only_when_link_encodes_it() {
        let link = VideoLink::parse("https://www.youtube.com/watch?v=abc&list=PL123&index=2").unwrap();
        assert_eq!(link.playlist.as_deref(), Some("PL123"));

        let link = VideoLink::parse("https://www.youtube.com/watch?v=abc&index=2").unwrap();
        assert_eq!(link.playlist, None);
        assert_eq!(link.url, "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn consent_gates_are_access_denied() {
        let err = classify_failure("ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate");
        assert!(matches!(err, PlaybackError::ProviderAccessDenied(_)));

        let err = classify_failure("ERROR: unable to download webpage: connection reset");
        assert!(matches!(err, PlaybackError::DownloadFailed(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn flat_entries_fall_back_to_id() {
        let entry: YtDlpEntry =
            serde_json::from_str(r#"{"id":"xyz","title":"Tema","duration":61.5}"#).unwrap();
        let meta = entry.into_metadata(None).unwrap();
        assert_eq!(meta.url, "https://www.youtube.com/watch?v=xyz");
        assert_eq!(meta.duration, Some(Duration::from_secs_f64(61.5)));
    }

    #[tokio::test]
    async fn text_search_maps_results_in_order() {
        let mut provider = MockVideoProvider::new();
        provider
            .expect_search()
            .withf(|q, limit| q == "lofi" && *limit == 2)
            .returning(|_, _| Ok(vec![meta("Uno", "https://y/1"), meta("Dos", "https://y/2")]));

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(60))),
            Duration::from_secs(30),
        );

        let songs = source.search("lofi", 2).await.unwrap();
        let titles: Vec<&str> = songs.iter().map(|s| s.title()).collect();
        assert_eq!(titles, vec!["Uno", "Dos"]);
        assert!(songs.iter().all(|s| s.provider() == Provider::RemoteVideo));
    }

    #[tokio::test]
    async fn playlist_expansion_drops_duplicates_and_private_entries() {
        let mut provider = MockVideoProvider::new();
        provider.expect_fetch().withf(|_, playlist| *playlist).returning(|_, _| {
            Ok(vec![
                meta("A", "https://y/a"),
                meta("[Private video]", "https://y/p"),
                meta("A otra vez", "https://y/a"),
                meta("B", "https://y/b"),
            ])
        });

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(60))),
            Duration::from_secs(30),
        );

        let songs = source
            .search("https://www.youtube.com/playlist?list=PLx", 10)
            .await
            .unwrap();
        let titles: Vec<&str> = songs.iter().map(|s| s.title()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn playlists_expand_past_the_search_limit() {
        let mut provider = MockVideoProvider::new();
        provider.expect_fetch().withf(|_, playlist| *playlist).returning(|_, _| {
            Ok((0..150)
                .map(|i| meta(&format!("Tema {}", i), &format!("https://y/{}", i)))
                .collect())
        });

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(60))),
            Duration::from_secs(30),
        );

        let songs = source
            .search("https://www.youtube.com/playlist?list=PLlargo", 10)
            .await
            .unwrap();
        assert_eq!(songs.len(), 150);
        assert_eq!(songs.last().map(|s| s.title()), Some("Tema 149"));
    }

    #[tokio::test]
    async fn second_resolution_reuses_cached_file() {
        let mut provider = MockVideoProvider::new();
        provider.expect_download().times(1).returning(|_, staging| {
            write_staged(staging, "m4a");
            Ok(())
        });

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(3600))),
            Duration::from_secs(30),
        );
        let song = SongRef::new(Provider::RemoteVideo, "Canción: Uno", "https://youtu.be/1");

        let first = source.resolve(&song).await.unwrap();
        let second = source.resolve(&song).await.unwrap();

        let expected = dir.path().join("Canción Uno.m4a");
        assert!(matches!(first, PlayableSource::File(ref p) if *p == expected));
        assert!(matches!(second, PlayableSource::File(ref p) if *p == expected));
    }

    #[tokio::test]
    async fn concurrent_resolutions_download_once() {
        let mut provider = MockVideoProvider::new();
        provider.expect_download().times(1).returning(|_, staging| {
            write_staged(staging, "opus");
            Ok(())
        });

        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(3600))),
            Duration::from_secs(30),
        ));
        let song = SongRef::new(Provider::RemoteVideo, "Compartida", "https://youtu.be/2");

        let (a, b) = tokio::join!(source.resolve(&song), source.resolve(&song));
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn access_denied_is_surfaced_distinctly() {
        let mut provider = MockVideoProvider::new();
        provider
            .expect_download()
            .returning(|_, _| Err(PlaybackError::ProviderAccessDenied("Sign in to confirm".into())));

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(3600))),
            Duration::from_secs(30),
        );
        let song = SongRef::new(Provider::RemoteVideo, "Bloqueada", "https://youtu.be/3");

        let err = source.resolve(&song).await.unwrap_err();
        assert!(matches!(err, PlaybackError::ProviderAccessDenied(_)));
    }

    #[tokio::test]
    async fn download_without_container_is_a_download_failure() {
        let mut provider = MockVideoProvider::new();
        provider.expect_download().returning(|_, _| Ok(()));

        let dir = tempfile::tempdir().unwrap();
        let source = RemoteVideoSource::new(
            Arc::new(provider),
            Arc::new(MediaCache::new(dir.path(), Duration::from_secs(3600))),
            Duration::from_secs(30),
        );
        let song = SongRef::new(Provider::RemoteVideo, "Vacía", "https://youtu.be/4");

        let err = source.resolve(&song).await.unwrap_err();
        assert!(matches!(err, PlaybackError::DownloadFailed(_)));
    }
}
