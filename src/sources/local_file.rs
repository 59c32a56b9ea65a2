use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info};

use super::{MusicSource, PlayableSource, Provider, SongRef};
use crate::error::PlaybackError;

/// Archivos de audio de un directorio local fijo
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Nombres de archivo del directorio, ordenados
    async fn list(&self) -> Result<Vec<String>, PlaybackError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Exact stem match first, then the first stem containing the term.
    fn find_match<'a>(names: &'a [String], term: &str) -> Option<&'a String> {
        let term = term.trim().to_lowercase();
        let stem = |name: &String| {
            Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        };

        names
            .iter()
            .find(|name| stem(name) == term)
            .or_else(|| names.iter().find(|name| stem(name).contains(&term)))
    }
}

#[async_trait]
impl MusicSource for LocalFileSource {
    fn provider(&self) -> Provider {
        Provider::LocalFile
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SongRef>, PlaybackError> {
        let names = match self.list().await {
            Ok(names) => names,
            Err(e) => {
                error!("Error buscando archivos en {}: {}", self.root.display(), e);
                return Ok(Vec::new());
            }
        };

        Ok(Self::find_match(&names, query)
            .map(|name| {
                let title = Path::new(name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                SongRef::new(Provider::LocalFile, title, name.clone())
            })
            .into_iter()
            .collect())
    }

    async fn resolve(&self, song: &SongRef) -> Result<PlayableSource, PlaybackError> {
        let name = song.locator();

        // Solo nombres planos dentro del directorio
        let is_plain = !name.is_empty()
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
            && !name.starts_with('.');
        if !is_plain {
            return Err(PlaybackError::ResolutionNotFound(name.to_string()));
        }

        let path = self.root.join(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                info!("🎵 Archivo local: {}", path.display());
                Ok(PlayableSource::File(path))
            }
            _ => Err(PlaybackError::ResolutionNotFound(song.title().to_string())),
        }
    }
}
