//! # Cache Module
//!
//! On-disk cache for downloaded remote audio, shared by every guild.
//!
//! Files are named after a filesystem-safe normalization of the song title
//! (the *cache key*) plus the container extension the downloader produced.
//! A file that exists and whose last use is younger than `max_age` is reused
//! without downloading again; a periodic sweep deletes anything older,
//! whether or not it was ever read again.
//!
//! ## Concurrency
//!
//! - Downloads stage under a temporary name and are renamed into place only
//!   once a supported container is found, so readers never see partial files.
//! - [`MediaCache::lock_key`] serializes resolutions of the same key across
//!   guilds, so the same song is downloaded once even when requested twice
//!   at the same time.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_DIR=./temp            # Cache root
//! CACHE_MAX_AGE=4h            # Files unused for longer are purged
//! CACHE_SWEEP_INTERVAL=1h     # How often the sweep runs
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};
use tokio::{fs, sync::OwnedMutexGuard, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PlaybackError;

/// Límite en bytes de una clave; deja lugar al prefijo de staging y la extensión
pub const MAX_KEY_BYTES: usize = 200;

/// Contenedores aceptados después de una descarga, en orden de preferencia
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["opus", "m4a", "webm", "mp3"];

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("regex válida"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("regex válida"));

/// Archivo reutilizable del caché
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MediaCache {
    root: PathBuf,
    max_age: Duration,
    key_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl MediaCache {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            max_age,
            key_locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normaliza un título a un nombre de archivo seguro.
    ///
    /// Quita caracteres inválidos en nombres de archivo, colapsa espacios y
    /// puntos iniciales y corta a [`MAX_KEY_BYTES`] sin partir un carácter.
    /// Nunca devuelve una clave vacía.
    pub fn key_for(title: &str) -> String {
        let cleaned = INVALID_CHARS.replace_all(title, "");
        let cleaned = WHITESPACE.replace_all(&cleaned, " ");
        let cleaned = cleaned.trim().trim_start_matches('.').trim();

        let end = cleaned
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= MAX_KEY_BYTES)
            .last()
            .unwrap_or(0);
        let key = cleaned[..end].trim_end();

        if key.is_empty() {
            "track".to_string()
        } else {
            key.to_string()
        }
    }

    /// Busca un archivo reutilizable para la clave
    pub async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let now = SystemTime::now();

        for ext in SUPPORTED_EXTENSIONS {
            let path = self.root.join(format!("{}.{}", key, ext));
            let Ok(meta) = fs::metadata(&path).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            if idle_for(&meta, now) > self.max_age {
                debug!("⌛ Archivo expirado en caché: {}", path.display());
                continue;
            }

            debug!("📦 Archivo encontrado en caché: {}", path.display());
            let created_at = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            return Some(CacheEntry {
                key: key.to_string(),
                file_path: path,
                created_at,
            });
        }

        None
    }

    /// Bloquea la clave mientras se resuelve y descarga
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Ruta temporal (sin extensión) donde el descargador debe escribir
    pub fn staging_base(&self, key: &str) -> PathBuf {
        self.root
            .join(format!(".{}.part-{:08x}", key, fastrand::u32(..)))
    }

    /// Mueve una descarga terminada a su nombre definitivo.
    ///
    /// Falla con `DownloadFailed` si la descarga no produjo un contenedor aceptado.
    pub async fn commit(&self, staging_base: &Path, key: &str) -> Result<CacheEntry, PlaybackError> {
        for ext in SUPPORTED_EXTENSIONS {
            let staged = with_extension(staging_base, ext);
            if fs::metadata(&staged).await.map(|m| m.is_file()).unwrap_or(false) {
                let final_path = self.root.join(format!("{}.{}", key, ext));
                fs::rename(&staged, &final_path).await?;
                self.discard(staging_base).await;

                info!("✅ Descarga completada: {}", final_path.display());
                return Ok(CacheEntry {
                    key: key.to_string(),
                    file_path: final_path,
                    created_at: Utc::now(),
                });
            }
        }

        self.discard(staging_base).await;
        error!("❌ No se encontró el archivo de audio después de la descarga: {}", key);
        Err(PlaybackError::DownloadFailed(
            "el descargador no produjo un contenedor de audio soportado".to_string(),
        ))
    }

    /// Elimina restos de una descarga temporal
    pub async fn discard(&self, staging_base: &Path) {
        let Some(prefix) = staging_base.file_name().and_then(|n| n.to_str()) else {
            return;
        };

        let Ok(mut entries) = fs::read_dir(&self.root).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!("No se pudo borrar temporal {}: {}", entry.path().display(), e);
                }
            }
        }
    }

    /// Borra archivos sin uso por más de `max_age` y retorna cuántos se eliminaron.
    ///
    /// Los errores se registran en el log, nunca se propagan.
    pub async fn sweep(&self) -> usize {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error leyendo el directorio temporal {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("Error recorriendo el caché: {}", e);
                    break;
                }
            };

            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    error!("Error procesando el archivo {}: {}", path.display(), e);
                    continue;
                }
            };

            if idle_for(&meta, now) > self.max_age {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("🗑️ Eliminando \"{}\" por inactividad", path.display());
                        removed += 1;
                    }
                    Err(e) => error!("Error borrando {}: {}", path.display(), e),
                }
            }
        }

        // Locks de claves que ya nadie está usando
        self.key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        removed
    }

    /// Ejecuta [`MediaCache::sweep`] periódicamente hasta que se cancele el token
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = self.sweep().await;
                        if removed > 0 {
                            info!("🧹 Cache cleanup: removed {} expired files", removed);
                        }
                    }
                }
            }
            debug!("Barrido de caché detenido");
        })
    }
}

/// Tiempo desde el último uso (acceso, o modificación si el FS no registra accesos)
fn idle_for(meta: &std::fs::Metadata, now: SystemTime) -> Duration {
    let last_used = match (meta.accessed(), meta.modified()) {
        (Ok(a), Ok(m)) => a.max(m),
        (Ok(a), Err(_)) => a,
        (Err(_), Ok(m)) => m,
        (Err(_), Err(_)) => return Duration::ZERO,
    };
    now.duration_since(last_used).unwrap_or_default()
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
