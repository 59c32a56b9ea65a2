use anyhow::Result;
use serde::{Deserialize, Serialize};
use serenity::all::GuildId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::speech::TtsProvider;

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub name: Option<String>,
    /// Entries shown by the queue listing, current song included.
    pub max_queue_display: usize,
    /// Voz para la voz sintetizada (nombre o voice id según el proveedor)
    pub speech_voice: Option<String>,
    /// Proveedor de voz; `None` usa `TTS_PROVIDER`
    pub tts_provider: Option<TtsProvider>,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            guild_id: 0,
            name: None,
            max_queue_display: 20,
            speech_voice: None,
            tts_provider: None,
        }
    }
}

/// Ajustes por guild, solo lectura para el motor de reproducción
pub trait GuildConfigProvider: Send + Sync {
    fn settings(&self, guild_id: GuildId) -> GuildSettings;
}

/// Configuraciones cargadas de `DATA_DIR/servers/*.json`
pub struct JsonStorage {
    data_dir: PathBuf,
    servers: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self::empty(data_dir);
        storage.load_all_servers().await?;
        Ok(storage)
    }

    /// Sin archivos: todas las guilds usan los valores por defecto
    pub fn empty(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            servers: HashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let servers_dir = self.data_dir.join("servers");
        let mut files = fs::read_dir(&servers_dir).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .map(|n| n.strip_prefix("guild_").unwrap_or(n))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };

            match load_server_config(&path).await {
                Ok(mut settings) => {
                    settings.guild_id = guild_id;
                    self.servers.insert(guild_id, settings);
                    loaded_count += 1;
                }
                Err(e) => warn!("Error cargando configuración para guild {}: {}", guild_id, e),
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }

        Ok(())
    }
}

async fn load_server_config(path: &Path) -> Result<GuildSettings> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

impl GuildConfigProvider for JsonStorage {
    fn settings(&self, guild_id: GuildId) -> GuildSettings {
        self.servers
            .get(&guild_id.get())
            .cloned()
            .unwrap_or_else(|| GuildSettings {
                guild_id: guild_id.get(),
                ..GuildSettings::default()
            })
    }
}
