//! # Bot Module
//!
//! Discord front end of the playback engine.
//!
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - Button dispatch for the now-playing card controls
//!
//! ## Architecture
//!
//! [`RobotoBot`] implements Serenity's [`EventHandler`]. It owns no playback
//! state of its own: every command goes through the guild's command slot in
//! the [`PlaybackController`], and speech goes through the [`Announcer`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use roboto_music::bot::RobotoBot;
//! # use std::sync::Arc;
//! # fn example(config: roboto_music::config::Config, controller: Arc<roboto_music::audio::PlaybackController>) {
//! let bot = RobotoBot::new(config, controller, None);
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::PlaybackController, config::Config, speech::Announcer};

/// Handler de eventos de Discord
pub struct RobotoBot {
    config: Arc<Config>,
    controller: Arc<PlaybackController>,
    /// `None` when no speech provider is configured.
    announcer: Option<Arc<Announcer>>,
}

impl RobotoBot {
    pub fn new(config: Config, controller: Arc<PlaybackController>, announcer: Option<Arc<Announcer>>) -> Self {
        Self {
            config: Arc::new(config),
            controller,
            announcer,
        }
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    pub fn announcer(&self) -> Option<&Arc<Announcer>> {
        self.announcer.as_ref()
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (`GUILD_ID`) propagate in about a second, which is what
    /// development wants; global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::from(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild."
                    )
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'."
                    )
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RobotoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Errors are logged and never crash the bot; a failed interaction shows
    /// Discord's generic "interaction failed" notice.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }
}
