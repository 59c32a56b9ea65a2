use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::QueueSnapshot,
    sources::{Provider, SongRef},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Roboto Music";

fn source_label(provider: Provider) -> &'static str {
    match provider {
        Provider::RemoteVideo => "YouTube",
        Provider::LocalFile => "Archivo local",
        Provider::GeneratedTrack => "Generada con IA",
    }
}

fn with_link(embed: CreateEmbed, song: &SongRef) -> CreateEmbed {
    if song.locator().starts_with("http") {
        embed.url(song.locator())
    } else {
        embed
    }
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing(song: &SongRef, queued: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", song.title()))
        .color(colors::MUSIC_PURPLE);

    embed = match song.duration_hint() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "Desconocida", true),
    };

    embed = embed
        .field("🔗 Fuente", source_label(song.provider()), true)
        .field("📋 En cola", queued.to_string(), true);

    if let Some(thumbnail) = song.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    with_link(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para canciones agregadas mientras algo suena
pub fn songs_added(songs: &[SongRef]) -> CreateEmbed {
    let Some(first) = songs.first() else {
        return info("Cola", "No se agregaron canciones");
    };

    let mut embed = if songs.len() == 1 {
        with_link(
            CreateEmbed::default()
                .title("✅ Canción Agregada")
                .description(format!("**{}** se ha agregado a la cola de reproducción", first.title())),
            first,
        )
    } else {
        let preview: Vec<String> = songs
            .iter()
            .take(5)
            .enumerate()
            .map(|(i, song)| format!("**{}**. {}", i + 1, song.title()))
            .collect();
        let mut description = preview.join("\n");
        if songs.len() > 5 {
            description.push_str(&format!("\n... y {} más", songs.len() - 5));
        }

        CreateEmbed::default()
            .title(format!("📋 {} Canciones Agregadas", songs.len()))
            .description(description)
    };

    if let Some(thumbnail) = first.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente al terminar la actual"))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue(snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.entries.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    let mut position = 0;
    for entry in &snapshot.entries {
        if entry.is_current {
            description.push_str(&format!("▶️ **{}** `[{}]`\n", entry.title, entry.provider));
        } else {
            position += 1;
            description.push_str(&format!("**{}**. {} `[{}]`\n", position, entry.title, entry.provider));
        }
    }

    let hidden = snapshot.total.saturating_sub(snapshot.entries.len());
    if hidden > 0 {
        description.push_str(&format!("\n... y {} más", hidden));
    }

    embed
        .description(description)
        .field("Información", format!("**Total:** {} canciones", snapshot.total), false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para una canción que no se pudo reproducir
pub fn playback_failed(song: &SongRef, reason: &str) -> CreateEmbed {
    with_link(
        CreateEmbed::default()
            .title("❌ Error al reproducir")
            .description(format!("**{}**\n\n{}", song.title(), reason)),
        song,
    )
    .color(colors::ERROR_RED)
    .timestamp(Timestamp::now())
    .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn error(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn success(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn info(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn warning(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
