use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};
use std::{fmt, str::FromStr};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "music.pause";
    pub const RESUME: &str = "music.resume";
    pub const STOP: &str = "music.stop";
    pub const SKIP: &str = "music.skip";

    pub const PREFIX: &str = "music.";
}

/// Acción de control sobre la reproducción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicAction {
    Pause,
    Resume,
    Stop,
    Skip,
}

impl MusicAction {
    pub fn custom_id(&self) -> &'static str {
        match self {
            MusicAction::Pause => button_ids::PAUSE,
            MusicAction::Resume => button_ids::RESUME,
            MusicAction::Stop => button_ids::STOP,
            MusicAction::Skip => button_ids::SKIP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acción desconocida: {}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for MusicAction {
    type Err = UnknownAction;

    /// Accepts `PAUSE|RESUME|STOP|SKIP` in any case, or a button custom id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let name = raw.strip_prefix(button_ids::PREFIX).unwrap_or(raw);

        match name.to_ascii_uppercase().as_str() {
            "PAUSE" => Ok(MusicAction::Pause),
            "RESUME" => Ok(MusicAction::Resume),
            "STOP" => Ok(MusicAction::Stop),
            "SKIP" => Ok(MusicAction::Skip),
            _ => Err(UnknownAction(raw.to_string())),
        }
    }
}

/// Controles del mensaje "reproduciendo ahora"
pub fn player_controls(paused: bool) -> Vec<CreateActionRow> {
    let toggle = if paused {
        CreateButton::new(button_ids::RESUME)
            .label("Reanudar")
            .emoji('▶')
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .label("Pausar")
            .emoji('⏸')
            .style(ButtonStyle::Primary)
    };

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .label("Saltar")
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .label("Detener")
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![toggle, skip_btn, stop_btn])]
}
