use thiserror::Error;

/// Errores del motor de reproducción.
///
/// Cada fallo afecta a una guild y un comando, ninguno es fatal para el
/// proceso. La capa de comandos los muestra con [`PlaybackError::user_message`].
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The command did not come from inside a guild.
    #[error("no se pudo identificar el servidor")]
    NoGuildContext,

    /// Neither the requester nor the guild has a usable voice channel.
    #[error("no hay un canal de voz disponible")]
    NoVoiceChannel,

    #[error("no se pudo conectar al canal de voz: {0}")]
    VoiceJoinFailed(String),

    /// Search or lookup returned zero matches.
    #[error("sin resultados para \"{0}\"")]
    ResolutionNotFound(String),

    /// The provider explicitly refused access (consent/verification gate).
    #[error("el proveedor denegó el acceso: {0}")]
    ProviderAccessDenied(String),

    #[error("la descarga falló: {0}")]
    DownloadFailed(String),

    #[error("no se pudo iniciar la reproducción: {0}")]
    PlaybackStartFailed(String),

    /// Nothing queued. Normal control-flow signal.
    #[error("la cola está vacía")]
    QueueEmpty,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    /// Control-flow outcomes that must not be logged as errors.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::QueueEmpty | Self::ResolutionNotFound(_))
    }

    /// Short text shown to the person who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoGuildContext => "❌ Este comando solo funciona dentro de un servidor".to_string(),
            Self::NoVoiceChannel => "❌ Únete a un canal de voz primero".to_string(),
            Self::ResolutionNotFound(query) => format!("🔍 No se encontraron resultados para \"{}\"", query),
            Self::ProviderAccessDenied(_) => {
                "🔒 El proveedor pidió verificación para este contenido, no se puede reproducir".to_string()
            }
            Self::QueueEmpty => "📭 No hay canciones en la cola".to_string(),
            Self::QueueFull(max) => format!("❌ La cola está llena (máximo {} canciones)", max),
            other => format!("❌ {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flow_errors_are_flagged() {
        assert!(PlaybackError::QueueEmpty.is_control_flow());
        assert!(PlaybackError::ResolutionNotFound("x".into()).is_control_flow());
        assert!(!PlaybackError::DownloadFailed("x".into()).is_control_flow());
    }

    #[test]
    fn transient_failures_carry_the_cause() {
        let msg = PlaybackError::DownloadFailed("connection reset".into()).user_message();
        assert!(msg.contains("connection reset"));

        let denied = PlaybackError::ProviderAccessDenied("Sign in to confirm".into()).user_message();
        assert!(!denied.contains("Sign in"));
    }
}
