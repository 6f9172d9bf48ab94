/// Core error type for the bot.
///
/// Adapter crates map their platform errors into this type so the core can
/// tell permission problems (skip quietly) from transport problems (log and
/// fall back).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing permission: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_permission(&self) -> bool {
        matches!(self, Error::Permission(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
