use thiserror::Error;

/// All errors produced by aec-engine.
///
/// Startup failures (device open, bad configuration) are fatal: the engine
/// never enters the steady loop with partial state. Buffer underruns are not
/// errors at all; they are absorbed by polling.
#[derive(Debug, Error)]
pub enum AecError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine has already run, create a new engine to restart")]
    AlreadyStopped,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AecError>;
