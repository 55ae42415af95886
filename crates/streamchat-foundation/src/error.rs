use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Actuation error: {0}")]
    Actuation(#[from] ActuationError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Buffer overflow, dropped {count} samples")]
    BufferOverflow { count: usize },

    #[error("CPAL error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect session transport: {0}")]
    Connect(String),

    #[error("Session transport closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Malformed server event: {0}")]
    MalformedEvent(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No screenshot tool available")]
    NoTool,

    #[error("Capture failed: {0}")]
    Capture(String),
}

#[derive(Error, Debug)]
pub enum ActuationError {
    #[error("Chat surface unavailable")]
    ChatUnavailable,

    #[error("Input backend failed: {0}")]
    Backend(String),

    #[error("Actuation task join failure")]
    TaskJoin,
}
