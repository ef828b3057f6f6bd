//! Voice session error types.

/// Errors that can occur while streaming a voice session.
///
/// None of these are fatal to a session: the orchestrator reports them as
/// `error` events and keeps accepting audio.
#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    /// Failed to transcribe a PCM window.
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// The reply generator failed to start or broke mid-stream.
    #[error("Reply generation failed: {0}")]
    Reply(String),

    /// Failed to synthesize speech for a phrase.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Audio chunk length is not a whole number of 16-bit samples.
    #[error("Audio chunk of {len} bytes is not a whole number of 16-bit samples")]
    PartialSample { len: usize },

    /// A configuration value is out of range.
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    /// A speech engine could not be constructed on its worker thread.
    #[error("Failed to initialise speech engine: {0}")]
    EngineInit(String),

    /// A job panicked on its worker thread; the worker's engine is rebuilt.
    #[error("Engine job panicked on its worker thread")]
    JobPanicked,

    /// The engine worker pool has shut down.
    #[error("Engine worker pool is closed")]
    WorkerPoolClosed,

    /// IO error (audio files, worker thread spawn).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled.
    #[error("Voice operation cancelled")]
    Cancelled,
}

impl VoxError {
    /// Whether this error is the cancellation control signal rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
