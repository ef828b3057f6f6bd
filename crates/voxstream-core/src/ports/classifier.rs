//! Frame-level speech/silence classification port.

/// Classifies one fixed-duration PCM frame as speech or silence.
///
/// Takes `&mut self` because frame classifiers are usually stateful
/// (smoothing, adaptive noise floors). Each session owns its own instance.
pub trait FrameClassifier: Send {
    /// Whether `frame` (mono PCM16 LE) contains speech.
    fn classify_frame(&mut self, frame: &[u8], sample_rate: u32) -> bool;
}
