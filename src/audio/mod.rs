// Audio module - format detection and duration probing

pub mod detection;
pub mod metadata;

pub use detection::{is_audio_file, AudioFormat};
pub use metadata::{probe, BasicTags, ProbedAudio};
