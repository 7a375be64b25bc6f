use std::fmt;
use std::path::Path;

/// Audio container formats the repeater knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Mp3,
    M4a,
    Flac,
    Ogg,
    Aac,
    Wma,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 7] = [
        AudioFormat::Wav,
        AudioFormat::Mp3,
        AudioFormat::M4a,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::Aac,
        AudioFormat::Wma,
    ];

    /// Parse a format tag such as "mp3", ".FLAC" or "m4a"
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().trim_start_matches('.').to_lowercase();
        match tag.as_str() {
            "wav" | "wave" => Some(AudioFormat::Wav),
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "mp4" => Some(AudioFormat::M4a),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "oga" => Some(AudioFormat::Ogg),
            "aac" => Some(AudioFormat::Aac),
            "wma" => Some(AudioFormat::Wma),
            _ => None,
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_tag)
    }

    /// Canonical file extension (without dot)
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Aac => "aac",
            AudioFormat::Wma => "wma",
        }
    }

    /// Whether ffmpeg can be asked to write this format
    pub fn is_supported_output(&self) -> bool {
        matches!(
            self,
            AudioFormat::Mp3
                | AudioFormat::Wav
                | AudioFormat::M4a
                | AudioFormat::Flac
                | AudioFormat::Ogg
        )
    }

    /// Plain PCM with a fixed header; the only format we handle without ffmpeg
    pub fn is_uncompressed(&self) -> bool {
        matches!(self, AudioFormat::Wav)
    }

    /// Whether files of this format can be processed given tool availability
    pub fn is_supported_input(&self, tool_available: bool) -> bool {
        tool_available || self.is_uncompressed()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Check if a file is an audio file based on its extension
pub fn is_audio_file(path: &Path) -> bool {
    AudioFormat::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_audio_formats() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("test.FLAC")));
        assert!(is_audio_file(Path::new("test.wav")));
        assert!(is_audio_file(Path::new("test.wma")));
    }

    #[test]
    fn test_rejects_non_audio() {
        assert!(!is_audio_file(Path::new("test.txt")));
        assert!(!is_audio_file(Path::new("test")));
        assert!(!is_audio_file(Path::new("test.opus")));
    }

    #[test]
    fn test_from_tag_normalizes() {
        assert_eq!(AudioFormat::from_tag(".MP3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_tag(" wav "), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_tag("mp4"), Some(AudioFormat::M4a));
        assert_eq!(AudioFormat::from_tag("aiff"), None);
    }

    #[test]
    fn test_output_support() {
        let outputs: Vec<_> = AudioFormat::ALL
            .iter()
            .filter(|f| f.is_supported_output())
            .collect();
        assert_eq!(outputs.len(), 5);
        assert!(!AudioFormat::Aac.is_supported_output());
        assert!(!AudioFormat::Wma.is_supported_output());
    }

    #[test]
    fn test_input_support_without_tool() {
        assert!(AudioFormat::Wav.is_supported_input(false));
        assert!(!AudioFormat::Flac.is_supported_input(false));
        assert!(AudioFormat::Flac.is_supported_input(true));
    }

    #[test]
    fn test_display_is_uppercase_extension() {
        assert_eq!(AudioFormat::M4a.to_string(), "M4A");
    }
}
