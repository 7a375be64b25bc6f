use std::fs;
use std::path::{Path, PathBuf};

use super::MediaError;
use crate::core::format_size;

/// Copy `file` into `media_dir` and verify the copy
///
/// The copy keeps the source's file name unless `file_name` is given.
/// Returns the path of the verified copy.
pub fn copy_to_media(
    file: &Path,
    media_dir: &Path,
    file_name: Option<&str>,
) -> Result<PathBuf, MediaError> {
    if !file.is_file() {
        return Err(MediaError::SourceMissing(file.to_path_buf()));
    }
    if !media_dir.is_dir() {
        return Err(MediaError::DestinationMissing(media_dir.to_path_buf()));
    }

    let name: std::ffi::OsString = match file_name {
        Some(name) => name.into(),
        None => file
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| MediaError::SourceMissing(file.to_path_buf()))?,
    };
    let target = media_dir.join(name);

    log::info!("Copying {} to {}", file.display(), target.display());
    if let Err(e) = fs::copy(file, &target) {
        // A failed copy can leave a truncated file behind on the media
        let _ = fs::remove_file(&target);
        return Err(MediaError::io(format!("Failed to copy to {}", target.display()), e));
    }

    verify_copy(file, &target)?;
    Ok(target)
}

/// Check that `target` exists and matches the source size
pub fn verify_copy(source: &Path, target: &Path) -> Result<(), MediaError> {
    let expected = fs::metadata(source)
        .map_err(|e| MediaError::io(format!("Failed to read {}", source.display()), e))?
        .len();

    let actual = match fs::metadata(target) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::TargetMissing(target.to_path_buf()));
        }
        Err(e) => {
            return Err(MediaError::io(format!("Failed to read {}", target.display()), e));
        }
    };

    if actual != expected {
        log::warn!(
            "Verification failed for {}: {} vs {}",
            target.display(),
            format_size(actual),
            format_size(expected)
        );
        return Err(MediaError::SizeMismatch {
            path: target.to_path_buf(),
            expected,
            actual,
        });
    }

    log::info!("Verified {} ({})", target.display(), format_size(actual));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_file(dir: &Path) -> PathBuf {
        let path = dir.join("loop_repeated.mp3");
        fs::write(&path, vec![0x55u8; 4096]).unwrap();
        path
    }

    #[test]
    fn test_copy_keeps_file_name() {
        let src_dir = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let file = source_file(src_dir.path());

        let copied = copy_to_media(&file, media.path(), None).unwrap();
        assert_eq!(copied, media.path().join("loop_repeated.mp3"));
        assert_eq!(fs::read(&copied).unwrap(), fs::read(&file).unwrap());
    }

    #[test]
    fn test_copy_with_new_name() {
        let src_dir = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let file = source_file(src_dir.path());

        let copied = copy_to_media(&file, media.path(), Some("track01.mp3")).unwrap();
        assert_eq!(copied, media.path().join("track01.mp3"));
    }

    #[test]
    fn test_missing_source() {
        let media = TempDir::new().unwrap();
        let err = copy_to_media(Path::new("/nonexistent/a.mp3"), media.path(), None).unwrap_err();
        assert!(matches!(err, MediaError::SourceMissing(_)));
    }

    #[test]
    fn test_missing_destination() {
        let src_dir = TempDir::new().unwrap();
        let file = source_file(src_dir.path());
        let err = copy_to_media(&file, Path::new("/nonexistent/media"), None).unwrap_err();
        assert!(matches!(err, MediaError::DestinationMissing(_)));
    }

    #[test]
    fn test_verify_detects_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = source_file(dir.path());
        let target = dir.path().join("copy.mp3");
        fs::write(&target, vec![0x55u8; 1000]).unwrap();

        let err = verify_copy(&file, &target).unwrap_err();
        assert!(matches!(
            err,
            MediaError::SizeMismatch {
                expected: 4096,
                actual: 1000,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_missing_target() {
        let dir = TempDir::new().unwrap();
        let file = source_file(dir.path());
        let err = verify_copy(&file, &dir.path().join("gone.mp3")).unwrap_err();
        assert!(matches!(err, MediaError::TargetMissing(_)));
    }
}
