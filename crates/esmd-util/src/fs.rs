use std::fs;
use std::io;
use std::path::Path;

/// Returns true if `path` exists and is a regular file (symlinks are followed).
#[must_use]
pub fn exists_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read at most `limit` bytes from the start of a file, lossily decoded.
///
/// Module sniffing only needs the head of a file; large bundles are not read in full.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn read_head_lossy(path: &Path, limit: usize) -> io::Result<String> {
    use std::io::Read;

    let file = fs::File::open(path)?;
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_exists_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("index.mjs");
        fs::write(&file, "export {}").unwrap();

        assert!(exists_file(&file));
        assert!(!exists_file(dir.path()));
        assert!(!exists_file(&dir.path().join("missing.js")));
    }

    #[test]
    fn test_read_to_string_lossy_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x80, 0x81])
            .unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert!(content.starts_with("Hello"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_read_head_lossy_truncates() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"export const a = 1;\nexport const b = 2;\n")
            .unwrap();
        file.flush().unwrap();

        let head = read_head_lossy(file.path(), 6).unwrap();
        assert_eq!(head, "export");
    }
}
