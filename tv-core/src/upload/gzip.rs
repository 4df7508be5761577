//! Streaming gzip decompression for the upload manager's `decompressing` stage
//! (spec.md §4.2).

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;

use crate::error::{EngineError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BUFFER_SIZE: usize = 1024 * 1024;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Checks the first two bytes of `path` against the gzip magic number.
pub fn has_gzip_magic(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Decompresses `src` into a `.decompressing` sibling file in ~1 MiB buffered loops, then
/// atomically renames it over `src`. Invokes `on_progress(bytes_written)` at most once per
/// 100ms. Asserts the final byte count equals `original_size`; on mismatch the temporary file is
/// removed and an error is returned (spec.md §4.2 steps 1-5).
///
/// Runs on a blocking thread since the underlying I/O is synchronous; this also means a panic in
/// the decompression loop surfaces as a `JoinError` to the caller rather than poisoning the async
/// runtime, satisfying the panic-isolation requirement in spec.md §4.2 and §7.
pub fn decompress_blocking(
    src: &Path,
    original_size: u64,
    mut on_progress: impl FnMut(u64) + Send,
) -> Result<u64> {
    if !has_gzip_magic(src)? {
        return Err(EngineError::Integrity(
            "gzip magic number mismatch".to_string(),
        ));
    }

    let tmp_path: PathBuf = {
        let mut p = src.as_os_str().to_owned();
        p.push(".decompressing");
        PathBuf::from(p)
    };

    let result = (|| -> Result<u64> {
        let source = File::open(src)?;
        let mut decoder = GzDecoder::new(source);
        let mut dest = File::create(&tmp_path)?;

        let mut buf = vec![0u8; BUFFER_SIZE];
        let mut written: u64 = 0;
        let mut last_report = Instant::now();

        loop {
            let n = decoder.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n])?;
            written += n as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                on_progress(written);
                last_report = Instant::now();
            }
        }
        dest.flush()?;
        on_progress(written);

        if written != original_size {
            return Err(EngineError::Integrity(format!(
                "decompressed size mismatch: expected {original_size}, got {written}"
            )));
        }
        Ok(written)
    })();

    match result {
        Ok(written) => {
            std::fs::rename(&tmp_path, src)?;
            Ok(written)
        }
        Err(err) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn gzip_bytes(raw: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decompresses_and_matches_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log.gz");
        let raw = b"the quick brown fox".repeat(1000);
        std::fs::write(&path, gzip_bytes(&raw)).unwrap();

        let written = decompress_blocking(&path, raw.len() as u64, |_| {}).unwrap();
        assert_eq!(written, raw.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), raw);
    }

    #[test]
    fn size_mismatch_removes_temp_file_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log.gz");
        let raw = b"some bytes".to_vec();
        std::fs::write(&path, gzip_bytes(&raw)).unwrap();

        let result = decompress_blocking(&path, raw.len() as u64 + 1, |_| {});
        assert!(result.is_err());
        assert!(!dir.path().join("trace.log.gz.decompressing").exists());
        // Original file is left untouched on failure.
        assert!(path.exists());
    }

    #[test]
    fn non_gzip_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        std::fs::write(&path, b"not gzip").unwrap();

        let result = decompress_blocking(&path, 8, |_| {});
        assert!(matches!(result, Err(EngineError::Integrity(_))));
    }
}
