use std::fs;
use std::io;
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::PhenError;

/// Decompresses the whole file to check it is a complete gzip stream.
/// Returns the number of uncompressed bytes.
pub fn validate_gzip(path: &Path) -> Result<u64, PhenError> {
    let file = fs::File::open(path)
        .map_err(|err| PhenError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|err| PhenError::CorruptDownload(format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn accepts_complete_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.fna.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(b">chr1\nACGT\n").unwrap();
        encoder.finish().unwrap();

        assert_eq!(validate_gzip(&path).unwrap(), 11);
    }

    #[test]
    fn rejects_truncated_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.fna.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[b'A'; 4096]).unwrap();
        let bytes = encoder.finish().unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert_matches!(validate_gzip(&path), Err(PhenError::CorruptDownload(_)));
    }
}
