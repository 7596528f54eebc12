//! Streaming checksum accumulator and ETag computation.
//!
//! `StreamingChecksum` feeds bytes incrementally to every algorithm the
//! caller asked for; `Finish` then produces the finalized values and,
//! if expected values were supplied, validates them.

use crate::model::{ChecksumAlgorithm, Checksums};
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Accumulates one or more checksum algorithms over a byte stream.
#[derive(Default)]
pub struct StreamingChecksum {
    crc32: Option<crc32fast::Hasher>,
    crc32c: Option<u32>,
    crc64nvme: Option<crc64fast_nvme::Digest>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
}

impl StreamingChecksum {
    /// Start accumulating the given set of algorithms.
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut acc = StreamingChecksum::default();
        for algo in algorithms {
            match algo {
                ChecksumAlgorithm::Crc32 => acc.crc32 = Some(crc32fast::Hasher::new()),
                ChecksumAlgorithm::Crc32c => acc.crc32c = Some(0),
                ChecksumAlgorithm::Crc64nvme => acc.crc64nvme = Some(crc64fast_nvme::Digest::new()),
                ChecksumAlgorithm::Sha1 => acc.sha1 = Some(Sha1::new()),
                ChecksumAlgorithm::Sha256 => acc.sha256 = Some(Sha256::new()),
            }
        }
        acc
    }

    /// Feed a chunk of bytes to every active algorithm.
    pub fn append(&mut self, bytes: &[u8]) {
        if let Some(h) = self.crc32.as_mut() {
            h.update(bytes);
        }
        if let Some(state) = self.crc32c.as_mut() {
            *state = crc32c::crc32c_append(*state, bytes);
        }
        if let Some(h) = self.crc64nvme.as_mut() {
            h.write(bytes);
        }
        if let Some(h) = self.sha1.as_mut() {
            h.update(bytes);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(bytes);
        }
    }

    /// Finalize every active algorithm into its canonical string form
    /// (hex for CRC32/CRC32C, hex for CRC64NVME, base64 for SHA1/SHA256
    /// — matching the AWS checksum header conventions).
    pub fn finish(self) -> Checksums {
        use base64::engine::general_purpose::STANDARD as B64;
        use base64::Engine;

        Checksums {
            crc32: self.crc32.map(|h| hex::encode(h.finalize().to_be_bytes())),
            crc32c: self.crc32c.map(|v| hex::encode(v.to_be_bytes())),
            crc64nvme: self
                .crc64nvme
                .map(|h| hex::encode(h.sum64().to_be_bytes())),
            sha1: self.sha1.map(|h| B64.encode(h.finalize())),
            sha256: self.sha256.map(|h| B64.encode(h.finalize())),
        }
    }
}

/// Compare computed checksums against a single client-supplied expected
/// value for one algorithm. Returns `true` on match.
pub fn verify_checksum(
    computed: &Checksums,
    algorithm: ChecksumAlgorithm,
    expected: &str,
) -> bool {
    let actual = match algorithm {
        ChecksumAlgorithm::Crc32 => computed.crc32.as_deref(),
        ChecksumAlgorithm::Crc32c => computed.crc32c.as_deref(),
        ChecksumAlgorithm::Crc64nvme => computed.crc64nvme.as_deref(),
        ChecksumAlgorithm::Sha1 => computed.sha1.as_deref(),
        ChecksumAlgorithm::Sha256 => computed.sha256.as_deref(),
    };
    actual == Some(expected)
}

/// Compute the lowercase-hex MD5 ETag of a file by streaming it with a
/// fresh read handle, 4 KiB at a time.
pub async fn md5_etag_of_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(0)).await?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the lowercase-hex MD5 of an in-memory buffer (used for
/// multipart part ETags, which are always computed from part bytes
/// already resident during upload).
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the raw (binary, not hex) MD5 digest of a buffer.
pub fn md5_raw(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the S3 multipart ETag: MD5 of the concatenation of each
/// part's raw (binary) MD5 digest, hex-encoded, suffixed with
/// `-<partCount>`.
pub fn multipart_etag(part_md5_raw_digests: &[[u8; 16]]) -> String {
    let mut hasher = Md5::new();
    for digest in part_md5_raw_digests {
        hasher.update(digest);
    }
    let combined = hex::encode(hasher.finalize());
    format!("{combined}-{}", part_md5_raw_digests.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_of_empty_matches_known_value() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn md5_hex_of_hello_matches_known_value() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn md5_etag_of_file_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let etag = md5_etag_of_file(&path).await.unwrap();
        assert_eq!(etag, md5_hex(b"hello"));
    }

    #[test]
    fn multipart_etag_formula() {
        let p1 = md5_raw(&[b'A'; 8]);
        let p2 = md5_raw(&[b'B'; 8]);
        let etag = multipart_etag(&[p1, p2]);
        assert!(etag.ends_with("-2"));
        assert_eq!(etag.len(), 32 + 2);
    }

    #[test]
    fn streaming_checksum_accumulates_in_pieces() {
        let mut acc = StreamingChecksum::new(&[ChecksumAlgorithm::Sha256]);
        acc.append(b"hel");
        acc.append(b"lo");
        let finished = acc.finish();

        let mut whole = StreamingChecksum::new(&[ChecksumAlgorithm::Sha256]);
        whole.append(b"hello");
        let whole_finished = whole.finish();

        assert_eq!(finished.sha256, whole_finished.sha256);
    }

    #[test]
    fn verify_checksum_detects_mismatch() {
        let mut acc = StreamingChecksum::new(&[ChecksumAlgorithm::Crc32]);
        acc.append(b"hello");
        let computed = acc.finish();
        assert!(!verify_checksum(&computed, ChecksumAlgorithm::Crc32, "deadbeef"));
    }
}
