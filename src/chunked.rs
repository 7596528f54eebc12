//! AWS streaming chunked-encoding parser.
//!
//! Decodes the `aws-chunked` wire format described in §4.4: each chunk
//! is `<hexSize>;chunk-signature=<hex>\r\n<rawBytes>\r\n`, terminated by
//! a zero-size chunk optionally followed by trailer header lines and a
//! trailer signature.

use crate::error::{EngineError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bound on the internal read buffer, matching the spec's "rented
/// bounded buffer (≤64 KiB)".
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Validates chunk and trailer signatures. An HTTP/auth layer supplies
/// the concrete SigV4 implementation; the parser only calls it.
pub trait ChunkSignatureValidator {
    /// Validate a single chunk's signature given the chunk's decoded
    /// payload and its claimed signature (lowercase hex).
    fn validate_chunk(&mut self, payload: &[u8], signature: &str) -> bool;

    /// Validate the trailer signature given the collected (non-signature)
    /// trailer headers and the claimed trailer signature.
    fn validate_trailer(&mut self, headers: &[(String, String)], signature: &str) -> bool;
}

/// A validator that accepts everything — used when chunk signing is not
/// in play (plain chunked transfer without SigV4 streaming).
pub struct NoopValidator;

impl ChunkSignatureValidator for NoopValidator {
    fn validate_chunk(&mut self, _payload: &[u8], _signature: &str) -> bool {
        true
    }
    fn validate_trailer(&mut self, _headers: &[(String, String)], _signature: &str) -> bool {
        true
    }
}

/// A type-erased validator, the shape the data and multipart stores
/// accept from callers that don't know (or care) about the concrete
/// SigV4 implementation behind it.
pub type BoxedChunkValidator = Box<dyn ChunkSignatureValidator + Send>;

impl ChunkSignatureValidator for BoxedChunkValidator {
    fn validate_chunk(&mut self, payload: &[u8], signature: &str) -> bool {
        (**self).validate_chunk(payload, signature)
    }
    fn validate_trailer(&mut self, headers: &[(String, String)], signature: &str) -> bool {
        (**self).validate_trailer(headers, signature)
    }
}

/// Decode an AWS chunked-encoded stream from `source`, writing decoded
/// payload bytes to `dest` as they arrive. `on_write` is invoked with
/// each payload slice before it's written, so a streaming checksum
/// accumulator can observe the plaintext.
///
/// Returns the trailer headers collected after the final chunk (possibly
/// empty if the stream had no trailers).
pub async fn decode_chunked<R, W, V, F>(
    mut source: R,
    mut dest: W,
    mut validator: V,
    mut on_write: F,
) -> Result<Vec<(String, String)>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    V: ChunkSignatureValidator,
    F: FnMut(&[u8]),
{
    let mut carry: Vec<u8> = Vec::new();
    let mut read_buf = [0u8; READ_BUFFER_SIZE];

    loop {
        // Ensure we have a full chunk header line in `carry`.
        let header_end = loop {
            if let Some(pos) = find_crlf(&carry) {
                break pos;
            }
            let n = fill_more(&mut source, &mut read_buf, &mut carry).await?;
            if n == 0 {
                return Err(malformed("unexpected end of stream reading chunk header"));
            }
        };

        let header_line = std::str::from_utf8(&carry[..header_end])
            .map_err(|_| malformed("chunk header is not valid UTF-8"))?
            .to_string();
        let (size, signature) = parse_chunk_header(&header_line)?;
        carry.drain(..header_end + 2);

        // Ensure `size + 2` (payload + trailing CRLF) bytes are buffered.
        while carry.len() < size + 2 {
            let n = fill_more(&mut source, &mut read_buf, &mut carry).await?;
            if n == 0 {
                return Err(malformed("unexpected end of stream reading chunk payload"));
            }
        }

        let payload = carry[..size].to_vec();
        if carry[size..size + 2] != *b"\r\n" {
            return Err(malformed("chunk payload missing trailing CRLF"));
        }
        carry.drain(..size + 2);

        if size == 0 {
            // Final chunk: payload must be empty, signature still checked.
            if !validator.validate_chunk(&payload, &signature) {
                return Err(EngineError::SignatureDoesNotMatch);
            }
            let trailers = read_trailers(&mut source, &mut read_buf, &mut carry).await?;
            let (headers, trailer_signature) = split_trailer_signature(trailers)?;
            if let Some(sig) = trailer_signature {
                if !validator.validate_trailer(&headers, &sig) {
                    return Err(EngineError::SignatureDoesNotMatch);
                }
            }
            return Ok(headers);
        }

        if !validator.validate_chunk(&payload, &signature) {
            return Err(EngineError::SignatureDoesNotMatch);
        }
        on_write(&payload);
        dest.write_all(&payload)
            .await
            .map_err(EngineError::Io)?;
    }
}

fn malformed(message: &str) -> EngineError {
    EngineError::InvalidArgument {
        message: format!("malformed chunked stream: {message}"),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

async fn fill_more<R: AsyncRead + Unpin>(
    source: &mut R,
    read_buf: &mut [u8],
    carry: &mut Vec<u8>,
) -> Result<usize> {
    let n = source.read(read_buf).await.map_err(EngineError::Io)?;
    carry.extend_from_slice(&read_buf[..n]);
    Ok(n)
}

/// Parse a `<hexSize>;chunk-signature=<hex>` header line.
fn parse_chunk_header(line: &str) -> Result<(usize, String)> {
    let mut parts = line.splitn(2, ';');
    let size_hex = parts.next().unwrap_or("");
    let size = usize::from_str_radix(size_hex.trim(), 16)
        .map_err(|_| malformed("invalid chunk size hex"))?;
    let attr = parts
        .next()
        .ok_or_else(|| malformed("missing chunk-signature attribute"))?;
    let sig = attr
        .trim()
        .strip_prefix("chunk-signature=")
        .ok_or_else(|| malformed("missing chunk-signature= attribute"))?
        .to_string();
    Ok((size, sig))
}

/// Read trailer header lines until an empty line, returning raw
/// `(name, value)` pairs (including `x-amz-trailer-signature` if
/// present — the caller splits it out).
async fn read_trailers<R: AsyncRead + Unpin>(
    source: &mut R,
    read_buf: &mut [u8],
    carry: &mut Vec<u8>,
) -> Result<Vec<(String, String)>> {
    let mut trailers = Vec::new();
    loop {
        let line_end = loop {
            if let Some(pos) = find_crlf(carry) {
                break pos;
            }
            let n = fill_more(source, read_buf, carry).await?;
            if n == 0 {
                return Err(malformed("unexpected end of stream reading trailers"));
            }
        };
        let line = std::str::from_utf8(&carry[..line_end])
            .map_err(|_| malformed("trailer header is not valid UTF-8"))?
            .to_string();
        carry.drain(..line_end + 2);

        if line.is_empty() {
            return Ok(trailers);
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed("malformed trailer header line"))?;
        trailers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

fn split_trailer_signature(
    trailers: Vec<(String, String)>,
) -> Result<(Vec<(String, String)>, Option<String>)> {
    let mut headers = Vec::new();
    let mut signature = None;
    for (name, value) in trailers {
        if name.eq_ignore_ascii_case("x-amz-trailer-signature") {
            signature = Some(value);
        } else {
            headers.push((name, value));
        }
    }
    Ok((headers, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_chunk(payload: &[u8], signature: &str) -> Vec<u8> {
        let mut out = format!("{:x};chunk-signature={signature}\r\n", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn encode_final(signature: &str) -> Vec<u8> {
        format!("0;chunk-signature={signature}\r\n\r\n").into_bytes()
    }

    #[tokio::test]
    async fn decodes_well_formed_stream() {
        let mut input = Vec::new();
        input.extend(encode_chunk(b"hello ", "sig1"));
        input.extend(encode_chunk(b"world", "sig2"));
        input.extend(encode_final("sig3"));

        let mut out = Vec::new();
        let trailers = decode_chunked(&input[..], &mut out, NoopValidator, |_| {})
            .await
            .unwrap();

        assert_eq!(out, b"hello world");
        assert!(trailers.is_empty());
    }

    #[tokio::test]
    async fn on_write_observes_every_payload() {
        let mut input = Vec::new();
        input.extend(encode_chunk(b"ab", "s1"));
        input.extend(encode_chunk(b"cd", "s2"));
        input.extend(encode_final("s3"));

        let mut seen = Vec::new();
        let mut out = Vec::new();
        decode_chunked(&input[..], &mut out, NoopValidator, |chunk| {
            seen.push(chunk.to_vec());
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![b"ab".to_vec(), b"cd".to_vec()]);
    }

    struct RejectSecondChunk;
    impl ChunkSignatureValidator for RejectSecondChunk {
        fn validate_chunk(&mut self, payload: &[u8], _signature: &str) -> bool {
            payload != b"world"
        }
        fn validate_trailer(&mut self, _headers: &[(String, String)], _signature: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn bad_signature_on_second_chunk_fails() {
        let mut input = Vec::new();
        input.extend(encode_chunk(b"hello ", "sig1"));
        input.extend(encode_chunk(b"world", "bad-sig"));
        input.extend(encode_final("sig3"));

        let mut out = Vec::new();
        let result = decode_chunked(&input[..], &mut out, RejectSecondChunk, |_| {}).await;
        assert!(matches!(result, Err(EngineError::SignatureDoesNotMatch)));
        // Bytes from the first (valid) chunk were already written.
        assert_eq!(out, b"hello ");
    }

    #[tokio::test]
    async fn malformed_header_errors() {
        let input = b"not-hex;chunk-signature=abc\r\n\r\n".to_vec();
        let mut out = Vec::new();
        let result = decode_chunked(&input[..], &mut out, NoopValidator, |_| {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn trailers_are_parsed_and_signature_split_out() {
        let mut input = Vec::new();
        input.extend(encode_chunk(b"data", "sig1"));
        input.extend(b"0;chunk-signature=final-sig\r\n");
        input.extend(b"x-amz-checksum-crc32:deadbeef\r\n");
        input.extend(b"x-amz-trailer-signature:trailer-sig\r\n");
        input.extend(b"\r\n");

        let mut out = Vec::new();
        let trailers = decode_chunked(&input[..], &mut out, NoopValidator, |_| {})
            .await
            .unwrap();

        assert_eq!(
            trailers,
            vec![("x-amz-checksum-crc32".to_string(), "deadbeef".to_string())]
        );
    }
}
