//! On-disk record for one run-file frame.
//!
//! Layout:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ uncompressed_len: u64 ][ compressed_len: u64 ]
//! [ payload bytes … ][ blake3(header || payload): 32 bytes ]
//!
//! Records are appended back to back, so a reader walks the file by reading a
//! header, then exactly `compressed_len + CHECKSUM_LEN` more bytes.

use serde::{Deserialize, Serialize};

use spilljoin_core::frame::Frame;

use super::codec::{self, Codec};
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x534A_4652; // "SJFR"
pub const VERSION: u16 = 2;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 8 + 8;
pub const CHECKSUM_LEN: usize = 32;

/// Upper bound on a single decoded frame, guards against corrupted headers.
pub const MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u16,
    pub codec: Codec,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

impl SegmentHeader {
    pub fn new(codec: Codec, uncompressed_len: u64, compressed_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            codec,
            uncompressed_len,
            compressed_len,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.codec as u8);
        out.push(0u8); // reserved
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.compressed_len.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Storage(format!(
                "short run-file header: {} bytes",
                bytes.len()
            )));
        }
        let magic = u32::from_le_bytes(array_at(bytes, 0)?);
        let version = u16::from_le_bytes(array_at(bytes, 4)?);
        let codec = Codec::from_u8(bytes[6])?;
        // bytes[7] reserved
        let uncompressed_len = u64::from_le_bytes(array_at(bytes, 8)?);
        let compressed_len = u64::from_le_bytes(array_at(bytes, 16)?);

        if magic != MAGIC || version != VERSION {
            return Err(Error::Storage("bad run-file magic/version".into()));
        }

        let header = Self::new(codec, uncompressed_len, compressed_len);
        header.validate_sizes()?;
        Ok(header)
    }

    /// Reject sizes no frame we wrote could have.
    pub fn validate_sizes(&self) -> Result<()> {
        if self.uncompressed_len > MAX_FRAME_BYTES || self.compressed_len > MAX_FRAME_BYTES {
            return Err(Error::Storage(format!(
                "frame record too large: {} / {} bytes",
                self.uncompressed_len, self.compressed_len
            )));
        }
        Ok(())
    }

    /// Bytes following the header: payload plus checksum.
    pub fn body_len(&self) -> usize {
        self.compressed_len as usize + CHECKSUM_LEN
    }
}

fn array_at<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N]> {
    bytes
        .get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Storage(format!("truncated header field at {at}")))
}

/// Serialize, compress and checksum one frame into a self-contained record.
pub fn encode_frame(codec: Codec, frame: &Frame) -> Result<Vec<u8>> {
    let uncompressed =
        bincode::serialize(frame).map_err(|e| Error::Codec(format!("frame serialize: {e}")))?;
    let compressed = codec::compress(codec, &uncompressed)?;
    let header = SegmentHeader::new(codec, uncompressed.len() as u64, compressed.len() as u64);
    let header_bytes = header.to_bytes();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&header_bytes);
    hasher.update(&compressed);
    let checksum: [u8; 32] = hasher.finalize().into();

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len() + CHECKSUM_LEN);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&compressed);
    out.extend_from_slice(&checksum);
    Ok(out)
}

/// Verify and decode a record body read after `header_bytes`.
///
/// Returns `Ok(None)` on a checksum mismatch so the caller can attach the
/// file position to the error.
pub fn decode_frame(header_bytes: &[u8], body: &[u8]) -> Result<Option<Frame>> {
    let header = SegmentHeader::from_bytes(header_bytes)?;
    if body.len() != header.body_len() {
        return Err(Error::Storage(format!(
            "truncated frame record: expected {} bytes, got {}",
            header.body_len(),
            body.len()
        )));
    }
    let (payload, checksum) = body.split_at(header.compressed_len as usize);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&header_bytes[..HEADER_LEN]);
    hasher.update(payload);
    let computed: [u8; 32] = hasher.finalize().into();
    if computed.as_slice() != checksum {
        return Ok(None);
    }

    let uncompressed = codec::decompress(header.codec, payload)?;
    let frame = bincode::deserialize(&uncompressed)
        .map_err(|e| Error::Codec(format!("frame deserialize: {e}")))?;
    Ok(Some(frame))
}
