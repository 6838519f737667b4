//! Animated-QR token fragments
//!
//! Tokens too large for one QR code are framed as a UR sequence,
//! `ur:cashu-token/<i>-<n>/<msg-id-hex>/<payload-hex>`, cycled as an
//! animated code. The receiver scans frames in any order until the set is
//! complete. Small tokens fit a single static code.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use thiserror::Error;

use super::TokenV4;
use crate::util::hex;

const UR_PREFIX: &str = "ur:cashu-token";

/// Payload bytes per fragment
const MAX_FRAGMENT_PAYLOAD: usize = 200;

/// Fragment error
#[derive(Debug, Error)]
pub enum Error {
    /// Not a `ur:cashu-token` frame
    #[error("Invalid fragment prefix")]
    InvalidPrefix,
    /// Frame structure not understood
    #[error("Malformed fragment")]
    Malformed,
    /// Sequence index out of range
    #[error("Fragment index {index} out of range 1..={total}")]
    IndexOutOfRange {
        /// Index carried by the frame
        index: usize,
        /// Total carried by the frame
        total: usize,
    },
    /// Frame belongs to a different message
    #[error("Fragment message id mismatch")]
    MessageIdMismatch,
    /// Frame disagrees with the set's total
    #[error("Fragment count mismatch")]
    CountMismatch,
    /// Hex error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Token error
    #[error(transparent)]
    Token(#[from] super::Error),
    /// Reassembled bytes were not UTF-8
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// QR error-correction level, which bounds the bytes one code can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrection {
    /// ~7% recovery, 2953 bytes
    #[default]
    Low,
    /// ~15% recovery, 2331 bytes
    Medium,
    /// ~25% recovery, 1663 bytes
    Quartile,
    /// ~30% recovery, 1273 bytes
    High,
}

impl ErrorCorrection {
    /// Byte capacity of a version-40 code at this level
    pub fn capacity(&self) -> usize {
        match self {
            Self::Low => 2953,
            Self::Medium => 2331,
            Self::Quartile => 1663,
            Self::High => 1273,
        }
    }
}

/// Whether a token fits a single static code: at most two proofs and within
/// the byte capacity of the chosen error-correction level
pub fn fits_static_qr(token: &TokenV4, ec: ErrorCorrection) -> bool {
    let proof_count: usize = token.token.iter().map(|entry| entry.proofs.len()).sum();

    proof_count <= 2 && token.to_string().len() <= ec.capacity()
}

/// One frame of a fragmented token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 1-based index of this frame
    pub index: usize,
    /// Total number of frames
    pub total: usize,
    /// Message id, shared by every frame of one token
    pub message_id: String,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}-{}/{}/{}",
            UR_PREFIX,
            self.index,
            self.total,
            self.message_id,
            hex::encode(&self.payload)
        )
    }
}

impl FromStr for Fragment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(UR_PREFIX).ok_or(Error::InvalidPrefix)?;
        let rest = rest.strip_prefix('/').ok_or(Error::Malformed)?;

        let mut parts = rest.splitn(3, '/');
        let seq = parts.next().ok_or(Error::Malformed)?;
        let message_id = parts.next().ok_or(Error::Malformed)?.to_string();
        let payload = hex::decode(parts.next().ok_or(Error::Malformed)?)?;

        let (index, total) = seq.split_once('-').ok_or(Error::Malformed)?;
        let index: usize = index.parse().map_err(|_| Error::Malformed)?;
        let total: usize = total.parse().map_err(|_| Error::Malformed)?;

        if index == 0 || index > total || total == 0 {
            return Err(Error::IndexOutOfRange { index, total });
        }

        Ok(Fragment {
            index,
            total,
            message_id,
            payload,
        })
    }
}

/// Split a token into displayable frames
pub fn fragment_token(token: &TokenV4) -> Vec<Fragment> {
    let bytes = token.to_string().into_bytes();
    let message_id = message_id(&bytes);

    let chunks: Vec<&[u8]> = bytes.chunks(MAX_FRAGMENT_PAYLOAD).collect();
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Fragment {
            index: i + 1,
            total,
            message_id: message_id.clone(),
            payload: chunk.to_vec(),
        })
        .collect()
}

fn message_id(bytes: &[u8]) -> String {
    let digest = Sha256Hash::hash(bytes).to_byte_array();
    hex::encode(&digest[..8])
}

/// Collects frames, in any order, until a token can be rebuilt
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    message_id: Option<String>,
    total: Option<usize>,
    received: BTreeMap<usize, Vec<u8>>,
}

impl FragmentAssembler {
    /// Create new [`FragmentAssembler`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scanned frame
    ///
    /// Frames of a different message or disagreeing on the total are
    /// rejected; duplicates are ignored.
    pub fn insert(&mut self, fragment: Fragment) -> Result<(), Error> {
        if let Some(message_id) = &self.message_id {
            if message_id != &fragment.message_id {
                return Err(Error::MessageIdMismatch);
            }
        }
        if let Some(total) = self.total {
            if total != fragment.total {
                return Err(Error::CountMismatch);
            }
        }

        self.message_id = Some(fragment.message_id);
        self.total = Some(fragment.total);
        self.received.entry(fragment.index).or_insert(fragment.payload);

        Ok(())
    }

    /// How many frames of the total have been seen
    pub fn progress(&self) -> (usize, usize) {
        (self.received.len(), self.total.unwrap_or(0))
    }

    /// Whether every frame has been seen
    pub fn is_complete(&self) -> bool {
        match self.total {
            Some(total) => self.received.len() == total,
            None => false,
        }
    }

    /// Rebuild the token once complete
    pub fn assemble(&self) -> Result<TokenV4, Error> {
        if !self.is_complete() {
            return Err(Error::Malformed);
        }

        let bytes: Vec<u8> = self.received.values().flatten().copied().collect();
        let token_str = String::from_utf8(bytes)?;

        // the message id commits to the payload
        if let Some(message_id) = &self.message_id {
            if message_id != &message_id_of(&token_str) {
                return Err(Error::MessageIdMismatch);
            }
        }

        Ok(TokenV4::from_str(&token_str)?)
    }
}

fn message_id_of(token_str: &str) -> String {
    message_id(token_str.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "cashuBo2F0gqJhaUgA_9SLj17PgGFwgaNhYQFhc3hAYWNjMTI0MzVlN2I4NDg0YzNjZjE4NTAxNDkyMThhZjkwZjcxNmE1MmJmNGE1ZWQzNDdlNDhlY2MxM2Y3NzM4OGFjWCECRFODGd5IXVW-07KaZCvuWHk3WrnnpiDhHki6SCQh88-iYWlIAK0mjE0fWCZhcIKjYWECYXN4QDEzMjNkM2Q0NzA3YTU4YWQyZTIzYWRhNGU5ZjFmNDlmNWE1YjRhYzdiNzA4ZWIwZDYxZjczOGY0ODMwN2U4ZWVhY1ghAjRWqhENhLSsdHrr2Cw7AFrKUL9Ffr1XN6RBT6w659lNo2FhAWFzeEA1NmJjYmNiYjdjYzY0MDZiM2ZhNWQ1N2QyMTc0ZjRlZmY4YjQ0MDJiMTc2OTI2ZDNhNTdkM2MzZGNiYjU5ZDU3YWNYIQJzEpxXGeWZN5qXSmJjY8MzxWyvwObQGr5G1YCCgHicY2FtdWh0dHA6Ly9sb2NhbGhvc3Q6MzMzOGF1Y3NhdA==";

    fn token() -> TokenV4 {
        TokenV4::from_str(TOKEN).unwrap()
    }

    #[test]
    fn test_fragments_cover_token() {
        let token = token();
        let fragments = fragment_token(&token);

        assert!(fragments.len() > 1);
        assert!(fragments.iter().all(|f| f.payload.len() <= 200));
        assert!(fragments.iter().all(|f| f.total == fragments.len()));

        let frame = fragments[0].to_string();
        assert!(frame.starts_with("ur:cashu-token/1-"));
    }

    #[test]
    fn test_frame_string_round_trip() {
        let fragments = fragment_token(&token());

        for fragment in &fragments {
            let parsed = Fragment::from_str(&fragment.to_string()).unwrap();
            assert_eq!(&parsed, fragment);
        }
    }

    #[test]
    fn test_assemble_out_of_order() {
        let token = token();
        let mut fragments = fragment_token(&token);
        fragments.reverse();

        let mut assembler = FragmentAssembler::new();
        for fragment in fragments {
            assert!(!assembler.is_complete());
            assembler.insert(fragment).unwrap();
        }

        assert!(assembler.is_complete());
        assert_eq!(assembler.assemble().unwrap(), token);
    }

    #[test]
    fn test_duplicates_ignored() {
        let token = token();
        let fragments = fragment_token(&token);

        let mut assembler = FragmentAssembler::new();
        for fragment in &fragments {
            assembler.insert(fragment.clone()).unwrap();
            assembler.insert(fragment.clone()).unwrap();
        }

        assert_eq!(assembler.assemble().unwrap(), token);
    }

    #[test]
    fn test_foreign_fragment_rejected() {
        let fragments = fragment_token(&token());

        let mut assembler = FragmentAssembler::new();
        assembler.insert(fragments[0].clone()).unwrap();

        let foreign = Fragment {
            message_id: "ffffffffffffffff".to_string(),
            ..fragments[1].clone()
        };
        assert!(assembler.insert(foreign).is_err());
    }

    #[test]
    fn test_bad_frames_rejected() {
        assert!(Fragment::from_str("ur:other/1-2/aabb/cc").is_err());
        assert!(Fragment::from_str("ur:cashu-token/0-2/aabb/cc").is_err());
        assert!(Fragment::from_str("ur:cashu-token/3-2/aabb/cc").is_err());
        assert!(Fragment::from_str("ur:cashu-token/1-2/aabb").is_err());
    }

    #[test]
    fn test_static_qr_rule() {
        // two proofs, well under capacity at low error correction
        assert!(fits_static_qr(&token(), ErrorCorrection::Low));
        // the same token does not fit the high-correction budget when the
        // capacity shrinks below its length
        assert_eq!(
            fits_static_qr(&token(), ErrorCorrection::High),
            token().to_string().len() <= ErrorCorrection::High.capacity()
        );
    }
}
