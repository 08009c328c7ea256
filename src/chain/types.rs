use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a serialized block header on the wire and in hashes.
pub const HEADER_BYTES: usize = 80;

/// Double-SHA256 block hash, kept in internal (little-endian) byte order.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
	pub const ZERO: BlockHash = BlockHash([0u8; 32]);

	/// Parses the conventional display form (byte-reversed hex).
	pub fn from_display_hex(value: &str) -> Result<Self, hex::FromHexError> {
		let mut bytes = [0u8; 32];
		hex::decode_to_slice(value, &mut bytes)?;
		bytes.reverse();
		Ok(Self(bytes))
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; 32]
	}
}

impl fmt::Display for BlockHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut reversed = self.0;
		reversed.reverse();
		f.write_str(&hex::encode(reversed))
	}
}

impl fmt::Debug for BlockHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlockHash({})", self)
	}
}

/// An 80-byte block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	pub version: u32,
	pub prev_block: BlockHash,
	pub merkle_root: BlockHash,
	pub time: u32,
	pub bits: u32,
	pub nonce: u32,
}

impl BlockHeader {
	pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
		let mut bytes = [0u8; HEADER_BYTES];
		bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
		bytes[4..36].copy_from_slice(&self.prev_block.0);
		bytes[36..68].copy_from_slice(&self.merkle_root.0);
		bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
		bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
		bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
		bytes
	}

	pub fn hash(&self) -> BlockHash {
		let first = Sha256::digest(self.to_bytes());
		let second = Sha256::digest(first);
		BlockHash(second.into())
	}

	pub fn timestamp(&self) -> DateTime<Utc> {
		Utc.timestamp_opt(i64::from(self.time), 0)
			.single()
			.unwrap_or_default()
	}
}

/// A header as kept in the chain store: the header plus its position in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
	pub hash: BlockHash,
	pub height: u32,
	pub header: BlockHeader,
}

impl StoredHeader {
	pub fn genesis(header: BlockHeader) -> Self {
		Self {
			hash: header.hash(),
			height: 0,
			header,
		}
	}

	/// Builds the stored form of `header`, which must name `self` as its parent.
	pub fn build_next(&self, header: BlockHeader) -> Self {
		Self {
			hash: header.hash(),
			height: self.height + 1,
			header,
		}
	}

	pub fn timestamp(&self) -> DateTime<Utc> {
		self.header.timestamp()
	}
}

/// Header summary handed to collaborators outside the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
	pub hash: String,
	pub height: u32,
	pub time: DateTime<Utc>,
}

impl From<&StoredHeader> for HeaderInfo {
	fn from(stored: &StoredHeader) -> Self {
		Self {
			hash: stored.hash.to_string(),
			height: stored.height,
			time: stored.timestamp(),
		}
	}
}

/// Result of connecting a downloaded header to the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
	/// The header extended the best chain.
	Extended(StoredHeader),
	/// The header became the new head on a different branch.
	Reorganized(StoredHeader),
	/// Stored on a side branch that is not (yet) the best chain.
	SideChain(StoredHeader),
	/// Already known.
	Duplicate,
	/// Parent is unknown; the header was not stored.
	Orphan,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainStoreError {
	#[error("Chain store is corrupt: {0}")]
	Corrupt(String),

	#[error("Chain store IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Chain store encoding error: {0}")]
	Encoding(#[from] bincode::Error),

	#[error("Header {0} not found in chain store")]
	UnknownHeader(BlockHash),
}
