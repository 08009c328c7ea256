//! File-backed header store.
//!
//! The backing file is a fixed-size ring of header records preceded by a small
//! file header holding the magic, the ring capacity, the write cursor and the
//! hash of the current chain head. Once the ring is full the oldest records are
//! overwritten, which is fine for a headers-only client that only ever needs the
//! recent part of the chain.
//!
//! Records are decoded into memory at open and every later read is served from
//! there. Writes are only buffered: the dirty records and the file header reach
//! disk in one batch at [`ChainStore::close`], so the file on disk always
//! reflects the last clean close.
//!
//! ```text
//! [magic:4][version:4][capacity:4][cursor:4][head:32][pad..64] [record 0][record 1]...
//! ```

use crate::chain::types::{BlockHash, BlockHeader, ChainStoreError, StoredHeader};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAGIC: [u8; 4] = *b"SPVH";
const FORMAT_VERSION: u32 = 1;

/// Bytes reserved for the file header.
pub const FILE_HEADER_SIZE: u64 = 64;
/// Serialized size of a [`StoredHeader`]: hash (32) + height (4) + header (80).
pub const RECORD_SIZE: u64 = 116;
/// Default ring capacity in headers.
pub const DEFAULT_CAPACITY: u32 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileHeader {
	magic: [u8; 4],
	version: u32,
	capacity: u32,
	cursor: u32,
	chain_head: BlockHash,
}

pub struct ChainStore {
	path: PathBuf,
	file: File,
	capacity: u32,
	cursor: u32,
	/// Record held by each ring slot, `None` for empty slots.
	slots: Vec<Option<StoredHeader>>,
	index: HashMap<BlockHash, u32>,
	/// Slots written since open, flushed at close.
	dirty: BTreeSet<u32>,
	head: StoredHeader,
}

impl ChainStore {
	/// Opens the store at `path`, creating it seeded with `genesis` when absent.
	///
	/// An existing file is validated eagerly: a bad magic, a size that does not
	/// match the recorded capacity, an undecodable record or a chain head that
	/// cannot be found all yield [`ChainStoreError::Corrupt`].
	pub fn open(
		path: impl AsRef<Path>,
		capacity: u32,
		genesis: &BlockHeader,
	) -> Result<Self, ChainStoreError> {
		let path = path.as_ref().to_path_buf();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&path)?;

		let len = file.metadata()?.len();
		if len == 0 {
			return Self::create(path, file, capacity, genesis);
		}

		Self::load(path, file, len)
	}

	fn create(
		path: PathBuf,
		file: File,
		capacity: u32,
		genesis: &BlockHeader,
	) -> Result<Self, ChainStoreError> {
		if capacity == 0 {
			return Err(ChainStoreError::Corrupt(
				"capacity must be at least one header".to_string(),
			));
		}

		file.set_len(FILE_HEADER_SIZE + u64::from(capacity) * RECORD_SIZE)?;

		let genesis = StoredHeader::genesis(*genesis);
		let mut store = Self {
			path,
			file,
			capacity,
			cursor: 0,
			slots: vec![None; capacity as usize],
			index: HashMap::new(),
			dirty: BTreeSet::new(),
			head: genesis,
		};
		store.put(&genesis);
		store.flush()?;

		info!(
			"Created chain store at {:?} with capacity {} headers, genesis {}",
			store.path, capacity, genesis.hash
		);
		Ok(store)
	}

	fn load(path: PathBuf, file: File, len: u64) -> Result<Self, ChainStoreError> {
		if len < FILE_HEADER_SIZE {
			return Err(ChainStoreError::Corrupt(format!(
				"file too short: {} bytes",
				len
			)));
		}

		let mut header_bytes = vec![0u8; FILE_HEADER_SIZE as usize];
		(&file).seek(SeekFrom::Start(0))?;
		(&file).read_exact(&mut header_bytes)?;
		let file_header: FileHeader = bincode::deserialize(&header_bytes)
			.map_err(|e| ChainStoreError::Corrupt(format!("unreadable file header: {}", e)))?;

		if file_header.magic != MAGIC {
			return Err(ChainStoreError::Corrupt("bad magic".to_string()));
		}
		if file_header.version != FORMAT_VERSION {
			return Err(ChainStoreError::Corrupt(format!(
				"unsupported format version {}",
				file_header.version
			)));
		}
		if file_header.capacity == 0 || file_header.cursor >= file_header.capacity {
			return Err(ChainStoreError::Corrupt(format!(
				"invalid cursor {} for capacity {}",
				file_header.cursor, file_header.capacity
			)));
		}

		let expected = FILE_HEADER_SIZE + u64::from(file_header.capacity) * RECORD_SIZE;
		if len != expected {
			return Err(ChainStoreError::Corrupt(format!(
				"file size {} does not match capacity {} (expected {})",
				len, file_header.capacity, expected
			)));
		}

		let mut records = vec![0u8; (len - FILE_HEADER_SIZE) as usize];
		(&file).read_exact(&mut records)?;

		let mut slots = vec![None; file_header.capacity as usize];
		let mut index = HashMap::new();
		let mut head = None;
		for (slot, chunk) in records.chunks_exact(RECORD_SIZE as usize).enumerate() {
			if chunk.iter().all(|b| *b == 0) {
				continue;
			}
			let stored: StoredHeader = bincode::deserialize(chunk).map_err(|e| {
				ChainStoreError::Corrupt(format!("unreadable record in slot {}: {}", slot, e))
			})?;
			if stored.hash == file_header.chain_head {
				head = Some(stored);
			}
			slots[slot] = Some(stored);
			index.insert(stored.hash, slot as u32);
		}

		let head = head.ok_or_else(|| {
			ChainStoreError::Corrupt(format!(
				"chain head {} not found in store",
				file_header.chain_head
			))
		})?;

		debug!(
			"Opened chain store at {:?}: {} headers, head {} at height {}",
			path,
			index.len(),
			head.hash,
			head.height
		);

		Ok(Self {
			path,
			file,
			capacity: file_header.capacity,
			cursor: file_header.cursor,
			slots,
			index,
			dirty: BTreeSet::new(),
			head,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Number of headers currently held in the ring.
	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// The current best header.
	pub fn chain_head(&self) -> &StoredHeader {
		&self.head
	}

	pub fn contains(&self, hash: &BlockHash) -> bool {
		self.index.contains_key(hash)
	}

	pub fn get(&self, hash: &BlockHash) -> Option<StoredHeader> {
		let slot = self.index.get(hash)?;
		self.slots[*slot as usize]
	}

	/// Stores `stored` in the next ring slot, evicting whatever was there.
	///
	/// The slot holding the current chain head is never reused, so the head
	/// always survives until the next close.
	pub fn put(&mut self, stored: &StoredHeader) {
		if self.index.contains_key(&stored.hash) {
			return;
		}

		let mut slot = self.cursor;
		if self.capacity > 1 && self.holds_head(slot) {
			slot = (slot + 1) % self.capacity;
		}

		if let Some(evicted) = self.slots[slot as usize].replace(*stored) {
			self.index.remove(&evicted.hash);
		}
		self.index.insert(stored.hash, slot);
		self.dirty.insert(slot);
		self.cursor = (slot + 1) % self.capacity;
	}

	pub fn set_chain_head(&mut self, stored: &StoredHeader) -> Result<(), ChainStoreError> {
		if !self.index.contains_key(&stored.hash) {
			return Err(ChainStoreError::UnknownHeader(stored.hash));
		}
		self.head = *stored;
		Ok(())
	}

	/// Number of slots written since open that have not reached disk yet.
	pub fn pending_writes(&self) -> usize {
		self.dirty.len()
	}

	/// Walks parent links backwards from `from`, returning at most `max_count`
	/// headers starting with `from` itself.
	///
	/// Stops at genesis. A missing parent, or one at an unexpected height, ends
	/// the walk early and the headers collected so far are returned.
	pub fn walk_back(&self, from: &StoredHeader, max_count: usize) -> Vec<StoredHeader> {
		let mut headers = Vec::with_capacity(max_count.min(self.index.len()));
		if max_count == 0 {
			return headers;
		}

		let mut current = *from;
		loop {
			headers.push(current);
			if headers.len() >= max_count || current.height == 0 {
				break;
			}

			match self.get(&current.header.prev_block) {
				Some(parent) if parent.height + 1 == current.height => current = parent,
				Some(parent) => {
					warn!(
						"Walk back stopped at height {}: parent {} claims height {}",
						current.height, parent.hash, parent.height
					);
					break;
				}
				None => {
					debug!(
						"Walk back stopped at height {}: parent {} no longer stored",
						current.height, current.header.prev_block
					);
					break;
				}
			}
		}

		headers
	}

	/// Writes buffered records and the file header, then releases the file.
	pub fn close(mut self) -> Result<(), ChainStoreError> {
		let written = self.flush()?;
		debug!(
			"Closed chain store at {:?}, wrote {} headers",
			self.path, written
		);
		Ok(())
	}

	fn flush(&mut self) -> Result<usize, ChainStoreError> {
		let dirty = std::mem::take(&mut self.dirty);
		let mut file = &self.file;
		for slot in &dirty {
			if let Some(stored) = &self.slots[*slot as usize] {
				file.seek(SeekFrom::Start(Self::slot_offset(*slot)))?;
				file.write_all(&bincode::serialize(stored)?)?;
			}
		}
		self.write_file_header()?;
		self.file.sync_all()?;
		Ok(dirty.len())
	}

	fn holds_head(&self, slot: u32) -> bool {
		self.slots[slot as usize].is_some_and(|stored| stored.hash == self.head.hash)
	}

	fn write_file_header(&self) -> Result<(), ChainStoreError> {
		let file_header = FileHeader {
			magic: MAGIC,
			version: FORMAT_VERSION,
			capacity: self.capacity,
			cursor: self.cursor,
			chain_head: self.head.hash,
		};
		let bytes = bincode::serialize(&file_header)?;
		let mut file = &self.file;
		file.seek(SeekFrom::Start(0))?;
		file.write_all(&bytes)?;
		Ok(())
	}

	fn slot_offset(slot: u32) -> u64 {
		FILE_HEADER_SIZE + u64::from(slot) * RECORD_SIZE
	}
}
