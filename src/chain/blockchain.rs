use crate::chain::store::ChainStore;
use crate::chain::types::{AddOutcome, BlockHeader, ChainStoreError, StoredHeader};
use crate::wallet::Wallet;

use std::sync::Arc;
use tracing::{debug, info};

/// Headers-only chain built on top of a [`ChainStore`] and the wallet it feeds.
///
/// The branch with the greatest height is the best chain. Each time the head
/// moves the wallet is told about the new best block.
pub struct BlockChain {
	store: ChainStore,
	wallet: Arc<dyn Wallet>,
}

impl BlockChain {
	pub fn new(store: ChainStore, wallet: Arc<dyn Wallet>) -> Result<Self, ChainStoreError> {
		let head = *store.chain_head();
		if !head.header.prev_block.is_zero() && head.height == 0 {
			return Err(ChainStoreError::Corrupt(format!(
				"head {} claims height 0 but has a parent",
				head.hash
			)));
		}

		info!(
			"Chain initialized at height {} ({}), head time {}",
			head.height,
			head.hash,
			head.timestamp()
		);
		Ok(Self { store, wallet })
	}

	pub fn chain_head(&self) -> &StoredHeader {
		self.store.chain_head()
	}

	pub fn best_height(&self) -> u32 {
		self.store.chain_head().height
	}

	pub fn store(&self) -> &ChainStore {
		&self.store
	}

	/// Connects a downloaded header.
	pub fn add(&mut self, header: BlockHeader) -> Result<AddOutcome, ChainStoreError> {
		let hash = header.hash();
		if self.store.contains(&hash) {
			return Ok(AddOutcome::Duplicate);
		}

		let Some(parent) = self.store.get(&header.prev_block) else {
			debug!("Rejecting orphan header {} (parent {})", hash, header.prev_block);
			return Ok(AddOutcome::Orphan);
		};

		let stored = parent.build_next(header);
		self.store.put(&stored);

		let head = *self.store.chain_head();
		if stored.height <= head.height {
			debug!(
				"Stored side chain header {} at height {} (head at {})",
				stored.hash, stored.height, head.height
			);
			return Ok(AddOutcome::SideChain(stored));
		}

		self.store.set_chain_head(&stored)?;
		self.wallet.notify_new_best_block(&stored);

		if parent.hash == head.hash {
			Ok(AddOutcome::Extended(stored))
		} else {
			info!(
				"Chain reorganized: new head {} at height {} replaces {} at height {}",
				stored.hash, stored.height, head.hash, head.height
			);
			Ok(AddOutcome::Reorganized(stored))
		}
	}

	/// Up to `max_count` headers walking back from the current head.
	pub fn recent_headers(&self, max_count: usize) -> Vec<StoredHeader> {
		let head = *self.store.chain_head();
		self.store.walk_back(&head, max_count)
	}

	pub fn close(self) -> Result<(), ChainStoreError> {
		self.store.close()
	}
}
