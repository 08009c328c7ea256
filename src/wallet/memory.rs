use crate::chain::StoredHeader;
use crate::wallet::types::{
	Address, BalanceType, ConfidenceType, ListenerId, SendRequest, Transaction, TxHash,
	VerificationError, Wallet, WalletError, WalletEvent, WalletEventSender,
};

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Reference wallet kept entirely in memory.
///
/// Incoming payments are injected with [`MemoryWallet::receive`]; outgoing
/// ones go through `create_transaction` and `commit`.
pub struct MemoryWallet {
	state: Mutex<WalletState>,
	save_path: Option<PathBuf>,
}

#[derive(Default)]
struct WalletState {
	available: u64,
	pending: u64,
	best_height: u32,
	transactions: HashMap<TxHash, WalletTransaction>,
	prepared: HashMap<TxHash, (Transaction, u64)>,
	listeners: Vec<(ListenerId, WalletEventSender)>,
	next_listener: u64,
}

struct WalletTransaction {
	tx: Transaction,
	/// Height of the best block when the transaction was recorded.
	height: u32,
}

#[derive(Serialize)]
struct WalletSummary {
	available: u64,
	pending: u64,
	best_height: u32,
	transactions: usize,
}

impl WalletState {
	fn emit(&mut self, event: WalletEvent) {
		self.listeners
			.retain(|(_, listener)| listener.send(event.clone()).is_ok());
	}
}

impl MemoryWallet {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(WalletState::default()),
			save_path: None,
		}
	}

	/// Wallet whose `save` writes a JSON summary to `path`.
	pub fn with_save_path(path: PathBuf) -> Self {
		Self {
			state: Mutex::new(WalletState::default()),
			save_path: Some(path),
		}
	}

	fn lock(&self) -> MutexGuard<'_, WalletState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Records an incoming payment and notifies listeners.
	pub fn receive(&self, from: Option<Address>, amount: u64, confidence: ConfidenceType) -> TxHash {
		let mut nonce = [0u8; 32];
		rand::rng().fill(&mut nonce);
		let hash = TxHash(Sha256::digest(nonce).into());

		let mut state = self.lock();
		match confidence {
			ConfidenceType::Building => state.available = state.available.saturating_add(amount),
			_ => state.pending = state.pending.saturating_add(amount),
		}
		let height = state.best_height;
		state.transactions.insert(
			hash,
			WalletTransaction {
				tx: Transaction {
					hash,
					raw: nonce.to_vec(),
					fee: 0,
				},
				height,
			},
		);

		state.emit(WalletEvent::CoinsReceived {
			tx_hash: hash,
			from,
			amount: i64::try_from(amount).unwrap_or(i64::MAX),
			confidence,
		});
		state.emit(WalletEvent::Changed);
		hash
	}

	pub fn best_height(&self) -> u32 {
		self.lock().best_height
	}

	pub fn transaction_count(&self) -> usize {
		self.lock().transactions.len()
	}

	/// Transactions built but neither committed nor cancelled.
	pub fn prepared_count(&self) -> usize {
		self.lock().prepared.len()
	}
}

impl Default for MemoryWallet {
	fn default() -> Self {
		Self::new()
	}
}

impl Wallet for MemoryWallet {
	fn balance(&self, kind: BalanceType) -> u64 {
		let state = self.lock();
		match kind {
			BalanceType::Available => state.available,
			BalanceType::Estimated => state.available.saturating_add(state.pending),
		}
	}

	fn add_event_listener(&self, listener: WalletEventSender) -> ListenerId {
		let mut state = self.lock();
		state.next_listener += 1;
		let id = ListenerId(state.next_listener);
		state.listeners.push((id, listener));
		id
	}

	fn remove_event_listener(&self, id: ListenerId) -> bool {
		let mut state = self.lock();
		let before = state.listeners.len();
		state.listeners.retain(|(listener, _)| *listener != id);
		state.listeners.len() != before
	}

	fn clear_transactions(&self, from_height: u32) {
		let mut state = self.lock();
		let before = state.transactions.len();
		state.transactions.retain(|_, wtx| wtx.height < from_height);
		if from_height == 0 {
			state.available = 0;
			state.pending = 0;
		}
		info!(
			"cleared {} transactions from height {}",
			before - state.transactions.len(),
			from_height
		);
		state.emit(WalletEvent::Changed);
	}

	fn notify_new_best_block(&self, head: &StoredHeader) {
		self.lock().best_height = head.height;
	}

	fn create_transaction(&self, request: &SendRequest) -> Result<Transaction, WalletError> {
		if request.amount == 0 {
			return Err(WalletError::InvalidRequest("amount must be positive".to_string()));
		}
		if request.to.0.trim().is_empty() {
			return Err(WalletError::InvalidRequest("missing destination".to_string()));
		}

		let needed = request.amount.saturating_add(request.fee);
		let mut state = self.lock();
		if state.available < needed {
			return Err(WalletError::InsufficientFunds {
				needed,
				available: state.available,
			});
		}

		let mut raw = bincode::serialize(request)
			.map_err(|e| WalletError::InvalidRequest(e.to_string()))?;
		let mut nonce = [0u8; 8];
		rand::rng().fill(&mut nonce);
		raw.extend_from_slice(&nonce);

		let hash = TxHash(Sha256::digest(Sha256::digest(&raw)).into());
		let tx = Transaction {
			hash,
			raw,
			fee: request.fee,
		};
		state.prepared.insert(hash, (tx.clone(), needed));
		debug!("created transaction {} sending {} to {}", hash, request.amount, request.to);
		Ok(tx)
	}

	fn commit(&self, tx: &Transaction) -> Result<(), VerificationError> {
		let mut state = self.lock();
		if state.transactions.contains_key(&tx.hash) {
			return Err(VerificationError::AlreadyCommitted(tx.hash));
		}
		let Some((prepared, needed)) = state.prepared.remove(&tx.hash) else {
			return Err(VerificationError::Rejected {
				hash: tx.hash,
				reason: "transaction was not created by this wallet".to_string(),
			});
		};
		let Some(available) = state.available.checked_sub(needed) else {
			return Err(VerificationError::Rejected {
				hash: tx.hash,
				reason: "insufficient funds".to_string(),
			});
		};

		state.available = available;
		let height = state.best_height;
		state
			.transactions
			.insert(tx.hash, WalletTransaction { tx: prepared, height });
		state.emit(WalletEvent::Changed);
		info!("committed transaction {}", tx.hash);
		Ok(())
	}

	fn cancel_transaction(&self, hash: &TxHash) -> bool {
		let cancelled = self.lock().prepared.remove(hash).is_some();
		if cancelled {
			debug!("cancelled transaction {}", hash);
		}
		cancelled
	}

	fn get_transaction(&self, hash: &TxHash) -> Option<Transaction> {
		self.lock().transactions.get(hash).map(|wtx| wtx.tx.clone())
	}

	fn save(&self) -> Result<(), WalletError> {
		let Some(path) = &self.save_path else {
			return Ok(());
		};
		let summary = {
			let state = self.lock();
			WalletSummary {
				available: state.available,
				pending: state.pending,
				best_height: state.best_height,
				transactions: state.transactions.len(),
			}
		};
		let content = serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?;
		std::fs::write(path, content)?;
		debug!("wallet saved to {:?}", path);
		Ok(())
	}
}
