use crate::chain::StoredHeader;

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// A base58check payment address, kept in its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Address {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut reversed = self.0;
		reversed.reverse();
		f.write_str(&hex::encode(reversed))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceType {
	/// Spendable now.
	Available,
	/// Including pending incoming value.
	Estimated,
}

/// How far a transaction has progressed towards inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceType {
	Unknown,
	Pending,
	/// Included in a block of the best chain.
	Building,
	Dead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub hash: TxHash,
	pub raw: Vec<u8>,
	pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
	pub to: Address,
	pub amount: u64,
	pub fee: u64,
}

/// Events a wallet delivers to its registered listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
	CoinsReceived {
		tx_hash: TxHash,
		/// First input's address, `None` for coinbase transactions.
		from: Option<Address>,
		/// Net value of the transaction to this wallet.
		amount: i64,
		confidence: ConfidenceType,
	},
	/// Any change to balance, transactions or confidence.
	Changed,
}

pub type WalletEventSender = mpsc::UnboundedSender<WalletEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The local wallet the service drives.
///
/// Implementations are thread-safe and mutate their state only through their
/// own methods; event delivery happens through the registered channels.
pub trait Wallet: Send + Sync {
	fn balance(&self, kind: BalanceType) -> u64;

	fn add_event_listener(&self, listener: WalletEventSender) -> ListenerId;

	fn remove_event_listener(&self, id: ListenerId) -> bool;

	/// Drops every transaction seen at or above `from_height`.
	fn clear_transactions(&self, from_height: u32);

	fn notify_new_best_block(&self, head: &StoredHeader);

	fn create_transaction(&self, request: &SendRequest) -> Result<Transaction, WalletError>;

	fn commit(&self, tx: &Transaction) -> Result<(), VerificationError>;

	/// Forgets a transaction built by `create_transaction` that will never be
	/// committed. Returns `false` when nothing was pending under `hash`.
	fn cancel_transaction(&self, hash: &TxHash) -> bool;

	fn get_transaction(&self, hash: &TxHash) -> Option<Transaction>;

	fn save(&self) -> Result<(), WalletError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
	#[error("Transaction {0} is already committed")]
	AlreadyCommitted(TxHash),

	#[error("Transaction {hash} rejected: {reason}")]
	Rejected { hash: TxHash, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Insufficient funds: need {needed}, have {available}")]
	InsufficientFunds { needed: u64, available: u64 },

	#[error("Invalid send request: {0}")]
	InvalidRequest(String),

	#[error("Verification error: {0}")]
	Verification(#[from] VerificationError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
