//! Outgoing payments.
//!
//! Building and committing a transaction can block on wallet I/O, so both run
//! on the blocking pool. Commit only happens through [`PreparedSend::confirm`],
//! which consumes the prepared send: a transaction is committed at most once,
//! after the caller has confirmed it. A prepared send that is dropped or
//! rebuilt is cancelled in the wallet.

use crate::service::{SyncServiceError, SyncServiceHandle};
use crate::wallet::types::{SendRequest, Transaction, TxHash, VerificationError, Wallet, WalletError};

use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),

	#[error("Verification error: {0}")]
	Verification(#[from] VerificationError),

	#[error("Service error: {0}")]
	Service(#[from] SyncServiceError),

	#[error("Send worker failed: {0}")]
	Worker(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct TransactionSender {
	wallet: Arc<dyn Wallet>,
	service: SyncServiceHandle,
}

impl TransactionSender {
	pub fn new(wallet: Arc<dyn Wallet>, service: SyncServiceHandle) -> Self {
		Self { wallet, service }
	}

	/// Builds a transaction for `request` without committing it.
	pub async fn prepare(&self, request: SendRequest) -> Result<PreparedSend, SendError> {
		let wallet = self.wallet.clone();
		let tx = tokio::task::spawn_blocking(move || wallet.create_transaction(&request)).await??;

		Ok(PreparedSend {
			tx,
			wallet: self.wallet.clone(),
			service: self.service.clone(),
		})
	}
}

/// A built transaction waiting for confirmation.
#[must_use = "a prepared send does nothing until confirmed"]
pub struct PreparedSend {
	tx: Transaction,
	wallet: Arc<dyn Wallet>,
	service: SyncServiceHandle,
}

impl PreparedSend {
	pub fn transaction(&self) -> &Transaction {
		&self.tx
	}

	pub fn fee(&self) -> u64 {
		self.tx.fee
	}

	/// Rebuilds the transaction with a different fee. The previous build is
	/// cancelled before the new one is created.
	pub async fn with_fee(self, request: SendRequest) -> Result<PreparedSend, SendError> {
		info!(
			"rebuilding transaction {} with fee {} (was {})",
			self.tx.hash, request.fee, self.tx.fee
		);
		let sender = TransactionSender::new(self.wallet.clone(), self.service.clone());
		drop(self);
		sender.prepare(request).await
	}

	/// Commits the transaction to the wallet, then hands it to the service
	/// for broadcast.
	pub async fn confirm(self) -> Result<TxHash, SendError> {
		let wallet = self.wallet.clone();
		let tx = self.tx.clone();
		if let Err(e) = tokio::task::spawn_blocking(move || wallet.commit(&tx)).await? {
			warn!("transaction {} failed verification: {}", self.tx.hash, e);
			return Err(e.into());
		}

		let hash = self.tx.hash;
		self.service.broadcast_transaction(self.tx.clone()).await?;
		info!("transaction {} committed and queued for broadcast", hash);
		Ok(hash)
	}
}

impl Drop for PreparedSend {
	fn drop(&mut self) {
		// No-op once committed.
		if self.wallet.cancel_transaction(&self.tx.hash) {
			debug!("prepared transaction {} dropped unconfirmed", self.tx.hash);
		}
	}
}
