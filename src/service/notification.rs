//! Rolling "coins received" summary.

use crate::config::COIN_DECIMALS;
use crate::service::types::CoinsReceivedNotification;
use crate::utils::format_coin_amount;
use crate::wallet::Address;

use itertools::Itertools;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingReceipts {
	pub count: usize,
	pub accumulated_amount: u64,
	/// Insertion ordered, without duplicates.
	pub senders: Vec<Address>,
}

/// Display parameters for rendering amounts.
#[derive(Debug, Clone)]
pub struct AmountFormat {
	pub precision: u32,
	/// Appended to every amount, e.g. a test network marker.
	pub suffix: String,
}

impl Default for AmountFormat {
	fn default() -> Self {
		Self {
			precision: COIN_DECIMALS,
			suffix: String::new(),
		}
	}
}

#[derive(Debug, Default)]
pub struct NotificationAggregator {
	pending: PendingReceipts,
	last_amount: u64,
}

impl NotificationAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Folds an incoming payment into the summary. Returns whether it was taken.
	///
	/// Non-positive amounts are ignored, as are transactions that are already
	/// in a block while the chain is replaying: those were notified before.
	pub fn on_incoming(
		&mut self,
		from: Option<&Address>,
		amount: i64,
		confidence_building: bool,
		replaying: bool,
	) -> bool {
		if amount <= 0 || (confidence_building && replaying) {
			return false;
		}
		let amount = amount.unsigned_abs();

		self.pending.count += 1;
		self.pending.accumulated_amount = self.pending.accumulated_amount.saturating_add(amount);
		self.last_amount = amount;
		if let Some(from) = from {
			if !self.pending.senders.contains(from) {
				self.pending.senders.push(from.clone());
			}
		}
		true
	}

	pub fn snapshot(&self) -> PendingReceipts {
		self.pending.clone()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.count == 0
	}

	pub fn clear(&mut self) {
		self.pending = PendingReceipts::default();
		self.last_amount = 0;
	}

	/// Renders the current summary; `None` when nothing is pending.
	pub fn render(&self, format: &AmountFormat) -> Option<CoinsReceivedNotification> {
		if self.is_empty() {
			return None;
		}

		let amount = |value: u64| {
			format!(
				"Received {} LTC{}",
				format_coin_amount(value, COIN_DECIMALS, format.precision),
				format.suffix
			)
		};

		let text = if self.pending.senders.is_empty() {
			"From unknown".to_string()
		} else {
			format!("From {}", self.pending.senders.iter().join(", "))
		};

		Some(CoinsReceivedNotification {
			ticker: amount(self.last_amount),
			title: amount(self.pending.accumulated_amount),
			text,
			number: if self.pending.count == 1 {
				0
			} else {
				self.pending.count
			},
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn addr(value: &str) -> Address {
		Address::from(value)
	}

	#[test]
	fn aggregates_counts_amounts_and_senders() {
		let mut notifications = NotificationAggregator::new();
		let a = addr("LdP8Qox1VAhCzLJNqrr74YovaWYyNBUWvL");
		let b = addr("LTpYZG19YmfvY2bBDYtCKpunVRw7nVgRHW");

		assert!(notifications.on_incoming(Some(&a), 100, false, false));
		assert!(notifications.on_incoming(Some(&a), 200, false, false));
		assert!(notifications.on_incoming(Some(&b), 50, false, false));

		assert_eq!(
			notifications.snapshot(),
			PendingReceipts {
				count: 3,
				accumulated_amount: 350,
				senders: vec![a, b],
			}
		);

		notifications.clear();
		assert_eq!(notifications.snapshot(), PendingReceipts::default());
		assert_eq!(notifications.render(&AmountFormat::default()), None);
	}

	#[test]
	fn ignores_outgoing_and_replayed_payments() {
		let mut notifications = NotificationAggregator::new();
		assert!(!notifications.on_incoming(None, 0, false, false));
		assert!(!notifications.on_incoming(None, -500, false, false));
		assert!(!notifications.on_incoming(None, 500, true, true));
		assert!(notifications.is_empty());

		// Pending during a replay, or building while in sync, still counts.
		assert!(notifications.on_incoming(None, 500, false, true));
		assert!(notifications.on_incoming(None, 500, true, false));
		assert_eq!(notifications.snapshot().count, 2);
	}

	#[test]
	fn renders_single_and_multiple_receipts() {
		let mut notifications = NotificationAggregator::new();
		let format = AmountFormat {
			precision: 4,
			suffix: " [testnet3]".to_string(),
		};

		notifications.on_incoming(None, 150_000_000, false, false);
		assert_eq!(
			notifications.render(&format),
			Some(CoinsReceivedNotification {
				ticker: "Received 1.50 LTC [testnet3]".to_string(),
				title: "Received 1.50 LTC [testnet3]".to_string(),
				text: "From unknown".to_string(),
				number: 0,
			})
		);

		notifications.on_incoming(Some(&addr("mzA")), 25_000_000, false, false);
		notifications.on_incoming(Some(&addr("mzB")), 1_230_000, false, false);
		assert_eq!(
			notifications.render(&format),
			Some(CoinsReceivedNotification {
				ticker: "Received 0.0123 LTC [testnet3]".to_string(),
				title: "Received 1.7623 LTC [testnet3]".to_string(),
				text: "From mzA, mzB".to_string(),
				number: 3,
			})
		);
	}
}
