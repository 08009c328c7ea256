use itertools::Itertools;
use std::collections::VecDeque;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
	Active,
	/// No progress over the timeout window. Terminal for this run.
	Idle,
}

/// Watches per-tick download progress and reports when it has stalled.
#[derive(Debug)]
pub struct IdleDetector {
	history: VecDeque<i64>,
	capacity: usize,
	timeout_ticks: usize,
	last_height: u32,
	state: IdleState,
}

impl IdleDetector {
	pub fn new(capacity: usize, timeout_ticks: usize) -> Self {
		Self {
			history: VecDeque::with_capacity(capacity),
			capacity: capacity.max(1),
			timeout_ticks: timeout_ticks.max(1),
			last_height: 0,
			state: IdleState::Active,
		}
	}

	pub fn state(&self) -> IdleState {
		self.state
	}

	/// Per-tick deltas, most recent first.
	pub fn history(&self) -> Vec<i64> {
		self.history.iter().copied().collect()
	}

	/// Records the chain height seen at a tick. Returns `true` exactly once,
	/// on the tick that moves the detector to [`IdleState::Idle`].
	///
	/// Nothing is recorded while the previous height is still 0, so the first
	/// tick only establishes the baseline and a chain sitting at genesis never
	/// goes idle.
	pub fn on_tick(&mut self, height: u32) -> bool {
		let last = std::mem::replace(&mut self.last_height, height);
		if last == 0 || self.state == IdleState::Idle {
			return false;
		}

		self.history.push_front(i64::from(height) - i64::from(last));
		self.history.truncate(self.capacity);
		info!(
			"Number of blocks downloaded: {}",
			self.history.iter().join(",")
		);

		let stalled = self.history.len() >= self.timeout_ticks
			&& self
				.history
				.iter()
				.take(self.timeout_ticks)
				.all(|downloaded| *downloaded <= 0);
		if stalled {
			self.state = IdleState::Idle;
		}
		stalled
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn detector() -> IdleDetector {
		IdleDetector::new(10, 2)
	}

	#[test]
	fn two_ticks_without_progress_go_idle_once() {
		let mut idle = detector();
		assert!(!idle.on_tick(100));
		assert!(!idle.on_tick(100));
		assert!(idle.on_tick(100));
		assert_eq!(idle.history(), vec![0, 0]);
		assert_eq!(idle.state(), IdleState::Idle);

		assert!(!idle.on_tick(100));
		assert!(!idle.on_tick(100));
	}

	#[test]
	fn recent_progress_keeps_it_active() {
		let mut idle = detector();
		idle.on_tick(100);
		idle.on_tick(100);
		assert!(!idle.on_tick(105));
		assert_eq!(idle.history(), vec![5, 0]);

		assert!(!idle.on_tick(105));
		assert_eq!(idle.history(), vec![0, 5, 0]);
		assert_eq!(idle.state(), IdleState::Active);
	}

	#[test]
	fn a_shrinking_chain_counts_as_no_progress() {
		let mut idle = detector();
		idle.on_tick(50);
		idle.on_tick(49);
		assert!(idle.on_tick(49));
	}

	#[test]
	fn chain_at_genesis_never_goes_idle() {
		let mut idle = detector();
		for _ in 0..5 {
			assert!(!idle.on_tick(0));
		}
		assert!(idle.history().is_empty());

		assert!(!idle.on_tick(4));
		assert!(!idle.on_tick(4));
		assert!(idle.on_tick(4));
		assert_eq!(idle.history(), vec![0, 0]);
	}

	#[test]
	fn window_is_bounded() {
		let mut idle = detector();
		for height in 0..30 {
			idle.on_tick(height * 3);
		}
		assert_eq!(idle.history().len(), 10);
		assert_eq!(idle.state(), IdleState::Active);
	}
}
