use std::time::Duration;
use tokio::time::Instant;

/// Schedule-or-replace debounce.
///
/// At most one emission per interval. Scheduling while an emission is already
/// pending keeps the pending deadline; the emission carries whatever state is
/// current when it fires.
#[derive(Debug)]
pub struct Debouncer {
	interval: Duration,
	last_fired: Option<Instant>,
	deadline: Option<Instant>,
}

impl Debouncer {
	pub fn new(interval: Duration) -> Self {
		Self {
			interval,
			last_fired: None,
			deadline: None,
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	pub fn is_pending(&self) -> bool {
		self.deadline.is_some()
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Requests an emission.
	pub fn schedule(&mut self, now: Instant) {
		if self.deadline.is_some() {
			return;
		}
		let deadline = match self.last_fired {
			Some(last) if now.saturating_duration_since(last) < self.interval => last + self.interval,
			_ => now,
		};
		self.deadline = Some(deadline);
	}

	/// Returns `true` when the pending emission is due, marking it fired.
	pub fn poll_due(&mut self, now: Instant) -> bool {
		match self.deadline {
			Some(deadline) if deadline <= now => {
				self.deadline = None;
				self.last_fired = Some(now);
				true
			}
			_ => false,
		}
	}

	/// Records an emission made outside the debounce, such as an immediate
	/// broadcast after an environment change.
	pub fn record_fire(&mut self, now: Instant) {
		self.last_fired = Some(now);
	}

	pub fn cancel(&mut self) {
		self.deadline = None;
	}
}
