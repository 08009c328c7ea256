//! Exclusive OS-level resources held while syncing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A non reference counted lock such as a CPU wake lock.
pub trait SystemLock: Send + Sync {
	fn name(&self) -> &str;
	fn acquire(&self);
	fn release(&self);
	fn is_held(&self) -> bool;
}

/// In-process lock that only tracks whether it is held.
#[derive(Debug)]
pub struct ProcessLock {
	name: String,
	held: AtomicBool,
}

impl ProcessLock {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			held: AtomicBool::new(false),
		}
	}
}

impl SystemLock for ProcessLock {
	fn name(&self) -> &str {
		&self.name
	}

	fn acquire(&self) {
		self.held.store(true, Ordering::SeqCst);
	}

	fn release(&self) {
		self.held.store(false, Ordering::SeqCst);
	}

	fn is_held(&self) -> bool {
		self.held.load(Ordering::SeqCst)
	}
}

/// Pairs the wake lock with the network keep-alive lock. Acquire and release
/// are no-ops when the lock is already in the requested state.
pub struct ResourceGuard {
	wake_lock: Arc<dyn SystemLock>,
	keep_alive: Arc<dyn SystemLock>,
}

impl ResourceGuard {
	pub fn new(wake_lock: Arc<dyn SystemLock>, keep_alive: Arc<dyn SystemLock>) -> Self {
		Self {
			wake_lock,
			keep_alive,
		}
	}

	/// Guard over two in-process locks named after `owner`.
	pub fn in_process(owner: &str) -> Self {
		let name = format!("{} blockchain sync", owner);
		Self::new(
			Arc::new(ProcessLock::new(format!("{} (wake)", name))),
			Arc::new(ProcessLock::new(format!("{} (keep-alive)", name))),
		)
	}

	pub fn acquire_wake_lock(&self) {
		if !self.wake_lock.is_held() {
			debug!("acquiring {}", self.wake_lock.name());
			self.wake_lock.acquire();
		}
	}

	pub fn release_wake_lock(&self) {
		if self.wake_lock.is_held() {
			debug!("releasing {}", self.wake_lock.name());
			self.wake_lock.release();
		}
	}

	pub fn hold_keep_alive(&self) {
		if !self.keep_alive.is_held() {
			debug!("acquiring {}", self.keep_alive.name());
			self.keep_alive.acquire();
		}
	}

	pub fn release_keep_alive(&self) {
		if self.keep_alive.is_held() {
			debug!("releasing {}", self.keep_alive.name());
			self.keep_alive.release();
		}
	}

	pub fn wake_lock_held(&self) -> bool {
		self.wake_lock.is_held()
	}

	pub fn keep_alive_held(&self) -> bool {
		self.keep_alive.is_held()
	}

	/// Releases whatever is still held.
	pub fn release_all(&self) {
		if self.wake_lock.is_held() {
			debug!("{} still held, releasing", self.wake_lock.name());
			self.wake_lock.release();
		}
		if self.keep_alive.is_held() {
			debug!("{} still held, releasing", self.keep_alive.name());
			self.keep_alive.release();
		}
	}
}
