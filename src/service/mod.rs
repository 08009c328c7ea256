//! Blockchain sync service.
//!
//! - `environment`: folds device signals into connectivity/power/storage flags.
//! - `orchestrator`: owns chain store and peer session, reconciles them with the environment.
//! - `runner`: the serialized event loop and its handle.
//! - `throttle`, `idle`, `notification`, `broadcaster`, `resources`: the orchestrator's helpers.

pub mod broadcaster;
pub mod environment;
pub mod idle;
pub mod notification;
pub mod orchestrator;
pub mod resources;
pub mod runner;
pub mod throttle;
pub mod types;

pub use broadcaster::StatusBroadcaster;
pub use environment::{EnvironmentSignal, EnvironmentState, EnvironmentWatcher};
pub use idle::{IdleDetector, IdleState};
pub use notification::{AmountFormat, NotificationAggregator, PendingReceipts};
pub use orchestrator::{ServiceDeps, SyncOrchestrator};
pub use resources::{ProcessLock, ResourceGuard, SystemLock};
pub use runner::{SyncService, SyncServiceHandle};
pub use throttle::Debouncer;
pub use types::*;
