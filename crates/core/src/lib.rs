//! Client-side resilience for session-authenticated remote calls.
//!
//! `backstop` sits between application code and a remote data API reached
//! through a session provider. Calls issued through the [`Backstop`] facade
//! are gated by a soft concurrency cap, and every failure is observed and
//! swallowed to `None` instead of propagating. Classified session errors can
//! additionally drive a bounded refresh-or-logout recovery budget, either
//! explicitly through [`Backstop::handle_session_error`] or automatically
//! under [`RecoveryPolicy::RefreshAndRetry`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use backstop::{Backstop, SessionProvider};
//!
//! struct MyAuth;
//!
//! #[async_trait::async_trait]
//! impl SessionProvider for MyAuth {
//! 	fn is_session_error(&self, _error: &anyhow::Error) -> bool {
//! 		false
//! 	}
//!
//! 	async fn refresh_session(&self) -> anyhow::Result<bool> {
//! 		Ok(false)
//! 	}
//!
//! 	async fn logout(&self) -> anyhow::Result<()> {
//! 		Ok(())
//! 	}
//! }
//!
//! async fn list_parcels(backstop: &Backstop) -> Option<Vec<String>> {
//! 	backstop.run(|| async { Ok(vec![]) }).await
//! }
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod gate;
pub mod provider;
pub mod recovery;
pub mod wrapper;

pub use call::{CallOptions, FailureObserver};
pub use config::{DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_REFRESH_ATTEMPTS, DEFAULT_THROTTLE_DELAY_MS, Limits, RecoveryPolicy};
pub use error::{CallFailure, DeadlineExceeded, FailureKind};
pub use gate::{AdmissionGate, InFlightGuard};
pub use provider::{AuthState, SessionProvider};
pub use recovery::RecoveryCoordinator;
pub use wrapper::{Backstop, BackstopBuilder};
