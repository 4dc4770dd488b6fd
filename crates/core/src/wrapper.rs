//! Resilient call facade composing admission control and session recovery.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::call::CallOptions;
use crate::config::{Limits, RecoveryPolicy};
use crate::error::{CallFailure, DeadlineExceeded, FailureKind};
use crate::gate::AdmissionGate;
use crate::provider::{AuthState, SessionProvider};
use crate::recovery::RecoveryCoordinator;

/// Entry point for wrapped remote calls.
///
/// Clones share one admission gate and one recovery coordinator, so the
/// concurrency cap and the attempt budget stay process-wide. Scope one
/// `Backstop` to an authenticated session and hand clones to every call
/// site.
#[derive(Clone)]
pub struct Backstop {
	provider: Arc<dyn SessionProvider>,
	gate: Arc<AdmissionGate>,
	recovery: Arc<RecoveryCoordinator>,
	limits: Limits,
}

/// Builder for [`Backstop`].
pub struct BackstopBuilder {
	provider: Arc<dyn SessionProvider>,
	limits: Limits,
	auth_rx: Option<watch::Receiver<AuthState>>,
}

impl BackstopBuilder {
	/// Replaces the default limits.
	pub fn limits(mut self, limits: Limits) -> Self {
		self.limits = limits;
		self
	}

	/// Wires the auth-state signal used to reset the recovery budget.
	pub fn auth_watch(mut self, auth_rx: watch::Receiver<AuthState>) -> Self {
		self.auth_rx = Some(auth_rx);
		self
	}

	/// Builds the facade.
	pub fn build(self) -> Backstop {
		let gate = Arc::new(AdmissionGate::new(self.limits.max_in_flight, self.limits.throttle_delay()));
		let recovery = Arc::new(RecoveryCoordinator::new(self.provider.clone(), self.limits.max_refresh_attempts, self.auth_rx));
		Backstop {
			provider: self.provider,
			gate,
			recovery,
			limits: self.limits,
		}
	}
}

impl Backstop {
	/// Starts a builder over the given session provider.
	pub fn builder(provider: Arc<dyn SessionProvider>) -> BackstopBuilder {
		BackstopBuilder {
			provider,
			limits: Limits::default(),
			auth_rx: None,
		}
	}

	/// Facade with default limits over the given session provider.
	pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
		Self::builder(provider).build()
	}

	/// Runs `operation` behind the gate, swallowing any failure to `None`.
	pub async fn run<T, F, Fut>(&self, operation: F) -> Option<T>
	where
		T: Send + 'static,
		F: FnMut() -> Fut,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		self.run_with(CallOptions::new(), operation).await
	}

	/// Runs `operation` with per-call options.
	///
	/// The caller always gets `Some(value)` or `None`; failures reach the
	/// observer and the log, never the return path. The admission slot is
	/// released on every exit, and under [`RecoveryPolicy::RefreshAndRetry`]
	/// a classified session error can trigger one refresh-and-retry cycle
	/// before the call settles.
	pub async fn run_with<T, F, Fut>(&self, options: CallOptions, mut operation: F) -> Option<T>
	where
		T: Send + 'static,
		F: FnMut() -> Fut,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let CallOptions { mut observer, timeout } = options;
		let deadline = timeout.or_else(|| self.limits.call_timeout());
		let _in_flight = self.gate.admit().await;

		let error = match self.execute(&mut operation, deadline).await {
			Ok(value) => return Some(value),
			Err(error) => error,
		};
		let failure = CallFailure {
			kind: self.classify(&error),
			error,
		};
		debug!(target = "backstop.call", kind = %failure.kind, error = %failure.error, "call failed");
		if let Some(observer) = observer.as_mut() {
			observer(&failure);
		}

		if self.limits.policy == RecoveryPolicy::RefreshAndRetry && failure.is_session() && self.recovery.handle_session_error(&failure.error).await {
			debug!(target = "backstop.call", "session refreshed; retrying once");
			match self.execute(&mut operation, deadline).await {
				Ok(value) => return Some(value),
				Err(error) => {
					let failure = CallFailure {
						kind: self.classify(&error),
						error,
					};
					debug!(target = "backstop.call", kind = %failure.kind, error = %failure.error, "retry failed");
					if let Some(observer) = observer.as_mut() {
						observer(&failure);
					}
				}
			}
		}
		None
	}

	/// Explicit classify-and-recover entry for callers handling errors themselves.
	pub async fn handle_session_error(&self, error: &anyhow::Error) -> bool {
		self.recovery.handle_session_error(error).await
	}

	/// Clears the recovery attempt budget.
	pub async fn reset_recovery(&self) {
		self.recovery.reset().await;
	}

	/// Recovery attempts consumed since the last fresh authentication.
	pub async fn recovery_attempts(&self) -> u32 {
		self.recovery.attempts_used().await
	}

	/// True when the recovery attempt budget is fully consumed.
	pub async fn recovery_exhausted(&self) -> bool {
		self.recovery.is_exhausted().await
	}

	/// Number of calls currently past the admission gate.
	pub fn in_flight(&self) -> usize {
		self.gate.active()
	}

	fn classify(&self, error: &anyhow::Error) -> FailureKind {
		if error.downcast_ref::<DeadlineExceeded>().is_some() {
			FailureKind::Timeout
		} else if self.provider.is_session_error(error) {
			FailureKind::Session
		} else {
			FailureKind::Other
		}
	}

	/// Awaits the operation, racing it against `deadline` when one is set.
	///
	/// The deadline abandons the wait, it does not cancel: the operation is
	/// spawned, and on expiry it keeps running detached while a reaper task
	/// records how it eventually settled.
	async fn execute<T, F, Fut>(&self, operation: &mut F, deadline: Option<Duration>) -> anyhow::Result<T>
	where
		T: Send + 'static,
		F: FnMut() -> Fut,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let Some(deadline) = deadline else {
			return operation().await;
		};

		let mut task = tokio::spawn(operation());
		match tokio::time::timeout(deadline, &mut task).await {
			Ok(Ok(result)) => result,
			Ok(Err(join_error)) => Err(anyhow::Error::new(join_error)),
			Err(_) => {
				reap_detached(task);
				Err(anyhow::Error::new(DeadlineExceeded { deadline }))
			}
		}
	}
}

/// Logs how an operation abandoned at its deadline eventually settled.
fn reap_detached<T: Send + 'static>(task: JoinHandle<anyhow::Result<T>>) {
	tokio::spawn(async move {
		match task.await {
			Ok(Ok(_)) => debug!(target = "backstop.call", "detached call settled after its deadline"),
			Ok(Err(error)) => debug!(target = "backstop.call", error = %error, "detached call failed after its deadline"),
			Err(join_error) => warn!(target = "backstop.call", error = %join_error, "detached call panicked"),
		}
	});
}
