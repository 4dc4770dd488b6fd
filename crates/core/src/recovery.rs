//! Bounded session-recovery coordination.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::provider::{AuthState, SessionProvider};

/// Coordinates bounded session recovery for one authenticated session.
///
/// Scope one coordinator to the login/logout lifecycle and share it across
/// callers; independent coordinators would hold independent attempt budgets
/// for the same session.
pub struct RecoveryCoordinator {
	provider: Arc<dyn SessionProvider>,
	max_attempts: u32,
	state: Mutex<RecoveryState>,
}

struct RecoveryState {
	attempts: u32,
	auth_rx: Option<watch::Receiver<AuthState>>,
}

impl RecoveryCoordinator {
	/// Creates a coordinator over the given provider and attempt budget.
	///
	/// `auth_rx` is the optional auth-state signal; when wired, a fresh
	/// authentication publication resets the attempt budget.
	pub fn new(provider: Arc<dyn SessionProvider>, max_attempts: u32, auth_rx: Option<watch::Receiver<AuthState>>) -> Self {
		Self {
			provider,
			max_attempts,
			state: Mutex::new(RecoveryState { attempts: 0, auth_rx }),
		}
	}

	/// Runs one classify-and-refresh evaluation for `error`.
	///
	/// Returns `false` immediately, with no side effects, when the provider
	/// does not classify `error` as a session error. Returns `true` only when
	/// the provider reports a successful refresh. A failed refresh that
	/// exhausts the attempt budget forces logout; once exhausted, later
	/// session errors short-circuit without another refresh or logout.
	///
	/// Evaluations serialize: the state lock is held across the refresh call
	/// so concurrent failures consume the budget one at a time.
	pub async fn handle_session_error(&self, error: &anyhow::Error) -> bool {
		if !self.provider.is_session_error(error) {
			return false;
		}

		let mut state = self.state.lock().await;
		state.absorb_auth_signal();

		if state.attempts >= self.max_attempts {
			debug!(target = "backstop.recovery", attempts = state.attempts, "attempt budget exhausted; skipping refresh");
			return false;
		}

		state.attempts += 1;
		let attempt = state.attempts;
		debug!(target = "backstop.recovery", attempt, max_attempts = self.max_attempts, "attempting session refresh");

		let refreshed = match self.provider.refresh_session().await {
			Ok(refreshed) => refreshed,
			Err(err) => {
				warn!(target = "backstop.recovery", attempt, error = %err, "session refresh errored");
				false
			}
		};

		if refreshed {
			info!(target = "backstop.recovery", attempt, "session refreshed");
			return true;
		}

		if attempt >= self.max_attempts {
			warn!(target = "backstop.recovery", attempt, max_attempts = self.max_attempts, "refresh attempts exhausted; forcing logout");
			if let Err(err) = self.provider.logout().await {
				warn!(target = "backstop.recovery", error = %err, "logout reported an error");
			}
		}
		false
	}

	/// Clears the attempt budget, e.g. after an explicit re-login.
	pub async fn reset(&self) {
		let mut state = self.state.lock().await;
		if state.attempts != 0 {
			debug!(target = "backstop.recovery", attempts = state.attempts, "attempt budget reset");
			state.attempts = 0;
		}
	}

	/// Attempts consumed since the last fresh authentication.
	pub async fn attempts_used(&self) -> u32 {
		self.state.lock().await.attempts
	}

	/// True when the attempt budget is fully consumed.
	pub async fn is_exhausted(&self) -> bool {
		self.state.lock().await.attempts >= self.max_attempts
	}
}

impl RecoveryState {
	/// Applies a pending auth publication, resetting the budget on fresh
	/// authentication. Re-publishing the same signed-in user counts: the
	/// channel versions every send, so an explicit re-login is never missed.
	fn absorb_auth_signal(&mut self) {
		let Some(rx) = self.auth_rx.as_mut() else {
			return;
		};
		if !rx.has_changed().unwrap_or(false) {
			return;
		}
		let auth = rx.borrow_and_update().clone();
		if auth.is_fresh() && self.attempts != 0 {
			info!(target = "backstop.recovery", user = ?auth.user, "fresh authentication; attempt budget reset");
			self.attempts = 0;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;
	use std::sync::Mutex as StdMutex;
	use std::sync::atomic::{AtomicU32, Ordering};

	use anyhow::anyhow;

	use super::*;

	#[derive(Debug, thiserror::Error)]
	#[error("session invalidated")]
	struct SessionInvalid;

	struct ScriptedProvider {
		refresh_outcomes: StdMutex<VecDeque<anyhow::Result<bool>>>,
		refresh_calls: AtomicU32,
		logout_calls: AtomicU32,
		fail_logout: bool,
	}

	impl ScriptedProvider {
		fn new(outcomes: Vec<anyhow::Result<bool>>) -> Arc<Self> {
			Arc::new(Self {
				refresh_outcomes: StdMutex::new(outcomes.into()),
				refresh_calls: AtomicU32::new(0),
				logout_calls: AtomicU32::new(0),
				fail_logout: false,
			})
		}

		fn failing_logout(outcomes: Vec<anyhow::Result<bool>>) -> Arc<Self> {
			Arc::new(Self {
				refresh_outcomes: StdMutex::new(outcomes.into()),
				refresh_calls: AtomicU32::new(0),
				logout_calls: AtomicU32::new(0),
				fail_logout: true,
			})
		}

		fn refresh_calls(&self) -> u32 {
			self.refresh_calls.load(Ordering::SeqCst)
		}

		fn logout_calls(&self) -> u32 {
			self.logout_calls.load(Ordering::SeqCst)
		}
	}

	#[async_trait::async_trait]
	impl SessionProvider for ScriptedProvider {
		fn is_session_error(&self, error: &anyhow::Error) -> bool {
			error.downcast_ref::<SessionInvalid>().is_some()
		}

		async fn refresh_session(&self) -> anyhow::Result<bool> {
			self.refresh_calls.fetch_add(1, Ordering::SeqCst);
			self.refresh_outcomes.lock().unwrap().pop_front().unwrap_or(Ok(false))
		}

		async fn logout(&self) -> anyhow::Result<()> {
			self.logout_calls.fetch_add(1, Ordering::SeqCst);
			if self.fail_logout {
				return Err(anyhow!("logout endpoint unreachable"));
			}
			Ok(())
		}
	}

	fn session_error() -> anyhow::Error {
		anyhow::Error::new(SessionInvalid)
	}

	fn coordinator(provider: Arc<ScriptedProvider>, max_attempts: u32) -> RecoveryCoordinator {
		RecoveryCoordinator::new(provider, max_attempts, None)
	}

	#[tokio::test]
	async fn unclassified_errors_are_ignored() {
		let provider = ScriptedProvider::new(vec![]);
		let coord = coordinator(provider.clone(), 2);
		assert!(!coord.handle_session_error(&anyhow!("NetworkDown")).await);
		assert_eq!(provider.refresh_calls(), 0);
		assert_eq!(provider.logout_calls(), 0);
		assert_eq!(coord.attempts_used().await, 0);
	}

	#[tokio::test]
	async fn successful_refresh_reports_recovered() {
		let provider = ScriptedProvider::new(vec![Ok(true)]);
		let coord = coordinator(provider.clone(), 2);
		assert!(coord.handle_session_error(&session_error()).await);
		assert_eq!(coord.attempts_used().await, 1);
		assert_eq!(provider.logout_calls(), 0);
	}

	#[tokio::test]
	async fn failed_refresh_below_budget_stays_available() {
		let provider = ScriptedProvider::new(vec![Ok(false), Ok(true)]);
		let coord = coordinator(provider.clone(), 2);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 0);
		assert!(coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.refresh_calls(), 2);
	}

	#[tokio::test]
	async fn exhausting_the_budget_forces_logout_once() {
		let provider = ScriptedProvider::new(vec![Ok(false), Ok(false)]);
		let coord = coordinator(provider.clone(), 2);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 0);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 1);
		// A third error short-circuits: no extra refresh, no second logout.
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.refresh_calls(), 2);
		assert_eq!(provider.logout_calls(), 1);
		assert!(coord.is_exhausted().await);
	}

	#[tokio::test]
	async fn refresh_error_counts_as_failed_attempt() {
		let provider = ScriptedProvider::new(vec![Err(anyhow!("refresh endpoint unreachable")), Err(anyhow!("refresh endpoint unreachable"))]);
		let coord = coordinator(provider.clone(), 2);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 1);
	}

	#[tokio::test]
	async fn logout_error_is_swallowed() {
		let provider = ScriptedProvider::failing_logout(vec![Ok(false)]);
		let coord = coordinator(provider.clone(), 1);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 1);
	}

	#[tokio::test]
	async fn fresh_auth_signal_resets_the_budget() {
		let (auth_tx, auth_rx) = watch::channel(AuthState::signed_out());
		let provider = ScriptedProvider::new(vec![Ok(false), Ok(false), Ok(false)]);
		let coord = RecoveryCoordinator::new(provider.clone(), 2, Some(auth_rx));
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(coord.attempts_used().await, 1);

		auth_tx.send(AuthState::signed_in("user-7")).unwrap();
		assert!(!coord.handle_session_error(&session_error()).await);
		// Counting restarted at 1 after the signal, so the budget survives.
		assert_eq!(coord.attempts_used().await, 1);
		assert_eq!(provider.logout_calls(), 0);
	}

	#[tokio::test]
	async fn republishing_the_same_user_also_resets() {
		let (auth_tx, auth_rx) = watch::channel(AuthState::signed_in("user-7"));
		let provider = ScriptedProvider::new(vec![Ok(false), Ok(false)]);
		let coord = RecoveryCoordinator::new(provider.clone(), 2, Some(auth_rx));
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(coord.attempts_used().await, 1);

		// An explicit re-login can republish a snapshot identical to the
		// current one; the send is versioned, so it resets all the same.
		auth_tx.send(AuthState::signed_in("user-7")).unwrap();
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(coord.attempts_used().await, 1);
		assert_eq!(provider.refresh_calls(), 2);
		assert_eq!(provider.logout_calls(), 0);
	}

	#[tokio::test]
	async fn signed_out_signal_does_not_reset() {
		let (auth_tx, auth_rx) = watch::channel(AuthState::signed_in("user-7"));
		let provider = ScriptedProvider::new(vec![Ok(false)]);
		let coord = RecoveryCoordinator::new(provider.clone(), 1, Some(auth_rx));
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.logout_calls(), 1);

		auth_tx.send(AuthState::signed_out()).unwrap();
		assert!(!coord.handle_session_error(&session_error()).await);
		assert_eq!(provider.refresh_calls(), 1);
		assert_eq!(provider.logout_calls(), 1);
	}

	#[tokio::test]
	async fn explicit_reset_reopens_the_budget() {
		let provider = ScriptedProvider::new(vec![Ok(false), Ok(true)]);
		let coord = coordinator(provider.clone(), 1);
		assert!(!coord.handle_session_error(&session_error()).await);
		assert!(coord.is_exhausted().await);

		coord.reset().await;
		assert_eq!(coord.attempts_used().await, 0);
		assert!(coord.handle_session_error(&session_error()).await);
	}
}
