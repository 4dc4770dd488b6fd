//! Contracts for the surrounding session and auth stack.

use async_trait::async_trait;

/// Snapshot of the surrounding application's authentication state.
///
/// Published through a `tokio::sync::watch` channel wired via
/// [`crate::BackstopBuilder::auth_watch`]. The recovery coordinator treats an
/// authenticated snapshot with a present user as fresh authentication and
/// replenishes its attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
	/// Whether the application currently holds a live session.
	pub authenticated: bool,
	/// Opaque reference to the signed-in user, if any.
	pub user: Option<String>,
}

impl AuthState {
	/// Snapshot for a signed-in user.
	pub fn signed_in(user: impl Into<String>) -> Self {
		Self {
			authenticated: true,
			user: Some(user.into()),
		}
	}

	/// Snapshot for the signed-out state.
	pub fn signed_out() -> Self {
		Self::default()
	}

	/// True for a live session with a known user.
	pub fn is_fresh(&self) -> bool {
		self.authenticated && self.user.is_some()
	}
}

/// Session collaborator driven by the resilience layer.
///
/// Implementations adapt whatever auth stack the application uses; the layer
/// consumes all three operations as a black box. Classification must stay
/// pure, and [`SessionProvider::logout`] must be idempotent.
#[async_trait]
pub trait SessionProvider: Send + Sync {
	/// Decides whether `error` means the session is no longer valid.
	///
	/// Implementations usually `downcast_ref` to their transport's error
	/// types. Must not block and must not have side effects.
	fn is_session_error(&self, error: &anyhow::Error) -> bool;

	/// Attempts to renew the current session.
	///
	/// `Ok(false)` reports an ordinary refresh failure; an `Err` reports an
	/// infrastructure fault. The recovery coordinator treats both as a failed
	/// attempt.
	async fn refresh_session(&self) -> anyhow::Result<bool>;

	/// Terminates the authenticated session.
	async fn logout(&self) -> anyhow::Result<()>;
}
