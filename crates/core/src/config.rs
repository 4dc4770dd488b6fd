//! Tunable limits and failure-handling policy for wrapped calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default soft cap on concurrently admitted calls.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;
/// Default flat delay applied once when the soft cap is hit, in milliseconds.
pub const DEFAULT_THROTTLE_DELAY_MS: u64 = 1_000;
/// Default session-refresh attempt budget per authenticated session.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 2;
/// Advisory per-call deadline in milliseconds. Deadlines are enforced only
/// when selected through [`Limits::call_timeout_ms`] or a per-call override.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// What the wrapper does with a failed call after the observer has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryPolicy {
	/// Report the failure and return `None`. Never refreshes, never retries.
	#[default]
	Observe,
	/// On a classified session error, consult the recovery coordinator and
	/// retry the operation once if the session was refreshed.
	RefreshAndRetry,
}

/// Limits shared by every call issued through one wrapper instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
	/// Soft cap on concurrently executing calls.
	pub max_in_flight: usize,
	/// Flat delay applied to a call admitted while the cap is hit.
	pub throttle_delay_ms: u64,
	/// Session-refresh attempts allowed before logout is forced.
	pub max_refresh_attempts: u32,
	/// Enforced per-call deadline. `None` leaves operations unbounded.
	pub call_timeout_ms: Option<u64>,
	/// Failure handling applied by the wrapper.
	pub policy: RecoveryPolicy,
}

impl Default for Limits {
	fn default() -> Self {
		Self {
			max_in_flight: DEFAULT_MAX_IN_FLIGHT,
			throttle_delay_ms: DEFAULT_THROTTLE_DELAY_MS,
			max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
			call_timeout_ms: None,
			policy: RecoveryPolicy::default(),
		}
	}
}

impl Limits {
	/// Sets the soft concurrency cap.
	pub fn with_max_in_flight(mut self, max: usize) -> Self {
		self.max_in_flight = max;
		self
	}

	/// Sets the throttle delay in milliseconds.
	pub fn with_throttle_delay_ms(mut self, delay_ms: u64) -> Self {
		self.throttle_delay_ms = delay_ms;
		self
	}

	/// Sets the session-refresh attempt budget.
	pub fn with_max_refresh_attempts(mut self, attempts: u32) -> Self {
		self.max_refresh_attempts = attempts;
		self
	}

	/// Enforces a deadline, in milliseconds, on every call.
	pub fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.call_timeout_ms = Some(timeout_ms);
		self
	}

	/// Sets the failure-handling policy.
	pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
		self.policy = policy;
		self
	}

	/// Throttle delay as a [`Duration`].
	pub fn throttle_delay(&self) -> Duration {
		Duration::from_millis(self.throttle_delay_ms)
	}

	/// Enforced per-call deadline, when configured.
	pub fn call_timeout(&self) -> Option<Duration> {
		self.call_timeout_ms.map(Duration::from_millis)
	}
}
