//! Failure taxonomy reported to call observers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	/// The session behind the call is no longer valid.
	Session,
	/// The call outlived its enforced deadline.
	Timeout,
	/// Anything else: network faults, server errors, unclassified failures.
	Other,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			FailureKind::Session => "session",
			FailureKind::Timeout => "timeout",
			FailureKind::Other => "other",
		};
		f.write_str(label)
	}
}

/// Error injected when an enforced deadline elapses before the operation settles.
///
/// Only the wait is abandoned; the operation itself keeps running detached.
#[derive(Debug, Error)]
#[error("operation did not settle within {}ms", .deadline.as_millis())]
pub struct DeadlineExceeded {
	/// The deadline that elapsed.
	pub deadline: Duration,
}

/// Failure handed to the per-call observer in place of a raised error.
#[derive(Debug, Error)]
#[error("{kind}: {error:#}")]
pub struct CallFailure {
	/// Classification of the failure.
	pub kind: FailureKind,
	/// The underlying error, unmodified.
	pub error: anyhow::Error,
}

impl CallFailure {
	/// True when the failure was classified as a session error.
	pub fn is_session(&self) -> bool {
		self.kind == FailureKind::Session
	}

	/// True when the failure was an enforced deadline elapsing.
	pub fn is_timeout(&self) -> bool {
		self.kind == FailureKind::Timeout
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deadline_display_names_the_budget() {
		let err = DeadlineExceeded {
			deadline: Duration::from_millis(250),
		};
		assert_eq!(err.to_string(), "operation did not settle within 250ms");
	}

	#[test]
	fn call_failure_display_prefixes_the_kind() {
		let failure = CallFailure {
			kind: FailureKind::Other,
			error: anyhow::anyhow!("connection reset"),
		};
		assert_eq!(failure.to_string(), "other: connection reset");
		assert!(!failure.is_session());
		assert!(!failure.is_timeout());
	}

	#[test]
	fn kind_labels_are_stable() {
		assert_eq!(FailureKind::Session.to_string(), "session");
		assert_eq!(FailureKind::Timeout.to_string(), "timeout");
		assert_eq!(FailureKind::Other.to_string(), "other");
	}
}
