//! Per-call options for wrapped operations.

use std::fmt;
use std::time::Duration;

use crate::error::CallFailure;

/// Observer invoked with the failure behind a `None` outcome.
pub type FailureObserver = Box<dyn FnMut(&CallFailure) + Send>;

/// Options applied to a single wrapped call.
#[derive(Default)]
pub struct CallOptions {
	pub(crate) observer: Option<FailureObserver>,
	pub(crate) timeout: Option<Duration>,
}

impl CallOptions {
	/// Options with no observer and no deadline override.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an observer for failures swallowed by the wrapper.
	///
	/// The observer can fire more than once for one call when the
	/// refresh-and-retry policy is active and the retry fails too.
	pub fn on_failure(mut self, observer: impl FnMut(&CallFailure) + Send + 'static) -> Self {
		self.observer = Some(Box::new(observer));
		self
	}

	/// Enforces a deadline for this call, overriding any configured default.
	pub fn with_timeout(mut self, deadline: Duration) -> Self {
		self.timeout = Some(deadline);
		self
	}
}

impl fmt::Debug for CallOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallOptions")
			.field("observer", &self.observer.is_some())
			.field("timeout", &self.timeout)
			.finish()
	}
}
