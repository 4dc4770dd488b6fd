//! Soft admission gate bounding how many wrapped calls run at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

/// Process-wide counter gating wrapped calls with a cooperative delay.
///
/// The cap is advisory: a caller that finds the gate full waits one flat
/// delay and then proceeds regardless of the counter, so bursts are smoothed
/// rather than queued. Callers that need a hard limit want a semaphore, not
/// this gate.
#[derive(Debug)]
pub struct AdmissionGate {
	active: AtomicUsize,
	max_in_flight: usize,
	throttle_delay: Duration,
}

impl AdmissionGate {
	/// Creates a gate with the given soft cap and throttle delay.
	pub fn new(max_in_flight: usize, throttle_delay: Duration) -> Self {
		Self {
			active: AtomicUsize::new(0),
			max_in_flight,
			throttle_delay,
		}
	}

	/// Number of calls currently admitted.
	pub fn active(&self) -> usize {
		self.active.load(Ordering::Relaxed)
	}

	/// Admits one call, delaying once when the gate is at or over its cap.
	///
	/// The check and the increment are deliberately separate steps: every
	/// caller that saw a full gate proceeds after the same flat delay, so the
	/// count can transiently overshoot `max_in_flight`. Dropping the returned
	/// guard releases the slot; abandoning the future mid-delay leaves the
	/// counter untouched.
	pub async fn admit(self: &Arc<Self>) -> InFlightGuard {
		let active = self.active.load(Ordering::Relaxed);
		if active >= self.max_in_flight {
			debug!(target = "backstop.gate", active, max = self.max_in_flight, delay = ?self.throttle_delay, "gate full; delaying admission");
			tokio::time::sleep(self.throttle_delay).await;
		}
		self.active.fetch_add(1, Ordering::Relaxed);
		InFlightGuard { gate: Arc::clone(self) }
	}
}

/// Scoped admission slot. Dropping it releases the gate exactly once.
#[derive(Debug)]
pub struct InFlightGuard {
	gate: Arc<AdmissionGate>,
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		self.gate.active.fetch_sub(1, Ordering::Relaxed);
	}
}
