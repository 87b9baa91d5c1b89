//! Cancellation utilities.
//!
//! A [`CancelHandle`] is threaded through every suspension point of a call:
//! the transport dispatch and the rate-limit cooldown. Cancellation is
//! cooperative; termination is guaranteed only where the handle is observed.

use tokio_util::sync::CancellationToken;

/// A clonable handle that can be used to request cancellation of a call.
///
/// Every call owns one handle for its whole lifetime, retries included. The
/// default handle is never cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new, not-yet-cancelled handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. The in-flight dispatch (if any) is abandoned and
    /// the engine refuses further retry transitions.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
