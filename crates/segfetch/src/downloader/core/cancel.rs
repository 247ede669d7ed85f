//! Cooperative cancellation shared by every segment worker of a session

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a session was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Operator abort (Ctrl-C, SIGTERM, or a caller-owned token)
    Interrupted,
    /// Another segment reached terminal failure
    SegmentFailed { index: usize },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Interrupted => write!(f, "interrupted by user"),
            CancelCause::SegmentFailed { index } => {
                write!(f, "aborted after segment {} failed", index)
            }
        }
    }
}

/// One-shot cancellation broadcast with a recorded cause
///
/// Cloning is cheap; all clones observe the same signal. The first cause
/// recorded wins, later `cancel` calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns `true` if this call was the one that fired it.
    pub fn cancel(&self, cause: CancelCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded cause, if the signal has fired
    pub fn cause(&self) -> Option<CancelCause> {
        self.cause.get().copied()
    }

    /// Resolves once the signal fires
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The error a worker reports when it stops because of this signal
    pub fn error(&self) -> super::DownloadError {
        super::DownloadError::Cancelled {
            cause: self.cause().unwrap_or(CancelCause::Interrupted),
        }
    }

    /// Forward an external interrupt token into this signal
    ///
    /// The forwarding task ends as soon as either side fires.
    pub fn link_interrupt(&self, interrupt: CancellationToken) -> tokio::task::JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.cancelled() => {
                    signal.cancel(CancelCause::Interrupted);
                }
                _ = signal.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins() {
        let signal = CancelSignal::new();
        assert!(signal.cause().is_none());

        assert!(signal.cancel(CancelCause::SegmentFailed { index: 2 }));
        assert!(!signal.cancel(CancelCause::Interrupted));

        assert!(signal.is_cancelled());
        assert_eq!(signal.cause(), Some(CancelCause::SegmentFailed { index: 2 }));
    }

    #[test]
    fn clones_share_state() {
        let signal = CancelSignal::new();
        let observer = signal.clone();
        signal.cancel(CancelCause::Interrupted);
        assert!(observer.is_cancelled());
        assert_eq!(observer.cause(), Some(CancelCause::Interrupted));
    }

    #[tokio::test]
    async fn interrupt_token_is_forwarded() {
        let signal = CancelSignal::new();
        let interrupt = CancellationToken::new();
        let forwarder = signal.link_interrupt(interrupt.clone());

        interrupt.cancel();
        forwarder.await.unwrap();

        assert_eq!(signal.cause(), Some(CancelCause::Interrupted));
        assert!(matches!(
            signal.error(),
            super::super::DownloadError::Cancelled { cause: CancelCause::Interrupted }
        ));
    }
}
