//! Single-slot runner for collaborator requests.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Identifies one collaborator request.
///
/// Replies carry the ticket they were issued for so that a reducer can
/// recognise answers to requests it no longer waits on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("#{}", _0)]
pub struct Ticket(u64);

impl Ticket {
    /// Creates a ticket from a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Why a collaborator did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum CollaboratorError {
    /// No answer arrived within the configured limit.
    #[display("No reply within {:?}", after)]
    TimedOut {
        /// The limit that elapsed.
        after: Duration,
    },
    /// The call itself failed (transport, API error).
    #[display("Collaborator failed: {}", _0)]
    Failed(String),
    /// An answer arrived but could not be used.
    #[display("Malformed reply: {}", _0)]
    Malformed(String),
    /// The request was abandoned before completing.
    #[display("Request cancelled")]
    Cancelled,
}

impl std::error::Error for CollaboratorError {}

/// A finished request: its ticket and outcome.
pub type Reply<T> = (Ticket, Result<T, CollaboratorError>);

/// Runs at most one collaborator request at a time on the tokio runtime.
///
/// Each request is bounded by a timeout and can be aborted with
/// [`InFlight::cancel`]. Completed requests are collected with
/// [`InFlight::recv`], which is cancel safe and can sit in a `select!`.
#[derive(Debug)]
pub struct InFlight<T> {
    timeout: Duration,
    slot: Option<(Ticket, JoinHandle<()>)>,
    tx: mpsc::UnboundedSender<Reply<T>>,
    rx: mpsc::UnboundedReceiver<Reply<T>>,
}

impl<T: Send + 'static> InFlight<T> {
    /// Creates an idle runner whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            timeout,
            slot: None,
            tx,
            rx,
        }
    }

    /// Whether a request has been launched and its reply not yet collected.
    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    /// Ticket of the outstanding request, if any.
    pub fn pending(&self) -> Option<Ticket> {
        self.slot.as_ref().map(|(ticket, _)| *ticket)
    }

    /// Spawns `request` under the runner's timeout.
    ///
    /// Refuses with the outstanding ticket when a request is already in
    /// flight; the new request is dropped without being polled.
    #[instrument(skip(self, request), fields(timeout = ?self.timeout))]
    pub fn launch<F>(&mut self, ticket: Ticket, request: F) -> Result<(), Ticket>
    where
        F: Future<Output = Result<T, CollaboratorError>> + Send + 'static,
    {
        if let Some(busy) = self.pending() {
            warn!(%busy, "Request already in flight");
            return Err(busy);
        }

        let tx = self.tx.clone();
        let limit = self.timeout;
        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%ticket, ?limit, "Collaborator timed out");
                    Err(CollaboratorError::TimedOut { after: limit })
                }
            };
            // The receiver only goes away with the runner itself.
            let _ = tx.send((ticket, result));
        });

        debug!(%ticket, "Request launched");
        self.slot = Some((ticket, handle));
        Ok(())
    }

    /// Aborts the outstanding request and discards any reply it already sent.
    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> Option<Ticket> {
        let (ticket, handle) = self.slot.take()?;
        handle.abort();
        while self.rx.try_recv().is_ok() {}
        debug!(%ticket, "Request cancelled");
        Some(ticket)
    }

    /// Waits for the outstanding request to finish.
    ///
    /// Pends forever while idle. Replies to cancelled requests are skipped.
    pub async fn recv(&mut self) -> Reply<T> {
        loop {
            let Some((ticket, result)) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            if self.pending() == Some(ticket) {
                self.slot = None;
                return (ticket, result);
            }
            debug!(%ticket, "Discarding reply to abandoned request");
        }
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.slot.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_is_delivered() {
        let mut inflight = InFlight::new(Duration::from_secs(1));
        inflight.launch(Ticket::new(1), async { Ok(7u8) }).unwrap();
        assert!(inflight.is_busy());

        let (ticket, result) = inflight.recv().await;
        assert_eq!(ticket, Ticket::new(1));
        assert_eq!(result, Ok(7));
        assert!(!inflight.is_busy());
    }

    #[tokio::test]
    async fn test_second_launch_refused() {
        let mut inflight = InFlight::<u8>::new(Duration::from_secs(1));
        inflight
            .launch(Ticket::new(1), std::future::pending())
            .unwrap();
        assert_eq!(
            inflight.launch(Ticket::new(2), async { Ok(1) }),
            Err(Ticket::new(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_as_failure() {
        let mut inflight = InFlight::<u8>::new(Duration::from_secs(5));
        inflight
            .launch(Ticket::new(3), std::future::pending())
            .unwrap();

        let (ticket, result) = inflight.recv().await;
        assert_eq!(ticket, Ticket::new(3));
        assert_eq!(
            result,
            Err(CollaboratorError::TimedOut {
                after: Duration::from_secs(5)
            })
        );
        assert!(!inflight.is_busy());
    }

    #[tokio::test]
    async fn test_cancel_frees_slot() {
        let mut inflight = InFlight::<u8>::new(Duration::from_secs(1));
        inflight
            .launch(Ticket::new(1), std::future::pending())
            .unwrap();
        assert_eq!(inflight.cancel(), Some(Ticket::new(1)));
        assert!(!inflight.is_busy());

        inflight.launch(Ticket::new(2), async { Ok(9) }).unwrap();
        assert_eq!(inflight.recv().await, (Ticket::new(2), Ok(9)));
    }
}
