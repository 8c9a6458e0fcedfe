//! Unbuffered single-writer/single-reader handoff points.
//!
//! A handoff only completes when both ends meet: [`HandoffSender::send`]
//! returns once the reader has taken the value, so a slow reader stalls
//! its writer. This is the only back-pressure between steps.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The other end of the handoff point is gone.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handoff point closed")]
pub struct HandoffClosed;

struct Offer<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Writing end of a handoff point.
#[derive(Debug)]
pub struct HandoffSender<T> {
    offers: mpsc::Sender<Offer<T>>,
}

/// Reading end of a handoff point.
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    offers: mpsc::Receiver<Offer<T>>,
}

/// Creates a handoff point and returns its two ends.
///
/// # Examples
///
/// ```
/// # #[tokio::main]
/// # async fn main() {
/// let (tx, mut rx) = nagare::handoff::<&str>();
///
/// let writer = tokio::spawn(async move { tx.send("hello").await });
///
/// assert_eq!(rx.recv().await, Some("hello"));
/// assert!(writer.await.unwrap().is_ok());
/// # }
/// ```
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    // One slot for the pending offer; completion waits on `taken`.
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { offers: tx }, HandoffReceiver { offers: rx })
}

impl<T> HandoffSender<T> {
    /// Hands `value` to the reader, waiting until it has been taken.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future before the offer is placed sends
    /// nothing. Dropping it after the offer is placed may still let the
    /// reader take the value.
    pub async fn send(&self, value: T) -> Result<(), HandoffClosed> {
        let (taken, accepted) = oneshot::channel();
        self.offers
            .send(Offer { value, taken })
            .await
            .map_err(|_| HandoffClosed)?;
        accepted.await.map_err(|_| HandoffClosed)
    }

    /// Returns `true` once the reading end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.offers.is_closed()
    }
}

impl<T> HandoffReceiver<T> {
    /// Waits for the next value.
    ///
    /// Returns `None` once the writing end has been dropped. Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let Offer { value, taken } = self.offers.recv().await?;
        // The writer may have given up waiting; the value is ours either way.
        let _ = taken.send(());
        Some(value)
    }
}
