//! Refresh notification stream
//!
//! Every successful token exchange is published here so the embedding
//! application can persist the new refresh token (refresh tokens are single
//! use, so losing one locks the client out). The channel is bounded and
//! ordered. A full buffer makes `publish` wait rather than drop an event;
//! applications that cannot drain promptly should drain on their own task.
//!
//! The stream is closed once, by `close`. Publishing afterwards is a bug in
//! the caller and is reported as `NotifierError::Closed`. A publish still
//! waiting for buffer space when `close` runs is not delivered either: the
//! event is handed over only while holding the same lock `close` takes.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use tremendous_auth::TokenResponse;

/// Buffer size of the refresh stream.
pub const REFRESH_CHANNEL_CAPACITY: usize = 10;

/// Why an event was not delivered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotifierError {
    #[error("refresh notifier already closed")]
    Closed,

    #[error("refresh event receiver dropped")]
    ReceiverDropped,
}

/// Single-producer refresh event channel with at most one subscriber.
#[derive(Debug)]
pub struct RefreshNotifier {
    sender: Mutex<Option<mpsc::Sender<TokenResponse>>>,
    receiver: Mutex<Option<mpsc::Receiver<TokenResponse>>>,
}

impl RefreshNotifier {
    pub fn new() -> Self {
        Self::with_capacity(REFRESH_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Take the receiving end. Returns `None` after the first call.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<TokenResponse>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Publish one event, waiting while the buffer is full.
    pub async fn publish(&self, event: TokenResponse) -> Result<(), NotifierError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            error!("refresh event published after the notifier was closed");
            return Err(NotifierError::Closed);
        };

        if sender.capacity() == 0 {
            warn!("refresh event buffer is full, waiting for the consumer to drain");
        }
        let permit = sender.reserve().await.map_err(|_| {
            warn!("refresh event receiver dropped, event not delivered");
            NotifierError::ReceiverDropped
        })?;

        let slot = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            error!("notifier closed while the refresh event waited for buffer space");
            return Err(NotifierError::Closed);
        }
        permit.send(event);
        drop(slot);
        debug!("published refresh event");
        Ok(())
    }

    /// Close the stream. Returns `true` for the call that actually closed it.
    ///
    /// Buffered events stay readable; the subscriber then sees the end of the
    /// stream.
    pub fn close(&self) -> bool {
        let closed = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!("refresh notifier closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for RefreshNotifier {
    fn default() -> Self {
        Self::new()
    }
}
