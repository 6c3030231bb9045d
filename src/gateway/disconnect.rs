//! Client-side lifecycle tracking for one streaming response.
//!
//! The gateway only learns that a client went away when axum drops the
//! response body, and it must not confuse that drop with the drop that
//! follows normal completion. Instead of a separate cancel flag and
//! completion flag, the whole lifecycle is a single one-way phase value
//! shared between the transducer loop and the response body.

use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;

/// Phase of the client side of a streaming request. Transitions are one-way
/// out of `Streaming`; whichever of the other two phases is reached first
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// The client is still reading, as far as the gateway knows
    Streaming,
    /// The response body was dropped before the stream finished
    Disconnected,
    /// The transducer delivered its terminal events
    Drained,
}

/// Shared view of a streaming client's lifecycle.
///
/// The transducer loop holds one clone and marks the stream drained when it
/// finishes; the response body holds another and reports its drop. Because
/// draining is recorded first, the body drop that follows a fully-consumed
/// stream is a no-op rather than a phantom disconnect.
#[derive(Clone)]
pub struct ClientWatch {
    phase: watch::Sender<ClientPhase>,
}

impl ClientWatch {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ClientPhase::Streaming);
        Self { phase }
    }

    /// Record that the client stopped reading mid-stream.
    pub fn mark_disconnected(&self) {
        let flipped = self.phase.send_if_modified(|phase| {
            if *phase == ClientPhase::Streaming {
                *phase = ClientPhase::Disconnected;
                true
            } else {
                false
            }
        });
        if flipped {
            tracing::debug!("client stopped reading mid-stream");
        }
    }

    /// Record that the stream finished normally.
    pub fn mark_drained(&self) {
        self.phase.send_if_modified(|phase| {
            if *phase == ClientPhase::Streaming {
                *phase = ClientPhase::Drained;
                true
            } else {
                false
            }
        });
    }

    pub fn phase(&self) -> ClientPhase {
        *self.phase.borrow()
    }

    pub fn is_disconnected(&self) -> bool {
        self.phase() == ClientPhase::Disconnected
    }

    /// Resolve when the client disconnects. Pends forever once the stream
    /// has drained, so a select loop can treat this arm as "disconnect or
    /// nothing".
    pub async fn disconnected(&self) {
        let mut rx = self.phase.subscribe();
        loop {
            let phase = *rx.borrow_and_update();
            match phase {
                ClientPhase::Disconnected => return,
                ClientPhase::Drained => std::future::pending::<()>().await,
                ClientPhase::Streaming => {}
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ClientWatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Response-body wrapper whose drop reports the client disconnect.
pub struct WatchedBody<S> {
    stream: S,
    watch: ClientWatch,
}

impl<S> WatchedBody<S> {
    pub fn new(stream: S, watch: ClientWatch) -> Self {
        Self { stream, watch }
    }
}

impl<S, E> Stream for WatchedBody<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for WatchedBody<S> {
    fn drop(&mut self) {
        // A no-op once the stream is marked drained; otherwise this drop IS
        // the disconnect signal.
        self.watch.mark_disconnected();
    }
}
