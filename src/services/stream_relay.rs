use tokio::sync::mpsc;
use tracing::debug;

use crate::models::news::NewsEvent;
use crate::models::stream::StreamEvent;

const CHANNEL_CAPACITY: usize = 64;

/// Single writer for one client's event stream. Sends after the client has
/// gone away are dropped silently.
pub struct StreamRelay {
    tx: mpsc::Sender<StreamEvent>,
    sent_news: usize,
}

impl StreamRelay {
    /// Opens the channel and queues the `connected` frame.
    pub fn open() -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // fresh channel with spare capacity, cannot fail
        let _ = tx.try_send(StreamEvent::Connected);
        (StreamRelay { tx, sent_news: 0 }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn emit(&self, event: StreamEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            debug!("Client disconnected, dropping stream event");
            return false;
        }
        true
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.emit(StreamEvent::Status {
            message: message.into(),
        })
        .await;
    }

    pub async fn news(&mut self, event: NewsEvent) {
        if self.emit(StreamEvent::news(event)).await {
            self.sent_news += 1;
        }
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(StreamEvent::Error {
            message: message.into(),
        })
        .await;
    }

    /// Terminal frame; consumes the relay so nothing can follow it.
    pub async fn complete(self) {
        let total = self.sent_news;
        self.emit(StreamEvent::Complete { total }).await;
    }

    pub fn sent_news(&self) -> usize {
        self.sent_news
    }
}
