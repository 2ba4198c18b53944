//! Fire-and-forget hit reporting
//!
//! Request handlers hand hits to an actor over a bounded mpsc channel and
//! return immediately. The actor buffers them and ships them in batches
//! through [`StatsClient::report_hits`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::StatsClient;
use crate::models::HitRecord;

enum DispatchMessage {
    Hit(HitRecord),
    /// Flush everything buffered, then stop and acknowledge
    Shutdown(oneshot::Sender<()>),
}

struct DispatchActor {
    receiver: mpsc::Receiver<DispatchMessage>,
    client: Arc<StatsClient>,
    buffer: Vec<HitRecord>,
    flush_interval: Duration,
}

impl DispatchActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(DispatchMessage::Hit(hit)) => {
                        self.buffer.push(hit);
                        if self.buffer.len() >= self.client.max_batch_size() {
                            self.flush().await;
                        }
                    }
                    Some(DispatchMessage::Shutdown(ack)) => {
                        info!("hit dispatcher shutting down, flushing {} hits", self.buffer.len());
                        self.flush().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        debug!("all dispatcher handles dropped, flushing");
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let hits = std::mem::take(&mut self.buffer);
        debug!("flushing {} buffered hits", hits.len());
        self.client.report_hits(&hits).await;
    }
}

/// Handle to the dispatch actor. Cheap to clone.
#[derive(Clone)]
pub struct HitDispatcher {
    sender: mpsc::Sender<DispatchMessage>,
}

impl HitDispatcher {
    /// Spawn the actor on the current tokio runtime
    pub fn spawn(client: Arc<StatsClient>, buffer_size: usize, flush_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let actor = DispatchActor {
            receiver,
            client,
            buffer: Vec::new(),
            flush_interval,
        };

        tokio::spawn(actor.run());

        Self { sender }
    }

    /// Queue a hit for delivery. Drops it when the queue is full.
    pub fn dispatch(&self, hit: HitRecord) {
        if let Err(e) = self.sender.try_send(DispatchMessage::Hit(hit)) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("hit dispatch queue full, dropping hit");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("hit dispatcher stopped, dropping hit");
                }
            }
        }
    }

    /// Flush pending hits and stop the actor
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(DispatchMessage::Shutdown(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }
}
