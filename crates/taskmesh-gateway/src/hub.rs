//! Websocket notification hub.
//!
//! Fan-out of opaque messages to every connected subscriber. The ingress
//! is a bounded rendezvous: publishers block until the dispatcher accepts
//! the message. A write failure drops and closes that subscriber within
//! the same critical section as the broadcast iteration.

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Write half of one subscriber connection.
pub type ClientSink = Box<dyn Sink<Message, Error = axum::Error> + Send + Unpin>;

pub struct NotificationHub {
    clients: Mutex<HashMap<u64, ClientSink>>,
    next_id: AtomicU64,
    ingress_tx: mpsc::Sender<Vec<u8>>,
    ingress_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (ingress_tx, ingress_rx) = mpsc::channel(1);
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ingress_tx,
            ingress_rx: Mutex::new(ingress_rx),
        }
    }

    /// Adds a subscriber and returns its handle.
    pub async fn register(&self, sink: ClientSink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().await.insert(id, sink);
        id
    }

    /// Removes and closes a subscriber.
    pub async fn unregister(&self, id: u64) {
        if let Some(mut sink) = self.clients.lock().await.remove(&id) {
            let _ = sink.close().await;
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Hands a message to the dispatcher, blocking until it is accepted.
    pub async fn broadcast(&self, message: Vec<u8>) {
        if self.ingress_tx.send(message).await.is_err() {
            warn!("Notification hub dispatcher is gone; dropping broadcast");
        }
    }

    /// Dispatcher loop: drains the ingress and fans each message out.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Notification hub started");
        let mut ingress = self.ingress_rx.lock().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = ingress.recv() => {
                    let Some(message) = message else { break };
                    self.fan_out(message).await;
                }
            }
        }

        info!("Notification hub stopped");
    }

    async fn fan_out(&self, message: Vec<u8>) {
        let Ok(text) = String::from_utf8(message) else {
            warn!("Dropping non-UTF-8 broadcast payload");
            return;
        };

        let mut clients = self.clients.lock().await;
        let mut dropped = Vec::new();

        for (id, sink) in clients.iter_mut() {
            if sink.send(Message::Text(text.clone())).await.is_err() {
                dropped.push(*id);
            }
        }

        for id in dropped {
            if let Some(mut sink) = clients.remove(&id) {
                let _ = sink.close().await;
            }
            warn!(client = id, "Dropped websocket subscriber after write failure");
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
