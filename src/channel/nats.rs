use async_nats::Client;
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::{
    ChannelConnector, ChannelEvent, LiveConnectConfig, RealtimeInput, RemoteChannel,
};
use super::messages::{ClientMessage, ServerMessage};
use crate::error::ChannelError;

/// Connects to the guidance service through a NATS bridge
///
/// Client messages are published as JSON on `live.<session>.input`;
/// server messages arrive as JSON on `live.<session>.output`.
pub struct NatsConnector {
    url: String,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn input_subject(session_id: &str) -> String {
        format!("live.{}.input", session_id)
    }

    pub fn output_subject(session_id: &str) -> String {
        format!("live.{}.output", session_id)
    }
}

#[async_trait::async_trait]
impl ChannelConnector for NatsConnector {
    async fn connect(
        &self,
        config: &LiveConnectConfig,
    ) -> Result<(Arc<dyn RemoteChannel>, mpsc::Receiver<ChannelEvent>), ChannelError> {
        info!("Connecting to NATS at {}", self.url);

        let client = async_nats::connect(&self.url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let output_subject = Self::output_subject(&config.session_id);
        let subscriber = client
            .subscribe(output_subject.clone())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        info!("Subscribed to {}", output_subject);

        let (event_tx, event_rx) = mpsc::channel(100);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        outbound_tx
            .send(config.setup_message())
            .map_err(|_| ChannelError::Closed)?;

        let writer = tokio::spawn(write_loop(
            client,
            Self::input_subject(&config.session_id),
            outbound_rx,
            event_tx.clone(),
        ));
        let reader = tokio::spawn(read_loop(subscriber, event_tx));

        let channel = NatsChannel {
            outbound: Mutex::new(Some(outbound_tx)),
            reader: Mutex::new(Some(reader)),
            _writer: writer,
        };

        Ok((Arc::new(channel), event_rx))
    }
}

/// Open channel over NATS
pub struct NatsChannel {
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    _writer: JoinHandle<()>,
}

impl RemoteChannel for NatsChannel {
    fn send_realtime_input(&self, input: RealtimeInput) -> Result<(), ChannelError> {
        let outbound = self.outbound.lock().map_err(|_| ChannelError::Closed)?;
        let tx = outbound.as_ref().ok_or(ChannelError::Closed)?;

        tx.send(input.into_message())
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) -> Result<(), ChannelError> {
        let sender = self
            .outbound
            .lock()
            .map_err(|_| ChannelError::Closed)?
            .take();

        // Dropping the sender lets the writer drain and flush before exiting
        if sender.is_none() {
            return Err(ChannelError::Closed);
        }

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(task) = reader.take() {
                task.abort();
            }
        }

        info!("NATS channel closed");
        Ok(())
    }
}

async fn write_loop(
    client: Client,
    subject: String,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::Sender<ChannelEvent>,
) {
    while let Some(message) = outbound.recv().await {
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                continue;
            }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            error!("Failed to publish to {}: {}", subject, e);
            let _ = events
                .send(ChannelEvent::Error(format!("publish failed: {}", e)))
                .await;
            break;
        }
    }

    if let Err(e) = client.flush().await {
        debug!("Flush on close failed: {}", e);
    }

    debug!("NATS writer finished");
}

async fn read_loop(mut subscriber: async_nats::Subscriber, events: mpsc::Sender<ChannelEvent>) {
    while let Some(msg) = subscriber.next().await {
        let message = match serde_json::from_slice::<ServerMessage>(&msg.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse server message: {}", e);
                continue;
            }
        };

        let event = if message.setup_complete.is_some() {
            ChannelEvent::Open
        } else if let Some(err) = message.error {
            ChannelEvent::Error(err.message)
        } else {
            ChannelEvent::Message(message)
        };

        if events.send(event).await.is_err() {
            return;
        }
    }

    let _ = events
        .send(ChannelEvent::Close {
            reason: Some("subscription ended".to_string()),
        })
        .await;
}
