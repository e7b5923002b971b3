use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::client::backoff::{Backoff, BackoffPolicy};
use crate::client::transport::{ConnectionEvent, ConnectionListener, MessageListener, RelayTransport};
use crate::models::message_types::{DELIVERED, DOCUMENT_RECEIVED, DOCUMENT_SCANNED};
use crate::models::{DeliveredMessage, DocumentEnvelope};
use crate::services::subscriber_registry::{
    DocumentsChangedListener, NewDocumentListener, Notice, NoticeListener, SubscriberRegistry,
};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Delay policy between delivery attempts; `max_attempts` bounds the total sends
    pub retry: BackoffPolicy,
    /// How long to wait for the relay's `delivered` acknowledgment
    pub ack_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry: BackoffPolicy {
                base: Duration::from_millis(3_000),
                factor: 1.5,
                max: Duration::from_millis(30_000),
                max_attempts: 5,
            },
            ack_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Delivery progress of a locally captured envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeliveryState {
    /// No transport attached
    LocalOnly,
    /// Waiting for the next send attempt
    Pending,
    /// Written to the channel, waiting for acknowledgment
    Sent,
    Delivered { recipients: usize },
    Failed { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("capture is not a base64 data URI")]
    InvalidDataUri,
    #[error("data URI payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

struct IngestInner {
    config: IngestConfig,
    documents: Mutex<Vec<DocumentEnvelope>>,
    deliveries: Mutex<HashMap<String, DeliveryState>>,
    acks: Mutex<HashMap<String, oneshot::Sender<usize>>>,
    registry: SubscriberRegistry,
    transport: Option<RelayTransport>,
    message_subscriptions: Mutex<Vec<(&'static str, Arc<MessageListener>)>>,
    connection_subscription: Mutex<Option<Arc<ConnectionListener>>>,
}

impl Drop for IngestInner {
    fn drop(&mut self) {
        let Some(transport) = &self.transport else {
            return;
        };
        let subscriptions = std::mem::take(
            self.message_subscriptions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (kind, listener) in subscriptions {
            transport.off(kind, &listener);
        }
        if let Some(listener) = self
            .connection_subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            transport.off_connection_change(&listener);
        }
    }
}

/// Turns captures into envelopes, keeps the session's working set and
/// pushes local captures to the paired device.
///
/// Cloning yields another handle to the same working set.
#[derive(Clone)]
pub struct DocumentIngest {
    inner: Arc<IngestInner>,
}

impl DocumentIngest {
    /// Build a pipeline. With a transport, remote envelopes are ingested
    /// and local captures are delivered over it.
    pub fn new(config: IngestConfig, transport: Option<RelayTransport>) -> Self {
        let ingest = Self {
            inner: Arc::new(IngestInner {
                config,
                documents: Mutex::new(Vec::new()),
                deliveries: Mutex::new(HashMap::new()),
                acks: Mutex::new(HashMap::new()),
                registry: SubscriberRegistry::new(),
                transport,
                message_subscriptions: Mutex::new(Vec::new()),
                connection_subscription: Mutex::new(None),
            }),
        };
        if let Some(transport) = ingest.inner.transport.clone() {
            ingest.attach(&transport);
        }
        ingest
    }

    /// Pipeline without remote delivery
    pub fn local() -> Self {
        Self::new(IngestConfig::default(), None)
    }

    fn attach(&self, transport: &RelayTransport) {
        let weak = Arc::downgrade(&self.inner);
        let on_received: Arc<MessageListener> = Arc::new(move |payload: &Value| {
            let Some(ingest) = upgrade(&weak) else {
                return;
            };
            match serde_json::from_value::<DocumentEnvelope>(payload.clone()) {
                Ok(envelope) => ingest.receive_remote_envelope(envelope),
                Err(e) => warn!("Dropping malformed {} payload: {}", DOCUMENT_RECEIVED, e),
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let on_delivered: Arc<MessageListener> = Arc::new(move |payload: &Value| {
            let Some(ingest) = upgrade(&weak) else {
                return;
            };
            match serde_json::from_value::<DeliveredMessage>(payload.clone()) {
                Ok(DeliveredMessage { id: Some(id), recipients }) => ingest.acknowledge(&id, recipients),
                Ok(_) => {}
                Err(e) => warn!("Dropping malformed {} payload: {}", DELIVERED, e),
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let on_connection: Arc<ConnectionListener> = Arc::new(move |event: &ConnectionEvent| {
            let Some(ingest) = upgrade(&weak) else {
                return;
            };
            if let ConnectionEvent::ReconnectExhausted { attempts } = event {
                ingest
                    .inner
                    .registry
                    .emit_notice(&Notice::ConnectionLost { attempts: *attempts });
            }
        });

        transport.on(DOCUMENT_RECEIVED, on_received.clone());
        transport.on(DELIVERED, on_delivered.clone());
        transport.on_connection_change(on_connection.clone());

        let mut subscriptions = lock(&self.inner.message_subscriptions);
        subscriptions.push((DOCUMENT_RECEIVED, on_received));
        subscriptions.push((DELIVERED, on_delivered));
        *lock(&self.inner.connection_subscription) = Some(on_connection);
    }

    /// Wrap a captured image, add it to the working set, notify listeners
    /// and start delivery to the paired device.
    pub fn process_captured_image(&self, image: Vec<u8>, name: Option<&str>) -> DocumentEnvelope {
        self.ingest_local(DocumentEnvelope::new_scan(image, name))
    }

    /// Same as [`DocumentIngest::process_captured_image`] for captures handed
    /// over as `data:<mime>;base64,<data>`. The URI doubles as thumbnail.
    pub fn process_data_uri(&self, uri: &str, name: Option<&str>) -> Result<DocumentEnvelope, IngestError> {
        let content = decode_data_uri(uri)?;
        Ok(self.ingest_local(DocumentEnvelope::new_scan(content, name).with_thumbnail_url(uri)))
    }

    /// Apply an envelope that arrived from the paired device. An existing
    /// envelope with the same id is replaced in place.
    pub fn receive_remote_envelope(&self, envelope: DocumentEnvelope) {
        info!("Received document {} ({}) from paired device", envelope.id, envelope.name);
        let snapshot = self.upsert(envelope.clone());
        self.inner.registry.emit_new_document(&envelope);
        self.inner.registry.emit_documents_changed(&snapshot);
        self.inner.registry.emit_notice(&Notice::RemoteDocument {
            id: envelope.id,
            name: envelope.name,
        });
    }

    /// Copy of the working set
    pub fn get_all(&self) -> Vec<DocumentEnvelope> {
        lock(&self.inner.documents).clone()
    }

    pub fn clear(&self) {
        lock(&self.inner.documents).clear();
        self.inner.registry.emit_documents_changed(&[]);
    }

    /// Register `listener` and immediately replay the current working set to it
    pub fn on_documents_changed(&self, listener: Arc<DocumentsChangedListener>) {
        self.inner.registry.add_documents_changed(listener.clone());
        let snapshot = self.get_all();
        listener(&snapshot);
    }

    pub fn remove_documents_changed_listener(&self, listener: &Arc<DocumentsChangedListener>) -> bool {
        self.inner.registry.remove_documents_changed(listener)
    }

    /// Register for envelopes added or replaced from now on
    pub fn on_new_document(&self, listener: Arc<NewDocumentListener>) {
        self.inner.registry.add_new_document(listener);
    }

    pub fn remove_new_document_listener(&self, listener: &Arc<NewDocumentListener>) -> bool {
        self.inner.registry.remove_new_document(listener)
    }

    pub fn on_notice(&self, listener: Arc<NoticeListener>) {
        self.inner.registry.add_notice(listener);
    }

    pub fn remove_notice_listener(&self, listener: &Arc<NoticeListener>) -> bool {
        self.inner.registry.remove_notice(listener)
    }

    pub fn delivery_state(&self, id: &str) -> Option<DeliveryState> {
        lock(&self.inner.deliveries).get(id).cloned()
    }

    pub fn transport(&self) -> Option<&RelayTransport> {
        self.inner.transport.as_ref()
    }

    fn ingest_local(&self, envelope: DocumentEnvelope) -> DocumentEnvelope {
        info!("Captured document {} ({}, {} bytes)", envelope.id, envelope.name, envelope.content.len());
        let snapshot = self.upsert(envelope.clone());
        self.inner.registry.emit_new_document(&envelope);
        self.inner.registry.emit_documents_changed(&snapshot);
        self.schedule_delivery(envelope.clone());
        envelope
    }

    /// Insert or replace by id, returning the post-mutation snapshot
    fn upsert(&self, envelope: DocumentEnvelope) -> Vec<DocumentEnvelope> {
        let mut documents = lock(&self.inner.documents);
        match documents.iter_mut().find(|d| d.id == envelope.id) {
            Some(slot) => *slot = envelope,
            None => documents.push(envelope),
        }
        documents.clone()
    }

    fn schedule_delivery(&self, envelope: DocumentEnvelope) {
        let Some(transport) = self.inner.transport.clone() else {
            self.set_delivery(&envelope.id, DeliveryState::LocalOnly);
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!("No async runtime available, document {} cannot be delivered", envelope.id);
                self.fail_delivery(&envelope, 0);
                return;
            }
        };

        self.set_delivery(&envelope.id, DeliveryState::Pending);
        let this = self.clone();
        runtime.spawn(async move { this.deliver(transport, envelope).await });
    }

    async fn deliver(&self, transport: RelayTransport, envelope: DocumentEnvelope) {
        let payload = match serde_json::to_value(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode document {}: {}", envelope.id, e);
                self.fail_delivery(&envelope, 0);
                return;
            }
        };

        let policy = self.inner.config.retry;
        let mut backoff = Backoff::new(policy);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let (ack_tx, ack_rx) = oneshot::channel();
            lock(&self.inner.acks).insert(envelope.id.clone(), ack_tx);

            if transport.send_message(DOCUMENT_SCANNED, payload.clone()) {
                self.set_delivery(&envelope.id, DeliveryState::Sent);
                match tokio::time::timeout(self.inner.config.ack_timeout, ack_rx).await {
                    Ok(Ok(recipients)) if recipients > 0 => {
                        info!("Document {} delivered to {} device(s)", envelope.id, recipients);
                        self.set_delivery(&envelope.id, DeliveryState::Delivered { recipients });
                        return;
                    }
                    Ok(Ok(_)) => info!("No paired device received document {} yet", envelope.id),
                    Ok(Err(_)) => debug!("Acknowledgment for {} superseded", envelope.id),
                    Err(_) => warn!(
                        "No delivery acknowledgment for {} within {:?}",
                        envelope.id, self.inner.config.ack_timeout
                    ),
                }
            } else {
                debug!("Transport not connected, document {} not sent (attempt {})", envelope.id, attempts);
            }
            lock(&self.inner.acks).remove(&envelope.id);

            let next = if attempts < policy.max_attempts { backoff.next_delay() } else { None };
            let Some(delay) = next else {
                self.fail_delivery(&envelope, attempts);
                return;
            };
            self.set_delivery(&envelope.id, DeliveryState::Pending);
            tokio::time::sleep(delay).await;
        }
    }

    fn acknowledge(&self, id: &str, recipients: usize) {
        match lock(&self.inner.acks).remove(id) {
            Some(ack) => {
                let _ = ack.send(recipients);
            }
            None => debug!("Unexpected delivery acknowledgment for {}", id),
        }
    }

    fn fail_delivery(&self, envelope: &DocumentEnvelope, attempts: u32) {
        error!("Giving up delivering document {} after {} attempts", envelope.id, attempts);
        self.set_delivery(&envelope.id, DeliveryState::Failed { attempts });
        self.inner.registry.emit_notice(&Notice::DeliveryFailed {
            id: envelope.id.clone(),
            name: envelope.name.clone(),
            attempts,
        });
    }

    fn set_delivery(&self, id: &str, state: DeliveryState) {
        lock(&self.inner.deliveries).insert(id.to_string(), state);
    }
}

fn upgrade(weak: &Weak<IngestInner>) -> Option<DocumentIngest> {
    weak.upgrade().map(|inner| DocumentIngest { inner })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Payload bytes of a `data:<mime>;base64,<data>` URI
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, IngestError> {
    let rest = uri.strip_prefix("data:").ok_or(IngestError::InvalidDataUri)?;
    let (meta, data) = rest.split_once(',').ok_or(IngestError::InvalidDataUri)?;
    if !meta.ends_with(";base64") {
        return Err(IngestError::InvalidDataUri);
    }
    Ok(STANDARD.decode(data.trim())?)
}
