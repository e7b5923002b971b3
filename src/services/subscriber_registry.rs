use serde::Serialize;
use std::sync::Arc;

use crate::models::DocumentEnvelope;
use crate::utils::listeners::Listeners;

pub type DocumentsChangedListener = dyn Fn(&[DocumentEnvelope]) + Send + Sync;
pub type NewDocumentListener = dyn Fn(&DocumentEnvelope) + Send + Sync;
pub type NoticeListener = dyn Fn(&Notice) + Send + Sync;

/// User-facing notifications raised by the ingest pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    /// A document arrived from the paired device
    RemoteDocument { id: String, name: String },
    /// Delivery to the paired device was abandoned
    DeliveryFailed { id: String, name: String, attempts: u32 },
    /// The relay connection could not be restored; the user has to re-pair
    ConnectionLost { attempts: u32 },
}

/// Callback lists for the ingest pipeline's event classes.
///
/// Notification is synchronous and in registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    documents_changed: Listeners<DocumentsChangedListener>,
    new_document: Listeners<NewDocumentListener>,
    notices: Listeners<NoticeListener>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_documents_changed(&self, listener: Arc<DocumentsChangedListener>) {
        self.documents_changed.add(listener);
    }

    pub fn remove_documents_changed(&self, listener: &Arc<DocumentsChangedListener>) -> bool {
        self.documents_changed.remove(listener)
    }

    pub fn add_new_document(&self, listener: Arc<NewDocumentListener>) {
        self.new_document.add(listener);
    }

    pub fn remove_new_document(&self, listener: &Arc<NewDocumentListener>) -> bool {
        self.new_document.remove(listener)
    }

    pub fn add_notice(&self, listener: Arc<NoticeListener>) {
        self.notices.add(listener);
    }

    pub fn remove_notice(&self, listener: &Arc<NoticeListener>) -> bool {
        self.notices.remove(listener)
    }

    pub fn emit_documents_changed(&self, documents: &[DocumentEnvelope]) {
        for listener in self.documents_changed.snapshot() {
            listener(documents);
        }
    }

    pub fn emit_new_document(&self, document: &DocumentEnvelope) {
        for listener in self.new_document.snapshot() {
            listener(document);
        }
    }

    pub fn emit_notice(&self, notice: &Notice) {
        for listener in self.notices.snapshot() {
            listener(notice);
        }
    }

    /// Registered listeners per event class
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.documents_changed.len(), self.new_document.len(), self.notices.len())
    }
}
