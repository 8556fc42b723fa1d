//! Change notifications and lifecycle events, delivered over channels.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use serde::Serialize;

/// Editor attributes that emit a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Comment,
    Text,
    RichText,
    OpenIssue,
    RequireVerification,
    ExtraData,
    ParentComments,
    PublishedComments,
    OtherComments,
    Editing,
    Dirty,
    CanEdit,
    CanSave,
    CanDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Save,
    Delete,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EditorEvent {
    Changed { attribute: Attribute },
    Saved,
    Deleted,
    Canceled,
    Closed,
    Failed { operation: Operation, message: String },
}

/// Fan-out of events to any number of subscribers.
///
/// Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Debug)]
pub struct Emitter<E> {
    subscribers: Vec<UnboundedSender<E>>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self { Self { subscribers: Vec::new() } }
}

impl<E: Clone> Emitter<E> {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&mut self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: E) {
        self.subscribers.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    /// Drop every subscriber; their streams end.
    pub fn clear(&mut self) { self.subscribers.clear(); }

    pub fn len(&self) -> usize { self.subscribers.len() }

    pub fn is_empty(&self) -> bool { self.subscribers.is_empty() }
}

/// Collect everything currently queued on `rx` without waiting.
pub fn drain<E>(rx: &mut UnboundedReceiver<E>) -> Vec<E> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
