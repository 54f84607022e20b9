//! Routing of messages that survived the plugin chain.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::watch;

use crate::message::SseMessage;

/// Callback receiving a dispatched message.
pub type MessageCallback = Arc<dyn Fn(&SseMessage) + Send + Sync>;

/// Delivers messages to the named listener, then the generic callback, then
/// the latest-message slot.
pub(crate) struct Dispatcher {
    listeners: HashMap<String, MessageCallback>,
    on_message: Option<MessageCallback>,
    latest: watch::Sender<Option<SseMessage>>,
}

impl Dispatcher {
    pub(crate) fn new(
        listeners: HashMap<String, MessageCallback>,
        on_message: Option<MessageCallback>,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            listeners,
            on_message,
            latest,
        }
    }

    pub(crate) fn dispatch(&self, message: SseMessage) {
        if let Some(listener) = self.listeners.get(&message.event) {
            listener(&message);
        }
        if let Some(on_message) = &self.on_message {
            on_message(&message);
        }
        self.latest.send_replace(Some(message));
    }

    pub(crate) fn latest(&self) -> Option<SseMessage> {
        self.latest.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<SseMessage>> {
        self.latest.subscribe()
    }
}
