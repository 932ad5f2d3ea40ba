use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use listing_core::ChannelName;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::FeatureError;

pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving end of a notification-type subscription.
#[derive(Debug, Clone)]
pub struct NotificationHandler {
    id: HandlerId,
    sender: mpsc::UnboundedSender<Value>,
}

impl NotificationHandler {
    pub fn new(sender: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns `false` once the receiving side is gone.
    pub fn deliver(&self, payload: Value) -> bool {
        self.sender.send(payload).is_ok()
    }
}

#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn subscribe(
        &self,
        notification_type: &str,
        handler: NotificationHandler,
    ) -> Result<(), FeatureError>;

    async fn unsubscribe(
        &self,
        notification_type: &str,
        handler: HandlerId,
    ) -> Result<(), FeatureError>;

    async fn add_channel(&self, channel: &ChannelName) -> Result<(), FeatureError>;

    async fn delete_channel(&self, channel: &ChannelName) -> Result<(), FeatureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Subscribe(String),
    Unsubscribe(String),
    AddChannel(ChannelName),
    DeleteChannel(ChannelName),
}

/// In-memory bus that records every call and delivers published payloads to
/// handlers of the matching type while the target channel is active.
#[derive(Debug, Default)]
pub struct MockNotificationBus {
    state: Mutex<MockBusState>,
}

#[derive(Debug, Default)]
struct MockBusState {
    handlers: Vec<(String, NotificationHandler)>,
    channels: BTreeSet<ChannelName>,
    calls: Vec<BusCall>,
    failing: bool,
    join_latency: Option<Duration>,
}

impl MockNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call is recorded and then rejected.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Holds every successful `add_channel` open for `latency` after the
    /// channel is already active.
    pub fn set_join_latency(&self, latency: Option<Duration>) {
        self.lock().join_latency = latency;
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.lock().calls.clone()
    }

    pub fn add_channel_count(&self, channel: &ChannelName) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, BusCall::AddChannel(added) if added == channel))
            .count()
    }

    pub fn active_channels(&self) -> Vec<ChannelName> {
        self.lock().channels.iter().cloned().collect()
    }

    pub fn handler_count(&self, notification_type: &str) -> usize {
        self.lock()
            .handlers
            .iter()
            .filter(|(kind, _)| kind == notification_type)
            .count()
    }

    /// Delivers `payload` to every live handler of `notification_type` if
    /// `channel` is active. Returns the number of handlers reached.
    pub fn publish(&self, channel: &ChannelName, notification_type: &str, payload: Value) -> usize {
        let state = self.lock();
        if !state.channels.contains(channel) {
            return 0;
        }

        state
            .handlers
            .iter()
            .filter(|(kind, _)| kind == notification_type)
            .filter(|(_, handler)| handler.deliver(payload.clone()))
            .count()
    }

    fn record(&self, call: BusCall) -> Result<MutexGuard<'_, MockBusState>, FeatureError> {
        let mut state = self.lock();
        let description = format!("{call:?}");
        state.calls.push(call);
        if state.failing {
            return Err(FeatureError::Bus(format!("bus unavailable for {description}")));
        }
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationBus for MockNotificationBus {
    async fn subscribe(
        &self,
        notification_type: &str,
        handler: NotificationHandler,
    ) -> Result<(), FeatureError> {
        let mut state = self.record(BusCall::Subscribe(notification_type.to_owned()))?;
        state
            .handlers
            .push((notification_type.to_owned(), handler));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        notification_type: &str,
        handler: HandlerId,
    ) -> Result<(), FeatureError> {
        let mut state = self.record(BusCall::Unsubscribe(notification_type.to_owned()))?;
        state
            .handlers
            .retain(|(kind, registered)| !(kind == notification_type && registered.id() == handler));
        Ok(())
    }

    async fn add_channel(&self, channel: &ChannelName) -> Result<(), FeatureError> {
        let latency = {
            let mut state = self.record(BusCall::AddChannel(channel.clone()))?;
            state.channels.insert(channel.clone());
            state.join_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    async fn delete_channel(&self, channel: &ChannelName) -> Result<(), FeatureError> {
        let mut state = self.record(BusCall::DeleteChannel(channel.clone()))?;
        state.channels.remove(channel);
        Ok(())
    }
}
