use std::sync::Arc;

use listing_core::{ChannelName, EntityId, channel_name_for};

use crate::bus::NotificationBus;

/// Which listing the widget is listening to, if any.
///
/// `active_channel` is set exactly when `entity_id` is, and always names that
/// listing's channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    pub entity_id: Option<EntityId>,
    pub active_channel: Option<ChannelName>,
}

impl SubscriptionState {
    pub fn is_subscribed(&self) -> bool {
        self.active_channel.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Subscribed(ChannelName),
    Switched { from: ChannelName, to: ChannelName },
    Released(ChannelName),
}

impl ReconcileOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Channel joined by this reconcile, if any.
    pub fn joined(&self) -> Option<&ChannelName> {
        match self {
            Self::Subscribed(channel) | Self::Switched { to: channel, .. } => Some(channel),
            Self::Unchanged | Self::Released(_) => None,
        }
    }
}

/// Keeps at most one per-listing bus channel in line with the listing identity.
///
/// Bus failures are logged and swallowed. A failed release still forgets the
/// channel; a failed join leaves the manager unsubscribed so the next
/// reconcile for the same listing retries. A join whose future is dropped
/// before it completes counts as joined.
pub struct SubscriptionManager {
    bus: Arc<dyn NotificationBus>,
    channel_prefix: String,
    state: SubscriptionState,
}

impl SubscriptionManager {
    pub fn new(bus: Arc<dyn NotificationBus>, channel_prefix: impl Into<String>) -> Self {
        Self {
            bus,
            channel_prefix: channel_prefix.into(),
            state: SubscriptionState::default(),
        }
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub fn channel_name_for(&self, id: EntityId) -> ChannelName {
        channel_name_for(&self.channel_prefix, id)
    }

    pub async fn reconcile(&mut self, candidate: Option<EntityId>) -> ReconcileOutcome {
        if candidate == self.state.entity_id {
            return ReconcileOutcome::Unchanged;
        }

        let previous = std::mem::take(&mut self.state);
        if let Some(channel) = &previous.active_channel {
            tracing::debug!(channel = %channel, "deleting bus channel");
            if let Err(err) = self.bus.delete_channel(channel).await {
                tracing::warn!(channel = %channel, error = %err, "failed to delete bus channel");
            }
        }

        let Some(id) = candidate else {
            return previous
                .active_channel
                .map_or(ReconcileOutcome::Unchanged, ReconcileOutcome::Released);
        };

        let channel = self.channel_name_for(id);
        tracing::debug!(channel = %channel, "adding bus channel");
        // Recorded before the call: a join dropped mid-flight must still be
        // released by the next reconcile.
        self.state = SubscriptionState {
            entity_id: Some(id),
            active_channel: Some(channel.clone()),
        };
        if let Err(err) = self.bus.add_channel(&channel).await {
            tracing::warn!(channel = %channel, error = %err, "failed to add bus channel");
            self.state = SubscriptionState::default();
            return previous
                .active_channel
                .map_or(ReconcileOutcome::Unchanged, ReconcileOutcome::Released);
        }

        match previous.active_channel {
            Some(from) => ReconcileOutcome::Switched { from, to: channel },
            None => ReconcileOutcome::Subscribed(channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::{BusCall, MockNotificationBus};

    fn id(value: u64) -> EntityId {
        EntityId::new(value).expect("non-zero id")
    }

    fn manager(bus: &Arc<MockNotificationBus>) -> SubscriptionManager {
        SubscriptionManager::new(bus.clone(), "estate_property")
    }

    #[tokio::test]
    async fn subscribes_once_per_identity() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        let channel = manager.channel_name_for(id(7));

        assert_eq!(
            manager.reconcile(Some(id(7))).await,
            ReconcileOutcome::Subscribed(channel.clone())
        );
        assert_eq!(manager.reconcile(Some(id(7))).await, ReconcileOutcome::Unchanged);

        assert_eq!(bus.calls(), vec![BusCall::AddChannel(channel.clone())]);
        assert_eq!(manager.state().active_channel.as_ref(), Some(&channel));
        assert_eq!(manager.state().entity_id, Some(id(7)));
    }

    #[tokio::test]
    async fn switching_identity_releases_the_old_channel_first() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        let first = manager.channel_name_for(id(1));
        let second = manager.channel_name_for(id(2));

        manager.reconcile(Some(id(1))).await;
        let outcome = manager.reconcile(Some(id(2))).await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Switched {
                from: first.clone(),
                to: second.clone()
            }
        );
        assert_eq!(
            bus.calls(),
            vec![
                BusCall::AddChannel(first.clone()),
                BusCall::DeleteChannel(first),
                BusCall::AddChannel(second.clone()),
            ]
        );
        assert_eq!(bus.active_channels(), vec![second]);
    }

    #[tokio::test]
    async fn clearing_identity_releases_and_is_idempotent() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);

        assert_eq!(manager.reconcile(None).await, ReconcileOutcome::Unchanged);
        manager.reconcile(Some(id(3))).await;
        let channel = manager.channel_name_for(id(3));

        assert_eq!(
            manager.reconcile(None).await,
            ReconcileOutcome::Released(channel)
        );
        assert_eq!(manager.reconcile(None).await, ReconcileOutcome::Unchanged);
        assert_eq!(manager.state(), &SubscriptionState::default());
        assert!(bus.active_channels().is_empty());
    }

    #[tokio::test]
    async fn at_most_one_channel_tracks_the_last_identity() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        let sequence = [Some(4), Some(4), None, Some(9), Some(5), None, None, Some(5)];

        for candidate in sequence {
            manager.reconcile(candidate.map(id)).await;
            let active = bus.active_channels();
            assert!(active.len() <= 1);
            assert_eq!(
                active.first(),
                candidate.map(|value| manager.channel_name_for(id(value))).as_ref()
            );
            assert_eq!(manager.state().active_channel.as_ref(), active.first());
        }
    }

    #[tokio::test]
    async fn failed_join_stays_unsubscribed_and_retries() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        let channel = manager.channel_name_for(id(8));

        bus.set_failing(true);
        assert_eq!(manager.reconcile(Some(id(8))).await, ReconcileOutcome::Unchanged);
        assert!(!manager.state().is_subscribed());

        bus.set_failing(false);
        assert_eq!(
            manager.reconcile(Some(id(8))).await,
            ReconcileOutcome::Subscribed(channel.clone())
        );
        assert_eq!(bus.add_channel_count(&channel), 2);
    }

    #[tokio::test]
    async fn failed_release_still_forgets_the_channel() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        manager.reconcile(Some(id(6))).await;
        let channel = manager.channel_name_for(id(6));

        bus.set_failing(true);
        assert_eq!(
            manager.reconcile(None).await,
            ReconcileOutcome::Released(channel)
        );
        assert_eq!(manager.state(), &SubscriptionState::default());
    }

    #[test]
    fn outcome_reports_joined_channel() {
        let a = channel_name_for("estate_property", id(1));
        let b = channel_name_for("estate_property", id(2));

        assert_eq!(ReconcileOutcome::Subscribed(a.clone()).joined(), Some(&a));
        assert_eq!(
            ReconcileOutcome::Switched {
                from: a.clone(),
                to: b.clone()
            }
            .joined(),
            Some(&b)
        );
        assert_eq!(ReconcileOutcome::Released(a).joined(), None);
        assert!(!ReconcileOutcome::Unchanged.is_change());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_join_is_released_by_the_next_reconcile() {
        let bus = Arc::new(MockNotificationBus::new());
        let mut manager = manager(&bus);
        let channel = manager.channel_name_for(id(7));
        bus.set_join_latency(Some(Duration::from_millis(100)));

        let interrupted = tokio::time::timeout(
            Duration::from_millis(10),
            manager.reconcile(Some(id(7))),
        )
        .await;
        assert!(interrupted.is_err());
        assert_eq!(bus.active_channels(), vec![channel.clone()]);
        assert_eq!(manager.state().active_channel.as_ref(), Some(&channel));

        assert_eq!(
            manager.reconcile(None).await,
            ReconcileOutcome::Released(channel)
        );
        assert!(bus.active_channels().is_empty());
    }
}
