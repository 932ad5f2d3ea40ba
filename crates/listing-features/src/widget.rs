use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use listing_config::{WidgetConfig, load_workspace_config};
use listing_core::EntityId;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::FeatureError;
use crate::action::{ActionOutcome, ActionRequest, ActionService};
use crate::aggregate::GroupedView;
use crate::bus::{HandlerId, NotificationBus, NotificationHandler};
use crate::query::QueryService;
use crate::refresh::{FeatureView, LoadOutcome, RefreshController};
use crate::subscription::{SubscriptionManager, SubscriptionState};

/// Host services the widget talks to.
#[derive(Clone)]
pub struct WidgetServices {
    pub query: Arc<dyn QueryService>,
    pub bus: Arc<dyn NotificationBus>,
    pub actions: Arc<dyn ActionService>,
}

/// Writable view of the listing identity held by the host record.
///
/// Assigning through the handle does not notify the widget directly; the
/// identity poller picks the new value up on its next tick.
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    sender: Arc<watch::Sender<Option<EntityId>>>,
}

impl IdentityHandle {
    pub fn assign(&self, id: Option<EntityId>) {
        self.sender.send_replace(id);
    }

    pub fn current(&self) -> Option<EntityId> {
        *self.sender.borrow()
    }
}

/// Live, grouped feature list for one listing form.
///
/// Call [`FeatureWidget::start`] once mounted and [`FeatureWidget::teardown`]
/// before discarding it. Dropping a widget that was never torn down aborts
/// its background tasks but leaves the bus channel joined.
pub struct FeatureWidget {
    config: WidgetConfig,
    services: WidgetServices,
    identity: Arc<watch::Sender<Option<EntityId>>>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    refresh: Arc<RefreshController>,
    handler: Option<HandlerId>,
    poller: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl FeatureWidget {
    pub fn new(services: WidgetServices, config: WidgetConfig, identity: Option<EntityId>) -> Self {
        let (identity, _) = watch::channel(identity);
        let subscriptions =
            SubscriptionManager::new(services.bus.clone(), config.channel_prefix.clone());
        let refresh = RefreshController::new(services.query.clone(), &config);

        Self {
            config,
            services,
            identity: Arc::new(identity),
            subscriptions: Arc::new(Mutex::new(subscriptions)),
            refresh: Arc::new(refresh),
            handler: None,
            poller: None,
            listener: None,
        }
    }

    /// Builds a widget configured from `<workspace_root>/.listing/config.toml`.
    pub fn from_workspace(
        workspace_root: impl AsRef<Path>,
        services: WidgetServices,
        identity: Option<EntityId>,
    ) -> Result<Self, FeatureError> {
        let config = load_workspace_config(workspace_root)?;
        Ok(Self::new(services, config.widget, identity))
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    /// Registers the notification handler, joins the listing channel when the
    /// identity is already known, starts the identity poller and performs the
    /// initial load. Calling it again only reloads.
    pub async fn start(&mut self) -> Result<LoadOutcome, FeatureError> {
        if self.listener.is_some() {
            return self.refresh.load_features(self.identity()).await;
        }

        let (handler, receiver) = NotificationHandler::channel();
        self.handler = Some(handler.id());
        if let Err(err) = self
            .services
            .bus
            .subscribe(&self.config.notification_type, handler)
            .await
        {
            tracing::warn!(
                notification_type = %self.config.notification_type,
                error = %err,
                "failed to subscribe to listing notifications"
            );
        }
        self.listener = Some(spawn_listener(
            receiver,
            self.identity.subscribe(),
            self.refresh.clone(),
        ));

        self.subscriptions
            .lock()
            .await
            .reconcile(self.identity())
            .await;
        self.poller = Some(spawn_identity_poller(
            self.identity.subscribe(),
            self.subscriptions.clone(),
            self.refresh.clone(),
            self.config.poll_interval(),
        ));

        self.refresh.load_features(self.identity()).await
    }

    pub fn identity(&self) -> Option<EntityId> {
        *self.identity.borrow()
    }

    pub fn identity_handle(&self) -> IdentityHandle {
        IdentityHandle {
            sender: self.identity.clone(),
        }
    }

    /// Host-reported identity change, e.g. after the first save of a new
    /// listing. Rejoins the channel and reloads when anything changed.
    pub async fn set_identity(&self, next: Option<EntityId>) -> Result<(), FeatureError> {
        let changed = self.identity.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        let outcome = self.subscriptions.lock().await.reconcile(next).await;
        if changed || outcome.is_change() {
            self.refresh.load_features(next).await?;
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<LoadOutcome, FeatureError> {
        self.refresh.load_features(self.identity()).await
    }

    /// Opens the creation dialog for a new feature row and reloads once it
    /// closes, whatever the dialog's result.
    pub async fn add_feature(&self) -> Result<ActionOutcome, FeatureError> {
        let request = ActionRequest::create_feature(&self.config, self.identity());
        let outcome = self.services.actions.do_action(request).await;
        if let Err(err) = &outcome {
            tracing::warn!(error = %err, "add feature action failed");
        }

        self.refresh.load_features(self.identity()).await?;
        outcome
    }

    /// Releases everything the widget holds. Every step runs even when an
    /// earlier one fails; failures are only logged.
    pub async fn teardown(&mut self) {
        // The poller is only stopped between reconciles, never inside one.
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(poller) = self.poller.take() {
            poller.abort();
            tracing::debug!("identity poller cancelled");
        }

        subscriptions.reconcile(None).await;
        drop(subscriptions);

        if let Some(handler) = self.handler.take()
            && let Err(err) = self
                .services
                .bus
                .unsubscribe(&self.config.notification_type, handler)
                .await
        {
            tracing::warn!(
                notification_type = %self.config.notification_type,
                error = %err,
                "failed to unsubscribe from listing notifications"
            );
        }

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    pub async fn subscription_state(&self) -> SubscriptionState {
        self.subscriptions.lock().await.state().clone()
    }

    pub fn snapshot(&self) -> FeatureView {
        self.refresh.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.refresh.is_loading()
    }

    pub fn groups(&self) -> GroupedView {
        self.refresh.snapshot().groups
    }

    pub fn parent_categories(&self) -> Vec<String> {
        self.refresh
            .with_view(|view| owned(view.groups.parent_categories()))
    }

    pub fn categories_of(&self, parent: &str) -> Vec<String> {
        self.refresh
            .with_view(|view| owned(view.groups.categories_of(parent)))
    }

    pub fn items_of(&self, parent: &str, category: &str) -> Vec<String> {
        self.refresh
            .with_view(|view| owned(view.groups.items_of(parent, category)))
    }
}

impl Drop for FeatureWidget {
    fn drop(&mut self) {
        for task in [self.poller.take(), self.listener.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_owned).collect()
}

fn spawn_listener(
    mut receiver: mpsc::UnboundedReceiver<Value>,
    identity: watch::Receiver<Option<EntityId>>,
    refresh: Arc<RefreshController>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = receiver.recv().await {
            let current = *identity.borrow();
            if let Err(err) = refresh.on_notification(&payload, current).await {
                tracing::error!(error = %err, "failed to refresh features after notification");
            }
        }
    })
}

// Safety net for the first save of a new listing: the identity may be written
// to the record without an identity-change event reaching the widget.
fn spawn_identity_poller(
    identity: watch::Receiver<Option<EntityId>>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    refresh: Arc<RefreshController>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let current = *identity.borrow();
            let Some(id) = current else {
                continue;
            };

            let outcome = {
                let mut manager = subscriptions.lock().await;
                if manager.state().entity_id == Some(id) {
                    continue;
                }
                tracing::debug!(entity_id = %id, "identity poller detected listing id");
                manager.reconcile(Some(id)).await
            };

            if outcome.joined().is_some()
                && let Err(err) = refresh.load_features(Some(id)).await
            {
                tracing::error!(entity_id = %id, error = %err, "failed to load features for new listing id");
            }
        }
    })
}
