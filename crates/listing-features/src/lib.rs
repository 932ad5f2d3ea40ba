use thiserror::Error;

mod action;
mod aggregate;
mod bus;
mod normalize;
mod query;
mod refresh;
mod registry;
mod subscription;
mod widget;

pub use action::{
    ActionOutcome, ActionRequest, ActionService, ActionTarget, MockActionService, WINDOW_ACTION,
};
pub use aggregate::{Aggregator, GroupedView, RowItems};
pub use bus::{BusCall, HandlerId, MockNotificationBus, NotificationBus, NotificationHandler};
pub use normalize::{extract_list_items, normalize, parse_structured_items};
pub use query::{FilterTerm, MockQueryService, QueryService, SearchCall};
pub use refresh::{FeatureView, LoadOutcome, RefreshController};
pub use registry::{
    LISTING_FEATURES_WIDGET, WidgetConstructor, WidgetDescriptor, WidgetRegistry,
    default_registry, listing_features_descriptor,
};
pub use subscription::{ReconcileOutcome, SubscriptionManager, SubscriptionState};
pub use widget::{FeatureWidget, IdentityHandle, WidgetServices};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("bus operation failed: {0}")]
    Bus(String),
    #[error("action failed: {0}")]
    Action(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config load failed: {0}")]
    Config(#[from] listing_config::ConfigError),
    #[error("widget '{0}' is already registered")]
    DuplicateWidget(String),
}
