use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use listing_config::WidgetConfig;
use listing_core::{AttributeRow, EntityId, FEATURE_FIELDS, NotificationPayload};
use serde_json::Value;

use crate::FeatureError;
use crate::aggregate::{Aggregator, GroupedView};
use crate::query::{FilterTerm, QueryService};

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureView {
    pub loading: bool,
    pub groups: GroupedView,
}

impl Default for FeatureView {
    fn default() -> Self {
        Self {
            loading: true,
            groups: GroupedView::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No listing identity yet; the view was emptied without querying.
    Cleared,
    Loaded { rows: usize },
}

#[derive(Debug, Default)]
struct ViewState {
    view: FeatureView,
    in_flight: usize,
}

/// Re-runs fetch, normalize and aggregate for the current listing.
///
/// Loads are neither queued nor coalesced; whichever finishes last replaces
/// the groups.
pub struct RefreshController {
    query: Arc<dyn QueryService>,
    aggregator: Aggregator,
    feature_model: String,
    parent_field: String,
    state: RwLock<ViewState>,
}

impl RefreshController {
    pub fn new(query: Arc<dyn QueryService>, config: &WidgetConfig) -> Self {
        Self {
            query,
            aggregator: Aggregator::from_config(config),
            feature_model: config.feature_model.clone(),
            parent_field: config.parent_field.clone(),
            state: RwLock::new(ViewState::default()),
        }
    }

    pub fn snapshot(&self) -> FeatureView {
        self.read().view.clone()
    }

    pub fn with_view<R>(&self, read: impl FnOnce(&FeatureView) -> R) -> R {
        read(&self.read().view)
    }

    pub fn is_loading(&self) -> bool {
        self.read().view.loading
    }

    pub async fn load_features(&self, entity: Option<EntityId>) -> Result<LoadOutcome, FeatureError> {
        let Some(id) = entity else {
            let mut state = self.write();
            state.view.groups = GroupedView::default();
            state.view.loading = state.in_flight > 0;
            return Ok(LoadOutcome::Cleared);
        };

        let _loading = LoadingGuard::begin(&self.state);
        let records = self
            .query
            .search_read(
                &self.feature_model,
                &[FilterTerm::equals(self.parent_field.as_str(), id.get())],
                &FEATURE_FIELDS,
            )
            .await?;

        let rows = decode_rows(&records);
        let groups = self.aggregator.build(&rows);
        self.write().view.groups = groups;

        Ok(LoadOutcome::Loaded { rows: rows.len() })
    }

    /// Reloads when `payload` concerns `current`. Returns whether it did.
    pub async fn on_notification(
        &self,
        payload: &Value,
        current: Option<EntityId>,
    ) -> Result<bool, FeatureError> {
        let payload = match NotificationPayload::from_value(payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring notification without a listing id");
                return Ok(false);
            }
        };
        if !payload.concerns(current) {
            return Ok(false);
        }

        tracing::debug!(
            entity_id = %payload.id,
            origin = payload.origin().unwrap_or("unknown"),
            event = payload.event.as_deref().unwrap_or("unknown"),
            "bus refresh"
        );
        self.load_features(current).await?;
        Ok(true)
    }

    fn read(&self) -> RwLockReadGuard<'_, ViewState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ViewState> {
        write_state(&self.state)
    }
}

fn write_state(state: &RwLock<ViewState>) -> RwLockWriteGuard<'_, ViewState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

fn decode_rows(records: &[Value]) -> Vec<AttributeRow> {
    records
        .iter()
        .filter_map(|record| match AttributeRow::from_record(record) {
            Ok(row) => Some(row),
            Err(err) => {
                tracing::warn!(error = %err, "skipping undecodable feature record");
                None
            }
        })
        .collect()
}

// Keeps `loading` set while any fetch is outstanding and clears it however the
// fetch ends.
struct LoadingGuard<'a> {
    state: &'a RwLock<ViewState>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(state: &'a RwLock<ViewState>) -> Self {
        let mut guard = write_state(state);
        guard.in_flight += 1;
        guard.view.loading = true;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut guard = write_state(self.state);
        guard.in_flight = guard.in_flight.saturating_sub(1);
        guard.view.loading = guard.in_flight > 0;
    }
}
