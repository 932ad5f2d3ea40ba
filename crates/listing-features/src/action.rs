use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use listing_config::WidgetConfig;
use listing_core::EntityId;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::FeatureError;
use crate::query::MockQueryService;

pub const WINDOW_ACTION: &str = "ir.actions.act_window";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Current,
    New,
}

/// Window action opening a form, as understood by the action service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    pub name: String,
    pub res_model: String,
    pub view_mode: String,
    pub views: Vec<(Value, String)>,
    pub target: ActionTarget,
    pub context: Map<String, Value>,
}

impl ActionRequest {
    /// Dialog creating a feature row preset to belong to `entity`.
    pub fn create_feature(config: &WidgetConfig, entity: Option<EntityId>) -> Self {
        let mut context = Map::new();
        context.insert(
            format!("default_{}", config.parent_field),
            entity.map_or(Value::Null, |id| json!(id.get())),
        );

        Self {
            action_type: WINDOW_ACTION.to_owned(),
            name: config.add_feature_title.clone(),
            res_model: config.feature_model.clone(),
            view_mode: "form".to_owned(),
            views: vec![(Value::Bool(false), "form".to_owned())],
            target: ActionTarget::New,
            context,
        }
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Dismissed,
}

#[async_trait]
pub trait ActionService: Send + Sync {
    /// Resolves once the opened dialog is closed.
    async fn do_action(&self, request: ActionRequest) -> Result<ActionOutcome, FeatureError>;
}

/// Action service that answers every request with a fixed result and can
/// simulate the dialog saving a record.
#[derive(Debug)]
pub struct MockActionService {
    outcome: Result<ActionOutcome, String>,
    creates: Option<(Arc<MockQueryService>, Value)>,
    requests: Mutex<Vec<ActionRequest>>,
}

impl MockActionService {
    pub fn new(outcome: ActionOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            creates: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_owned()),
            creates: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// On completion, stores `record` under the requested model in `query`.
    pub fn creating_record(mut self, query: Arc<MockQueryService>, record: Value) -> Self {
        self.creates = Some((query, record));
        self
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ActionRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockActionService {
    fn default() -> Self {
        Self::new(ActionOutcome::Dismissed)
    }
}

#[async_trait]
impl ActionService for MockActionService {
    async fn do_action(&self, request: ActionRequest) -> Result<ActionOutcome, FeatureError> {
        let model = request.res_model.clone();
        self.lock().push(request);

        let outcome = self.outcome.clone().map_err(FeatureError::Action)?;
        if outcome == ActionOutcome::Completed
            && let Some((query, record)) = &self.creates
        {
            query.insert_record(&model, record.clone());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryService;

    #[test]
    fn create_feature_request_presets_the_parent_listing() {
        let config = WidgetConfig::default();
        let request = ActionRequest::create_feature(&config, EntityId::new(12));

        assert_eq!(request.action_type, WINDOW_ACTION);
        assert_eq!(request.name, "Add Feature");
        assert_eq!(request.res_model, "real_estate.feature");
        assert_eq!(request.target, ActionTarget::New);
        assert_eq!(request.context_value("default_property_id"), Some(&json!(12)));

        let encoded = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(encoded["type"], json!("ir.actions.act_window"));
        assert_eq!(encoded["views"], json!([[false, "form"]]));
        assert_eq!(encoded["target"], json!("new"));
    }

    #[test]
    fn create_feature_without_identity_sends_null_default() {
        let request = ActionRequest::create_feature(&WidgetConfig::default(), None);
        assert_eq!(request.context_value("default_property_id"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn completed_mock_action_stores_the_new_record() {
        let query = Arc::new(MockQueryService::new());
        let actions = MockActionService::new(ActionOutcome::Completed)
            .creating_record(query.clone(), json!({ "id": 5, "property_id": 12 }));

        let outcome = actions
            .do_action(ActionRequest::create_feature(&WidgetConfig::default(), EntityId::new(12)))
            .await
            .expect("action");

        assert_eq!(outcome, ActionOutcome::Completed);
        assert_eq!(actions.requests().len(), 1);
        let records = query
            .search_read("real_estate.feature", &[], &["id"])
            .await
            .expect("search");
        assert_eq!(records, vec![json!({ "id": 5 })]);
    }
}
