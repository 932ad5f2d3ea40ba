use std::collections::HashMap;

use listing_config::WidgetConfig;
use listing_core::{EntityId, FieldType};

use crate::FeatureError;
use crate::widget::{FeatureWidget, WidgetServices};

pub const LISTING_FEATURES_WIDGET: &str = "listing_features";

pub type WidgetConstructor = fn(WidgetServices, WidgetConfig, Option<EntityId>) -> FeatureWidget;

#[derive(Debug, Clone, Copy)]
pub struct WidgetDescriptor {
    pub name: &'static str,
    pub supported_types: &'static [FieldType],
    pub build: WidgetConstructor,
}

impl WidgetDescriptor {
    pub fn supports(&self, field_type: FieldType) -> bool {
        self.supported_types.contains(&field_type)
    }
}

/// Widget kinds available to form fields, filled once at startup.
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    descriptors: Vec<WidgetDescriptor>,
    name_index: HashMap<&'static str, usize>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: WidgetDescriptor) -> Result<(), FeatureError> {
        if self.name_index.contains_key(descriptor.name) {
            return Err(FeatureError::DuplicateWidget(descriptor.name.to_owned()));
        }

        self.insert(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&WidgetDescriptor> {
        let index = *self.name_index.get(name)?;
        self.descriptors.get(index)
    }

    pub fn supports(&self, name: &str, field_type: FieldType) -> bool {
        self.get(name)
            .is_some_and(|descriptor| descriptor.supports(field_type))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|descriptor| descriptor.name)
    }

    fn insert(&mut self, descriptor: WidgetDescriptor) {
        self.name_index
            .insert(descriptor.name, self.descriptors.len());
        self.descriptors.push(descriptor);
    }

    pub fn build(
        &self,
        name: &str,
        services: WidgetServices,
        config: WidgetConfig,
        identity: Option<EntityId>,
    ) -> Option<FeatureWidget> {
        self.get(name)
            .map(|descriptor| (descriptor.build)(services, config, identity))
    }
}

pub fn listing_features_descriptor() -> WidgetDescriptor {
    WidgetDescriptor {
        name: LISTING_FEATURES_WIDGET,
        supported_types: &[
            FieldType::One2many,
            FieldType::Many2many,
            FieldType::Char,
            FieldType::Text,
        ],
        build: FeatureWidget::new,
    }
}

pub fn default_registry() -> WidgetRegistry {
    let mut registry = WidgetRegistry::new();
    registry.insert(listing_features_descriptor());
    registry
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::MockActionService;
    use crate::bus::MockNotificationBus;
    use crate::query::MockQueryService;

    fn services() -> WidgetServices {
        WidgetServices {
            query: Arc::new(MockQueryService::new()),
            bus: Arc::new(MockNotificationBus::new()),
            actions: Arc::new(MockActionService::default()),
        }
    }

    #[test]
    fn default_registry_exposes_listing_features_for_relational_and_text_fields() {
        let registry = default_registry();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec![LISTING_FEATURES_WIDGET]);
        for field_type in [
            FieldType::One2many,
            FieldType::Many2many,
            FieldType::Char,
            FieldType::Text,
        ] {
            assert!(registry.supports(LISTING_FEATURES_WIDGET, field_type));
        }
        assert!(!registry.supports(LISTING_FEATURES_WIDGET, FieldType::Integer));
        assert!(!registry.supports("listing_summary", FieldType::Char));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = default_registry();

        let err = registry
            .register(listing_features_descriptor())
            .expect_err("duplicate");

        assert!(matches!(err, FeatureError::DuplicateWidget(name) if name == LISTING_FEATURES_WIDGET));
        assert_eq!(registry.names().count(), 1);
    }

    #[test]
    fn build_constructs_a_widget_for_known_names_only() {
        let registry = default_registry();
        let identity = EntityId::new(3);

        let widget = registry
            .build(LISTING_FEATURES_WIDGET, services(), WidgetConfig::default(), identity)
            .expect("known widget");
        assert_eq!(widget.identity(), identity);
        assert!(widget.is_loading());
        assert!(!widget.is_polling());

        assert!(
            registry
                .build("listing_summary", services(), WidgetConfig::default(), None)
                .is_none()
        );
    }
}
