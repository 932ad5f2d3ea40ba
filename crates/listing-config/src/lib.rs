use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LISTING_DIR_NAME: &str = ".listing";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_NOTIFICATION_TYPE: &str = "estate_property_update";
pub const DEFAULT_CHANNEL_PREFIX: &str = "estate_property";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_FEATURE_MODEL: &str = "real_estate.feature";
pub const DEFAULT_PARENT_FIELD: &str = "property_id";
pub const DEFAULT_PARENT_CATEGORY: &str = "Other";
pub const DEFAULT_CATEGORY: &str = "Details";
pub const DEFAULT_ADD_FEATURE_TITLE: &str = "Add Feature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListingConfig {
    #[serde(default)]
    pub widget: WidgetConfig,
}

/// Settings for the live feature widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Notification type the widget registers its bus handler for.
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
    /// Prefix of the per-listing channel, joined to the id with `_`.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_feature_model")]
    pub feature_model: String,
    /// Foreign-key field on the feature model pointing at the listing.
    #[serde(default = "default_parent_field")]
    pub parent_field: String,
    #[serde(default = "default_parent_category")]
    pub default_parent_category: String,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_add_feature_title")]
    pub add_feature_title: String,
}

impl WidgetConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            notification_type: default_notification_type(),
            channel_prefix: default_channel_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            feature_model: default_feature_model(),
            parent_field: default_parent_field(),
            default_parent_category: default_parent_category(),
            default_category: default_category(),
            add_feature_title: default_add_feature_title(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn listing_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(LISTING_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    listing_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<ListingConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(ListingConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<ListingConfig, ConfigError> {
    let parsed: ListingConfig = toml::from_str(raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<ListingConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(listing_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = ListingConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

fn default_notification_type() -> String {
    DEFAULT_NOTIFICATION_TYPE.to_owned()
}

fn default_channel_prefix() -> String {
    DEFAULT_CHANNEL_PREFIX.to_owned()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_feature_model() -> String {
    DEFAULT_FEATURE_MODEL.to_owned()
}

fn default_parent_field() -> String {
    DEFAULT_PARENT_FIELD.to_owned()
}

fn default_parent_category() -> String {
    DEFAULT_PARENT_CATEGORY.to_owned()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_owned()
}

fn default_add_feature_title() -> String {
    DEFAULT_ADD_FEATURE_TITLE.to_owned()
}

fn normalize_required(value: &mut String, fallback: fn() -> String) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        *value = fallback();
    } else if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
    }
}

fn normalize_config(mut config: ListingConfig) -> ListingConfig {
    let widget = &mut config.widget;
    normalize_required(&mut widget.notification_type, default_notification_type);
    normalize_required(&mut widget.channel_prefix, default_channel_prefix);
    normalize_required(&mut widget.feature_model, default_feature_model);
    normalize_required(&mut widget.parent_field, default_parent_field);
    normalize_required(&mut widget.default_parent_category, default_parent_category);
    normalize_required(&mut widget.default_category, default_category);
    normalize_required(&mut widget.add_feature_title, default_add_feature_title);
    widget.poll_interval_ms = widget.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);

    config
}
