use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Field types a form widget can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    One2many,
    Many2many,
    Many2one,
    Char,
    Text,
    Html,
    Integer,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::One2many => "one2many",
            Self::Many2many => "many2many",
            Self::Many2one => "many2one",
            Self::Char => "char",
            Self::Text => "text",
            Self::Html => "html",
            Self::Integer => "integer",
        }
    }
}

impl FromStr for FieldType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "one2many" => Ok(Self::One2many),
            "many2many" => Ok(Self::Many2many),
            "many2one" => Ok(Self::Many2one),
            "char" => Ok(Self::Char),
            "text" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            "integer" => Ok(Self::Integer),
            other => Err(CoreError::InvalidFieldType(other.to_owned())),
        }
    }
}
