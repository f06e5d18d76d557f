use std::fmt;

use serde::Serialize;

use super::error::{CoreError, CoreErrorCode};
use crate::container::SaveEncoding;
use crate::facts::{FactDefinition, FactType};
use crate::property::{MapEntryValue, ScalarValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSummary {
    pub save_data_type: String,
    pub engine_version: String,
    pub header_value: u32,
    pub encoding: SaveEncoding,
    pub uncompressed_len: usize,
    pub property_count: usize,
    pub scene_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub name: String,
    pub level: u8,
    pub growth: u8,
    pub decay: u8,
    pub growth_changes: i32,
    pub decay_changes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneRelationships {
    pub scene: String,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum FactValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Enum(u8),
}

impl FactValue {
    pub fn fact_type(&self) -> FactType {
        match self {
            Self::Int(_) => FactType::Int,
            Self::Float(_) => FactType::Float,
            Self::Bool(_) => FactType::Bool,
            Self::Enum(_) => FactType::Enum,
        }
    }

    /// Encoding used in the fact maps; enum facts are stored as bytes.
    pub fn to_scalar(&self) -> ScalarValue {
        match *self {
            Self::Int(v) => ScalarValue::Int(v),
            Self::Float(v) => ScalarValue::Float(v),
            Self::Bool(v) => ScalarValue::Bool(v),
            Self::Enum(v) => ScalarValue::Byte(v),
        }
    }

    pub fn from_map_value(fact_type: FactType, value: &MapEntryValue) -> Option<Self> {
        match (fact_type, value) {
            (FactType::Int, MapEntryValue::Int(v)) => Some(Self::Int(*v)),
            (FactType::Float, MapEntryValue::Float(v)) => Some(Self::Float(*v)),
            (FactType::Bool, MapEntryValue::Bool(v)) => Some(Self::Bool(*v)),
            (FactType::Enum, MapEntryValue::Byte(v)) => Some(Self::Enum(*v)),
            _ => None,
        }
    }

    /// Parse user input for `fact`. Enum facts take either the numeric value
    /// or one of the definition's value names.
    pub fn parse_for(fact: &FactDefinition, text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        let invalid = || {
            CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("invalid {} value for {}: {text:?}", fact.fact_type, fact.label()),
            )
        };
        match fact.fact_type {
            FactType::Int => text.parse().map(Self::Int).map_err(|_| invalid()),
            FactType::Float => text.parse().map(Self::Float).map_err(|_| invalid()),
            FactType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Self::Bool(true)),
                "false" | "0" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            FactType::Enum => match text.parse::<u8>() {
                Ok(v) => Ok(Self::Enum(v)),
                Err(_) => fact
                    .enum_value_by_name(text)
                    .map(|v| Self::Enum(v.numerical))
                    .ok_or_else(invalid),
            },
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneValue {
    pub scene: String,
    pub value: FactValue,
}

/// Values of one fact across the snapshots it appears in, in play order
/// with the global snapshot last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactTimeline {
    pub fact: FactDefinition,
    pub values: Vec<SceneValue>,
}

impl FactTimeline {
    pub fn first_scene(&self) -> Option<&str> {
        self.values.first().map(|v| v.scene.as_str())
    }

    pub fn latest(&self) -> Option<FactValue> {
        self.values.last().map(|v| v.value)
    }

    /// Record `value` for `scene`, replacing an earlier value for the same
    /// scene in place.
    pub fn record(&mut self, scene: &str, value: FactValue) {
        match self.values.iter_mut().find(|v| v.scene == scene) {
            Some(slot) => slot.value = value,
            None => self.values.push(SceneValue {
                scene: scene.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FactValue;
    use crate::facts::{FactDefinition, FactEnumValue, FactType};
    use crate::property::{MapEntryValue, ScalarValue};

    #[test]
    fn enum_facts_patch_as_bytes() {
        assert_eq!(FactValue::Enum(3).to_scalar(), ScalarValue::Byte(3));
        assert_eq!(
            FactValue::from_map_value(FactType::Enum, &MapEntryValue::Byte(3)),
            Some(FactValue::Enum(3))
        );
        assert_eq!(FactValue::from_map_value(FactType::Int, &MapEntryValue::Byte(3)), None);
    }

    #[test]
    fn parse_for_uses_definition_type() {
        let mut def = FactDefinition::bare(FactType::Enum, "A", "F");
        def.enum_values.push(FactEnumValue {
            name: "Sad".to_string(),
            numerical: 4,
        });
        assert_eq!(FactValue::parse_for(&def, "sad").unwrap(), FactValue::Enum(4));
        assert_eq!(FactValue::parse_for(&def, "2").unwrap(), FactValue::Enum(2));
        assert!(FactValue::parse_for(&def, "angry").is_err());

        let def = FactDefinition::bare(FactType::Bool, "A", "F");
        assert_eq!(FactValue::parse_for(&def, "TRUE").unwrap(), FactValue::Bool(true));
        let def = FactDefinition::bare(FactType::Float, "A", "F");
        assert_eq!(FactValue::parse_for(&def, "0.5").unwrap(), FactValue::Float(0.5));
    }
}
