use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core_api::{CoreError, CoreErrorCode};

/// Value type of a fact. Serialized as its numeric code, the form used by
/// `fact_defs.json`; names are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FactTypeRepr", into = "u8")]
pub enum FactType {
    Int,
    Float,
    Enum,
    Bool,
}

impl FactType {
    /// Name of the per-asset map holding facts of this type.
    pub fn map_name(&self) -> &'static str {
        match self {
            Self::Int => "IntFacts",
            Self::Float => "FloatFacts",
            Self::Enum => "EnumFacts",
            Self::Bool => "BoolFacts",
        }
    }

    pub fn all() -> [FactType; 4] {
        [Self::Bool, Self::Int, Self::Enum, Self::Float]
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "IntFact",
            Self::Float => "FloatFact",
            Self::Enum => "EnumFact",
            Self::Bool => "BoolFact",
        };
        f.write_str(name)
    }
}

impl From<FactType> for u8 {
    fn from(value: FactType) -> Self {
        match value {
            FactType::Int => 0,
            FactType::Float => 1,
            FactType::Enum => 2,
            FactType::Bool => 3,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FactTypeRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<FactTypeRepr> for FactType {
    type Error = String;

    fn try_from(value: FactTypeRepr) -> Result<Self, Self::Error> {
        match value {
            FactTypeRepr::Code(0) => Ok(Self::Int),
            FactTypeRepr::Code(1) => Ok(Self::Float),
            FactTypeRepr::Code(2) => Ok(Self::Enum),
            FactTypeRepr::Code(3) => Ok(Self::Bool),
            FactTypeRepr::Code(other) => Err(format!("unknown fact type code {other}")),
            FactTypeRepr::Name(name) => match name.as_str() {
                "IntFact" | "Int" => Ok(Self::Int),
                "FloatFact" | "Float" => Ok(Self::Float),
                "EnumFact" | "Enum" => Ok(Self::Enum),
                "BoolFact" | "Bool" => Ok(Self::Bool),
                _ => Err(format!("unknown fact type {name:?}")),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FactEnumValue {
    pub name: String,
    pub numerical: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FactDefinition {
    #[serde(rename = "Type")]
    pub fact_type: FactType,
    pub fact_asset_id: String,
    pub fact_id: String,
    #[serde(default)]
    pub fact_asset_name: Option<String>,
    #[serde(default)]
    pub fact_name: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub enum_values: Vec<FactEnumValue>,
}

impl FactDefinition {
    /// Definition with ids only, used for facts the catalog does not know.
    pub fn bare(fact_type: FactType, fact_asset_id: &str, fact_id: &str) -> Self {
        Self {
            fact_type,
            fact_asset_id: fact_asset_id.to_string(),
            fact_id: fact_id.to_string(),
            fact_asset_name: None,
            fact_name: None,
            family: None,
            enum_values: Vec::new(),
        }
    }

    /// `asset / fact`, by name when both are known.
    pub fn label(&self) -> String {
        match self.fact_name.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                let asset = self.fact_asset_name.as_deref().unwrap_or(&self.fact_asset_id);
                format!("{asset} / {name}")
            }
            _ => format!("{} / {}", self.fact_asset_id, self.fact_id),
        }
    }

    pub fn enum_value(&self, numerical: u8) -> Option<&FactEnumValue> {
        self.enum_values.iter().find(|v| v.numerical == numerical)
    }

    pub fn enum_value_by_name(&self, name: &str) -> Option<&FactEnumValue> {
        self.enum_values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fact definitions, built once and passed by reference to lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactCatalog {
    definitions: Vec<FactDefinition>,
}

impl FactCatalog {
    /// Keeps the first definition for each `(asset id, fact id)` pair.
    pub fn from_definitions(definitions: Vec<FactDefinition>) -> Self {
        let mut seen = HashSet::new();
        let definitions = definitions
            .into_iter()
            .filter(|d| seen.insert((d.fact_asset_id.clone(), d.fact_id.clone())))
            .collect();
        Self { definitions }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let definitions: Vec<FactDefinition> = serde_json::from_str(json).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Format,
                format!("invalid fact definition json: {e}"),
            )
        })?;
        Ok(Self::from_definitions(definitions))
    }

    pub fn load_json(path: &Path) -> Result<Self, CoreError> {
        let json = fs::read_to_string(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        Self::from_json_str(&json).map_err(|e| {
            CoreError::new(e.code, format!("{}: {}", path.display(), e.message))
        })
    }

    pub fn definitions(&self) -> &[FactDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Look a fact up by id, narrowed to one asset when `asset_id` is given.
    pub fn find(&self, fact_id: &str, asset_id: Option<&str>) -> Option<&FactDefinition> {
        let candidates: Vec<&FactDefinition> = self
            .definitions
            .iter()
            .filter(|d| d.fact_id == fact_id)
            .filter(|d| asset_id.is_none_or(|asset| d.fact_asset_id == asset))
            .collect();
        let label = format!("{} / {fact_id}", asset_id.unwrap_or(""));
        first_candidate(candidates, &label)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FactDefinition> {
        let candidates: Vec<&FactDefinition> = self
            .definitions
            .iter()
            .filter(|d| d.fact_name.as_deref() == Some(name))
            .collect();
        first_candidate(candidates, name)
    }
}

fn first_candidate<'a>(candidates: Vec<&'a FactDefinition>, label: &str) -> Option<&'a FactDefinition> {
    match candidates.len() {
        0 => warn!("fact definition not found: {label}"),
        1 => {}
        n => warn!("{n} candidates for fact {label}; using the first"),
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::{FactCatalog, FactType};

    const DEFS: &str = r#"[
        {"Type": 3, "FactAssetId": "A1", "FactId": "F1", "FactAssetName": "Chapter1",
         "FactName": "MetAutumn", "Family": null, "EnumValues": null},
        {"Type": 2, "FactAssetId": "A1", "FactId": "F2", "FactAssetName": "Chapter1",
         "FactName": "Mood", "Family": "Mood",
         "EnumValues": [{"Name": "Happy", "Numerical": 0}, {"Name": "Sad", "Numerical": 1}]},
        {"Type": 0, "FactAssetId": "A2", "FactId": "F2", "FactName": "Mood"},
        {"Type": "BoolFact", "FactAssetId": "A1", "FactId": "F1", "FactName": "Duplicate"}
    ]"#;

    #[test]
    fn loads_and_deduplicates_definitions() {
        let catalog = FactCatalog::from_json_str(DEFS).unwrap();
        assert_eq!(catalog.len(), 3);
        let first = catalog.find("F1", Some("A1")).unwrap();
        assert_eq!(first.fact_type, FactType::Bool);
        assert_eq!(first.fact_name.as_deref(), Some("MetAutumn"));
        assert!(first.enum_values.is_empty());
    }

    #[test]
    fn find_narrows_by_asset() {
        let catalog = FactCatalog::from_json_str(DEFS).unwrap();
        assert_eq!(catalog.find("F2", Some("A2")).unwrap().fact_type, FactType::Int);
        assert_eq!(catalog.find("F2", None).unwrap().fact_asset_id, "A1");
        assert!(catalog.find("F9", None).is_none());
    }

    #[test]
    fn find_by_name_returns_first_of_several() {
        let catalog = FactCatalog::from_json_str(DEFS).unwrap();
        let mood = catalog.find_by_name("Mood").unwrap();
        assert_eq!(mood.fact_type, FactType::Enum);
        assert_eq!(mood.enum_value(1).map(|v| v.name.as_str()), Some("Sad"));
        assert_eq!(mood.enum_value_by_name("happy").map(|v| v.numerical), Some(0));
        assert!(catalog.find_by_name("Nope").is_none());
    }

    #[test]
    fn labels_prefer_names() {
        let catalog = FactCatalog::from_json_str(DEFS).unwrap();
        assert_eq!(catalog.find("F1", None).unwrap().label(), "Chapter1 / MetAutumn");
        let bare = super::FactDefinition::bare(FactType::Int, "A9", "F9");
        assert_eq!(bare.label(), "A9 / F9");
    }

    #[test]
    fn type_serializes_as_code() {
        let json = serde_json::to_string(&FactType::Enum).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let err = FactCatalog::from_json_str("{").unwrap_err();
        assert_eq!(err.code, crate::core_api::CoreErrorCode::Format);
    }
}
