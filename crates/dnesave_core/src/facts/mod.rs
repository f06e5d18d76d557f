mod catalog;
pub mod scenes;

pub use catalog::{FactCatalog, FactDefinition, FactEnumValue, FactType};
