use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::warn;

use super::error::{CoreError, CoreErrorCode};
use super::types::{FactTimeline, FactValue, Relationship, SaveSummary, SceneRelationships};
use crate::container::SaveContainer;
use crate::decoder::DecodeOptions;
use crate::decompress::{Decompressor, NoDecompressor};
use crate::facts::scenes::{GLOBAL_SCENE_KEY, SCENES, scene_order};
use crate::facts::{FactCatalog, FactDefinition, FactType};
use crate::patch::PatchBuffer;
use crate::property::{MapEntryValue, Property, ScalarValue};

const SCENE_SNAPSHOTS: &str = "SceneSnapshots";
const CURRENT_SNAPSHOT: &str = "CurrentSnapshot";
const SECTION: &str = "Section";
const RELATIONSHIPS: &str = "CharactersRelationships";
const RELATIONSHIP_NAME: &str = "RelationshipName";
const LEVEL: &str = "Level";
const GROWTH_VALUE: &str = "GrowthValue";
const DECAY_VALUE: &str = "DecayValue";
const GROWTH_CHANGES: &str = "GrowthChangesCount";
const DECAY_CHANGES: &str = "DecayChangesCount";
const FACTS: &str = "Facts";
const FACT_ASSETS: &str = "FactAssets";

/// Opens saves. Holds the decompressor and decoder options shared by every
/// session it creates.
pub struct Engine {
    decompressor: Box<dyn Decompressor>,
    options: DecodeOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            decompressor: Box::new(NoDecompressor),
            options: DecodeOptions::default(),
        }
    }

    pub fn with_decompressor(mut self, decompressor: Box<dyn Decompressor>) -> Self {
        self.decompressor = decompressor;
        self
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn open_bytes<B: Into<Vec<u8>>>(&self, bytes: B) -> Result<Session, CoreError> {
        let container =
            SaveContainer::parse(bytes.into(), self.decompressor.as_ref(), self.options.clone())
                .map_err(|e| CoreError::from_io("failed to parse save", e))?;
        Ok(Session { container })
    }

    pub fn open_path(&self, path: &Path) -> Result<Session, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        self.open_bytes(bytes)
    }
}

/// A decoded save and the domain queries and edits built on top of it.
///
/// Edits never touch the session. They go through a [`PatchBuffer`] loaded
/// from the uncompressed working copy, see [`Session::write_working_copy`].
#[derive(Debug)]
pub struct Session {
    container: SaveContainer,
}

impl Session {
    pub fn container(&self) -> &SaveContainer {
        &self.container
    }

    pub fn summary(&self) -> SaveSummary {
        SaveSummary {
            save_data_type: self.container.save_data_type().to_string(),
            engine_version: self.container.engine_version().to_string(),
            header_value: self.container.header_value(),
            encoding: self.container.encoding(),
            uncompressed_len: self.container.uncompressed_len(),
            property_count: self.container.properties().len(),
            scene_ids: self.scene_ids(),
        }
    }

    /// Scene ids present in `SceneSnapshots`, in file order.
    pub fn scene_ids(&self) -> Vec<String> {
        self.container
            .get(SCENE_SNAPSHOTS)
            .and_then(Property::as_map)
            .map(|map| map.entries().iter().map(|e| e.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Write the uncompressed stream to `path` and load it as a patch buffer.
    pub fn write_working_copy(&self, path: &Path) -> Result<PatchBuffer, CoreError> {
        self.container.write_uncompressed_to(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to write {}: {e}", path.display()),
            )
        })?;
        PatchBuffer::load(path)
    }

    /// Relationships per scene snapshot, followed by the global snapshot.
    pub fn relationships(&self) -> Result<Vec<SceneRelationships>, CoreError> {
        let snapshots = self.scene_snapshots()?;
        let mut out = Vec::new();

        if let Some(map) = snapshots.as_map() {
            for entry in map.entries() {
                let MapEntryValue::Struct(scene) = &entry.value else {
                    continue;
                };
                let scene_id = scene
                    .get(SECTION)
                    .and_then(Property::as_str)
                    .unwrap_or(&entry.key);
                out.push(SceneRelationships {
                    scene: scene_id.to_string(),
                    relationships: relationships_in(scene)?,
                });
            }
        }

        out.push(SceneRelationships {
            scene: GLOBAL_SCENE_KEY.to_string(),
            relationships: relationships_in(self.current_snapshot()?)?,
        });
        Ok(out)
    }

    /// Every fact found in the known scenes and the global snapshot, with
    /// definitions resolved through `catalog`.
    pub fn catalog_facts(&self, catalog: &FactCatalog) -> Result<Vec<FactTimeline>, CoreError> {
        let snapshots = self.scene_snapshots()?;
        let mut timelines: Vec<FactTimeline> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        let mut visit = |scene: &Property, key: &str| -> Result<(), CoreError> {
            for (asset_id, fact_type, fact_id, value) in facts_in(scene)? {
                let slot = *index
                    .entry((asset_id.to_string(), fact_id.to_string()))
                    .or_insert_with(|| {
                        let fact = resolve_definition(catalog, fact_type, asset_id, fact_id);
                        timelines.push(FactTimeline {
                            fact,
                            values: Vec::new(),
                        });
                        timelines.len() - 1
                    });
                timelines[slot].record(key, value);
            }
            Ok(())
        };

        for (scene_id, _) in SCENES {
            match snapshots.get(scene_id) {
                Some(scene) => visit(scene, scene_id)?,
                None => warn!("scene {scene_id} not found"),
            }
        }
        visit(self.current_snapshot()?, GLOBAL_SCENE_KEY)?;

        timelines.sort_by(|a, b| {
            let first = |t: &FactTimeline| t.first_scene().map(scene_order).unwrap_or(usize::MAX);
            first(a)
                .cmp(&first(b))
                .then_with(|| a.fact.fact_asset_id.cmp(&b.fact.fact_asset_id))
                .then_with(|| a.fact.fact_id.cmp(&b.fact.fact_id))
        });
        Ok(timelines)
    }

    /// Patch `fact` to `value` in each of `scenes` and, with `alter_global`,
    /// in the current snapshot. Returns false when some target snapshot does
    /// not carry the fact; the others are still patched.
    pub fn adjust_fact(
        &self,
        buffer: &mut PatchBuffer,
        fact: &FactDefinition,
        value: FactValue,
        scenes: &[String],
        alter_global: bool,
    ) -> Result<bool, CoreError> {
        if value.fact_type() != fact.fact_type {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!(
                    "{} is a {}, got a {} value",
                    fact.label(),
                    fact.fact_type,
                    value.fact_type()
                ),
            ));
        }

        let mut complete = true;
        for scene in self.target_snapshots(scenes, alter_global)? {
            complete &= patch_fact_in(buffer, scene, fact, value)?;
        }
        Ok(complete)
    }

    /// Patch the five counters of the relationship named `relationship.name`.
    pub fn adjust_relationship(
        &self,
        buffer: &mut PatchBuffer,
        relationship: &Relationship,
        scenes: &[String],
        alter_global: bool,
    ) -> Result<(), CoreError> {
        for scene in self.target_snapshots(scenes, alter_global)? {
            patch_relationship_in(buffer, scene, relationship)?;
        }
        Ok(())
    }

    fn target_snapshots(&self, scenes: &[String], alter_global: bool) -> Result<Vec<&Property>, CoreError> {
        let snapshots = self.scene_snapshots()?;
        let mut targets = Vec::new();
        for scene_id in scenes {
            match snapshots.get(scene_id) {
                Some(scene) => targets.push(scene),
                None => warn!("scene {scene_id} not found"),
            }
        }
        if alter_global {
            targets.push(self.current_snapshot()?);
        }
        Ok(targets)
    }

    fn scene_snapshots(&self) -> Result<&Property, CoreError> {
        required_top_level(&self.container, SCENE_SNAPSHOTS)
    }

    fn current_snapshot(&self) -> Result<&Property, CoreError> {
        required_top_level(&self.container, CURRENT_SNAPSHOT)
    }
}

fn required_top_level<'a>(container: &'a SaveContainer, name: &str) -> Result<&'a Property, CoreError> {
    container
        .get(name)
        .ok_or_else(|| CoreError::new(CoreErrorCode::NotFound, format!("{name} not found")))
}

fn required_child<'a>(parent: &'a Property, name: &str) -> Result<&'a Property, CoreError> {
    parent.get(name).ok_or_else(|| {
        CoreError::new(
            CoreErrorCode::Format,
            format!("{} is missing required field {name}", describe(parent)),
        )
    })
}

fn describe(property: &Property) -> &str {
    if property.name.is_empty() {
        "map value"
    } else {
        &property.name
    }
}

fn byte_field(parent: &Property, name: &str) -> Result<u8, CoreError> {
    match required_child(parent, name)?.scalar().map(|s| s.value) {
        Some(ScalarValue::Byte(v)) => Ok(v),
        _ => Err(CoreError::new(
            CoreErrorCode::Format,
            format!("{name} is not a byte property"),
        )),
    }
}

fn int_field(parent: &Property, name: &str) -> Result<i32, CoreError> {
    match required_child(parent, name)?.scalar().map(|s| s.value) {
        Some(ScalarValue::Int(v)) => Ok(v),
        _ => Err(CoreError::new(
            CoreErrorCode::Format,
            format!("{name} is not an int property"),
        )),
    }
}

fn relationships_in(scene: &Property) -> Result<Vec<Relationship>, CoreError> {
    let Some(list) = scene.get(RELATIONSHIPS) else {
        return Ok(Vec::new());
    };
    list.children()
        .into_iter()
        .map(|rel| {
            let name = required_child(rel, RELATIONSHIP_NAME)?
                .as_str()
                .ok_or_else(|| {
                    CoreError::new(
                        CoreErrorCode::Format,
                        format!("{RELATIONSHIP_NAME} is not a string property"),
                    )
                })?;
            Ok(Relationship {
                name: name.to_string(),
                level: byte_field(rel, LEVEL)?,
                growth: byte_field(rel, GROWTH_VALUE)?,
                decay: byte_field(rel, DECAY_VALUE)?,
                growth_changes: int_field(rel, GROWTH_CHANGES)?,
                decay_changes: int_field(rel, DECAY_CHANGES)?,
            })
        })
        .collect()
}

fn find_relationship<'a>(scene: &'a Property, name: &str) -> Result<&'a Property, CoreError> {
    let list = required_child(scene, RELATIONSHIPS)?;
    list.get(name)
        .or_else(|| {
            list.children().into_iter().find(|rel| {
                rel.get(RELATIONSHIP_NAME)
                    .and_then(Property::as_str)
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        })
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::NotFound,
                format!("relationship {name} not found"),
            )
        })
}

fn patch_relationship_in(
    buffer: &mut PatchBuffer,
    scene: &Property,
    relationship: &Relationship,
) -> Result<(), CoreError> {
    let rel = find_relationship(scene, &relationship.name)?;
    let edits = [
        (LEVEL, ScalarValue::Byte(relationship.level)),
        (GROWTH_VALUE, ScalarValue::Byte(relationship.growth)),
        (DECAY_VALUE, ScalarValue::Byte(relationship.decay)),
        (GROWTH_CHANGES, ScalarValue::Int(relationship.growth_changes)),
        (DECAY_CHANGES, ScalarValue::Int(relationship.decay_changes)),
    ];
    for (field, value) in edits {
        buffer.patch_property(required_child(rel, field)?, value)?;
    }
    Ok(())
}

/// `(asset id, fact type, fact id, value)` for every fact in a snapshot.
fn facts_in(scene: &Property) -> Result<Vec<(&str, FactType, &str, FactValue)>, CoreError> {
    let assets = required_child(required_child(scene, FACTS)?, FACT_ASSETS)?
        .as_map()
        .ok_or_else(|| CoreError::new(CoreErrorCode::Format, format!("{FACT_ASSETS} is not a map")))?;

    let mut out = Vec::new();
    for asset in assets.entries() {
        let MapEntryValue::Struct(lists) = &asset.value else {
            continue;
        };
        for fact_type in FactType::all() {
            let Some(map) = lists.get(fact_type.map_name()).and_then(Property::as_map) else {
                continue;
            };
            for entry in map.entries() {
                if let Some(value) = FactValue::from_map_value(fact_type, &entry.value) {
                    out.push((asset.key.as_str(), fact_type, entry.key.as_str(), value));
                }
            }
        }
    }
    Ok(out)
}

fn resolve_definition(
    catalog: &FactCatalog,
    fact_type: FactType,
    asset_id: &str,
    fact_id: &str,
) -> FactDefinition {
    if catalog.is_empty() {
        return FactDefinition::bare(fact_type, asset_id, fact_id);
    }
    catalog
        .find(fact_id, Some(asset_id))
        .cloned()
        .unwrap_or_else(|| FactDefinition::bare(fact_type, asset_id, fact_id))
}

fn patch_fact_in(
    buffer: &mut PatchBuffer,
    scene: &Property,
    fact: &FactDefinition,
    value: FactValue,
) -> Result<bool, CoreError> {
    let assets = required_child(required_child(scene, FACTS)?, FACT_ASSETS)?;
    let Some(lists) = assets.get(&fact.fact_asset_id) else {
        return Ok(false);
    };
    let Some(map_property) = lists.get(fact.fact_type.map_name()) else {
        return Ok(false);
    };
    let has_key = map_property
        .as_map()
        .is_some_and(|map| map.get(&fact.fact_id).is_some());
    if !has_key {
        return Ok(false);
    }
    buffer.patch_map_value(map_property, &fact.fact_id, value.to_scalar())?;
    Ok(true)
}
