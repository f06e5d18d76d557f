use std::fmt::Write as _;

use dnesave_core::container::SaveContainer;
use dnesave_core::core_api::{
    FactTimeline, FactValue, SaveSummary, SceneRelationships, Session,
};
use dnesave_core::facts::scenes::{GLOBAL_SCENE_KEY, previous_scene_label, scene_display_name};
use dnesave_core::facts::{FactDefinition, FactType};
use dnesave_core::property::{
    ArrayElements, MapEntry, MapEntryValue, MapValue, Property, PropertyKind, Scalar,
    ScalarValue, StructPayload, StructValue, hex,
};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

const INDENT_WIDTH: usize = 4;
const RELATIONSHIP_NAME_WIDTH: usize = 37;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeRenderOptions {
    /// Append `{OFFSET:LEN}` to every offset-tracked value.
    pub offsets: bool,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn render_summary_text(session: &Session) -> String {
    let summary = session.summary();
    let mut out = String::new();
    writeln!(out, "{}", summary.save_data_type).expect("writing to String cannot fail");
    writeln!(out, "Engine ver.: {}", summary.engine_version)
        .expect("writing to String cannot fail");
    writeln!(out, "Header value: {}", summary.header_value).expect("writing to String cannot fail");
    writeln!(
        out,
        "Encoding: {:?} ({} bytes uncompressed)",
        summary.encoding, summary.uncompressed_len
    )
    .expect("writing to String cannot fail");
    writeln!(out, "Properties: {}", summary.property_count).expect("writing to String cannot fail");
    if summary.scene_ids.is_empty() {
        writeln!(out, "Scenes: none").expect("writing to String cannot fail");
    } else {
        writeln!(out, "Scenes: {}", summary.scene_ids.len())
            .expect("writing to String cannot fail");
        for id in &summary.scene_ids {
            writeln!(out, "  {id:<10} {}", scene_display_name(id).unwrap_or("?"))
                .expect("writing to String cannot fail");
        }
    }
    out
}

pub fn render_summary_json(session: &Session) -> JsonValue {
    summary_to_json(&session.summary())
}

fn summary_to_json(summary: &SaveSummary) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert(
        "save_data_type".to_string(),
        JsonValue::String(summary.save_data_type.clone()),
    );
    out.insert(
        "engine_version".to_string(),
        JsonValue::String(summary.engine_version.clone()),
    );
    out.insert("header_value".to_string(), json!(summary.header_value));
    out.insert(
        "encoding".to_string(),
        JsonValue::String(format!("{:?}", summary.encoding)),
    );
    out.insert(
        "uncompressed_len".to_string(),
        json!(summary.uncompressed_len),
    );
    out.insert("property_count".to_string(), json!(summary.property_count));
    out.insert("scene_ids".to_string(), json!(summary.scene_ids));
    JsonValue::Object(out)
}

// ---------------------------------------------------------------------------
// Property tree
// ---------------------------------------------------------------------------

pub fn render_tree_text(container: &SaveContainer, options: TreeRenderOptions) -> String {
    let mut out = String::new();
    writeln!(out, "{}", container.save_data_type()).expect("writing to String cannot fail");
    writeln!(out, "Engine ver.: {}", container.engine_version())
        .expect("writing to String cannot fail");
    out.push('\n');
    for property in container.properties() {
        write_property(&mut out, property, 0, options);
    }
    out
}

fn pad(indent: usize) -> String {
    " ".repeat(indent)
}

fn scalar_text(scalar: &Scalar, options: TreeRenderOptions) -> String {
    match &scalar.opaque {
        Some(raw) => format!("[raw {}]", hex(raw)),
        None if options.offsets => format!(
            "{} {{{:08X}:{}}}",
            scalar.value, scalar.value_offset, scalar.value_length
        ),
        None => scalar.value.to_string(),
    }
}

const TICKS_PER_SECOND: u64 = 10_000_000;
const SECONDS_PER_DAY: u64 = 86_400;
/// Days from 0000-03-01 to 0001-01-01 in the proleptic Gregorian calendar.
const MARCH_EPOCH_SHIFT: u64 = 306;

/// `yyyy-MM-dd HH:mm:ss` for 100ns ticks counted from 0001-01-01.
fn format_ticks(ticks: u64) -> String {
    let seconds = ticks / TICKS_PER_SECOND;
    let (days, secs_of_day) = (seconds / SECONDS_PER_DAY, seconds % SECONDS_PER_DAY);

    // Civil-from-days over 400-year eras with years starting in March.
    let z = days + MARCH_EPOCH_SHIFT;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        secs_of_day / 3600,
        secs_of_day / 60 % 60,
        secs_of_day % 60
    )
}

/// Registry GUID form: the first three groups are little-endian words.
fn format_guid(bytes: &[u8]) -> String {
    let Ok(b) = <[u8; 16]>::try_from(bytes) else {
        return hex(bytes);
    };
    format!(
        "{:08x}-{:04x}-{:04x}-{}-{}",
        u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        u16::from_le_bytes([b[4], b[5]]),
        u16::from_le_bytes([b[6], b[7]]),
        hex(&b[8..10]).to_lowercase(),
        hex(&b[10..]).to_lowercase()
    )
}

fn write_property(
    out: &mut String,
    property: &Property,
    indent: usize,
    options: TreeRenderOptions,
) {
    let lead = pad(indent);
    let label = format!("{} {}", property.type_tag, property.name);
    match &property.kind {
        PropertyKind::Scalar(scalar) => {
            writeln!(out, "{lead}{label} = {}", scalar_text(scalar, options))
                .expect("writing to String cannot fail");
        }
        PropertyKind::Str(value) | PropertyKind::Name(value) => {
            writeln!(out, "{lead}{label} = {value}").expect("writing to String cannot fail");
        }
        PropertyKind::Enum { enum_type, value } => {
            writeln!(out, "{lead}{label} = {value} [type: {enum_type}]")
                .expect("writing to String cannot fail");
        }
        PropertyKind::Struct(value) => {
            let head = if property.name.is_empty() {
                String::new()
            } else {
                format!("{label} = ")
            };
            write_struct(out, &lead, &head, &property.name, value, indent, options);
        }
        PropertyKind::Array(array) => {
            writeln!(out, "{lead}{label} = {} [", array.element_type)
                .expect("writing to String cannot fail");
            let inner = pad(indent + INDENT_WIDTH);
            match &array.elements {
                ArrayElements::Int(values) => {
                    for v in values {
                        writeln!(out, "{inner}{v}").expect("writing to String cannot fail");
                    }
                }
                ArrayElements::Name(values) => {
                    for v in values {
                        writeln!(out, "{inner}{v}").expect("writing to String cannot fail");
                    }
                }
                ArrayElements::Struct(elements) => {
                    for element in elements {
                        write_property(out, element, indent + INDENT_WIDTH, options);
                    }
                }
                ArrayElements::Empty => {}
            }
            writeln!(out, "{lead}]").expect("writing to String cannot fail");
        }
        PropertyKind::Map(map) => {
            writeln!(out, "{lead}{label} = ({},{}) [", map.key_type, map.value_type)
                .expect("writing to String cannot fail");
            for entry in map.entries() {
                write_map_entry(out, map, entry, indent + INDENT_WIDTH, options);
            }
            writeln!(out, "{lead}]").expect("writing to String cannot fail");
        }
        PropertyKind::None { .. } => {
            writeln!(out, "{lead}NONE").expect("writing to String cannot fail");
        }
    }
}

fn write_struct(
    out: &mut String,
    pad: &str,
    head: &str,
    name: &str,
    value: &StructValue,
    indent: usize,
    options: TreeRenderOptions,
) {
    match &value.payload {
        StructPayload::Fields(fields) => {
            writeln!(out, "{pad}{head}struct {} {{", value.struct_kind)
                .expect("writing to String cannot fail");
            for field in fields {
                write_property(out, field, indent + INDENT_WIDTH, options);
            }
            writeln!(out, "{pad}}}").expect("writing to String cannot fail");
        }
        StructPayload::DateTime(scalar) => {
            let text = match scalar.value {
                ScalarValue::UInt64(ticks) if scalar.opaque.is_none() && !options.offsets => {
                    format_ticks(ticks)
                }
                _ => scalar_text(scalar, options),
            };
            writeln!(out, "{pad}DateTime {name} = {text}").expect("writing to String cannot fail");
        }
        StructPayload::Color(bytes) => {
            writeln!(out, "{pad}Color {name} = #{}", hex(bytes))
                .expect("writing to String cannot fail");
        }
        StructPayload::Guid(bytes) => {
            writeln!(out, "{pad}Guid {name} = {}", format_guid(bytes))
                .expect("writing to String cannot fail");
        }
        StructPayload::Opaque(bytes) => {
            let spaced: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
            writeln!(
                out,
                "{pad}{head}[unknown {}] {}",
                value.struct_kind,
                spaced.join(" ")
            )
            .expect("writing to String cannot fail");
        }
    }
}

fn write_map_entry(
    out: &mut String,
    map: &MapValue,
    entry: &MapEntry,
    indent: usize,
    options: TreeRenderOptions,
) {
    let lead = pad(indent);
    match &entry.value {
        MapEntryValue::Struct(property) => {
            let mut nested = String::new();
            write_property(&mut nested, property, indent, options);
            write!(out, "{lead}{} = {}", entry.key, nested.trim_start())
                .expect("writing to String cannot fail");
        }
        MapEntryValue::Name(value) => {
            writeln!(out, "{lead}{} = {value}", entry.key).expect("writing to String cannot fail");
        }
        other => {
            let value = other.as_scalar().map(|v| v.to_string()).unwrap_or_default();
            match (options.offsets, entry.value_offset, map.value_length) {
                (true, Some(offset), Some(length)) => {
                    writeln!(out, "{lead}{} = {value} {{{offset:08X}:{length}}}", entry.key)
                        .expect("writing to String cannot fail");
                }
                _ => {
                    writeln!(out, "{lead}{} = {value}", entry.key)
                        .expect("writing to String cannot fail");
                }
            }
        }
    }
}

pub fn render_tree_json(container: &SaveContainer) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert(
        "save_data_type".to_string(),
        JsonValue::String(container.save_data_type().to_string()),
    );
    out.insert(
        "engine_version".to_string(),
        JsonValue::String(container.engine_version().to_string()),
    );
    out.insert("header_value".to_string(), json!(container.header_value()));
    out.insert(
        "properties".to_string(),
        JsonValue::Array(container.properties().iter().map(property_to_json).collect()),
    );
    JsonValue::Object(out)
}

pub fn property_to_json(property: &Property) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("name".to_string(), JsonValue::String(property.name.clone()));
    out.insert(
        "type".to_string(),
        JsonValue::String(property.type_tag.clone()),
    );
    out.insert(
        "declared_length".to_string(),
        json!(property.declared_length),
    );

    match &property.kind {
        PropertyKind::Scalar(scalar) => insert_scalar(&mut out, scalar),
        PropertyKind::Str(value) | PropertyKind::Name(value) => {
            out.insert("value".to_string(), JsonValue::String(value.clone()));
        }
        PropertyKind::Enum { enum_type, value } => {
            out.insert("enum_type".to_string(), JsonValue::String(enum_type.clone()));
            out.insert("value".to_string(), JsonValue::String(value.clone()));
        }
        PropertyKind::Struct(value) => {
            out.insert(
                "struct_kind".to_string(),
                JsonValue::String(value.struct_kind.clone()),
            );
            match &value.payload {
                StructPayload::Fields(fields) => {
                    out.insert(
                        "fields".to_string(),
                        JsonValue::Array(fields.iter().map(property_to_json).collect()),
                    );
                }
                StructPayload::DateTime(scalar) => insert_scalar(&mut out, scalar),
                StructPayload::Color(bytes)
                | StructPayload::Guid(bytes)
                | StructPayload::Opaque(bytes) => {
                    out.insert("raw".to_string(), JsonValue::String(hex(bytes)));
                }
            }
        }
        PropertyKind::Array(array) => {
            out.insert(
                "element_type".to_string(),
                JsonValue::String(array.element_type.clone()),
            );
            let elements = match &array.elements {
                ArrayElements::Int(values) => json!(values),
                ArrayElements::Name(values) => json!(values),
                ArrayElements::Struct(elements) => {
                    JsonValue::Array(elements.iter().map(property_to_json).collect())
                }
                ArrayElements::Empty => JsonValue::Array(Vec::new()),
            };
            out.insert("elements".to_string(), elements);
        }
        PropertyKind::Map(map) => {
            out.insert("key_type".to_string(), JsonValue::String(map.key_type.clone()));
            out.insert(
                "value_type".to_string(),
                JsonValue::String(map.value_type.clone()),
            );
            out.insert("value_length".to_string(), json!(map.value_length));
            let entries = map
                .entries()
                .iter()
                .map(|entry| {
                    let mut e = JsonMap::new();
                    e.insert("key".to_string(), JsonValue::String(entry.key.clone()));
                    let value = match &entry.value {
                        MapEntryValue::Struct(property) => property_to_json(property),
                        MapEntryValue::Name(v) => JsonValue::String(v.clone()),
                        other => other
                            .as_scalar()
                            .map(scalar_value_json)
                            .unwrap_or(JsonValue::Null),
                    };
                    e.insert("value".to_string(), value);
                    e.insert("offset".to_string(), json!(entry.value_offset));
                    JsonValue::Object(e)
                })
                .collect();
            out.insert("entries".to_string(), JsonValue::Array(entries));
        }
        PropertyKind::None { reserved } => {
            out.insert("reserved".to_string(), json!(reserved));
        }
    }

    JsonValue::Object(out)
}

fn insert_scalar(out: &mut JsonMap<String, JsonValue>, scalar: &Scalar) {
    out.insert("value".to_string(), scalar_value_json(scalar.value));
    out.insert("offset".to_string(), json!(scalar.value_offset));
    out.insert("length".to_string(), json!(scalar.value_length));
    if let Some(raw) = &scalar.opaque {
        out.insert("raw".to_string(), JsonValue::String(hex(raw)));
    }
}

fn scalar_value_json(value: ScalarValue) -> JsonValue {
    match value {
        ScalarValue::Bool(v) => json!(v),
        ScalarValue::Byte(v) => json!(v),
        ScalarValue::Int(v) => json!(v),
        ScalarValue::UInt32(v) => json!(v),
        ScalarValue::Int64(v) => json!(v),
        ScalarValue::Float(v) => json!(v),
        ScalarValue::UInt64(v) => json!(v),
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

fn scene_title(scene: &str) -> &str {
    if scene == GLOBAL_SCENE_KEY {
        return "Global Scene";
    }
    scene_display_name(scene).unwrap_or(scene)
}

pub fn render_relationships_text(scenes: &[SceneRelationships]) -> String {
    let mut out = String::new();
    for scene in scenes {
        writeln!(out, "Scene: {} ({})", scene_title(&scene.scene), scene.scene)
            .expect("writing to String cannot fail");
        if scene.relationships.is_empty() {
            writeln!(out, "\tno relationships").expect("writing to String cannot fail");
        }
        for rel in &scene.relationships {
            writeln!(
                out,
                "\t{:<width$}: level {} (growth: {} [{}x]; decay: {} [{}x])",
                rel.name,
                rel.level,
                rel.growth,
                rel.growth_changes,
                rel.decay,
                rel.decay_changes,
                width = RELATIONSHIP_NAME_WIDTH
            )
            .expect("writing to String cannot fail");
        }
        out.push('\n');
    }
    out
}

pub fn render_relationships_json(scenes: &[SceneRelationships]) -> JsonValue {
    let mut out = JsonMap::new();
    for scene in scenes {
        let rels = scene
            .relationships
            .iter()
            .map(|rel| {
                json!({
                    "name": rel.name,
                    "level": rel.level,
                    "growth": rel.growth,
                    "decay": rel.decay,
                    "growth_changes": rel.growth_changes,
                    "decay_changes": rel.decay_changes,
                })
            })
            .collect();
        out.insert(scene.scene.clone(), JsonValue::Array(rels));
    }
    JsonValue::Object(out)
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Display a fact value, naming enum values when the definition knows them.
pub fn fact_value_text(fact: &FactDefinition, value: FactValue) -> String {
    match value {
        FactValue::Enum(n) if fact.fact_type == FactType::Enum => match fact.enum_value(n) {
            Some(named) => format!("{} [{}]", named.name, named.numerical),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Where a fact was first set and every scene in which it changed.
pub fn render_fact_history(timeline: &FactTimeline, include_header: bool) -> String {
    let mut out = String::new();
    if include_header {
        writeln!(out, "Fact {} -> {}", timeline.fact.label(), timeline.fact.fact_type)
            .expect("writing to String cannot fail");
    }

    let mut last: Option<FactValue> = None;
    for entry in &timeline.values {
        let scene = previous_scene_label(&entry.scene);
        let text = fact_value_text(&timeline.fact, entry.value);
        match last {
            None => {
                writeln!(out, "\tFirst Set in Scene {scene} -> {text}")
                    .expect("writing to String cannot fail");
            }
            Some(previous) if previous != entry.value => {
                writeln!(out, "\tModified in Scene {scene} -> {text}")
                    .expect("writing to String cannot fail");
            }
            Some(_) => {}
        }
        last = Some(entry.value);
    }
    out
}

pub fn render_facts_text(timelines: &[FactTimeline]) -> String {
    let mut out = String::new();
    for timeline in timelines {
        out.push_str(&render_fact_history(timeline, true));
        out.push('\n');
    }
    out
}

pub fn render_facts_json(timelines: &[FactTimeline]) -> JsonValue {
    let facts = timelines
        .iter()
        .map(|timeline| {
            let fact = &timeline.fact;
            let mut out = JsonMap::new();
            out.insert("asset_id".to_string(), JsonValue::String(fact.fact_asset_id.clone()));
            out.insert("fact_id".to_string(), JsonValue::String(fact.fact_id.clone()));
            out.insert("asset_name".to_string(), json!(fact.fact_asset_name));
            out.insert("name".to_string(), json!(fact.fact_name));
            out.insert("type".to_string(), JsonValue::String(fact.fact_type.to_string()));
            let values = timeline
                .values
                .iter()
                .map(|v| {
                    json!({
                        "scene": v.scene,
                        "value": fact_value_json(v.value),
                        "display": fact_value_text(fact, v.value),
                    })
                })
                .collect();
            out.insert("values".to_string(), JsonValue::Array(values));
            JsonValue::Object(out)
        })
        .collect();
    JsonValue::Array(facts)
}

fn fact_value_json(value: FactValue) -> JsonValue {
    match value {
        FactValue::Int(v) => json!(v),
        FactValue::Float(v) => json!(v),
        FactValue::Bool(v) => json!(v),
        FactValue::Enum(v) => json!(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date_struct(ticks: u64) -> StructValue {
        StructValue {
            struct_kind: "DateTime".to_string(),
            header: vec![0; 17],
            payload: StructPayload::DateTime(Scalar {
                value: ScalarValue::UInt64(ticks),
                value_offset: 0x40,
                value_length: 8,
                opaque: None,
            }),
        }
    }

    #[test]
    fn ticks_format_as_calendar_dates() {
        assert_eq!(format_ticks(0), "0001-01-01 00:00:00");
        assert_eq!(format_ticks(638_000_000_000_000_000), "2022-09-28 22:13:20");
        assert_eq!(format_ticks(638_448_479_999_999_999), "2024-02-29 23:59:59");
        assert_eq!(format_ticks(3_155_378_975_999_999_999), "9999-12-31 23:59:59");
    }

    #[test]
    fn datetime_shows_date_unless_offsets_are_requested() {
        let value = date_struct(638_000_000_000_000_000);

        let mut out = String::new();
        write_struct(&mut out, "", "", "SavedAt", &value, 0, TreeRenderOptions::default());
        assert_eq!(out, "DateTime SavedAt = 2022-09-28 22:13:20\n");

        let mut out = String::new();
        write_struct(&mut out, "", "", "SavedAt", &value, 0, TreeRenderOptions { offsets: true });
        assert_eq!(out, "DateTime SavedAt = 638000000000000000 {00000040:8}\n");
    }

    #[test]
    fn guid_uses_registry_form() {
        let bytes: Vec<u8> = (0..16).collect();
        assert_eq!(format_guid(&bytes), "03020100-0504-0706-0809-0a0b0c0d0e0f");
        assert_eq!(format_guid(&[0xAB, 0xCD]), "ABCD");
    }
}
