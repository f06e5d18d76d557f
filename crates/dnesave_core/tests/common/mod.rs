#![allow(dead_code)]

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

pub const COMPRESSED_MARKER: u64 = 0x590C_6EB5_18E9_B0C3;

/// Writes property streams the way the game serializer lays them out.
pub struct SaveBuilder {
    bytes: Vec<u8>,
}

impl SaveBuilder {
    pub fn new(save_type: &str, version: &str) -> Self {
        let mut b = Self {
            bytes: b"@DNESAV@".to_vec(),
        };
        b.u64(4).string(save_type).u32(1).string(version);
        b
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u32((s.len() + 1) as u32);
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.bytes.resize(self.bytes.len() + n, 0);
        self
    }

    pub fn header(&mut self, name: &str, tag: &str, len: u64) -> &mut Self {
        self.string(name).string(tag).u64(len)
    }

    pub fn int(&mut self, name: &str, v: i32) -> &mut Self {
        self.header(name, "IntProperty", 4).u8(0).i32(v)
    }

    pub fn byte(&mut self, name: &str, v: u8) -> &mut Self {
        self.header(name, "ByteProperty", 1).string("None").u8(0).u8(v)
    }

    pub fn float(&mut self, name: &str, v: f32) -> &mut Self {
        self.header(name, "FloatProperty", 4).u8(0).f32(v)
    }

    pub fn str_prop(&mut self, name: &str, v: &str) -> &mut Self {
        self.header(name, "StrProperty", (v.len() + 5) as u64)
            .u8(0)
            .string(v)
    }

    /// Struct header; follow with fields and [`SaveBuilder::none`].
    pub fn struct_begin(&mut self, name: &str, kind: &str) -> &mut Self {
        self.header(name, "StructProperty", 1).string(kind).zeros(17)
    }

    pub fn none(&mut self) -> &mut Self {
        self.string("None")
    }

    pub fn map_begin(&mut self, name: &str, key_type: &str, value_type: &str, count: u32) -> &mut Self {
        self.header(name, "MapProperty", 1)
            .string(key_type)
            .string(value_type)
            .zeros(5)
            .u32(count)
    }

    pub fn array_begin(&mut self, name: &str, element_type: &str, count: u32) -> &mut Self {
        self.header(name, "ArrayProperty", 1)
            .string(element_type)
            .u8(0)
            .u32(count)
    }
}

pub struct SnapshotState {
    pub section: Option<&'static str>,
    pub level: u8,
    pub growth_changes: i32,
    pub met_autumn: bool,
    pub trust: i32,
}

/// Relationships as a struct array, facts under one asset `A1` with a
/// bool fact `F1` and an int fact `F2`.
fn snapshot_fields(b: &mut SaveBuilder, state: &SnapshotState) {
    if let Some(section) = state.section {
        b.str_prop("Section", section);
    }

    b.array_begin("CharactersRelationships", "StructProperty", 2);
    b.struct_begin("CharactersRelationships", "UNIRelationship");
    relationship(b, "Autumn", state.level, state.growth_changes);
    relationship(b, "Nora", 1, 0);

    b.struct_begin("Facts", "UNIFacts");
    b.map_begin("FactAssets", "NameProperty", "StructProperty", 1);
    b.string("A1");
    b.map_begin("BoolFacts", "NameProperty", "BoolProperty", 1);
    b.string("F1").u8(u8::from(state.met_autumn));
    b.map_begin("IntFacts", "NameProperty", "IntProperty", 1);
    b.string("F2").i32(state.trust);
    b.none();
    b.none();

    b.none();
}

fn relationship(b: &mut SaveBuilder, name: &str, level: u8, growth_changes: i32) {
    b.str_prop("RelationshipName", name);
    b.byte("Level", level);
    b.byte("GrowthValue", 2);
    b.byte("DecayValue", 0);
    b.int("GrowthChangesCount", growth_changes);
    b.int("DecayChangesCount", 0);
    b.none();
}

/// Two scene snapshots and the current snapshot, plus a couple of plain
/// top-level properties.
pub fn story_save() -> Vec<u8> {
    let mut b = SaveBuilder::new("DNESaveGame", "5.3.2");
    b.int("SaveSlot", 3);
    b.float("PlayTime", 1234.5);

    b.map_begin("SceneSnapshots", "NameProperty", "StructProperty", 2);
    b.string("S1000_10");
    snapshot_fields(
        &mut b,
        &SnapshotState {
            section: Some("S1000_10"),
            level: 1,
            growth_changes: 3,
            met_autumn: false,
            trust: 5,
        },
    );
    b.string("S1100_10");
    snapshot_fields(
        &mut b,
        &SnapshotState {
            section: Some("S1100_10"),
            level: 2,
            growth_changes: 4,
            met_autumn: true,
            trust: 5,
        },
    );

    b.struct_begin("CurrentSnapshot", "UNISnapshot");
    snapshot_fields(
        &mut b,
        &SnapshotState {
            section: None,
            level: 3,
            growth_changes: 6,
            met_autumn: true,
            trust: 7,
        },
    );

    b.none().u32(0).u32(0);
    b.finish()
}

/// Repack a raw save the way the compressed container stores it.
pub fn compress(raw: &[u8]) -> Vec<u8> {
    let body = &raw[8..];
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    let packed = encoder.finish().unwrap();

    let mut out = b"@DNESAV@".to_vec();
    out.extend_from_slice(&COMPRESSED_MARKER.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
    out.extend_from_slice(&packed);
    out
}
