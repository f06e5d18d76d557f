use std::collections::HashSet;
use std::io::{self, Read, Seek};

use log::warn;

use crate::property::{
    ArrayElements, ArrayValue, MapEntry, MapEntryValue, MapValue, NONE_NAME, Property,
    PropertyKind, PropertyType, Scalar, ScalarValue, StructPayload, StructValue,
    composite_key_string,
};
use crate::reader::LittleEndianReader;

pub const STRUCT_HEADER_LEN: usize = 0x11;
/// Map key slots whose leading u32 is below this are length-prefixed
/// strings; anything else is a 16-byte GUID.
pub const GUID_KEY_THRESHOLD: u32 = 256;
pub const DEFAULT_COMPOSITE_STRUCT_PREFIX: &str = "UNI";

const DATETIME_LEN: u64 = 8;
const COLOR_LEN: u64 = 4;
const GUID_LEN: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Struct kinds starting with this prefix are decoded as field lists;
    /// other unrecognized kinds are kept as raw bytes.
    pub composite_struct_prefix: String,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            composite_struct_prefix: DEFAULT_COMPOSITE_STRUCT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapValueKind {
    Name,
    Struct,
    Bool,
    Byte,
    Int,
    Float,
}

impl MapValueKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match PropertyType::from_tag(tag)? {
            PropertyType::Name => Some(Self::Name),
            PropertyType::Struct => Some(Self::Struct),
            PropertyType::Bool => Some(Self::Bool),
            PropertyType::Byte => Some(Self::Byte),
            PropertyType::Int => Some(Self::Int),
            PropertyType::Float => Some(Self::Float),
            _ => None,
        }
    }

    fn value_length(&self) -> Option<u64> {
        match self {
            Self::Bool | Self::Byte => Some(1),
            Self::Int | Self::Float => Some(4),
            Self::Name | Self::Struct => None,
        }
    }
}

/// Recursive-descent decoder over a little-endian property stream.
///
/// Offsets recorded in the produced tree are absolute positions in the
/// underlying stream, so the decoder must run over the complete
/// uncompressed file image starting at byte 0.
pub struct PropertyDecoder<R> {
    r: LittleEndianReader<R>,
    options: DecodeOptions,
    warned_struct_kinds: HashSet<String>,
}

impl<R: Read + Seek> PropertyDecoder<R> {
    pub fn new(inner: R, options: DecodeOptions) -> Self {
        Self {
            r: LittleEndianReader::new(inner),
            options,
            warned_struct_kinds: HashSet::new(),
        }
    }

    pub fn reader(&mut self) -> &mut LittleEndianReader<R> {
        &mut self.r
    }

    pub fn warned_struct_kinds(&self) -> &HashSet<String> {
        &self.warned_struct_kinds
    }

    /// Decode properties until the end of the stream. Explicit `None`
    /// sentinels are consumed but not returned.
    pub fn decode_until_end(&mut self) -> io::Result<Vec<Property>> {
        let mut out = Vec::new();
        while !self.r.at_end()? {
            match self.decode_property(false, None)? {
                Some(property) if !property.is_none_sentinel() => out.push(property),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Decode one property.
    ///
    /// Returns `Ok(None)` when the name is `None` and the caller is inside a
    /// terminated list; the trailing reserved words are not read in that
    /// case. `forced_name` supplies a name that was already consumed by the
    /// caller.
    pub fn decode_property(
        &mut self,
        expect_none_terminator: bool,
        forced_name: Option<String>,
    ) -> io::Result<Option<Property>> {
        let start = self.r.position()?;
        let name = match forced_name {
            Some(name) => name,
            None => self.r.read_length_prefixed_string()?,
        };

        if name == NONE_NAME {
            if expect_none_terminator {
                return Ok(None);
            }
            let first = self.r.read_u32()?;
            let second = if self.r.at_end()? {
                0
            } else {
                self.r.read_u32()?
            };
            return Ok(Some(Property {
                name,
                type_tag: String::new(),
                declared_length: 0,
                kind: PropertyKind::None {
                    reserved: [first, second],
                },
            }));
        }

        let type_tag = self.r.read_length_prefixed_string()?;
        let declared_length = self.r.read_u64()?;

        let Some(property_type) = PropertyType::from_tag(&type_tag) else {
            warn!("unknown type {type_tag} of field {name} @ 0x{start:X}");
            return Err(invalid_data(format!(
                "unsupported property type {type_tag:?} for field {name:?} at 0x{start:X}"
            )));
        };

        let kind = match property_type {
            PropertyType::Name => {
                self.r.read_reserved(1)?;
                PropertyKind::Name(self.r.read_length_prefixed_string()?)
            }
            PropertyType::Str => {
                self.r.read_reserved(1)?;
                PropertyKind::Str(self.r.read_length_prefixed_string()?)
            }
            PropertyType::Enum => self.decode_enum(declared_length)?,
            PropertyType::Bool
            | PropertyType::Byte
            | PropertyType::Int
            | PropertyType::UInt32
            | PropertyType::Int64
            | PropertyType::Float => {
                PropertyKind::Scalar(self.decode_scalar(property_type, &name, declared_length)?)
            }
            PropertyType::Struct => PropertyKind::Struct(self.decode_struct(&name, declared_length)?),
            PropertyType::Map => PropertyKind::Map(self.decode_map(&name)?),
            PropertyType::Array => PropertyKind::Array(self.decode_array(&name)?),
        };

        Ok(Some(Property {
            name,
            type_tag,
            declared_length,
            kind,
        }))
    }

    /// Decode a `None`-terminated field list. `header_only` skips the list
    /// entirely; the format marks some empty structs with a zero length.
    pub fn decode_struct_fields(
        &mut self,
        header_only: bool,
        first_name: Option<String>,
    ) -> io::Result<Vec<Property>> {
        let mut fields = Vec::new();
        if header_only {
            return Ok(fields);
        }

        let mut forced = first_name;
        while let Some(field) = self.decode_property(true, forced.take())? {
            fields.push(field);
        }
        Ok(fields)
    }

    fn decode_enum(&mut self, declared_length: u64) -> io::Result<PropertyKind> {
        let enum_type = self.r.read_length_prefixed_string()?;
        self.r.read_reserved(1)?;
        let data = self.r.read_bytes(to_len(declared_length)?)?;
        let value = data
            .get(4..)
            .map(|tail| String::from_utf8_lossy(tail).trim_end_matches('\0').to_string())
            .unwrap_or_default();
        Ok(PropertyKind::Enum { enum_type, value })
    }

    fn decode_scalar(
        &mut self,
        property_type: PropertyType,
        name: &str,
        declared_length: u64,
    ) -> io::Result<Scalar> {
        match property_type {
            PropertyType::Bool => {
                let offset = self.r.position()?;
                let raw = self.r.read_u8()?;
                if raw > 1 {
                    warn!("BoolProperty {name} @ 0x{offset:X}: unexpected bool value {raw:02X}");
                }
                self.r.read_reserved(1)?;
                Ok(tracked(ScalarValue::Bool(raw != 0), offset))
            }
            PropertyType::Byte => {
                let enum_name = self.r.read_length_prefixed_string()?;
                if declared_length == 1 && enum_name != NONE_NAME {
                    warn!("ByteProperty {name} with length 1 names enum {enum_name:?}, expected None");
                }
                self.r.read_reserved(1)?;
                if declared_length != 1 {
                    return self.opaque_scalar(name, property_type, declared_length);
                }
                let offset = self.r.position()?;
                Ok(tracked(ScalarValue::Byte(self.r.read_u8()?), offset))
            }
            _ => {
                self.r.read_reserved(1)?;
                if Some(declared_length) != property_type.native_width() {
                    return self.opaque_scalar(name, property_type, declared_length);
                }
                let offset = self.r.position()?;
                let value = match property_type {
                    PropertyType::Int => ScalarValue::Int(self.r.read_i32()?),
                    PropertyType::UInt32 => ScalarValue::UInt32(self.r.read_u32()?),
                    PropertyType::Int64 => ScalarValue::Int64(self.r.read_i64()?),
                    PropertyType::Float => ScalarValue::Float(self.r.read_f32()?),
                    other => {
                        return Err(invalid_data(format!(
                            "{} is not a fixed-width scalar",
                            other.tag()
                        )));
                    }
                };
                Ok(tracked(value, offset))
            }
        }
    }

    /// Consume `declared_length` bytes for a scalar whose declared size does
    /// not match its type. Keeps the stream aligned; the value is lost.
    fn opaque_scalar(
        &mut self,
        name: &str,
        property_type: PropertyType,
        declared_length: u64,
    ) -> io::Result<Scalar> {
        let offset = self.r.position()?;
        let value = default_value(property_type);
        warn!(
            "{} {name} @ 0x{offset:X}: declared length {declared_length} != native width {}; keeping raw bytes",
            property_type.tag(),
            value.width()
        );
        let raw = self.r.read_bytes(to_len(declared_length)?)?;
        Ok(Scalar {
            value,
            value_offset: offset,
            value_length: value.width(),
            opaque: Some(raw),
        })
    }

    fn decode_struct(&mut self, name: &str, declared_length: u64) -> io::Result<StructValue> {
        let struct_kind = self.r.read_length_prefixed_string()?;
        let header = self.r.read_bytes(STRUCT_HEADER_LEN)?;

        let payload = match struct_kind.as_str() {
            "DateTime" => {
                let offset = self.r.position()?;
                if declared_length != DATETIME_LEN {
                    warn!("DateTime {name} @ 0x{offset:X}: length {declared_length} != 8");
                    let raw = self.r.read_bytes(to_len(declared_length)?)?;
                    StructPayload::DateTime(Scalar {
                        value: ScalarValue::UInt64(0),
                        value_offset: offset,
                        value_length: DATETIME_LEN,
                        opaque: Some(raw),
                    })
                } else {
                    StructPayload::DateTime(tracked(ScalarValue::UInt64(self.r.read_u64()?), offset))
                }
            }
            "Color" => {
                if declared_length != COLOR_LEN {
                    warn!("Color {name}: length {declared_length} != 4");
                }
                StructPayload::Color(self.r.read_bytes(to_len(declared_length)?)?)
            }
            "Guid" => {
                if declared_length != GUID_LEN {
                    warn!("Guid {name}: length {declared_length} != 16");
                }
                StructPayload::Guid(self.r.read_bytes(to_len(declared_length)?)?)
            }
            kind if !kind.starts_with(&self.options.composite_struct_prefix) => {
                if self.warned_struct_kinds.insert(kind.to_string()) {
                    warn!("no special handling for struct type {kind}; keeping raw bytes");
                }
                StructPayload::Opaque(self.r.read_bytes(to_len(declared_length)?)?)
            }
            _ => StructPayload::Fields(self.decode_struct_fields(declared_length == 0, None)?),
        };

        Ok(StructValue {
            struct_kind,
            header,
            payload,
        })
    }

    fn decode_map(&mut self, name: &str) -> io::Result<MapValue> {
        let key_type = self.r.read_length_prefixed_string()?;
        let value_type = self.r.read_length_prefixed_string()?;
        self.r.read_reserved(1)?;
        self.r.read_reserved(4)?;
        let count = self.r.read_u32()?;

        let struct_keyed = key_type == PropertyType::Struct.tag();
        if !struct_keyed && key_type != PropertyType::Name.tag() {
            warn!("map {name}: unexpected key type {key_type}");
        }

        let mut map = MapValue::new(key_type, value_type);
        let Some(value_kind) = MapValueKind::from_tag(&map.value_type) else {
            if count == 0 {
                warn!(
                    "map {name}: unsupported value type {} with no entries; ignoring",
                    map.value_type
                );
                return Ok(map);
            }
            return Err(invalid_data(format!(
                "map {name}: unsupported value type {} with {count} entries",
                map.value_type
            )));
        };
        map.value_length = value_kind.value_length();

        for _ in 0..count {
            let key = self.decode_map_key(struct_keyed)?;
            let offset = self.r.position()?;
            let value = match value_kind {
                MapValueKind::Name => MapEntryValue::Name(self.r.read_length_prefixed_string()?),
                MapValueKind::Struct => {
                    let fields = self.decode_struct_fields(false, None)?;
                    MapEntryValue::Struct(Property {
                        name: String::new(),
                        type_tag: String::new(),
                        declared_length: 0,
                        kind: PropertyKind::Struct(StructValue {
                            struct_kind: format!("c{name}"),
                            header: Vec::new(),
                            payload: StructPayload::Fields(fields),
                        }),
                    })
                }
                MapValueKind::Bool => {
                    let raw = self.r.read_u8()?;
                    if raw > 1 {
                        warn!("map {name} @ 0x{offset:X}: unexpected bool value {raw:02X}");
                    }
                    MapEntryValue::Bool(raw != 0)
                }
                MapValueKind::Byte => MapEntryValue::Byte(self.r.read_u8()?),
                MapValueKind::Int => MapEntryValue::Int(self.r.read_i32()?),
                MapValueKind::Float => MapEntryValue::Float(self.r.read_f32()?),
            };

            let duplicate = map.insert(MapEntry {
                key,
                value,
                value_offset: Some(offset),
            });
            if duplicate {
                warn!("map {name}: duplicate key at 0x{offset:X}; keeping the later value");
            }
        }

        Ok(map)
    }

    fn decode_map_key(&mut self, struct_keyed: bool) -> io::Result<String> {
        let leading = self.r.peek_u32()?;
        if leading >= GUID_KEY_THRESHOLD {
            return self.read_guid_string();
        }

        let key = self.r.read_length_prefixed_string()?;
        if !struct_keyed {
            return Ok(key);
        }
        // For struct keys the string just read is the first field name.
        let fields = self.decode_struct_fields(false, Some(key))?;
        Ok(composite_key_string(&fields))
    }

    fn read_guid_string(&mut self) -> io::Result<String> {
        let a = self.r.read_u32()?;
        let b = self.r.read_u32()?;
        let c = self.r.read_u32()?;
        let d = self.r.read_u32()?;
        Ok(format!("{a:08X}-{b:08X}-{c:08X}-{d:08X}"))
    }

    fn decode_array(&mut self, name: &str) -> io::Result<ArrayValue> {
        let element_type = self.r.read_length_prefixed_string()?;
        self.r.read_reserved(1)?;
        let count = self.r.read_u32()? as usize;

        let elements = match PropertyType::from_tag(&element_type) {
            Some(PropertyType::Struct) => ArrayElements::Struct(self.decode_struct_elements(name, count)?),
            Some(PropertyType::Int) => {
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(self.r.read_i32()?);
                }
                ArrayElements::Int(values)
            }
            Some(PropertyType::Name) => {
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(self.r.read_length_prefixed_string()?);
                }
                ArrayElements::Name(values)
            }
            _ if count == 0 => {
                warn!("array {name}: unsupported element type {element_type} with no elements; ignoring");
                ArrayElements::Empty
            }
            _ => {
                return Err(invalid_data(format!(
                    "array {name}: unsupported element type {element_type} with {count} elements"
                )));
            }
        };

        Ok(ArrayValue {
            element_type,
            elements,
        })
    }

    /// The first element carries the full struct header; the rest share it
    /// and only contribute their field lists.
    fn decode_struct_elements(&mut self, name: &str, count: usize) -> io::Result<Vec<Property>> {
        let mut elements: Vec<Property> = Vec::with_capacity(count.min(4096));
        while elements.len() < count {
            let template = elements.last().and_then(|last| match &last.kind {
                PropertyKind::Struct(value) if matches!(value.payload, StructPayload::Fields(_)) => {
                    Some((
                        (last.name.clone(), last.type_tag.clone(), last.declared_length),
                        value.struct_kind.clone(),
                        value.header.clone(),
                    ))
                }
                _ => None,
            });

            let next = match template {
                Some(((element_name, type_tag, declared_length), struct_kind, header)) => {
                    let fields = self.decode_struct_fields(false, None)?;
                    Some(Property {
                        name: element_name,
                        type_tag,
                        declared_length,
                        kind: PropertyKind::Struct(StructValue {
                            struct_kind,
                            header,
                            payload: StructPayload::Fields(fields),
                        }),
                    })
                }
                None => self.decode_property(true, None)?,
            };

            let Some(element) = next else {
                warn!(
                    "array {name}: terminator after {} of {count} elements",
                    elements.len()
                );
                break;
            };
            elements.push(element);
        }
        Ok(elements)
    }
}

fn tracked(value: ScalarValue, offset: u64) -> Scalar {
    Scalar {
        value,
        value_offset: offset,
        value_length: value.width(),
        opaque: None,
    }
}

fn default_value(property_type: PropertyType) -> ScalarValue {
    match property_type {
        PropertyType::Bool => ScalarValue::Bool(false),
        PropertyType::Byte => ScalarValue::Byte(0),
        PropertyType::UInt32 => ScalarValue::UInt32(0),
        PropertyType::Int64 => ScalarValue::Int64(0),
        PropertyType::Float => ScalarValue::Float(0.0),
        _ => ScalarValue::Int(0),
    }
}

fn to_len(declared_length: u64) -> io::Result<usize> {
    usize::try_from(declared_length)
        .map_err(|_| invalid_data(format!("declared length {declared_length} does not fit in memory")))
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
