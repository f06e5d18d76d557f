use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

pub const NONE_NAME: &str = "None";

/// Tags of the property kinds the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyType {
    Name,
    Str,
    Enum,
    Byte,
    Int,
    UInt32,
    Int64,
    Bool,
    Float,
    Struct,
    Map,
    Array,
}

impl PropertyType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "NameProperty" => Some(Self::Name),
            "StrProperty" => Some(Self::Str),
            "EnumProperty" => Some(Self::Enum),
            "ByteProperty" => Some(Self::Byte),
            "IntProperty" => Some(Self::Int),
            "UInt32Property" => Some(Self::UInt32),
            "Int64Property" => Some(Self::Int64),
            "BoolProperty" => Some(Self::Bool),
            "FloatProperty" => Some(Self::Float),
            "StructProperty" => Some(Self::Struct),
            "MapProperty" => Some(Self::Map),
            "ArrayProperty" => Some(Self::Array),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Name => "NameProperty",
            Self::Str => "StrProperty",
            Self::Enum => "EnumProperty",
            Self::Byte => "ByteProperty",
            Self::Int => "IntProperty",
            Self::UInt32 => "UInt32Property",
            Self::Int64 => "Int64Property",
            Self::Bool => "BoolProperty",
            Self::Float => "FloatProperty",
            Self::Struct => "StructProperty",
            Self::Map => "MapProperty",
            Self::Array => "ArrayProperty",
        }
    }

    /// Width in bytes of the value for fixed-size scalar kinds.
    pub fn native_width(&self) -> Option<u64> {
        match self {
            Self::Bool | Self::Byte => Some(1),
            Self::Int | Self::UInt32 | Self::Float => Some(4),
            Self::Int64 => Some(8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ScalarValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt32(u32),
    Int64(i64),
    Float(f32),
    /// DateTime tick count.
    UInt64(u64),
}

impl ScalarValue {
    pub fn width(&self) -> u64 {
        match self {
            Self::Bool(_) | Self::Byte(_) => 1,
            Self::Int(_) | Self::UInt32(_) | Self::Float(_) => 4,
            Self::Int64(_) | Self::UInt64(_) => 8,
        }
    }

    /// On-disk encoding of the value.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Bool(v) => vec![u8::from(v)],
            Self::Byte(v) => vec![v],
            Self::Int(v) => v.to_le_bytes().to_vec(),
            Self::UInt32(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::UInt64(v) => v.to_le_bytes().to_vec(),
        }
    }

    pub fn same_kind(&self, other: &ScalarValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Int(_) => "int",
            Self::UInt32(_) => "uint32",
            Self::Int64(_) => "int64",
            Self::Float(_) => "float",
            Self::UInt64(_) => "uint64",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
        }
    }
}

/// A fixed-width leaf value and the byte range it was read from.
///
/// `value_offset` and `value_length` address the value bytes only, never the
/// property header. When the stream declared a length different from the
/// native width, the consumed bytes are kept in `opaque`, `value` is the
/// default for its kind and the scalar must not be patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scalar {
    pub value: ScalarValue,
    pub value_offset: u64,
    pub value_length: u64,
    pub opaque: Option<Vec<u8>>,
}

impl Scalar {
    pub fn is_patchable(&self) -> bool {
        self.opaque.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StructPayload {
    DateTime(Scalar),
    Color(Vec<u8>),
    Guid(Vec<u8>),
    /// Struct kind without special handling, kept as raw bytes.
    Opaque(Vec<u8>),
    Fields(Vec<Property>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructValue {
    pub struct_kind: String,
    pub header: Vec<u8>,
    pub payload: StructPayload,
}

impl StructValue {
    pub fn fields(&self) -> &[Property] {
        match &self.payload {
            StructPayload::Fields(fields) => fields,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayElements {
    Int(Vec<i32>),
    Name(Vec<String>),
    Struct(Vec<Property>),
    /// Unsupported element type declared with zero elements.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayValue {
    pub element_type: String,
    pub elements: ArrayElements,
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match &self.elements {
            ArrayElements::Int(v) => v.len(),
            ArrayElements::Name(v) => v.len(),
            ArrayElements::Struct(v) => v.len(),
            ArrayElements::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MapEntryValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    Float(f32),
    Name(String),
    Struct(Property),
}

impl MapEntryValue {
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match *self {
            Self::Bool(v) => Some(ScalarValue::Bool(v)),
            Self::Byte(v) => Some(ScalarValue::Byte(v)),
            Self::Int(v) => Some(ScalarValue::Int(v)),
            Self::Float(v) => Some(ScalarValue::Float(v)),
            Self::Name(_) | Self::Struct(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEntry {
    pub key: String,
    pub value: MapEntryValue,
    /// Offset of the value bytes; recorded for every entry, meaningful for
    /// patching only when the map has a `value_length`.
    pub value_offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapValue {
    pub key_type: String,
    pub value_type: String,
    /// Width shared by every scalar entry; `None` for name or struct values.
    pub value_length: Option<u64>,
    entries: Vec<MapEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MapValue {
    pub fn new(key_type: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            key_type: key_type.into(),
            value_type: value_type.into(),
            value_length: None,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert an entry, replacing the value of an existing key in place.
    /// Returns true when the key was already present.
    pub fn insert(&mut self, entry: MapEntry) -> bool {
        if let Some(&slot) = self.index.get(&entry.key) {
            self.entries[slot] = entry;
            return true;
        }
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
        false
    }

    pub fn get(&self, key: &str) -> Option<&MapEntry> {
        if let Some(&slot) = self.index.get(key) {
            return self.entries.get(slot);
        }
        self.entries
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(key))
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyKind {
    Scalar(Scalar),
    Str(String),
    Name(String),
    Enum { enum_type: String, value: String },
    Struct(StructValue),
    Array(ArrayValue),
    Map(MapValue),
    /// Explicit terminator; the two trailing words have no known meaning.
    None { reserved: [u32; 2] },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub type_tag: String,
    pub declared_length: u64,
    pub kind: PropertyKind,
}

impl Property {
    pub fn is_none_sentinel(&self) -> bool {
        matches!(self.kind, PropertyKind::None { .. })
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        child_lookup(self, name)
    }

    pub fn children(&self) -> Vec<&Property> {
        children(self)
    }

    /// The offset-tracked scalar held by this property, if any. DateTime
    /// structs expose their tick count through the same contract.
    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            PropertyKind::Scalar(scalar) => Some(scalar),
            PropertyKind::Struct(StructValue {
                payload: StructPayload::DateTime(scalar),
                ..
            }) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Str(v) | PropertyKind::Name(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            PropertyKind::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match &self.kind {
            PropertyKind::Struct(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match &self.kind {
            PropertyKind::Array(value) => Some(value),
            _ => None,
        }
    }
}

/// Find a named child: struct fields by property name, struct array
/// elements by name and struct-valued map entries by key. Case-insensitive.
pub fn child_lookup<'a>(property: &'a Property, name: &str) -> Option<&'a Property> {
    match &property.kind {
        PropertyKind::Struct(value) => value
            .fields()
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name)),
        PropertyKind::Array(ArrayValue {
            elements: ArrayElements::Struct(elements),
            ..
        }) => elements
            .iter()
            .find(|element| element.name.eq_ignore_ascii_case(name)),
        PropertyKind::Map(map) => match map.get(name).map(|entry| &entry.value) {
            Some(MapEntryValue::Struct(value)) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

/// Nested properties in stream order. Leaves and raw-valued containers
/// have none.
pub fn children(property: &Property) -> Vec<&Property> {
    match &property.kind {
        PropertyKind::Struct(value) => value.fields().iter().collect(),
        PropertyKind::Array(ArrayValue {
            elements: ArrayElements::Struct(elements),
            ..
        }) => elements.iter().collect(),
        PropertyKind::Map(map) => map
            .entries()
            .iter()
            .filter_map(|entry| match &entry.value {
                MapEntryValue::Struct(value) => Some(value),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Find a top-level property by name, case-insensitively.
pub fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties
        .iter()
        .find(|property| property.name.eq_ignore_ascii_case(name))
}

/// Every offset-tracked scalar below `properties`, depth first, including
/// DateTime ticks. Opaque fallback scalars are included; callers filter
/// with [`Scalar::is_patchable`].
pub fn scalar_leaves(properties: &[Property]) -> Vec<&Scalar> {
    let mut out = Vec::new();
    for property in properties {
        collect_scalars(property, &mut out);
    }
    out
}

fn collect_scalars<'a>(property: &'a Property, out: &mut Vec<&'a Scalar>) {
    if let Some(scalar) = property.scalar() {
        out.push(scalar);
    }
    for child in children(property) {
        collect_scalars(child, out);
    }
}

/// Render a composite map key decoded from a field list.
pub fn composite_key_string(fields: &[Property]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| format!("{}={}", field.name, short_value(field)))
        .collect();
    format!("({})", parts.join(","))
}

fn short_value(property: &Property) -> String {
    match &property.kind {
        PropertyKind::Scalar(scalar) => scalar.value.to_string(),
        PropertyKind::Str(v) | PropertyKind::Name(v) => v.clone(),
        PropertyKind::Enum { value, .. } => value.clone(),
        PropertyKind::Struct(value) => match &value.payload {
            StructPayload::Fields(fields) => composite_key_string(fields),
            StructPayload::DateTime(scalar) => scalar.value.to_string(),
            StructPayload::Color(bytes)
            | StructPayload::Guid(bytes)
            | StructPayload::Opaque(bytes) => hex(bytes),
        },
        PropertyKind::Array(array) => format!("[{}]", array.len()),
        PropertyKind::Map(map) => format!("[{}]", map.len()),
        PropertyKind::None { .. } => NONE_NAME.to_string(),
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
