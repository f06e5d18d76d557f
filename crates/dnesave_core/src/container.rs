use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::decoder::{DecodeOptions, PropertyDecoder};
use crate::decompress::Decompressor;
use crate::patch::write_atomic;
use crate::property::{Property, find_property};
use crate::reader::LittleEndianReader;

pub const SAVE_MAGIC: &[u8; 8] = b"@DNESAV@";
pub const RAW_MARKER: u64 = 4;
pub const COMPRESSED_MARKER: u64 = 0x590C_6EB5_18E9_B0C3;
/// Structured content starts after the magic and the encoding marker.
pub const HEADER_OFFSET: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveEncoding {
    Raw,
    Compressed,
    /// Marker not seen before; the payload was read as raw.
    UnknownMarker(u64),
}

impl SaveEncoding {
    pub fn from_marker(marker: u64) -> Self {
        match marker {
            RAW_MARKER => Self::Raw,
            COMPRESSED_MARKER => Self::Compressed,
            other => Self::UnknownMarker(other),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed)
    }
}

/// A decoded save file: header fields, the top-level properties and the
/// uncompressed byte stream every recorded offset refers to.
#[derive(Debug, Clone)]
pub struct SaveContainer {
    encoding: SaveEncoding,
    save_data_type: String,
    header_value: u32,
    engine_version: String,
    properties: Vec<Property>,
    bytes: Vec<u8>,
}

impl SaveContainer {
    pub fn load(
        path: &Path,
        decompressor: &dyn Decompressor,
        options: DecodeOptions,
    ) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(bytes, decompressor, options)
    }

    pub fn parse(
        bytes: Vec<u8>,
        decompressor: &dyn Decompressor,
        options: DecodeOptions,
    ) -> io::Result<Self> {
        let (encoding, bytes) = unpack(bytes, decompressor)?;

        let mut decoder = PropertyDecoder::new(Cursor::new(bytes.as_slice()), options);
        let r = decoder.reader();
        r.seek_to(HEADER_OFFSET)?;
        let save_data_type = r.read_length_prefixed_string()?;
        let header_value = r.read_u32()?;
        let engine_version = r.read_length_prefixed_string()?;
        info!("engine version {engine_version}, data type {save_data_type}");

        let properties = decoder.decode_until_end()?;
        drop(decoder);

        Ok(Self {
            encoding,
            save_data_type,
            header_value,
            engine_version,
            properties,
            bytes,
        })
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Top-level property by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Property> {
        find_property(&self.properties, name)
    }

    pub fn save_data_type(&self) -> &str {
        &self.save_data_type
    }

    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    pub fn header_value(&self) -> u32 {
        self.header_value
    }

    pub fn encoding(&self) -> SaveEncoding {
        self.encoding
    }

    pub fn uncompressed_len(&self) -> usize {
        self.bytes.len()
    }

    /// The uncompressed stream, magic included.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the uncompressed stream. This is the working copy that patches
    /// are applied to.
    pub fn write_uncompressed_to(&self, path: &Path) -> io::Result<()> {
        write_atomic(path, &self.bytes)
    }
}

/// Check the magic and resolve the container encoding, returning the
/// uncompressed stream with the magic in place.
pub fn unpack(bytes: Vec<u8>, decompressor: &dyn Decompressor) -> io::Result<(SaveEncoding, Vec<u8>)> {
    if bytes.len() < SAVE_MAGIC.len() || &bytes[..SAVE_MAGIC.len()] != SAVE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a save file: expected @DNESAV@ magic",
        ));
    }

    let mut r = LittleEndianReader::new(Cursor::new(bytes.as_slice()));
    r.seek_to(SAVE_MAGIC.len() as u64)?;
    let marker = r.read_u64()?;
    let encoding = SaveEncoding::from_marker(marker);

    match encoding {
        SaveEncoding::Raw => {
            info!("save is not compressed");
            Ok((encoding, bytes))
        }
        SaveEncoding::UnknownMarker(marker) => {
            warn!("unrecognised encoding marker {marker:016X}; assuming raw");
            Ok((encoding, bytes))
        }
        SaveEncoding::Compressed => {
            let uncompressed_len = r.read_u32()? as usize;
            let compressed_len = r.read_u32()? as usize;
            let packed = r.read_bytes(compressed_len)?;
            let inflated = decompressor.decompress(&packed, uncompressed_len)?;

            let mut stream = Vec::with_capacity(SAVE_MAGIC.len() + inflated.len());
            stream.extend_from_slice(SAVE_MAGIC);
            stream.extend_from_slice(&inflated);
            info!(
                "decompressed save from {} bytes -> {} bytes",
                packed.len(),
                stream.len()
            );
            Ok((encoding, stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{COMPRESSED_MARKER, SaveContainer, SaveEncoding, unpack};
    use crate::decoder::DecodeOptions;
    use crate::decompress::{NoDecompressor, ZlibDecompressor};
    use crate::property::ScalarValue;

    fn lp(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&((s.len() + 1) as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }

    fn score_save(marker: u64) -> Vec<u8> {
        let mut out = b"@DNESAV@".to_vec();
        out.extend_from_slice(&marker.to_le_bytes());
        lp(&mut out, "Save");
        out.extend_from_slice(&7u32.to_le_bytes());
        lp(&mut out, "1.0");
        lp(&mut out, "Score");
        lp(&mut out, "IntProperty");
        out.extend_from_slice(&4u64.to_le_bytes());
        out.push(0);
        out.extend_from_slice(&42i32.to_le_bytes());
        out
    }

    #[test]
    fn raw_save_decodes_header_and_properties() {
        let bytes = score_save(4);
        let save = SaveContainer::parse(bytes.clone(), &NoDecompressor, DecodeOptions::default()).unwrap();

        assert_eq!(save.encoding(), SaveEncoding::Raw);
        assert_eq!(save.save_data_type(), "Save");
        assert_eq!(save.header_value(), 7);
        assert_eq!(save.engine_version(), "1.0");
        assert_eq!(save.properties().len(), 1);
        assert_eq!(save.raw_bytes(), bytes.as_slice());

        let score = save.get("score").unwrap().scalar().unwrap();
        assert_eq!(score.value, ScalarValue::Int(42));
        let at = score.value_offset as usize;
        assert_eq!(&bytes[at..at + 4], &42i32.to_le_bytes());
    }

    #[test]
    fn unknown_marker_is_read_as_raw() {
        let save = SaveContainer::parse(score_save(9), &NoDecompressor, DecodeOptions::default()).unwrap();
        assert_eq!(save.encoding(), SaveEncoding::UnknownMarker(9));
        assert_eq!(save.properties().len(), 1);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = score_save(4);
        bytes[0] = b'#';
        let err = SaveContainer::parse(bytes, &NoDecompressor, DecodeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(SaveContainer::parse(b"@DNE".to_vec(), &NoDecompressor, DecodeOptions::default()).is_err());
    }

    #[test]
    fn compressed_save_without_codec_fails() {
        let mut bytes = b"@DNESAV@".to_vec();
        bytes.extend_from_slice(&COMPRESSED_MARKER.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(unpack(bytes, &NoDecompressor).is_err());
    }

    #[test]
    fn compressed_payload_gets_magic_back() {
        use std::io::Write;

        use flate2::Compression;
        use flate2::write::ZlibEncoder;

        let raw = score_save(4);
        let body = &raw[8..];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).unwrap();
        let packed = encoder.finish().unwrap();

        let mut bytes = b"@DNESAV@".to_vec();
        bytes.extend_from_slice(&COMPRESSED_MARKER.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&packed);

        let save = SaveContainer::parse(bytes, &ZlibDecompressor, DecodeOptions::default()).unwrap();
        assert!(save.encoding().is_compressed());
        assert_eq!(save.raw_bytes(), raw.as_slice());
        assert_eq!(save.uncompressed_len(), raw.len());
    }
}
