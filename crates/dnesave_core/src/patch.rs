use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use tempfile::NamedTempFile;

use crate::core_api::{CoreError, CoreErrorCode};
use crate::property::{Property, ScalarValue};

/// In-memory copy of an uncompressed save that accepts verified in-place
/// writes.
///
/// The buffer never looks at a property tree on its own. Offsets and old
/// values come from the caller, normally through [`PatchBuffer::patch_property`]
/// or [`PatchBuffer::patch_map_value`] which derive them from a tree decoded
/// from the same bytes.
#[derive(Debug, Clone)]
pub struct PatchBuffer {
    path: Option<PathBuf>,
    bytes: Vec<u8>,
}

impl PatchBuffer {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            bytes,
        })
    }

    /// Buffer with no backing file; `write_out` and `reload` are refused.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { path: None, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite `length` bytes at `offset` after checking every one of them
    /// against `old`. Nothing is written unless the whole range matches.
    pub fn patch_scalar(
        &mut self,
        offset: u64,
        length: u64,
        old: &[u8],
        new: &[u8],
    ) -> Result<(), CoreError> {
        let range = self.checked_range(offset, length, old, new)?;

        if let Some(i) = self.bytes[range.clone()]
            .iter()
            .zip(old)
            .position(|(have, want)| have != want)
        {
            return Err(CoreError::new(
                CoreErrorCode::PatchVerification,
                format!(
                    "old value does not match at 0x{:X}: found {:02X}, expected {:02X}",
                    range.start + i,
                    self.bytes[range.start + i],
                    old[i]
                ),
            ));
        }

        self.bytes[range].copy_from_slice(new);
        Ok(())
    }

    /// Same contract as [`PatchBuffer::patch_scalar`], addressed through the
    /// per-key offset a map entry recorded at decode time.
    pub fn patch_map_entry(
        &mut self,
        base_offset: u64,
        length: u64,
        old: &[u8],
        new: &[u8],
    ) -> Result<(), CoreError> {
        self.patch_scalar(base_offset, length, old, new)
    }

    /// Patch the scalar held by `property`, taking the offset and the old
    /// value from the decoded tree.
    pub fn patch_property(&mut self, property: &Property, new: ScalarValue) -> Result<(), CoreError> {
        let scalar = property.scalar().ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("{} ({}) has no patchable value", property.name, property.type_tag),
            )
        })?;
        if !scalar.is_patchable() {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!(
                    "{} was decoded from a {}-byte fallback and cannot be patched",
                    property.name, property.declared_length
                ),
            ));
        }
        check_same_kind(&property.name, &scalar.value, &new)?;

        self.patch_scalar(
            scalar.value_offset,
            scalar.value_length,
            &scalar.value.to_le_bytes(),
            &new.to_le_bytes(),
        )?;
        info!("patch {} {} -> {new}", property.name, scalar.value);
        Ok(())
    }

    /// Patch the value stored under `key` in a scalar-valued map.
    pub fn patch_map_value(
        &mut self,
        property: &Property,
        key: &str,
        new: ScalarValue,
    ) -> Result<(), CoreError> {
        let map = property.as_map().ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("{} is not a map", property.name),
            )
        })?;
        let entry = map.get(key).ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::NotFound,
                format!("{} has no key {key}", property.name),
            )
        })?;
        let (Some(old), Some(length), Some(offset)) =
            (entry.value.as_scalar(), map.value_length, entry.value_offset)
        else {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                format!("{} holds {} values, which cannot be patched", property.name, map.value_type),
            ));
        };
        check_same_kind(key, &old, &new)?;

        self.patch_map_entry(offset, length, &old.to_le_bytes(), &new.to_le_bytes())?;
        info!("patch {}[{key}] {old} -> {new}", property.name);
        Ok(())
    }

    /// Drop every in-memory change and re-read the backing file.
    pub fn reload(&mut self) -> Result<(), CoreError> {
        let path = self.backing_path()?.to_path_buf();
        *self = Self::load(&path)?;
        Ok(())
    }

    /// Replace the backing file with the buffer contents.
    pub fn write_out(&self) -> Result<(), CoreError> {
        let path = self.backing_path()?;
        write_atomic(path, &self.bytes).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to write {}: {e}", path.display()),
            )
        })
    }

    fn backing_path(&self) -> Result<&Path, CoreError> {
        self.path.as_deref().ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                "patch buffer has no backing file",
            )
        })
    }

    fn checked_range(
        &self,
        offset: u64,
        length: u64,
        old: &[u8],
        new: &[u8],
    ) -> Result<std::ops::Range<usize>, CoreError> {
        if old.len() as u64 != length || new.len() as u64 != length {
            return Err(CoreError::new(
                CoreErrorCode::PatchLength,
                format!(
                    "length mismatch: range is {length} bytes, old value {}, new value {}",
                    old.len(),
                    new.len()
                ),
            ));
        }
        let out_of_bounds = || {
            CoreError::new(
                CoreErrorCode::PatchOutOfBounds,
                format!(
                    "range 0x{offset:X}+{length} is outside the {}-byte buffer",
                    self.bytes.len()
                ),
            )
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start
            .checked_add(old.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(out_of_bounds)?;
        Ok(start..end)
    }
}

fn check_same_kind(label: &str, old: &ScalarValue, new: &ScalarValue) -> Result<(), CoreError> {
    if old.same_kind(new) {
        return Ok(());
    }
    Err(CoreError::new(
        CoreErrorCode::UnsupportedOperation,
        format!(
            "{label} holds a {} value, got a {}",
            old.kind_name(),
            new.kind_name()
        ),
    ))
}

/// Write `bytes` to a temporary file next to `path`, sync it, then rename it
/// over `path`. Readers see either the old or the new file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
