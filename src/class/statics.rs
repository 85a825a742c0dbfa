use std::{fmt, sync::RwLock};

use crate::{services::ObjectRef, Error, Result};

/// Zero-initialized storage for the static fields of one class
///
/// Values are stored little-endian at the offsets assigned to the static fields. Reference
/// slots are `reference_size` bytes wide and hold the raw object handle, `0` for null.
pub struct StaticBlock {
    bytes: RwLock<Box<[u8]>>,
    reference_size: u32,
}

impl StaticBlock {
    pub(crate) fn new(size: u32, reference_size: u32) -> Self {
        StaticBlock {
            bytes: RwLock::new(vec![0; size as usize].into_boxed_slice()),
            reference_size,
        }
    }

    /// Size of the block in bytes
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the block is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(read_lock!(self.bytes).len())
    }

    /// `true` for classes without static fields
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the block is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read<const N: usize>(&self, offset: u32) -> Result<[u8; N]> {
        let bytes = read_lock!(self.bytes);
        let start = offset as usize;
        let slice = bytes
            .get(start..start + N)
            .ok_or_else(|| Error::OutOfBounds(format!("static read of {N} bytes at {offset}")))?;

        let mut value = [0; N];
        value.copy_from_slice(slice);
        Ok(value)
    }

    fn write<const N: usize>(&self, offset: u32, value: [u8; N]) -> Result<()> {
        let mut bytes = write_lock!(self.bytes);
        let start = offset as usize;
        let slice = bytes
            .get_mut(start..start + N)
            .ok_or_else(|| Error::OutOfBounds(format!("static write of {N} bytes at {offset}")))?;

        slice.copy_from_slice(&value);
        Ok(())
    }

    /// Reads a 32-bit integer
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn read_i32(&self, offset: u32) -> Result<i32> {
        self.read::<4>(offset).map(i32::from_le_bytes)
    }

    /// Writes a 32-bit integer
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn write_i32(&self, offset: u32, value: i32) -> Result<()> {
        self.write(offset, value.to_le_bytes())
    }

    /// Reads a 64-bit integer
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn read_i64(&self, offset: u32) -> Result<i64> {
        self.read::<8>(offset).map(i64::from_le_bytes)
    }

    /// Writes a 64-bit integer
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn write_i64(&self, offset: u32, value: i64) -> Result<()> {
        self.write(offset, value.to_le_bytes())
    }

    /// Reads a 32-bit float
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn read_f32(&self, offset: u32) -> Result<f32> {
        self.read::<4>(offset).map(f32::from_le_bytes)
    }

    /// Writes a 32-bit float
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn write_f32(&self, offset: u32, value: f32) -> Result<()> {
        self.write(offset, value.to_le_bytes())
    }

    /// Reads a 64-bit float
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn read_f64(&self, offset: u32) -> Result<f64> {
        self.read::<8>(offset).map(f64::from_le_bytes)
    }

    /// Writes a 64-bit float
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn write_f64(&self, offset: u32, value: f64) -> Result<()> {
        self.write(offset, value.to_le_bytes())
    }

    /// Reads a reference slot
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block.
    pub fn read_reference(&self, offset: u32) -> Result<Option<ObjectRef>> {
        if self.reference_size == 4 {
            let raw = self.read::<4>(offset).map(u32::from_le_bytes)?;
            Ok(ObjectRef::new(u64::from(raw)))
        } else {
            let raw = self.read::<8>(offset).map(u64::from_le_bytes)?;
            Ok(ObjectRef::new(raw))
        }
    }

    /// Stores `value` into a reference slot; the caller is responsible for the write barrier
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the slot lies outside the block, or if the handle does
    /// not fit a 4-byte reference slot.
    pub(crate) fn write_reference(&self, offset: u32, value: ObjectRef) -> Result<()> {
        if self.reference_size == 4 {
            let raw = u32::try_from(value.value()).map_err(|_| {
                Error::OutOfBounds(format!("{value:?} does not fit a 4-byte reference slot"))
            })?;
            self.write(offset, raw.to_le_bytes())
        } else {
            self.write(offset, value.value().to_le_bytes())
        }
    }
}

impl fmt::Debug for StaticBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticBlock")
            .field("len", &self.len().unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_roundtrip_at_offsets() {
        let block = StaticBlock::new(24, 8);
        assert_eq!(block.len().unwrap(), 24);
        assert_eq!(block.read_i64(8).unwrap(), 0);

        block.write_i32(0, -7).unwrap();
        block.write_f64(8, 2.5).unwrap();
        block.write_reference(16, ObjectRef::new(0x30).unwrap()).unwrap();

        assert_eq!(block.read_i32(0).unwrap(), -7);
        assert_eq!(block.read_f64(8).unwrap(), 2.5);
        assert_eq!(block.read_reference(16).unwrap(), ObjectRef::new(0x30));
    }

    #[test]
    fn rejects_out_of_bounds() {
        let block = StaticBlock::new(8, 4);
        assert!(matches!(block.read_i64(4), Err(Error::OutOfBounds(_))));
        assert!(block.write_i32(8, 1).is_err());
        assert!(block.read_reference(4).unwrap().is_none());
        assert!(StaticBlock::new(0, 8).is_empty().unwrap());
    }
}
