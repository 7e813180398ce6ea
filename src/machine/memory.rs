////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Flat little-endian scratch memory

use byteorder::{ByteOrder, LittleEndian};

use crate::machine::InterpreterError;

/// Byte addressed memory with a fixed capacity.
///
/// Only the prefix up to the highest byte written is backed by an allocation.
/// Bytes beyond it read as zero, so a large capacity costs nothing until it
/// is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMemory {
    bytes: Vec<u8>,
    capacity: usize,
}

/// Reject widths other than 1, 2 or 4 bytes
///
/// # Errors
/// [InterpreterError::UnsupportedSize] for any other width
pub fn check_size(size: u8) -> Result<u8, InterpreterError> {
    match size {
        1 | 2 | 4 => Ok(size),
        _ => Err(InterpreterError::UnsupportedSize(size)),
    }
}

impl VirtualMemory {
    /// Zero filled memory of exactly `capacity` bytes. It never grows past
    /// that.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn range(&self, offset: i64, size: usize) -> Result<std::ops::Range<usize>, InterpreterError> {
        let out_of_range = || InterpreterError::OutOfRangeMemoryAccess(offset, size, self.capacity);
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(size).ok_or_else(out_of_range)?;
        if end > self.capacity {
            return Err(out_of_range());
        }
        Ok(start..end)
    }

    /// Back every byte below `end` with real storage
    fn materialize(&mut self, end: usize) -> Result<(), InterpreterError> {
        if end > self.bytes.len() {
            self.bytes
                .try_reserve(end - self.bytes.len())
                .map_err(|_| InterpreterError::MemoryExhausted(end))?;
            self.bytes.resize(end, 0);
        }
        Ok(())
    }

    fn copy_out(&self, range: std::ops::Range<usize>, out: &mut [u8]) {
        let backed = range.start.min(self.bytes.len())..range.end.min(self.bytes.len());
        out.fill(0);
        out[..backed.len()].copy_from_slice(&self.bytes[backed]);
    }

    /// Load a 1, 2 or 4 byte little-endian value
    ///
    /// # Errors
    /// - [InterpreterError::UnsupportedSize]: `size` is not 1, 2 or 4
    /// - [InterpreterError::OutOfRangeMemoryAccess]: any byte is outside memory
    pub fn load(&self, offset: i64, size: u8) -> Result<u32, InterpreterError> {
        let size = check_size(size)?;
        let range = self.range(offset, usize::from(size))?;
        let mut buffer = [0u8; 4];
        self.copy_out(range, &mut buffer[..usize::from(size)]);
        Ok(LittleEndian::read_u32(&buffer))
    }

    /// Store the low `size` bytes of `value` in little-endian order
    ///
    /// # Errors
    /// - [InterpreterError::UnsupportedSize]: `size` is not 1, 2 or 4
    /// - [InterpreterError::OutOfRangeMemoryAccess]: any byte is outside memory
    /// - [InterpreterError::MemoryExhausted]: the host could not back the write
    pub fn store(&mut self, offset: i64, value: u32, size: u8) -> Result<(), InterpreterError> {
        let size = check_size(size)?;
        let range = self.range(offset, usize::from(size))?;
        self.materialize(range.end)?;
        let mut buffer = [0u8; 4];
        LittleEndian::write_u32(&mut buffer, value);
        self.bytes[range].copy_from_slice(&buffer[..usize::from(size)]);
        Ok(())
    }

    /// # Errors
    /// - [InterpreterError::OutOfRangeMemoryAccess]: the slice does not fit
    /// - [InterpreterError::MemoryExhausted]: the host could not back the write
    pub fn write_slice(&mut self, offset: usize, data: &[u8]) -> Result<(), InterpreterError> {
        let range = self.range(offset as i64, data.len())?;
        self.materialize(range.end)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy of `length` bytes starting at `offset`
    ///
    /// # Errors
    /// [InterpreterError::OutOfRangeMemoryAccess] if the range does not fit
    pub fn read_bytes(&self, offset: usize, length: usize) -> Result<Vec<u8>, InterpreterError> {
        let range = self.range(offset as i64, length)?;
        let mut out = vec![0; length];
        self.copy_out(range, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn little_endian_layout() {
        let mut memory = VirtualMemory::new(8);
        memory.store(0, 0x1122_3344, 4).unwrap();
        assert_eq!(memory.read_bytes(0, 4).unwrap(), &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(memory.load(1, 2).unwrap(), 0x2233);
        assert_eq!(memory.load(3, 1).unwrap(), 0x11);

        memory.store(4, 0xABCD, 1).unwrap();
        assert_eq!(memory.load(4, 4).unwrap(), 0xCD);
    }

    #[test]
    fn out_of_range_access() {
        let mut memory = VirtualMemory::new(4);
        assert_eq!(
            memory.load(1, 4),
            Err(InterpreterError::OutOfRangeMemoryAccess(1, 4, 4))
        );
        assert!(memory.load(-1, 1).is_err());
        assert!(memory.store(4, 0, 1).is_err());
        assert!(memory.write_slice(2, &[1, 2, 3]).is_err());
        assert!(memory.read_bytes(0, 4).is_ok());
    }

    #[test]
    fn only_word_widths() {
        let mut memory = VirtualMemory::new(8);
        for size in [0, 3, 5, 8] {
            assert_eq!(memory.load(0, size), Err(InterpreterError::UnsupportedSize(size)));
            assert_eq!(
                memory.store(0, 1, size),
                Err(InterpreterError::UnsupportedSize(size))
            );
        }
    }

    #[test]
    fn untouched_bytes_read_zero() {
        let mut memory = VirtualMemory::new(1 << 30);
        assert_eq!(memory.load((1 << 30) - 4, 4), Ok(0));
        memory.store(6, 0xAABB, 2).unwrap();
        assert_eq!(memory.load(4, 4).unwrap(), 0xAABB_0000);
        assert_eq!(memory.load(7, 4).unwrap(), 0xAA);
        assert_eq!(memory.read_bytes(5, 5).unwrap(), &[0, 0xBB, 0xAA, 0, 0]);
    }

    #[proptest]
    fn store_then_load(
        #[strategy(0i64..60)] offset: i64,
        value: u32,
        #[strategy(prop_oneof![Just(1u8), Just(2), Just(4)])] size: u8,
    ) {
        let mut memory = VirtualMemory::new(64);
        memory.store(offset, value, size).unwrap();
        let mask = if size == 4 {
            u32::MAX
        } else {
            (1 << (u32::from(size) * 8)) - 1
        };
        prop_assert_eq!(memory.load(offset, size).unwrap(), value & mask);
    }
}
