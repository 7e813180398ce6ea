////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Everything past the header: the three decoders, the RefPack control codes
//! and the RefPack compressor.

use std::io::{Read, Seek};

use onlyerror::Error;

use crate::QfsError;

pub mod compression;
pub mod control;
pub mod decompression;
pub mod qfs2;
pub mod qfs3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Error indicating that offset was 0 in a back-reference. This doesn't
    /// make sense, and likely indicated the data is corrupted or malformed.
    #[error("Offset is 0 in compressed data control command")]
    BadOffset,
    /// Error indicating that the requested copy offset would go past the start
    /// of the buffer. This indicates malformed or corrupted data.
    ///
    /// ### Fields
    /// - usize: buffer length
    /// - usize: offset requested
    #[error("Offset went past start of buffer: buffer length `{0}`, offset `{1}`")]
    NegativePosition(usize, usize),
    /// Error indicating that during decompression, a write would go past the
    /// end of the decompression buffer
    ///
    /// This error exists to prevent maliciously constructed data from using an
    /// unbounded amount of memory
    ///
    /// ### Fields
    /// - usize: amount of bytes attempted to write past
    #[error("Decompressed data overran decompressed size in header by `{0}` bytes")]
    BadLength(usize),
    /// The QFS3 code length table does not describe a complete prefix code
    /// within 16 bits
    #[error("Code length table does not fill the code space")]
    BadCodeLengths,
    /// ### Fields
    /// - usize: number of symbols declared by the code length table
    #[error("Code length table declares `{0}` symbols, more than 256")]
    TooManySymbols(usize),
    /// ### Fields
    /// - u32: bit window that matched no code
    #[error("No code matches bit window `{0:#010X}`")]
    InvalidCode(u32),
    /// ### Fields
    /// - usize: bytes the bit reader consumed
    /// - usize: bytes available
    #[error("Bit stream consumed `{0}` bytes but only `{1}` are available")]
    TruncatedInput(usize, usize),
}

/// Fast decoding of run length encoded data
/// Based on https://github.com/WanzenBug/rle-decode-helper/blob/master/src/lib.rs
///
/// Takes the last `offset` items of the buffer and repeatedly copies them
/// to `position` until `length` items have been copied.
///
/// If this function errors no data will have been copied
///
/// # Errors
/// - [DecodeError::BadOffset]: `offset` is 0
/// - [DecodeError::NegativePosition]: `offset` > `position`
/// - [DecodeError::BadLength]: `position + length` > `buffer.len()`
///
/// # Returns
/// the new position of the buffer after the read
#[inline(always)]
pub(crate) fn rle_decode_fixed<T: Copy>(
    buffer: &mut [T],
    mut position: usize,
    mut offset: usize,
    mut length: usize,
) -> Result<usize, DecodeError> {
    if offset == 0 {
        return Err(DecodeError::BadOffset);
    }
    if offset > position {
        return Err(DecodeError::NegativePosition(position, offset));
    }
    if position + length > buffer.len() {
        return Err(DecodeError::BadLength(position + length - buffer.len()));
    }

    let fragment_start = position - offset;

    // each pass doubles the repeated fragment
    while length > offset {
        buffer.copy_within(fragment_start..position, position);
        length -= offset;
        position += offset;
        offset *= 2;
    }

    buffer.copy_within(fragment_start..(fragment_start + length), position);
    position += length;

    Ok(position)
}

/// Copy `length` literal bytes from the reader into `buffer` at `position`
///
/// # Returns
/// the new position of the buffer after the read
///
/// # Errors
/// - [QfsError::ControlError]: the copy would go past the end of `buffer`
/// - [QfsError::Io]: General IO Error when reading from the reader
#[inline(always)]
pub(crate) fn copy_from_reader(
    buffer: &mut [u8],
    reader: &mut (impl Read + Seek),
    position: usize,
    length: usize,
) -> Result<usize, QfsError> {
    if position + length > buffer.len() {
        return Err(QfsError::ControlError {
            error: DecodeError::BadLength(position + length - buffer.len()),
            position,
        });
    }

    reader.read_exact(&mut buffer[position..(position + length)])?;

    Ok(position + length)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn errors_on_bad_offset() {
        let error = rle_decode_fixed(&mut [0], 0, 0, 1).unwrap_err();
        assert!(matches!(error, DecodeError::BadOffset));
    }

    #[test]
    fn errors_on_negative_position() {
        let error = rle_decode_fixed(&mut [0], 0, 1, 1).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Offset went past start of buffer: buffer length `0`, offset `1`"
        );
    }

    #[test]
    fn errors_on_bad_length() {
        let error = rle_decode_fixed(&mut [0, 0], 1, 1, 10).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Decompressed data overran decompressed size in header by `9` bytes"
        );
    }

    #[test]
    fn literal_copy_is_bounded() {
        let mut buffer = [0u8; 4];
        let mut reader = Cursor::new([1u8, 2, 3, 4, 5]);
        assert_eq!(copy_from_reader(&mut buffer, &mut reader, 1, 3).unwrap(), 4);
        assert_eq!(buffer, [0, 1, 2, 3]);
        assert!(matches!(
            copy_from_reader(&mut buffer, &mut reader, 3, 2),
            Err(QfsError::ControlError {
                error: DecodeError::BadLength(1),
                position: 3
            })
        ));
    }

    // Appended bytes repeat the last `offset` bytes with period `offset`
    #[proptest]
    fn overlap_repeats_with_period(
        #[strategy(proptest::collection::vec(any::<u8>(), 1..64))] history: Vec<u8>,
        #[strategy(1usize..=#history.len())] offset: usize,
        #[strategy(0usize..200)] length: usize,
    ) {
        let mut buffer = history.clone();
        buffer.resize(history.len() + length, 0);
        let end = rle_decode_fixed(&mut buffer, history.len(), offset, length).unwrap();
        prop_assert_eq!(end, history.len() + length);

        let window = &history[history.len() - offset..];
        let expected: Vec<u8> = window.iter().copied().cycle().take(length).collect();
        prop_assert_eq!(&buffer[history.len()..], expected.as_slice());
    }
}
