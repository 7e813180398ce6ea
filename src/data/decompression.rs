////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! RefPack decompression.
//!
//! Basic concept is to parse the header, identify key information such as
//! decompressed length, then parse as a repeating stream of "command" blocks,
//! consisting of a control code and any (if any) following literal bytes.
//!
//! Literal bytes are always written before performing the control code
//! operation.
//!
//! Control code operations are "run length encoded": the length of a
//! back-reference can be longer than its lookback distance, in which case the
//! lookback region repeats until the length is fulfilled.
//!
//! Given the current decoded output of `DEADBEEF`, a command with a lookback
//! of `4` and a length of `16` produces
//! ```text
//! DEADBEEFBEEFBEEFBEEFBEEF
//! ```
//!
//! Some files carry a compressed size in the header that is larger than the
//! command stream. Whatever follows the stop code up to that size is raw
//! output and is copied verbatim until the declared length is reached.
use std::io::Cursor;

use tracing::debug;

use crate::data::control::{Command, MAX_EXPANSION};
use crate::data::{copy_from_reader, rle_decode_fixed};
use crate::header::mode::RefPack;
use crate::header::Header;
use crate::{Decoded, QfsError, QfsResult};

/// Decode a complete RefPack blob, header included.
///
/// # Errors
/// - [QfsError::BadMagic]: second header byte is not `0xFB`
/// - [QfsError::BadFlags]: unknown flag bits are set in the first header byte
/// - [QfsError::ImplausibleLength]: the declared length is out of reach of
///   the bytes after the header
/// - [QfsError::ControlError]: a command copied past either end of the output
/// - [QfsError::DecodeStall]: the input ran out before the stop code with the
///   output still short of the declared length
/// - [QfsError::Integrity]: the output length differs from the declared one
/// - [QfsError::Io]: a command or its literals are truncated
#[tracing::instrument(skip(input), fields(input_length = input.len()))]
pub fn decode(input: &[u8]) -> QfsResult<Decoded> {
    let mut reader = Cursor::new(input);
    let header = Header::read::<RefPack>(&mut reader)?;
    debug!(?header, "refpack header");

    let declared = header.decompressed_length as usize;
    let limit = (input.len() - reader.position() as usize).saturating_mul(MAX_EXPANSION);
    if declared > limit {
        return Err(QfsError::ImplausibleLength { declared, limit });
    }
    let mut decompression_buffer = vec![0; declared];
    let mut position = 0usize;

    loop {
        if reader.position() as usize >= input.len() {
            if position == declared {
                break;
            }
            return Err(QfsError::DecodeStall {
                position: reader.position() as usize,
            });
        }

        let command = Command::read(&mut reader)?;

        if command.literal() > 0 {
            position = copy_from_reader(
                &mut decompression_buffer,
                &mut reader,
                position,
                command.literal(),
            )?;
        }

        if let Some((offset, length)) = command.offset_copy() {
            position = rle_decode_fixed(&mut decompression_buffer, position, offset, length)
                .map_err(|error| QfsError::ControlError { error, position })?;
        }

        if let Command::Stop(_) = command {
            break;
        }
    }

    let mut consumed = reader.position() as usize;

    if let Some(compressed_length) = header.compressed_length {
        let compressed_length = (compressed_length as usize).min(input.len());
        if compressed_length > consumed && position < declared {
            let raw = (compressed_length - consumed).min(declared - position);
            debug!(raw, "copying raw tail");
            decompression_buffer[position..position + raw]
                .copy_from_slice(&input[consumed..consumed + raw]);
            position += raw;
            consumed += raw;
        }
    }

    if position != declared {
        return Err(QfsError::Integrity {
            expected: declared,
            actual: position,
        });
    }

    Ok(Decoded {
        bytes: decompression_buffer,
        consumed,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::DecodeError;

    #[test]
    fn literal_run_then_stop() {
        let input = [0x10, 0xFB, 0, 0, 5, 0xE0, b'A', b'A', b'A', b'A', 0xFD, b'A'];
        let decoded = decode(&input).unwrap();
        assert_eq!(decoded.bytes, b"AAAAA");
        assert_eq!(decoded.consumed, input.len());
    }

    #[test]
    fn literals_precede_back_reference() {
        // short: 1 literal, offset 1, length 3, then literal-less stop
        let input = [0x10, 0xFB, 0, 0, 4, 0b0000_0001, 0x00, b'x', 0xFC];
        assert_eq!(decode(&input).unwrap().bytes, b"xxxx");
    }

    #[test]
    fn raw_tail_after_stop() {
        let input = [0x11, 0xFB, 0, 0, 6, 0, 0, 16, 0xE0, 1, 2, 3, 4, 0xFC, 5, 6];
        let decoded = decode(&input).unwrap();
        assert_eq!(decoded.bytes, [1, 2, 3, 4, 5, 6]);
        assert_eq!(decoded.consumed, 16);
    }

    #[test]
    fn back_reference_before_start_is_an_error() {
        let input = [0x10, 0xFB, 0, 0, 4, 0b0000_0001, 0x01, b'x', 0xFC];
        assert!(matches!(
            decode(&input),
            Err(QfsError::ControlError {
                error: DecodeError::NegativePosition(1, 2),
                position: 1
            })
        ));
    }

    #[test]
    fn overrun_is_an_error() {
        let input = [0x10, 0xFB, 0, 0, 2, 0xE0, 1, 2, 3, 4, 0xFC];
        assert!(matches!(
            decode(&input),
            Err(QfsError::ControlError {
                error: DecodeError::BadLength(2),
                ..
            })
        ));
    }

    #[test]
    fn missing_stop_code() {
        let short = [0x10, 0xFB, 0, 0, 8, 0xE0, 1, 2, 3, 4];
        assert!(matches!(
            decode(&short),
            Err(QfsError::DecodeStall { position: 10 })
        ));

        let complete = [0x10, 0xFB, 0, 0, 4, 0xE0, 1, 2, 3, 4];
        assert_eq!(decode(&complete).unwrap().bytes, [1, 2, 3, 4]);
    }

    #[test]
    fn declared_length_beyond_reach() {
        let input = [0x90, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC];
        assert!(matches!(
            decode(&input),
            Err(QfsError::ImplausibleLength {
                declared: 0xFFFF_FFFF,
                limit: MAX_EXPANSION
            })
        ));

        // a four byte long command expands to the full per-byte limit
        let mut input = vec![0x10, 0xFB, 0, 0x04, 0x08, 0xE0, 1, 2, 3, 4];
        input.extend_from_slice(&[0xCC, 0x00, 0x00, 0xFF, 0xFC]);
        assert_eq!(decode(&input).unwrap().bytes.len(), 4 + 1028);
    }

    #[test]
    fn short_output_is_integrity_error() {
        let input = [0x10, 0xFB, 0, 0, 6, 0xE0, 1, 2, 3, 4, 0xFC];
        assert!(matches!(
            decode(&input),
            Err(QfsError::Integrity {
                expected: 6,
                actual: 4
            })
        ));
    }
}
