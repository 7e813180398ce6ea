////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Codecs to use as generic arguments
//!
//! ```
//! use std::io::Cursor;
//!
//! use qfs_codec::codec::{Codec, RefPack};
//!
//! let packed = RefPack::encode(b"abcabcabcabc").unwrap();
//! let mut reader = Cursor::new(&packed);
//! let decoded = RefPack::uncompress(&mut reader, packed.len()).unwrap();
//! assert_eq!(decoded.bytes, b"abcabcabcabc");
//! ```
use std::io::{Read, Seek};

use crate::header::mode::qfs3::FLAG_LARGE;
use crate::header::mode::{
    Mode as HeaderMode,
    Qfs2 as Qfs2Header,
    Qfs3 as Qfs3Header,
    RefPack as RefPackHeader,
};
use crate::{data, Decoded, QfsError, QfsResult};

/// Implement on a marker unit to make it usable as a codec argument
pub trait Codec {
    type HeaderMode: HeaderMode;

    /// Decode a complete blob, header included
    ///
    /// # Errors
    /// Any decoding error of the format
    fn decode(input: &[u8]) -> QfsResult<Decoded>;

    /// Encode `input` into a complete blob
    ///
    /// # Errors
    /// [QfsError::Unsupported] unless the format implements compression
    fn encode(input: &[u8]) -> QfsResult<Vec<u8>> {
        let _ = input;
        Err(QfsError::Unsupported("compression"))
    }

    /// Read `length` bytes from `reader` and decode them
    ///
    /// # Errors
    /// - [QfsError::Io]: fewer than `length` bytes could be read
    /// - any error of [decode](Self::decode)
    fn uncompress(reader: &mut (impl Read + Seek), length: usize) -> QfsResult<Decoded> {
        let mut input = vec![0; length];
        reader.read_exact(&mut input)?;
        Self::decode(&input)
    }

    /// Read `length` bytes from `reader` and encode them
    ///
    /// # Errors
    /// - [QfsError::Io]: fewer than `length` bytes could be read
    /// - any error of [encode](Self::encode)
    fn compress(reader: &mut (impl Read + Seek), length: usize) -> QfsResult<Vec<u8>> {
        let mut input = vec![0; length];
        reader.read_exact(&mut input)?;
        Self::encode(&input)
    }
}

/// LZ77 style back-references and literal runs
/// - [RefPack](crate::header::mode::RefPack) header
/// - control codes in [control](crate::data::control)
pub struct RefPack {
    // trick to prevent struct from ever being constructed. These are "markers" intended to be used
    // as generic arguments rather than data structs
    _private: (),
}

impl Codec for RefPack {
    type HeaderMode = RefPackHeader;

    fn decode(input: &[u8]) -> QfsResult<Decoded> {
        data::decompression::decode(input)
    }

    fn encode(input: &[u8]) -> QfsResult<Vec<u8>> {
        data::compression::encode(input)
    }
}

/// Byte pair substitution. Decode only.
pub struct Qfs2 {
    _private: (),
}

impl Codec for Qfs2 {
    type HeaderMode = Qfs2Header;

    fn decode(input: &[u8]) -> QfsResult<Decoded> {
        data::qfs2::decode(input)
    }
}

/// Adaptive prefix code with back-references, decoded on the
/// [machine](crate::machine). Encodes with signature `0x30`, or `0x31` when
/// the length needs four bytes.
pub struct Qfs3 {
    _private: (),
}

impl Codec for Qfs3 {
    type HeaderMode = Qfs3Header;

    fn decode(input: &[u8]) -> QfsResult<Decoded> {
        data::qfs3::decode(input)
    }

    fn encode(input: &[u8]) -> QfsResult<Vec<u8>> {
        let signature = if input.len() > 0xFF_FFFF {
            0x30 | FLAG_LARGE
        } else {
            0x30
        };
        data::qfs3::encoder::encode(input, signature)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn qfs2_does_not_compress() {
        assert!(matches!(
            Qfs2::encode(b"abc"),
            Err(QfsError::Unsupported("compression"))
        ));
    }

    #[test]
    fn uncompress_reads_exactly_length() {
        let mut packed = RefPack::encode(b"hello").unwrap();
        let length = packed.len();
        packed.extend_from_slice(b"trailing");
        let mut reader = Cursor::new(packed);
        let decoded = RefPack::uncompress(&mut reader, length).unwrap();
        assert_eq!(decoded.bytes, b"hello");
        assert_eq!(reader.position() as usize, length);
    }

    #[test]
    fn uncompress_short_reader_is_io_error() {
        let mut reader = Cursor::new([0x10, 0xFB, 0]);
        assert!(matches!(
            RefPack::uncompress(&mut reader, 10),
            Err(QfsError::Io(_))
        ));
    }

    #[test]
    fn qfs3_compress_round_trip() {
        let input = b"one two three two one two three".repeat(5);
        let mut reader = Cursor::new(&input);
        let packed = Qfs3::compress(&mut reader, input.len()).unwrap();
        assert_eq!(packed[0], 0x30);
        assert_eq!(Qfs3::decode(&packed).unwrap().bytes, input);
    }
}
