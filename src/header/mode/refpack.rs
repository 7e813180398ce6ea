////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::header::mode::Mode;
use crate::header::{Header, MAGIC};
use crate::{QfsError, QfsResult};

/// Lengths are four bytes wide instead of three
pub const FLAG_LARGE: u8 = 0b1000_0000;
/// Usual first signature byte
pub const FLAG_REFPACK: u8 = 0b0001_0000;
/// A three byte compressed length follows the decompressed length
pub const FLAG_COMPRESSED_SIZE: u8 = 0b0000_0001;

/// Every other bit is reserved. A header setting one is refused with
/// [QfsError::BadFlags] rather than ignored, since no known writer sets them
/// and a stray bit most likely means the stream is not RefPack at all.
const KNOWN_FLAGS: u8 = FLAG_LARGE | FLAG_REFPACK | FLAG_COMPRESSED_SIZE;

/// `flags FB decompressed[3|4] compressed[3]?`, all big endian
pub struct RefPack;

impl Mode for RefPack {
    fn read<R: Read + Seek>(reader: &mut R) -> QfsResult<Header> {
        let flags = reader.read_u8()?;
        let magic = reader.read_u8()?;
        if magic != MAGIC {
            return Err(QfsError::BadMagic(magic));
        }
        if flags & !KNOWN_FLAGS != 0 {
            return Err(QfsError::BadFlags(flags));
        }
        let decompressed_length = if flags & FLAG_LARGE == 0 {
            reader.read_u24::<BigEndian>()?
        } else {
            reader.read_u32::<BigEndian>()?
        };
        let compressed_length = if flags & FLAG_COMPRESSED_SIZE == 0 {
            None
        } else {
            Some(reader.read_u24::<BigEndian>()?)
        };
        Ok(Header {
            flags,
            decompressed_length,
            compressed_length,
        })
    }

    fn write<W: Write>(header: Header, writer: &mut W) -> QfsResult<()> {
        let mut flags = header.flags & !FLAG_COMPRESSED_SIZE;
        if header.compressed_length.is_some() {
            flags |= FLAG_COMPRESSED_SIZE;
        }
        writer.write_u8(flags)?;
        writer.write_u8(MAGIC)?;
        if flags & FLAG_LARGE == 0 {
            writer.write_u24::<BigEndian>(header.decompressed_length)?;
        } else {
            writer.write_u32::<BigEndian>(header.decompressed_length)?;
        }
        if let Some(compressed_length) = header.compressed_length {
            writer.write_u24::<BigEndian>(compressed_length)?;
        }
        Ok(())
    }

    fn length(header: &Header) -> usize {
        let length = if header.flags & FLAG_LARGE == 0 { 5 } else { 6 };
        length + if header.compressed_length.is_some() { 3 } else { 0 }
    }
}
