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

/// Valid first signature bytes
pub const SIGNATURES: std::ops::RangeInclusive<u8> = 0x30..=0x35;
/// Length is four bytes wide instead of three
pub const FLAG_LARGE: u8 = 0b0000_0001;
/// Output is the running sum of the decoded bytes
pub const FLAG_SINGLE_SUM: u8 = 0b0000_0010;
/// Output is the running sum of the running sum. Wins over [FLAG_SINGLE_SUM].
pub const FLAG_DOUBLE_SUM: u8 = 0b0000_0100;

/// `3x FB length[3|4]`, length big endian
pub struct Qfs3;

impl Mode for Qfs3 {
    fn read<R: Read + Seek>(reader: &mut R) -> QfsResult<Header> {
        let flags = reader.read_u8()?;
        let magic = reader.read_u8()?;
        if magic != MAGIC {
            return Err(QfsError::BadMagic(magic));
        }
        if !SIGNATURES.contains(&flags) {
            return Err(QfsError::BadFlags(flags));
        }
        let decompressed_length = if flags & FLAG_LARGE == 0 {
            reader.read_u24::<BigEndian>()?
        } else {
            reader.read_u32::<BigEndian>()?
        };
        Ok(Header {
            flags,
            decompressed_length,
            compressed_length: None,
        })
    }

    fn write<W: Write>(header: Header, writer: &mut W) -> QfsResult<()> {
        if !SIGNATURES.contains(&header.flags) {
            return Err(QfsError::BadFlags(header.flags));
        }
        writer.write_u8(header.flags)?;
        writer.write_u8(MAGIC)?;
        if header.flags & FLAG_LARGE == 0 {
            writer.write_u24::<BigEndian>(header.decompressed_length)?;
        } else {
            writer.write_u32::<BigEndian>(header.decompressed_length)?;
        }
        Ok(())
    }

    fn length(header: &Header) -> usize {
        if header.flags & FLAG_LARGE == 0 {
            5
        } else {
            6
        }
    }
}
