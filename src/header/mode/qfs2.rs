////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::header::mode::Mode;
use crate::header::{Header, MAGIC};
use crate::QfsResult;

pub const SIGNATURE: u8 = 0x46;

/// Two signature bytes, which are not checked, then a three byte big endian
/// length
pub struct Qfs2;

impl Mode for Qfs2 {
    fn read<R: Read + Seek>(reader: &mut R) -> QfsResult<Header> {
        let flags = reader.read_u8()?;
        reader.seek(SeekFrom::Current(1))?;
        let decompressed_length = reader.read_u24::<BigEndian>()?;
        Ok(Header {
            flags,
            decompressed_length,
            compressed_length: None,
        })
    }

    fn write<W: Write>(header: Header, writer: &mut W) -> QfsResult<()> {
        writer.write_u8(SIGNATURE)?;
        writer.write_u8(MAGIC)?;
        writer.write_u24::<BigEndian>(header.decompressed_length)?;
        Ok(())
    }

    fn length(_: &Header) -> usize {
        5
    }
}
