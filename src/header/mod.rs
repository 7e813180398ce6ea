////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Module for things relating to the header of the data: the signature word,
//! the decompressed length, and for some RefPack files the compressed length.

use std::io::{Read, Seek, Write};

use crate::header::mode::Mode;
use crate::QfsResult;

pub mod mode;

/// Second byte of every supported signature
pub const MAGIC: u8 = 0xFB;

/// Internal struct to represent a decoded header
#[derive(Eq, PartialEq, Debug, Default, Copy, Clone)]
pub struct Header {
    /// First signature byte. Its bits select length widths and
    /// post-processing depending on the format.
    pub flags: u8,
    pub decompressed_length: u32,
    pub compressed_length: Option<u32>,
}

impl Header {
    /// # Errors
    /// - [QfsError::BadMagic](crate::QfsError::BadMagic): the second byte is not [MAGIC]
    /// - [QfsError::BadFlags](crate::QfsError::BadFlags): the first byte is not valid for `M`
    /// - [QfsError::Io](crate::QfsError::Io): generic IO error, e.g. truncated input
    pub fn read<M: Mode>(reader: &mut (impl Read + Seek)) -> QfsResult<Header> {
        M::read(reader)
    }

    /// # Errors
    /// Returns [QfsError::Io](crate::QfsError::Io) if the write failed due to a
    /// generic IO Error
    pub fn write<M: Mode>(self, writer: &mut impl Write) -> QfsResult<()> {
        M::write(self, writer)
    }

    /// Number of bytes this header occupies when encoded with `M`
    #[must_use]
    pub fn length<M: Mode>(&self) -> usize {
        M::length(self)
    }
}
