////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! possible modes to use for header encoding and decoding
pub mod qfs2;
pub mod qfs3;
pub mod refpack;

use std::io::{Read, Seek, Write};

pub use qfs2::Qfs2;
pub use qfs3::Qfs3;
pub use refpack::RefPack;

use crate::header::Header;
use crate::QfsResult;

/// Represents a read and write format for a Header
pub trait Mode {
    /// Reads from a `Read + Seek` reader and attempts to parse a header at the current position.
    /// # Errors
    /// Returns [QfsError::BadMagic](crate::QfsError::BadMagic) if the in data has invalid
    /// magic numbers
    /// Returns [QfsError::Io](crate::QfsError::Io) if a generic IO Error occurs while
    /// attempting to read data
    fn read<R: Read + Seek>(reader: &mut R) -> QfsResult<Header>;
    /// Writes to a `Write` writer and attempts to encode a header at the current position.
    /// # Errors
    /// Returns [QfsError::Io](crate::QfsError::Io) if a generic IO Error occurs while
    /// attempting to write data
    fn write<W: Write>(header: Header, writer: &mut W) -> QfsResult<()>;
    /// Encoded length of `header`
    fn length(header: &Header) -> usize;
}
