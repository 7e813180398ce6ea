////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! RefPack control codes utilized by compression and decompression

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::QfsResult;

/// minimum value of the literal length in a literal command
pub const LITERAL_MIN: u8 = 4;

/// maximum value of the literal length in a literal command
pub const LITERAL_MAX: u8 = 112;

/// maximum value of the literal length in a non-literal command
pub const COPY_LITERAL_MAX: u8 = 3;

/// maximum offset distance for a short command
pub const SHORT_OFFSET_MAX: u32 = 1_024;

/// minimum length for a short command
pub const SHORT_LENGTH_MIN: u16 = 3;

/// maximum length for a short command
pub const SHORT_LENGTH_MAX: u16 = 10;

/// maximum offset distance for a medium command
pub const MEDIUM_OFFSET_MAX: u32 = 16_384;

/// minimum length for a medium command
pub const MEDIUM_LENGTH_MIN: u16 = 4;

/// maximum length for a medium command
pub const MEDIUM_LENGTH_MAX: u16 = 67;

/// maximum offset distance for a long command
pub const LONG_OFFSET_MAX: u32 = 131_072;

/// minimum length for a long command
pub const LONG_LENGTH_MIN: u16 = 5;

/// maximum length for a long command
pub const LONG_LENGTH_MAX: u16 = 1_028;

/// Most output a single input byte can produce: a four byte long command
/// copying [LONG_LENGTH_MAX] bytes
pub const MAX_EXPANSION: usize = LONG_LENGTH_MAX as usize / 4;

/// Op-codes of the RefPack stream. Each command is followed by its literal
/// bytes, which are written before the back-reference is performed.
///
/// ### Key for layout
/// - `0` or `1`: header
/// - `P`: Position
/// - `L`: Length
/// - `B`: Literal bytes Length
/// - `-`: Nibble Separator
/// - `:`: Byte Separator
///
/// | Command | Len | Literal      | Length        | Position        | Layout                                    |
/// |---------|-----|--------------|---------------|-----------------|-------------------------------------------|
/// | Short   | 2   | (0..=3) +0   | (3..=10) +3   | (1..=1024) +1   | `0PPL-LLBB:PPPP-PPPP`                     |
/// | Medium  | 3   | (0..=3) +0   | (4..=67) +4   | (1..=16384) +1  | `10LL-LLLL:BBPP-PPPP:PPPP-PPPP`           |
/// | Long    | 4   | (0..=3) +0   | (5..=1028) +5 | (1..=131072) +1 | `110P-LLBB:PPPP-PPPP:PPPP-PPPP:LLLL-LLLL` |
/// | Literal | 1   | (4..=112) +4 | 0             | 0               | `111B-BBBB`                               |
/// | Stop    | 1   | (0..=3) +0   | 0             | 0               | `1111-11BB`                               |
///
/// Literal runs hold a multiple of four bytes, stored as `(n - 4) >> 2`. The
/// largest run, 112, encodes as `0xFB`; anything above would collide with the
/// stop codes at `0xFC..=0xFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Short { offset: u16, length: u8, literal: u8 },
    Medium { offset: u16, length: u8, literal: u8 },
    Long { offset: u32, length: u16, literal: u8 },
    Literal(u8),
    Stop(u8),
}

impl Command {
    /// Smallest copy command able to hold `offset` and `length`, or `None` if
    /// no command can encode them
    #[must_use]
    pub fn copy(offset: u32, length: u16, literal: u8) -> Option<Self> {
        if literal > COPY_LITERAL_MAX || offset == 0 {
            return None;
        }
        if offset <= SHORT_OFFSET_MAX && (SHORT_LENGTH_MIN..=SHORT_LENGTH_MAX).contains(&length) {
            Some(Self::Short {
                offset: offset as u16,
                length: length as u8,
                literal,
            })
        } else if offset <= MEDIUM_OFFSET_MAX
            && (MEDIUM_LENGTH_MIN..=MEDIUM_LENGTH_MAX).contains(&length)
        {
            Some(Self::Medium {
                offset: offset as u16,
                length: length as u8,
                literal,
            })
        } else if offset <= LONG_OFFSET_MAX && (LONG_LENGTH_MIN..=LONG_LENGTH_MAX).contains(&length)
        {
            Some(Self::Long {
                offset,
                length,
                literal,
            })
        } else {
            None
        }
    }

    /// Number of literal bytes following the command
    #[must_use]
    pub fn literal(self) -> usize {
        match self {
            Self::Short { literal, .. }
            | Self::Medium { literal, .. }
            | Self::Long { literal, .. }
            | Self::Literal(literal)
            | Self::Stop(literal) => literal as usize,
        }
    }

    /// `(offset, length)` of a back-reference, `None` for literal and stop
    /// commands
    #[must_use]
    pub fn offset_copy(self) -> Option<(usize, usize)> {
        match self {
            Self::Short { offset, length, .. } | Self::Medium { offset, length, .. } => {
                Some((offset as usize, length as usize))
            }
            Self::Long { offset, length, .. } => Some((offset as usize, length as usize)),
            Self::Literal(_) | Self::Stop(_) => None,
        }
    }

    /// Reads and decodes a command from a reader.
    ///
    /// # Errors
    /// - [QfsError::Io](crate::QfsError::Io): the command is truncated
    pub fn read(reader: &mut impl Read) -> QfsResult<Self> {
        let first = reader.read_u8()?;

        Ok(match first {
            0x00..=0x7F => {
                let second = reader.read_u8()?;
                Self::Short {
                    offset: ((u16::from(first & 0b0110_0000) << 3) | u16::from(second)) + 1,
                    length: ((first & 0b0001_1100) >> 2) + 3,
                    literal: first & 0b0000_0011,
                }
            }
            0x80..=0xBF => {
                let second = reader.read_u8()?;
                let third = reader.read_u8()?;
                Self::Medium {
                    offset: ((u16::from(second & 0b0011_1111) << 8) | u16::from(third)) + 1,
                    length: (first & 0b0011_1111) + 4,
                    literal: second >> 6,
                }
            }
            0xC0..=0xDF => {
                let second = reader.read_u8()?;
                let third = reader.read_u8()?;
                let fourth = reader.read_u8()?;
                Self::Long {
                    offset: ((u32::from(first & 0b0001_0000) << 12)
                        | (u32::from(second) << 8)
                        | u32::from(third))
                        + 1,
                    length: ((u16::from(first & 0b0000_1100) << 6) | u16::from(fourth)) + 5,
                    literal: first & 0b0000_0011,
                }
            }
            0xE0..=0xFB => Self::Literal(((first & 0b0001_1111) << 2) + 4),
            0xFC..=0xFF => Self::Stop(first & 0b0000_0011),
        })
    }

    /// Encodes and writes a command
    ///
    /// # Errors
    /// - [QfsError::Io](crate::QfsError::Io): Generic IO error occurred while
    ///   attempting to write data
    pub fn write(self, writer: &mut impl Write) -> QfsResult<()> {
        match self {
            Self::Short {
                offset,
                length,
                literal,
            } => {
                let offset = offset - 1;
                let length = length - 3;
                writer.write_u8(
                    ((offset >> 3) as u8 & 0b0110_0000)
                        | ((length << 2) & 0b0001_1100)
                        | (literal & 0b0000_0011),
                )?;
                writer.write_u8(offset as u8)?;
            }
            Self::Medium {
                offset,
                length,
                literal,
            } => {
                let offset = offset - 1;
                writer.write_u8(0b1000_0000 | ((length - 4) & 0b0011_1111))?;
                writer.write_u8(((literal & 0b0000_0011) << 6) | (offset >> 8) as u8)?;
                writer.write_u8(offset as u8)?;
            }
            Self::Long {
                offset,
                length,
                literal,
            } => {
                let offset = offset - 1;
                let length = length - 5;
                writer.write_u8(
                    0b1100_0000
                        | ((offset >> 12) as u8 & 0b0001_0000)
                        | ((length >> 6) as u8 & 0b0000_1100)
                        | (literal & 0b0000_0011),
                )?;
                writer.write_u8((offset >> 8) as u8)?;
                writer.write_u8(offset as u8)?;
                writer.write_u8(length as u8)?;
            }
            Self::Literal(literal) => {
                writer.write_u8(0b1110_0000 | (((literal - 4) >> 2) & 0b0001_1111))?;
            }
            Self::Stop(literal) => writer.write_u8(0b1111_1100 | (literal & 0b0000_0011))?,
        }
        Ok(())
    }
}
