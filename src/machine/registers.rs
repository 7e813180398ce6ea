////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Eight 32-bit registers with the overlapping 16 and 8-bit views of the four
//! general purpose ones.
//!
//! | register | bits   | backing |
//! |----------|--------|---------|
//! | `eax`    | 0..32  | A       |
//! | `ax`     | 0..16  | A       |
//! | `ah`     | 8..16  | A       |
//! | `al`     | 0..8   | A       |
//!
//! and likewise for `B`, `C` and `D`. `esi`, `edi`, `esp` and `ebp` have no
//! sub-views.

use parse_display::{Display, FromStr};

#[derive(Display, FromStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[display(style = "lowercase")]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Ax,
    Bx,
    Cx,
    Dx,
    Ah,
    Bh,
    Ch,
    Dh,
    Al,
    Bl,
    Cl,
    Dl,
    Esi,
    Edi,
    Esp,
    Ebp,
}

/// Which backing word a register lives in, and where
#[derive(Debug, Clone, Copy)]
struct View {
    slot: usize,
    shift: u32,
    mask: u32,
}

impl Register {
    /// Natural width of the register in bytes
    #[must_use]
    pub fn size(self) -> u8 {
        match self {
            Self::Eax | Self::Ebx | Self::Ecx | Self::Edx => 4,
            Self::Esi | Self::Edi | Self::Esp | Self::Ebp => 4,
            Self::Ax | Self::Bx | Self::Cx | Self::Dx => 2,
            _ => 1,
        }
    }

    fn view(self) -> View {
        let (slot, shift, mask) = match self {
            Self::Eax => (0, 0, u32::MAX),
            Self::Ebx => (1, 0, u32::MAX),
            Self::Ecx => (2, 0, u32::MAX),
            Self::Edx => (3, 0, u32::MAX),
            Self::Ax => (0, 0, 0xFFFF),
            Self::Bx => (1, 0, 0xFFFF),
            Self::Cx => (2, 0, 0xFFFF),
            Self::Dx => (3, 0, 0xFFFF),
            Self::Ah => (0, 8, 0xFF),
            Self::Bh => (1, 8, 0xFF),
            Self::Ch => (2, 8, 0xFF),
            Self::Dh => (3, 8, 0xFF),
            Self::Al => (0, 0, 0xFF),
            Self::Bl => (1, 0, 0xFF),
            Self::Cl => (2, 0, 0xFF),
            Self::Dl => (3, 0, 0xFF),
            Self::Esi => (4, 0, u32::MAX),
            Self::Edi => (5, 0, u32::MAX),
            Self::Esp => (6, 0, u32::MAX),
            Self::Ebp => (7, 0, u32::MAX),
        };
        View { slot, shift, mask }
    }
}

/// Backing store: `A B C D SI DI SP BP`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    words: [u32; 8],
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read(&self, register: Register) -> u32 {
        let View { slot, shift, mask } = register.view();
        (self.words[slot] >> shift) & mask
    }

    /// Write `value` through the register's view. Bits outside the view's
    /// width are discarded and the rest of the backing word is kept.
    pub fn write(&mut self, register: Register, value: u32) {
        let View { slot, shift, mask } = register.view();
        let word = &mut self.words[slot];
        *word = (*word & !(mask << shift)) | ((value & mask) << shift);
    }

    /// Read the register as a two's complement number of its own width
    #[must_use]
    pub fn read_signed(&self, register: Register) -> i32 {
        let value = self.read(register);
        match register.size() {
            1 => i32::from(value as u8 as i8),
            2 => i32::from(value as u16 as i16),
            _ => value as i32,
        }
    }
}

impl std::fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, si, di, sp, bp] = self.words;
        write!(
            f,
            "eax={a:08X} ebx={b:08X} ecx={c:08X} edx={d:08X} esi={si:08X} edi={di:08X} \
             esp={sp:08X} ebp={bp:08X}"
        )
    }
}
