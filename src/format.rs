////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Runtime format detection from the first two header bytes
use parse_display::Display;
use tracing::debug;

use crate::codec::{Codec, Qfs2, Qfs3, RefPack};
use crate::header::mode::qfs2::SIGNATURE as QFS2_SIGNATURE;
use crate::header::mode::qfs3::SIGNATURES as QFS3_SIGNATURES;
use crate::header::mode::refpack::FLAG_REFPACK;
use crate::header::MAGIC;
use crate::{Decoded, QfsResult};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(style = "lowercase")]
pub enum Format {
    RefPack,
    Qfs2,
    Qfs3,
}

impl Format {
    /// Classify `input` by its signature, `None` when nothing matches
    #[must_use]
    pub fn detect(input: &[u8]) -> Option<Self> {
        let format = match input {
            [first, MAGIC, ..] if first & 0xFE == FLAG_REFPACK => Some(Self::RefPack),
            [QFS2_SIGNATURE, MAGIC, ..] => Some(Self::Qfs2),
            [first, MAGIC, ..] if QFS3_SIGNATURES.contains(first) => Some(Self::Qfs3),
            _ => None,
        };
        debug!(?format, "detected");
        format
    }

    /// Decode with this format's codec
    ///
    /// # Errors
    /// Any decoding error of the format
    pub fn decode(self, input: &[u8]) -> QfsResult<Decoded> {
        match self {
            Self::RefPack => RefPack::decode(input),
            Self::Qfs2 => Qfs2::decode(input),
            Self::Qfs3 => Qfs3::decode(input),
        }
    }
}
