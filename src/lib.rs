////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Decoders for the three compression formats found in the archives of a 90s
//! EA racing game: RefPack, QFS2 and QFS3.
//!
//! RefPack is a byte oriented LZ77 variant; QFS2 substitutes byte pairs; QFS3
//! is an adaptive prefix code decoder known only as a machine routine, and is
//! decoded by replaying that routine on the small x86 flavoured
//! [machine] that ships with this crate.
//!
//! ```
//! let raw = b"ABABABABABABABAB hello hello hello";
//! let packed = qfs_codec::easy_compress(raw).unwrap();
//! let unpacked = qfs_codec::easy_decompress(&packed).unwrap();
//! assert_eq!(unpacked.bytes, raw);
//! ```
//!
//! To pick a codec statically use the markers in [codec], or inspect the
//! header first with [Format::detect].

#![warn(clippy::pedantic, clippy::cargo)]
// Due to the high amount of byte conversions, sometimes intentional lossy conversions are necessary.
#![allow(clippy::cast_possible_truncation)]
// The machine reinterprets register contents as signed and back all the time
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
// Default::default() is more idiomatic imo
#![allow(clippy::default_trait_access)]
// too many lines is a dumb metric
#![allow(clippy::too_many_lines)]

pub mod codec;
pub mod data;
mod error;
pub mod format;
pub mod header;
pub mod machine;

pub use crate::codec::Codec;
pub use crate::error::Error as QfsError;
pub use crate::format::Format;

/// Wrapper for the common result type of the crate
pub type QfsResult<T> = Result<T, QfsError>;

/// Output of a decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Decompressed data, exactly as long as the header declared
    pub bytes: Vec<u8>,
    /// Input bytes the decoder read, header included
    pub consumed: usize,
}

/// Detect the format from the header and decode.
///
/// # Errors
/// - [QfsError::FormatUnrecognized]: the header matches no supported format;
///   callers that accept uncompressed data may treat this as "not compressed"
/// - any error of the detected format's decoder
pub fn easy_decompress(input: &[u8]) -> QfsResult<Decoded> {
    match Format::detect(input) {
        Some(format) => format.decode(input),
        None => {
            let mut signature = [0u8; 2];
            for (slot, byte) in signature.iter_mut().zip(input) {
                *slot = *byte;
            }
            Err(QfsError::FormatUnrecognized(signature))
        }
    }
}

/// Compress with RefPack, the only format commonly written back.
///
/// # Errors
/// [QfsError::EmptyInput] if `input` is empty
pub fn easy_compress(input: &[u8]) -> QfsResult<Vec<u8>> {
    data::compression::encode(input)
}
