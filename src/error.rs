////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::fmt::{Display, Formatter};

use crate::data::DecodeError;
use crate::machine::InterpreterError;

/// Possible errors returned by the codecs
#[derive(Debug)]
pub enum Error {
    /// Error for when no input is provided to a compressor function
    EmptyInput,
    /// The leading bytes of the input match no known compression signature.
    /// Callers may treat this as "not compressed" rather than a failure.
    ///
    /// ### Fields
    /// - [u8; 2]: The first two bytes that were inspected (zero padded)
    FormatUnrecognized([u8; 2]),
    /// Error that occurs when a flag was set in the header flags that is not
    /// supported
    ///
    /// ### Fields
    /// - u8: What was read instead of the expected flags
    BadFlags(u8),
    /// Error indicating that the header failed to read the magic where it
    /// expected it.
    ///
    /// ### Fields
    /// - u8: What was read instead of the magic value
    BadMagic(u8),
    /// The decoded length does not match the length declared in the header.
    /// Indicates either a corrupt source file or a decoder bug.
    Integrity { expected: usize, actual: usize },
    /// The header declares more output than the stream could ever produce,
    /// or more than the decoder can address. Nothing is allocated.
    ImplausibleLength { declared: usize, limit: usize },
    /// A RefPack control iteration consumed nothing and produced nothing
    DecodeStall { position: usize },
    /// Indicates that an invalid operation occurred while attempting to decode
    /// a control. This normally indicates invalid or corrupted data.
    ///
    /// See [DecodeError] for further details on types of errors that can occur.
    ControlError { error: DecodeError, position: usize },
    /// The instruction interpreter driving a decoder failed
    Interpreter(InterpreterError),
    /// The codec does not implement the requested direction
    Unsupported(&'static str),
    /// Generic IO Error wrapper for when a generic IO error of some sort occurs
    /// in relation to the readers and writers.
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<InterpreterError> for Error {
    fn from(value: InterpreterError) -> Self {
        Self::Interpreter(value)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::EmptyInput => {
                write!(f, "No input provided to compression")
            }
            Error::FormatUnrecognized([first, second]) => {
                write!(
                    f,
                    "No compression format matches header `{first:#04X} {second:#04X}`"
                )
            }
            Error::BadFlags(flags) => {
                write!(
                    f,
                    "Unknown flag was set in compression header `{flags:08b}`"
                )
            }
            Error::BadMagic(magic) => {
                write!(
                    f,
                    "Invalid magic number at compression header `{magic:#04X}`"
                )
            }
            Error::Integrity { expected, actual } => {
                write!(
                    f,
                    "Decoded `{actual}` bytes but the header declared `{expected}`"
                )
            }
            Error::ImplausibleLength { declared, limit } => {
                write!(
                    f,
                    "Header declares `{declared}` bytes but at most `{limit}` are possible"
                )
            }
            Error::DecodeStall { position } => {
                write!(f, "Decoding made no progress at input position `{position}`")
            }
            Error::ControlError { position, error } => {
                write!(
                    f,
                    "Error occured while decoding control block at position `{position}`:\n{error}"
                )
            }
            Error::Interpreter(err) => {
                write!(f, "Interpreter error: {err}")
            }
            Error::Unsupported(what) => {
                write!(f, "Unsupported operation: {what}")
            }
            Error::Io(err) => {
                write!(f, "IO Error: {err}")
            }
        }
    }
}

impl std::error::Error for Error {}
