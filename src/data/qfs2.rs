////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! QFS2 decompression: byte pair substitution.
//!
//! After the header come an escape byte, a pattern count, and `count` records
//! of `(id, value1, value2)`. Each record makes `id` stand for the expansion
//! of `value1` followed by the expansion of `value2`, where a value expands to
//! the entry already recorded for it, or to itself. The body is then read one
//! byte at a time: a byte with an entry emits its expansion, the escape byte
//! emits the following byte verbatim, and every other byte is copied.

use std::io::{self, Cursor};

use byteorder::ReadBytesExt;
use tracing::debug;

use crate::header::mode::Qfs2;
use crate::header::Header;
use crate::{Decoded, QfsError, QfsResult};

struct Dictionary {
    entries: Vec<Option<Vec<u8>>>,
    // expansions never need to be longer than the output
    cap: usize,
}

impl Dictionary {
    fn new(cap: usize) -> Self {
        Self {
            entries: vec![None; 256],
            cap,
        }
    }

    fn expand_into(&self, value: u8, out: &mut Vec<u8>) {
        match &self.entries[value as usize] {
            Some(expansion) => out.extend_from_slice(expansion),
            None => out.push(value),
        }
    }

    fn insert(&mut self, id: u8, first: u8, second: u8) {
        let mut expansion = Vec::with_capacity(2);
        self.expand_into(first, &mut expansion);
        self.expand_into(second, &mut expansion);
        // one byte over the cap is enough to fail the length check on use
        expansion.truncate(self.cap + 1);
        self.entries[id as usize] = Some(expansion);
    }

    fn get(&self, id: u8) -> Option<&[u8]> {
        self.entries[id as usize].as_deref()
    }
}

/// Decode a complete QFS2 blob, header included. Every input byte is
/// consumed.
///
/// # Errors
/// - [QfsError::Integrity]: the output length differs from the declared one
/// - [QfsError::Io]: the pattern table is truncated, or the input ends right
///   after an escape byte
#[tracing::instrument(skip(input), fields(input_length = input.len()))]
pub fn decode(input: &[u8]) -> QfsResult<Decoded> {
    let mut reader = Cursor::new(input);
    let header = Header::read::<Qfs2>(&mut reader)?;
    let declared = header.decompressed_length as usize;

    let escape = reader.read_u8()?;
    let count = reader.read_u8()?;
    debug!(?header, escape, count, "qfs2 header");

    let mut dictionary = Dictionary::new(declared);
    for _ in 0..count {
        let id = reader.read_u8()?;
        let first = reader.read_u8()?;
        let second = reader.read_u8()?;
        dictionary.insert(id, first, second);
    }

    let mut body = input[reader.position() as usize..].iter().copied();
    let mut output = Vec::with_capacity(declared);

    while let Some(byte) = body.next() {
        if let Some(expansion) = dictionary.get(byte) {
            output.extend_from_slice(expansion);
        } else if byte == escape {
            let raw = body
                .next()
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
            output.push(raw);
        } else {
            output.push(byte);
        }

        if output.len() > declared {
            return Err(QfsError::Integrity {
                expected: declared,
                actual: output.len(),
            });
        }
    }

    if output.len() != declared {
        return Err(QfsError::Integrity {
            expected: declared,
            actual: output.len(),
        });
    }

    Ok(Decoded {
        bytes: output,
        consumed: input.len(),
    })
}
