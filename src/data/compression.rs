////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! RefPack compression. A greedy single-candidate matcher: every three byte
//! prefix remembers only its latest position, and the first usable match is
//! taken at full length.

use std::collections::HashMap;

use tracing::debug;

use crate::data::control::{Command, LITERAL_MAX, LONG_LENGTH_MAX, LONG_OFFSET_MAX};
use crate::header::mode::refpack::{FLAG_LARGE, FLAG_REFPACK};
use crate::header::mode::RefPack;
use crate::header::Header;
use crate::{QfsError, QfsResult};

const LARGE_LENGTH_THRESHOLD: usize = 0xFF_FFFF;

fn prefix(input: &[u8]) -> [u8; 3] {
    [input[0], input[1], input[2]]
}

fn match_length(input: &[u8], source: usize, position: usize, max: usize) -> usize {
    input[position..]
        .iter()
        .zip(&input[source..])
        .take(max)
        .take_while(|(a, b)| a == b)
        .count()
}

/// Writes as many literal runs as fit and returns the leftover (at most three)
/// bytes, which must ride along with the next copy or stop command
fn write_literals<'a>(out: &mut Vec<u8>, literals: &'a [u8]) -> QfsResult<&'a [u8]> {
    let split = literals.len() - literals.len() % 4;
    for chunk in literals[..split].chunks(LITERAL_MAX as usize) {
        Command::Literal(chunk.len() as u8).write(out)?;
        out.extend_from_slice(chunk);
    }
    Ok(&literals[split..])
}

/// Compress `input` into a complete RefPack blob.
///
/// # Errors
/// - [QfsError::EmptyInput]: `input` is empty
/// - [QfsError::Unsupported]: `input` does not fit a four byte length
#[tracing::instrument(skip(input), fields(input_length = input.len()))]
pub fn encode(input: &[u8]) -> QfsResult<Vec<u8>> {
    if input.is_empty() {
        return Err(QfsError::EmptyInput);
    }
    let decompressed_length = u32::try_from(input.len())
        .map_err(|_| QfsError::Unsupported("inputs of 4 GiB or more"))?;

    let flags = if input.len() > LARGE_LENGTH_THRESHOLD {
        FLAG_REFPACK | FLAG_LARGE
    } else {
        FLAG_REFPACK
    };

    let mut out = Vec::with_capacity(input.len() / 2 + 16);
    Header {
        flags,
        decompressed_length,
        compressed_length: None,
    }
    .write::<RefPack>(&mut out)?;

    let mut prefix_table: HashMap<[u8; 3], usize> = HashMap::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i + 3 <= input.len() {
        let matched = prefix_table.insert(prefix(&input[i..]), i);
        let pending = ((i - literal_start) % 4) as u8;

        let found = matched.and_then(|matched| {
            let distance = i - matched;
            if distance > LONG_OFFSET_MAX as usize {
                return None;
            }
            let length = match_length(input, matched, i, LONG_LENGTH_MAX as usize);
            Command::copy(distance as u32, length as u16, pending).map(|command| (command, length))
        });

        if let Some((command, length)) = found {
            let leftover = write_literals(&mut out, &input[literal_start..i])?;
            command.write(&mut out)?;
            out.extend_from_slice(leftover);
            i += length;
            literal_start = i;
        } else {
            i += 1;
        }
    }

    let leftover = write_literals(&mut out, &input[literal_start..])?;
    Command::Stop(leftover.len() as u8).write(&mut out)?;
    out.extend_from_slice(leftover);

    debug!(compressed_length = out.len(), "refpack encoded");
    Ok(out)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;
    use crate::data::decompression::decode;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(encode(&[]), Err(QfsError::EmptyInput)));
    }

    #[test]
    fn repeats_become_back_references() {
        let input = b"abcabcabcabcabcabcabcabcabcabcabcabc".repeat(8);
        let encoded = encode(&input).unwrap();
        assert!(encoded.len() < input.len() / 4);
        assert_eq!(decode(&encoded).unwrap().bytes, input);
    }

    #[test]
    fn short_inputs_fit_in_the_stop_code() {
        let encoded = encode(b"hi").unwrap();
        assert_eq!(encoded, [0x10, 0xFB, 0, 0, 2, 0xFE, b'h', b'i']);
    }

    #[test]
    fn long_inputs_use_large_header() {
        let input = vec![7u8; LARGE_LENGTH_THRESHOLD + 1];
        let encoded = encode(&input).unwrap();
        assert_eq!(encoded[0], FLAG_REFPACK | FLAG_LARGE);
        assert_eq!(decode(&encoded).unwrap().bytes, input);
    }

    #[proptest]
    fn decodes_to_input(
        #[strategy(proptest::collection::vec(0u8..4, 1..2000))] input: Vec<u8>,
    ) {
        let encoded = encode(&input).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(decoded.consumed, encoded.len());
        prop_assert_eq!(decoded.bytes, input);
    }

    #[proptest]
    fn deterministic(#[any] input: Vec<u8>) {
        prop_assume!(!input.is_empty());
        prop_assert_eq!(encode(&input).unwrap(), encode(&input).unwrap());
    }
}
