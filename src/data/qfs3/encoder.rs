////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! QFS3 compression: the stream layout described in [the decoder](super),
//! produced with a Huffman code and a greedy four byte prefix matcher.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tracing::debug;

use crate::data::qfs3::{CodeCounts, MAX_CODE_LENGTH};
use crate::header::mode::qfs3::{FLAG_DOUBLE_SUM, FLAG_LARGE, FLAG_SINGLE_SUM, SIGNATURES};
use crate::header::mode::Qfs3;
use crate::header::Header;
use crate::{QfsError, QfsResult};

const MIN_MATCH: usize = 4;
const MAX_MATCH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Copy { distance: usize, length: usize },
}

/// MSB first bit sink, padded to whole 16 bit words
#[derive(Default)]
pub(super) struct BitWriter {
    bytes: Vec<u8>,
    accumulator: u64,
    held: u32,
}

impl BitWriter {
    pub(super) fn write(&mut self, value: u32, count: u32) {
        self.accumulator = (self.accumulator << count) | (u64::from(value) & ((1 << count) - 1));
        self.held += count;
        while self.held >= 8 {
            self.held -= 8;
            self.bytes.push((self.accumulator >> self.held) as u8);
        }
    }

    pub(super) fn number(&mut self, value: u32) {
        let biased = value + 4;
        if biased < 8 {
            self.write(biased, 3);
        } else {
            let width = 32 - biased.leading_zeros();
            self.write(0, width - 3);
            self.write(biased, width);
        }
    }

    pub(super) fn finish(mut self) -> Vec<u8> {
        if self.held > 0 {
            self.write(0, 8 - self.held);
        }
        if self.bytes.len() % 2 == 1 {
            self.bytes.push(0);
        }
        self.bytes
    }
}

/// Inverse of the running sum applied by the decoder
fn delta(bytes: &mut [u8]) {
    let mut previous = 0u8;
    for byte in bytes {
        let current = *byte;
        *byte = current.wrapping_sub(previous);
        previous = current;
    }
}

fn tokenize(input: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(input.len());
    let mut prefixes: HashMap<[u8; MIN_MATCH], usize> = HashMap::new();
    let mut i = 0;
    while i < input.len() {
        let matched = input.get(i..i + MIN_MATCH).and_then(|prefix| {
            let key = [prefix[0], prefix[1], prefix[2], prefix[3]];
            prefixes.insert(key, i)
        });
        if let Some(source) = matched {
            let length = input[i..]
                .iter()
                .zip(&input[source..])
                .take(MAX_MATCH)
                .take_while(|(a, b)| a == b)
                .count();
            tokens.push(Token::Copy {
                distance: i - source,
                length,
            });
            i += length;
        } else {
            tokens.push(Token::Literal(input[i]));
            i += 1;
        }
    }
    tokens
}

/// Huffman code lengths for every byte with a nonzero weight, none longer than
/// [MAX_CODE_LENGTH]
fn code_lengths(weights: &[u64; 256]) -> [u8; 256] {
    let lengths = huffman(weights);
    if lengths.iter().all(|&len| len as usize <= MAX_CODE_LENGTH) {
        return lengths;
    }
    // flat weights give a balanced tree, at most eight bits deep
    let flat = weights.map(|weight| u64::from(weight != 0));
    huffman(&flat)
}

fn huffman(weights: &[u64; 256]) -> [u8; 256] {
    let mut parent: Vec<usize> = vec![usize::MAX; 256];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = weights
        .iter()
        .enumerate()
        .filter(|(_, &weight)| weight > 0)
        .map(|(symbol, &weight)| Reverse((weight, symbol)))
        .collect();

    while heap.len() > 1 {
        let (Some(Reverse((a, left))), Some(Reverse((b, right)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let node = parent.len();
        parent.push(usize::MAX);
        parent[left] = node;
        parent[right] = node;
        heap.push(Reverse((a + b, node)));
    }

    let mut lengths = [0u8; 256];
    for (symbol, length) in lengths.iter_mut().enumerate() {
        if weights[symbol] == 0 {
            continue;
        }
        let mut node = symbol;
        let mut depth = 0u8;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth = depth.saturating_add(1);
        }
        *length = depth;
    }
    lengths
}

/// Compress `input` into a complete QFS3 blob with the given signature byte.
/// Signatures with [FLAG_SINGLE_SUM] or [FLAG_DOUBLE_SUM] store the input's
/// differences, which the decoder sums back up.
///
/// # Errors
/// - [QfsError::BadFlags]: `signature` is not one of `0x30..=0x35`
/// - [QfsError::Unsupported]: `input` is too long for the signature's length
///   field
#[tracing::instrument(skip(input), fields(input_length = input.len()))]
pub fn encode(input: &[u8], signature: u8) -> QfsResult<Vec<u8>> {
    if !SIGNATURES.contains(&signature) {
        return Err(QfsError::BadFlags(signature));
    }
    let limit = if signature & FLAG_LARGE == 0 {
        0xFF_FFFF
    } else {
        u32::MAX as usize
    };
    if input.len() > limit {
        return Err(QfsError::Unsupported("input too long for the QFS3 length field"));
    }

    let mut data = input.to_vec();
    if signature & FLAG_DOUBLE_SUM != 0 {
        delta(&mut data);
        delta(&mut data);
    } else if signature & FLAG_SINGLE_SUM != 0 {
        delta(&mut data);
    }

    let tokens = tokenize(&data);

    let mut frequency = [0u64; 256];
    for token in &tokens {
        if let Token::Literal(byte) = token {
            frequency[*byte as usize] += 1;
        }
    }
    let escape = (0..=255u8)
        .min_by_key(|&byte| frequency[byte as usize])
        .unwrap_or(0);

    let mut weights = frequency;
    // copies and the end marker use the escape code too
    weights[escape as usize] += 1 + tokens
        .iter()
        .filter(|token| matches!(token, Token::Copy { .. }))
        .count() as u64;
    if weights.iter().filter(|&&weight| weight > 0).count() < 2 {
        weights[escape.wrapping_add(1) as usize] = 1;
    }
    let lengths = code_lengths(&weights);

    let mut ranked: Vec<u8> = (0..=255u8).filter(|&byte| lengths[byte as usize] > 0).collect();
    ranked.sort_by_key(|&byte| (lengths[byte as usize], byte));

    let mut counts: CodeCounts = [0; MAX_CODE_LENGTH + 1];
    for &byte in &ranked {
        counts[lengths[byte as usize] as usize] += 1;
    }

    let mut out = Vec::with_capacity(input.len() / 2 + 32);
    Header {
        flags: signature,
        decompressed_length: input.len() as u32,
        compressed_length: None,
    }
    .write::<Qfs3>(&mut out)?;

    let mut bits = BitWriter::default();
    bits.write(u32::from(escape), 8);

    let mut space = 1u64;
    for &count in &counts[1..] {
        space <<= 1;
        bits.number(count);
        space -= u64::from(count);
        if space == 0 {
            break;
        }
    }

    let mut used = [false; 256];
    let mut cursor = 0xFFu8;
    for &symbol in &ranked {
        let mut leap = 0;
        let mut slot = cursor;
        loop {
            slot = slot.wrapping_add(1);
            if slot == symbol {
                break;
            }
            if !used[slot as usize] {
                leap += 1;
            }
        }
        bits.number(leap);
        used[symbol as usize] = true;
        cursor = symbol;
    }

    let mut codes = [(0u32, 0u32); 256];
    let mut code = 0u32;
    let mut previous_length = 0u8;
    for &symbol in &ranked {
        let length = lengths[symbol as usize];
        code <<= length - previous_length;
        codes[symbol as usize] = (code, u32::from(length));
        code += 1;
        previous_length = length;
    }
    let emit = |bits: &mut BitWriter, symbol: u8| {
        let (code, length) = codes[symbol as usize];
        bits.write(code, length);
    };

    for token in &tokens {
        match *token {
            Token::Literal(byte) if byte == escape => {
                emit(&mut bits, escape);
                bits.number(0);
                bits.write(0, 1);
            }
            Token::Literal(byte) => emit(&mut bits, byte),
            Token::Copy { distance, length } => {
                emit(&mut bits, escape);
                bits.number(length as u32);
                bits.number(distance as u32 - 1);
            }
        }
    }
    emit(&mut bits, escape);
    bits.number(0);
    bits.write(1, 1);

    out.extend(bits.finish());
    debug!(escape, symbols = ranked.len(), tokens = tokens.len(), "qfs3 encoded");
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numbers_use_short_and_prefixed_forms() {
        let mut bits = BitWriter::default();
        bits.number(2);
        bits.number(15);
        assert_eq!(bits.finish(), [0b1100_0100, 0b1100_0000]);
    }

    #[test]
    fn delta_inverts_running_sum() {
        let mut bytes = [3u8, 5, 4, 250];
        delta(&mut bytes);
        assert_eq!(bytes, [3, 2, 255, 246]);
    }

    #[test]
    fn tokenizer_finds_overlapping_copies() {
        assert_eq!(
            tokenize(b"aaaaaaaaaa"),
            [
                Token::Literal(b'a'),
                Token::Copy {
                    distance: 1,
                    length: 9
                }
            ]
        );
    }

    #[test]
    fn skewed_weights_fall_back_to_flat_code() {
        let mut weights = [0u64; 256];
        for (index, weight) in weights.iter_mut().take(40).enumerate() {
            *weight = 1 << index.min(39);
        }
        let lengths = code_lengths(&weights);
        assert!(lengths.iter().all(|&len| len as usize <= MAX_CODE_LENGTH));
        assert_eq!(lengths.iter().filter(|&&len| len > 0).count(), 40);
    }

    #[test]
    fn rejects_unknown_signature() {
        assert!(matches!(encode(b"a", 0x10), Err(QfsError::BadFlags(0x10))));
    }
}
