////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

// Garbage after a valid signature must fail cleanly, never panic or hang.
// Declared lengths beyond what the body could expand to are refused up front.

use proptest::prelude::*;
use qfs_codec::codec::{Codec, Qfs2, Qfs3, RefPack};
use qfs_codec::easy_decompress;
use test_strategy::proptest;

fn with_header(signature: u8, length: u16, body: &[u8]) -> Vec<u8> {
    let mut input = vec![signature, 0xFB, 0];
    input.extend_from_slice(&length.to_be_bytes());
    input.extend_from_slice(body);
    input
}

#[proptest]
fn refpack_survives_garbage(
    #[strategy(prop_oneof![Just(0x10u8), Just(0x11)])] signature: u8,
    length: u16,
    #[strategy(proptest::collection::vec(any::<u8>(), 0..512))] body: Vec<u8>,
) {
    let input = with_header(signature, length, &body);
    if let Ok(decoded) = RefPack::decode(&input) {
        prop_assert_eq!(decoded.bytes.len(), usize::from(length));
        prop_assert!(decoded.consumed <= input.len());
    }
}

#[proptest]
fn qfs2_survives_garbage(
    length: u16,
    #[strategy(proptest::collection::vec(any::<u8>(), 0..512))] body: Vec<u8>,
) {
    let input = with_header(0x46, length, &body);
    if let Ok(decoded) = Qfs2::decode(&input) {
        prop_assert_eq!(decoded.bytes.len(), usize::from(length));
    }
}

#[proptest(ProptestConfig { cases: 64, ..ProptestConfig::default() })]
fn qfs3_survives_garbage(
    #[strategy(prop_oneof![Just(0x30u8), Just(0x32), Just(0x34)])] signature: u8,
    #[strategy(0u16..2048)] length: u16,
    #[strategy(proptest::collection::vec(any::<u8>(), 0..256))] body: Vec<u8>,
) {
    let input = with_header(signature, length, &body);
    if let Ok(decoded) = Qfs3::decode(&input) {
        prop_assert_eq!(decoded.bytes.len(), usize::from(length));
        prop_assert!(decoded.consumed <= input.len());
    }
}

#[proptest]
fn detection_never_panics(
    #[strategy(proptest::collection::vec(any::<u8>(), 0..8))] input: Vec<u8>,
) {
    let _ = easy_decompress(&input);
}

fn with_wide_header(signature: u8, length: u32, body: &[u8]) -> Vec<u8> {
    let mut input = vec![signature, 0xFB];
    input.extend_from_slice(&length.to_be_bytes());
    input.extend_from_slice(body);
    input
}

#[proptest]
fn refpack_refuses_unreachable_lengths(
    #[strategy(0x0100_0000u32..)] length: u32,
    #[strategy(proptest::collection::vec(any::<u8>(), 0..64))] body: Vec<u8>,
) {
    let input = with_wide_header(0x90, length, &body);
    prop_assert!(RefPack::decode(&input).is_err());
}

#[proptest(ProptestConfig { cases: 64, ..ProptestConfig::default() })]
fn qfs3_survives_four_byte_lengths(
    #[strategy(prop_oneof![Just(0x31u8), Just(0x33), Just(0x35)])] signature: u8,
    #[strategy(prop_oneof![0x0100_0000u32..0x0400_0000, Just(u32::MAX)])] length: u32,
    #[strategy(proptest::collection::vec(any::<u8>(), 0..64))] body: Vec<u8>,
) {
    let input = with_wide_header(signature, length, &body);
    if let Ok(decoded) = Qfs3::decode(&input) {
        prop_assert_eq!(decoded.bytes.len(), length as usize);
    }
}
