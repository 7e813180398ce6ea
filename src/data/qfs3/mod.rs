////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! QFS3 decompression, replayed on the [machine](crate::machine).
//!
//! After the header the input is one big endian bit stream, read most
//! significant bit first through a 32 bit window refilled 16 bits at a time:
//!
//! 1. 8 bits: the escape symbol
//! 2. code lengths: for each length from 1 bit up, a number giving how many
//!    codes have that length, until the code space is full
//! 3. symbols: for each rank, a number `n` that moves a cursor (starting at
//!    `0xFF`) forward `n % free + 1` times over the byte values not yet
//!    ranked, landing on the next symbol
//! 4. tokens until the declared length is produced:
//!    - a code for a symbol other than the escape is that literal byte
//!    - the escape code followed by a nonzero number `length` and a number
//!      `distance - 1` copies `length` bytes from `distance` bytes back,
//!      repeating when they overlap
//!    - the escape code followed by a zero and a `0` bit is the escape byte
//!      as a literal; followed by a zero and a `1` bit it ends the stream
//!
//! Codes are canonical. Ranked symbols take their lengths in rank order, the
//! first `counts[1]` ranks one bit codes, the next `counts[2]` two bit codes,
//! and so on. Codes of one length are consecutive, and the first code of
//! each length follows the last code of the previous length shifted left
//! by one.
//!
//! Numbers are a self describing prefix code: a leading `1` bit starts a three
//! bit value, otherwise `z` zero bits and a one bit are followed by `z + 2`
//! payload bits. Either way the value read has 4 subtracted.
//!
//! Signatures `0x32`/`0x33` turn the output into its running sum, and
//! `0x34`/`0x35` into the running sum of the running sum.

use tracing::{debug, trace};

use crate::data::DecodeError;
use crate::header::mode::qfs3::{FLAG_DOUBLE_SUM, FLAG_SINGLE_SUM};
use crate::header::mode::Qfs3;
use crate::header::Header;
use crate::machine::{Interpreter, Register};
use crate::{Decoded, QfsError, QfsResult};

pub mod encoder;
mod program;

/// Longest code in bits
pub const MAX_CODE_LENGTH: usize = 16;

/// Number of codes of each length, indexed by length
pub type CodeCounts = [u32; MAX_CODE_LENGTH + 1];

// zeroed bytes after the input so reads ahead of the bit window stay in bounds
const INPUT_SLACK: usize = 32;
const STACK_SIZE: usize = 256;
const LENGTH_TABLE: usize = (MAX_CODE_LENGTH + 1) * 4;

/// Byte tables, one entry per byte value
const BYTE_TABLES: [&str; 4] = ["quick_len", "quick_sym", "symbols", "ranked"];
/// Dword tables, one entry per code length
const LENGTH_TABLES: [&str; 3] = ["counts", "first_code", "first_index"];
/// Dword loop state
const CELLS: [&str; 7] = ["space", "length", "total", "cursor", "rank", "steps", "entry"];

/// Where everything lives in the machine's memory:
/// `input | slack | byte tables | length tables | cells | stack | output`
#[derive(Debug, Clone, Copy)]
struct Layout {
    tables: usize,
    /// Stack grows down from here, output grows up
    output: usize,
    capacity: usize,
}

impl Layout {
    fn new(input_length: usize, declared: usize) -> QfsResult<Self> {
        let tables = input_length + INPUT_SLACK;
        let output = tables
            + BYTE_TABLES.len() * 256
            + LENGTH_TABLES.len() * LENGTH_TABLE
            + CELLS.len() * 4
            + STACK_SIZE;
        // every address, including one past the output, must fit a register
        let limit = (u32::MAX as usize).saturating_sub(output);
        if declared > limit {
            return Err(QfsError::ImplausibleLength { declared, limit });
        }
        Ok(Self {
            tables,
            output,
            capacity: output + declared,
        })
    }

    /// Name every table and cell on `machine`
    fn define(&self, machine: &mut Interpreter, declared: usize) -> QfsResult<()> {
        let mut address = self.tables;
        for name in BYTE_TABLES {
            machine.define_variable(name, address as u32, 1)?;
            address += 256;
        }
        for name in LENGTH_TABLES {
            machine.define_variable(name, address as u32, 4)?;
            address += LENGTH_TABLE;
        }
        for name in CELLS {
            machine.define_variable(name, address as u32, 4)?;
            address += 4;
        }
        machine.define_variable("output", self.output as u32, 4)?;
        machine.define_variable("output_len", declared as u32, 4)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostProcess {
    SingleSum,
    DoubleSum,
}

impl PostProcess {
    fn from_signature(signature: u8) -> Option<Self> {
        if signature & FLAG_DOUBLE_SUM != 0 {
            Some(Self::DoubleSum)
        } else if signature & FLAG_SINGLE_SUM != 0 {
            Some(Self::SingleSum)
        } else {
            None
        }
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    machine: Interpreter,
    layout: Layout,
    declared: usize,
}

impl<'a> Decoder<'a> {
    fn getbits(&mut self, count: u32) -> QfsResult<u32> {
        self.machine.registers_mut().write(Register::Ecx, count);
        self.machine.run_line("call getbits")?;
        Ok(self.machine.registers().read(Register::Eax))
    }

    /// Current value of a dword cell
    fn cell(&self, name: &str) -> QfsResult<u32> {
        let address = self.machine.variable(name).unwrap_or_default();
        Ok(self.machine.memory().load(i64::from(address), 4)?)
    }

    /// Input bytes the bit stream has used so far
    fn consumed(&self) -> usize {
        let registers = self.machine.registers();
        let loaded = registers.read(Register::Esi) as usize * 8;
        let held = (16 + i64::from(registers.read_signed(Register::Edx))) as usize;
        (loaded - held).div_ceil(8)
    }

    fn check_consumed(&self) -> QfsResult<()> {
        let consumed = self.consumed();
        if consumed > self.input.len() {
            return Err(QfsError::ControlError {
                error: DecodeError::TruncatedInput(consumed, self.input.len()),
                position: self.produced(),
            });
        }
        Ok(())
    }

    fn produced(&self) -> usize {
        self.machine.registers().read(Register::Edi) as usize - self.layout.output
    }

    /// Phase 1: code counts per length until the code space is full.
    /// Returns the number of symbols.
    fn code_lengths(&mut self) -> QfsResult<usize> {
        let bad = |error| QfsError::ControlError { error, position: 0 };
        self.machine.run_block(program::CODE_SPACE_START)?;
        loop {
            if self.machine.run_block(program::CODE_LENGTH)? == Some(true) {
                return Err(bad(DecodeError::BadCodeLengths));
            }
            self.check_consumed()?;
            if self.machine.run_block(program::CODE_SPACE_FULL)? == Some(true) {
                break;
            }
            if self.machine.run_block(program::CODE_LENGTH_LAST)? == Some(true) {
                return Err(bad(DecodeError::BadCodeLengths));
            }
        }

        let total = self.cell("total")? as usize;
        if total > 256 {
            return Err(bad(DecodeError::TooManySymbols(total)));
        }
        Ok(total)
    }

    /// Phase 2: rank symbols by leaping over the byte values not yet ranked
    fn symbols(&mut self) -> QfsResult<()> {
        self.machine.run_block(program::RANKS_START)?;
        while self.machine.run_block(program::RANK_NEXT)? == Some(true) {
            self.machine.run_block(program::RANK_LEAP)?;
            self.check_consumed()?;
            loop {
                while self.machine.run_block(program::LEAP)? == Some(true) {}
                if self.machine.run_block(program::LEAP_COUNT)? != Some(true) {
                    break;
                }
            }
            self.machine.run_block(program::RANK_PLACE)?;
        }
        Ok(())
    }

    fn tokens(&mut self) -> QfsResult<()> {
        while self.produced() < self.declared {
            self.check_consumed()?;

            if self.machine.run_block(program::LOOKUP)? == Some(true) {
                self.machine.run_block(program::LONG_CODE)?;
                if !program::resolve(&mut self.machine, false)? {
                    let window = self.machine.registers().read(Register::Ebp);
                    return Err(QfsError::ControlError {
                        error: DecodeError::InvalidCode(window),
                        position: self.produced(),
                    });
                }
            } else {
                self.machine.run_block(program::QUICK_SYMBOL)?;
            }

            if self.machine.run_block(program::CONSUME)? != Some(true) {
                self.machine.run_block(program::LITERAL)?;
                continue;
            }

            if self.machine.run_block(program::ESCAPE)? == Some(true) {
                if self.machine.run_block(program::CONTROL)? == Some(true) {
                    trace!(produced = self.produced(), "end of stream");
                    break;
                }
                self.machine.run_block(program::ESCAPED_LITERAL)?;
                continue;
            }

            self.machine.run_block(program::COPY_OPERANDS)?;
            self.check_consumed()?;
            let position = self.produced();
            let registers = self.machine.registers();
            let distance = registers.read(Register::Eax) as usize;
            let length = registers.read(Register::Ecx) as usize;
            if distance == 0 {
                return Err(QfsError::ControlError {
                    error: DecodeError::BadOffset,
                    position,
                });
            }
            if distance > position {
                return Err(QfsError::ControlError {
                    error: DecodeError::NegativePosition(position, distance),
                    position,
                });
            }
            if position + length > self.declared {
                return Err(QfsError::ControlError {
                    error: DecodeError::BadLength(position + length - self.declared),
                    position,
                });
            }
            self.machine.run_block(program::COPY)?;
        }
        self.check_consumed()
    }

    fn post_process(&mut self, post: PostProcess) -> QfsResult<()> {
        if self.declared == 0 {
            return Ok(());
        }
        let step = match post {
            PostProcess::SingleSum => program::SINGLE_SUM,
            PostProcess::DoubleSum => program::DOUBLE_SUM,
        };
        self.machine.run_block(program::SUM_START)?;
        while self.machine.run_block(step)? == Some(true) {}
        Ok(())
    }
}

/// Decode a complete QFS3 blob, header included.
///
/// # Errors
/// - [QfsError::BadMagic], [QfsError::BadFlags]: not a QFS3 signature
/// - [QfsError::ImplausibleLength]: the declared length does not fit the
///   machine's address space
/// - [QfsError::ControlError]: malformed code tables or tokens, or a bit
///   stream longer than the input
/// - [QfsError::Interpreter]: a number with an overlong prefix, or output
///   memory the host could not provide
/// - [QfsError::Integrity]: the stream ended before the declared length
#[tracing::instrument(skip(input), fields(input_length = input.len()))]
pub fn decode(input: &[u8]) -> QfsResult<Decoded> {
    let header = Header::read::<Qfs3>(&mut std::io::Cursor::new(input))?;
    let header_length = header.length::<Qfs3>();
    let declared = header.decompressed_length as usize;
    let post = PostProcess::from_signature(header.flags);
    debug!(?header, ?post, "qfs3 header");

    let layout = Layout::new(input.len(), declared)?;
    let mut machine = program::machine(layout.capacity);
    layout.define(&mut machine, declared)?;
    machine.memory_mut().write_slice(0, input)?;
    let registers = machine.registers_mut();
    registers.write(Register::Esi, header_length as u32);
    registers.write(Register::Edi, layout.output as u32);
    registers.write(Register::Esp, layout.output as u32);
    machine.run_block(program::PRIME)?;

    let mut decoder = Decoder {
        input,
        machine,
        layout,
        declared,
    };

    let escape = decoder.getbits(8)? as u8;
    let total = decoder.code_lengths()?;
    decoder.symbols()?;
    program::build_tables(&mut decoder.machine)?;
    decoder.machine.define_variable("escape", u32::from(escape), 1)?;
    debug!(escape, symbols = total, "qfs3 code tables");

    decoder.tokens()?;

    let produced = decoder.produced();
    if produced != declared {
        return Err(QfsError::Integrity {
            expected: declared,
            actual: produced,
        });
    }

    if let Some(post) = post {
        decoder.post_process(post)?;
    }

    let consumed = decoder.consumed();
    let bytes = decoder.machine.memory().read_bytes(layout.output, declared)?;
    Ok(Decoded { bytes, consumed })
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;
    use crate::header::mode::qfs3::SIGNATURES;
    use crate::machine::InterpreterError;

    fn round_trip(input: &[u8], signature: u8) -> Decoded {
        let encoded = encoder::encode(input, signature).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert!(decoded.consumed <= encoded.len());
        decoded
    }

    #[test]
    fn literals_only() {
        assert_eq!(round_trip(b"abcd", 0x30).bytes, b"abcd");
    }

    #[test]
    fn single_symbol_input() {
        assert_eq!(round_trip(&[9; 3], 0x30).bytes, [9; 3]);
    }

    #[test]
    fn overlapping_copies() {
        let input = b"xyzxyzxyzxyzxyzxyzxyzxyzxyzxyz!".repeat(3);
        assert_eq!(round_trip(&input, 0x30).bytes, input);
    }

    #[test]
    fn running_sums() {
        let input: Vec<u8> = (0..200u32).map(|i| (i * i / 7) as u8).collect();
        for signature in SIGNATURES {
            assert_eq!(round_trip(&input, signature).bytes, input, "{signature:#04X}");
        }
    }

    #[test]
    fn empty_output() {
        assert_eq!(round_trip(&[], 0x34).bytes, b"");
    }

    #[test]
    fn truncated_stream() {
        let input = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let encoded = encoder::encode(&input, 0x30).unwrap();
        let error = decode(&encoded[..encoded.len() / 2]).unwrap_err();
        assert!(
            matches!(
                error,
                QfsError::ControlError {
                    error: DecodeError::TruncatedInput(..),
                    ..
                } | QfsError::Interpreter(InterpreterError::RoutineFault(_))
            ),
            "{error}"
        );
    }

    #[test]
    fn incomplete_code_lengths() {
        // escape 0, one code of one bit, then a zero count for every other length
        let input = [
            0x30, 0xFB, 0, 0, 1, 0x00, 0xB2, 0x49, 0x24, 0x92, 0x49, 0x24, 0x00,
        ];
        assert!(matches!(
            decode(&input),
            Err(QfsError::ControlError {
                error: DecodeError::BadCodeLengths,
                position: 0
            })
        ));
    }

    fn stream(declared: u8, write: impl FnOnce(&mut encoder::BitWriter)) -> Vec<u8> {
        let mut bits = encoder::BitWriter::default();
        write(&mut bits);
        let mut input = vec![0x30, 0xFB, 0, 0, declared];
        input.extend(bits.finish());
        input.extend_from_slice(&[0; 4]);
        input
    }

    #[test]
    fn oversubscribed_code_lengths() {
        // three one bit codes
        let input = stream(1, |bits| {
            bits.write(0, 8);
            bits.number(3);
        });
        assert!(matches!(
            decode(&input),
            Err(QfsError::ControlError {
                error: DecodeError::BadCodeLengths,
                position: 0
            })
        ));
    }

    #[test]
    fn too_many_symbols() {
        let input = stream(1, |bits| {
            bits.write(0, 8);
            for _ in 1..9 {
                bits.number(0);
            }
            bits.number(512);
        });
        assert!(matches!(
            decode(&input),
            Err(QfsError::ControlError {
                error: DecodeError::TooManySymbols(512),
                position: 0
            })
        ));
    }

    #[test]
    fn leaps_wrap_over_free_bytes() {
        // 300 % 256 + 1 steps from 0xFF lands on 0x2C, then one more on 0x2D
        let input = stream(3, |bits| {
            bits.write(0, 8);
            bits.number(2);
            bits.number(300);
            bits.number(0);
            bits.write(0b010, 3);
        });
        assert_eq!(decode(&input).unwrap().bytes, [0x2C, 0x2D, 0x2C]);
    }

    #[test]
    fn long_codes_resolve_past_the_quick_table() {
        // one code per length from 1 to 15 bits, two of 16 bits
        let input = stream(3, |bits| {
            bits.write(0xFF, 8);
            for _ in 1..16 {
                bits.number(1);
            }
            bits.number(2);
            for _ in 0..17 {
                bits.number(0);
            }
            // the two sixteen bit codes, then the one bit code
            bits.write(0xFFFE, 16);
            bits.write(0xFFFF, 16);
            bits.write(0, 1);
        });
        // ranks land on bytes 0 to 16 in order
        assert_eq!(decode(&input).unwrap().bytes, [15, 16, 0]);
    }

    #[test]
    fn unreachable_declared_length() {
        let input = [0x31, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0x80];
        assert!(matches!(
            decode(&input),
            Err(QfsError::ImplausibleLength {
                declared: 0xFFFF_FFFF,
                ..
            })
        ));

        // large but addressable: memory is only backed as it is written
        let input = [0x31, 0xFB, 0x40, 0, 0, 0, 0x80];
        assert!(decode(&input).is_err());
    }

    #[test]
    fn copy_past_declared_length() {
        let mut encoded = encoder::encode(b"aaaaaaaaaa", 0x30).unwrap();
        encoded[4] = 5;
        assert!(matches!(
            decode(&encoded),
            Err(QfsError::ControlError {
                error: DecodeError::BadLength(5),
                position: 1
            })
        ));
    }

    #[proptest(ProptestConfig { cases: 64, ..ProptestConfig::default() })]
    fn decodes_to_input(
        #[strategy(proptest::collection::vec(0u8..8, 0..300))] input: Vec<u8>,
        #[strategy(0x30u8..=0x35)] signature: u8,
    ) {
        let encoded = encoder::encode(&input, signature).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(decoded.bytes, input);
        prop_assert!(decoded.consumed <= encoded.len());
    }
}
