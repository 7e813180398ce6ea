////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! x86 condition flag computation.
//!
//! Every producer hands the engine its operands and the result already masked
//! to the operation width. Each [OpClass] only writes the flags it has a rule
//! for; everything else keeps its previous state.

use std::collections::HashMap;

use bitflags::bitflags;

bitflags! {
    /// Flag cells, laid out at their EFLAGS bit positions
    #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const CARRY     = 1 << 0;
        const PARITY    = 1 << 2;
        const AUXILIARY = 1 << 4;
        const ZERO      = 1 << 6;
        const SIGN      = 1 << 7;
        const DIRECTION = 1 << 10;
        const OVERFLOW  = 1 << 11;
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = |flag: Flags, name: char| if self.contains(flag) { name } else { '-' };
        write!(
            f,
            "{}{}{}{}{}{}{}",
            cell(Flags::OVERFLOW, 'O'),
            cell(Flags::DIRECTION, 'D'),
            cell(Flags::SIGN, 'S'),
            cell(Flags::ZERO, 'Z'),
            cell(Flags::AUXILIARY, 'A'),
            cell(Flags::PARITY, 'P'),
            cell(Flags::CARRY, 'C'),
        )
    }
}

/// Families of instructions sharing one flag rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Add,
    /// Also used by `cmp`
    Sub,
    /// `and`, `or`, `xor` and `test`
    Logic,
    /// `op2` is the masked shift count
    Shl,
    /// `op2` is the masked shift count
    Shr,
    Inc,
    Dec,
    Neg,
    /// `op2` is the masked rotate count
    Rol,
}

/// Even number of set bits in the low byte
#[inline]
#[must_use]
pub fn parity(value: u32) -> bool {
    (value as u8).count_ones() % 2 == 0
}

#[derive(Debug, Default, Clone)]
pub struct FlagEngine {
    flags: Flags,
    statistics: Option<HashMap<OpClass, usize>>,
}

impl FlagEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine that counts its [apply](Self::apply) calls per class
    #[must_use]
    pub fn with_statistics() -> Self {
        Self {
            flags: Flags::empty(),
            statistics: Some(HashMap::new()),
        }
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    #[must_use]
    pub fn get(&self, flag: Flags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set(&mut self, flag: Flags, value: bool) {
        self.flags.set(flag, value);
    }

    #[must_use]
    pub fn statistics(&self) -> Option<&HashMap<OpClass, usize>> {
        self.statistics.as_ref()
    }

    /// Update the flags `class` defines a rule for. `op1`, `op2` and `result`
    /// must already be masked to `size` bytes.
    pub fn apply(&mut self, class: OpClass, op1: u32, op2: u32, result: u32, size: u8) {
        if let Some(statistics) = self.statistics.as_mut() {
            *statistics.entry(class).or_default() += 1;
        }

        let bits = u32::from(size) * 8;
        let sign = 1u32 << (bits - 1);
        let msb = |value: u32| value & sign != 0;

        match class {
            OpClass::Add => {
                self.set(Flags::CARRY, result < op1);
                self.set(Flags::OVERFLOW, (op1 ^ result) & (op2 ^ result) & sign != 0);
                self.set(Flags::AUXILIARY, (op1 ^ op2 ^ result) & 0x10 != 0);
                self.set_result_flags(result, sign);
            }
            OpClass::Sub => {
                self.set(Flags::CARRY, op1 < op2);
                self.set(Flags::OVERFLOW, (op1 ^ op2) & (op1 ^ result) & sign != 0);
                self.set(Flags::AUXILIARY, (op1 ^ op2 ^ result) & 0x10 != 0);
                self.set_result_flags(result, sign);
            }
            OpClass::Logic => {
                self.set(Flags::CARRY, false);
                self.set(Flags::OVERFLOW, false);
                self.set_result_flags(result, sign);
            }
            OpClass::Shl => {
                let count = op2;
                if count == 0 {
                    self.set(Flags::OVERFLOW, false);
                } else {
                    let carry = count <= bits && (u64::from(op1) >> (bits - count)) & 1 == 1;
                    self.set(Flags::CARRY, carry);
                    self.set(Flags::OVERFLOW, msb(result) != carry);
                }
                self.set_result_flags(result, sign);
            }
            OpClass::Shr => {
                let count = op2;
                if count != 0 {
                    let carry = count <= bits && (op1 >> (count - 1)) & 1 == 1;
                    self.set(Flags::CARRY, carry);
                }
                self.set(Flags::OVERFLOW, count == 1 && msb(op1));
                self.set_result_flags(result, sign);
            }
            OpClass::Inc => {
                self.set(Flags::OVERFLOW, result == sign);
                self.set(Flags::AUXILIARY, result & 0xF == 0);
                self.set_result_flags(result, sign);
            }
            OpClass::Dec => {
                self.set(Flags::OVERFLOW, result == sign - 1);
                self.set(Flags::AUXILIARY, result & 0xF == 0xF);
                self.set_result_flags(result, sign);
            }
            OpClass::Neg => {
                self.set(Flags::CARRY, result != 0);
                self.set(Flags::OVERFLOW, result == sign);
                self.set(Flags::AUXILIARY, result & 0xF != 0);
                self.set_result_flags(result, sign);
            }
            OpClass::Rol => {
                if op2 != 0 {
                    let carry = result & 1 == 1;
                    self.set(Flags::CARRY, carry);
                    if op2 == 1 {
                        self.set(Flags::OVERFLOW, msb(result) != carry);
                    }
                }
            }
        }
    }

    fn set_result_flags(&mut self, result: u32, sign: u32) {
        self.set(Flags::ZERO, result == 0);
        self.set(Flags::SIGN, result & sign != 0);
        self.set(Flags::PARITY, parity(result));
    }
}
