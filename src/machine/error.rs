////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use onlyerror::Error;

/// Errors raised while parsing or executing instruction text. None of them are
/// recoverable: they indicate either malformed input data or a bug in the
/// micro-program driving the machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    /// The line does not match `mnemonic operand (, operand)* (; comment)?`
    ///
    /// ### Fields
    /// - String: the offending line
    #[error("Could not parse instruction `{0}`")]
    UnparsableInstruction(String),
    /// The mnemonic is not part of the instruction catalog
    #[error("Unknown operator `{0}`")]
    UnknownOperator(String),
    /// An operand names neither a register nor a defined variable
    #[error("Unknown operand `{0}`")]
    UnknownOperand(String),
    /// The symbolic variables inside a memory reference disagree on its width
    ///
    /// ### Fields
    /// - u8: first size seen
    /// - u8: conflicting size
    #[error("Ambiguous pointer size: variables of `{0}` and `{1}` bytes")]
    AmbiguousPointerSize(u8, u8),
    #[error("Variable `{0}` is already defined")]
    DuplicateVariable(String),
    /// ### Fields
    /// - i64: offset of the access
    /// - usize: width of the access
    /// - usize: memory capacity
    #[error("Memory access of `{1}` bytes at `{0:#X}` is outside capacity `{2:#X}`")]
    OutOfRangeMemoryAccess(i64, usize, usize),
    /// A variable or memory access wider or narrower than 1, 2 or 4 bytes
    #[error("`{0}` bytes is not a supported operand width")]
    UnsupportedSize(u8),
    /// The host refused to back memory up to this offset
    #[error("Could not allocate machine memory up to `{0:#X}`")]
    MemoryExhausted(usize),
    /// ### Fields
    /// - String: mnemonic
    /// - usize: operands given
    #[error("`{0}` does not take `{1}` operands")]
    OperandCount(String, usize),
    /// ### Fields
    /// - String: mnemonic
    /// - u8: resolved operand size
    #[error("`{0}` cannot operate on a `{1}` byte operand")]
    OperandSize(String, u8),
    #[error("Operand `{0}` cannot be assigned to")]
    NotAssignable(String),
    #[error("No routine named `{0}` is bound")]
    UnknownRoutine(String),
    /// A bound routine rejected what it was decoding
    #[error("Routine failed: {0}")]
    RoutineFault(String),
    /// ### Fields
    /// - usize: index of the branch inside the block
    /// - usize: number of lines in the block
    #[error("Branch at line `{0}` is not the last of a `{1}` line block")]
    BranchNotLast(usize, usize),
}
