////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Instruction text replayed by the QFS3 decoder.
//!
//! Register roles throughout:
//! - `esi`: next input byte to load into the bit window
//! - `ebp`: bit window, most significant bit first
//! - `edx`: bits held in `ebp` beyond the 16 every lookup needs; a refill is
//!   due when it goes negative
//! - `edi`: next output byte
//! - `esp`: scratch stack below the output
//!
//! Code tables and loop counters live in memory under symbolic names:
//! - `counts`, `first_code`, `first_index`: one dword per code length
//! - `symbols`, `ranked`, `quick_len`, `quick_sym`: one byte per entry
//! - `space`, `length`, `total`, `cursor`, `rank`, `steps`, `entry`: dword
//!   cells holding loop state across `call getnum`, which clobbers `eax`,
//!   `ebx` and `ecx`
//!
//! Each block ends in at most one branch, whose outcome the driver reads from
//! [Interpreter::run_block].

use crate::machine::{Interpreter, InterpreterError, Register};

/// Longest run of zero bits a variable length number may start with
pub const MAX_NUMBER_PREFIX: u32 = 29;

/// Loads the first four bytes after `esi` into the window
pub const PRIME: &[&str] = &[
    "movzx ebp, byte ptr [esi]",
    "shl ebp, 8",
    "movzx eax, byte ptr [esi+1]",
    "or ebp, eax",
    "shl ebp, 8",
    "movzx eax, byte ptr [esi+2]",
    "or ebp, eax",
    "shl ebp, 8",
    "movzx eax, byte ptr [esi+3]",
    "or ebp, eax",
    "add esi, 4",
    "mov edx, 16",
];

/// `eax = top cl bits of the window`; taken when a refill is due
const GETBITS: &[&str] = &[
    "mov eax, ebp",
    "shl ebp, cl",
    "sub edx, ecx",
    "mov ebx, 32",
    "sub ebx, ecx",
    "mov ecx, ebx",
    "shr eax, cl",
    "test edx, edx",
    "js refill",
];

/// Merges the next big endian word in right below the bits still held
const REFILL: &[&str] = &[
    "movzx ebx, byte ptr [esi]",
    "shl ebx, 8",
    "movzx ecx, byte ptr [esi+1]",
    "or ebx, ecx",
    "add esi, 2",
    "mov ecx, edx",
    "neg ecx",
    "shl ebx, cl",
    "or ebp, ebx",
    "add edx, 16",
];

/// Taken when the number is a three bit short form
const NUMBER_FORM: &[&str] = &["test ebp, ebp", "js short_number"];

const SHORT_NUMBER: &[&str] = &["mov ecx, 3", "call getbits", "sub eax, 4"];

const NUMBER_PREFIX_START: &[&str] = &["xor eax, eax", "push eax"];

/// Taken on the one bit closing the zero prefix
const NUMBER_PREFIX_BIT: &[&str] = &[
    "mov ecx, 1",
    "call getbits",
    "test eax, eax",
    "jnz prefix_done",
];

const NUMBER_PREFIX_ZERO: &[&str] = &["inc dword ptr [esp]"];

/// `ecx = prefix + 2` payload bits; taken when they fit one read
const NUMBER_WIDTH: &[&str] = &[
    "pop ecx",
    "add ecx, 2",
    "push ecx",
    "cmp ecx, 17",
    "jb narrow_number",
];

const NARROW_NUMBER: &[&str] = &["call getbits"];

const WIDE_NUMBER: &[&str] = &[
    "sub ecx, 16",
    "call getbits",
    "push eax",
    "mov ecx, 16",
    "call getbits",
    "pop ebx",
    "shl ebx, 16",
    "or eax, ebx",
];

/// Restores the implicit leading one bit and removes the bias
const NUMBER_FINISH: &[&str] = &[
    "pop ecx",
    "mov ebx, 1",
    "shl ebx, cl",
    "or eax, ebx",
    "sub eax, 4",
];

const MODULO_START: &[&str] = &["mov ebx, ecx"];

/// Taken once the shifted divisor reaches the dividend
const MODULO_REACHED: &[&str] = &["cmp ebx, eax", "jnb modulo_reached"];

/// Taken when the divisor cannot be shifted further
const MODULO_TOP_BIT: &[&str] = &["test ebx, ebx", "js modulo_reached"];

const MODULO_WIDEN: &[&str] = &["shl ebx, 1"];

/// Taken when the shifted divisor does not fit
const MODULO_FITS: &[&str] = &["cmp eax, ebx", "jb modulo_skip"];

const MODULO_SUBTRACT: &[&str] = &["sub eax, ebx"];

/// Taken once the divisor is back to its own value
const MODULO_DONE: &[&str] = &["cmp ebx, ecx", "jz modulo_done"];

const MODULO_NARROW: &[&str] = &["shr ebx, 1"];

pub const CODE_SPACE_START: &[&str] = &[
    "mov dword ptr [space], 1",
    "mov dword ptr [length], 0",
    "mov dword ptr [total], 0",
];

/// Reads how many codes the next length has; taken when they do not fit
/// the code space left
pub const CODE_LENGTH: &[&str] = &[
    "inc dword ptr [length]",
    "shl dword ptr [space], 1",
    "call getnum",
    "mov ecx, [length]",
    "mov [ecx*4+counts], eax",
    "add [total], eax",
    "sub [space], eax",
    "jb oversubscribed",
];

/// Taken when every code is assigned
pub const CODE_SPACE_FULL: &[&str] = &["cmp dword ptr [space], 0", "jz code_space_full"];

/// Taken when the longest length is read and code space is still left
pub const CODE_LENGTH_LAST: &[&str] = &["cmp dword ptr [length], 16", "jnb code_space_left"];

pub const RANKS_START: &[&str] = &["mov dword ptr [cursor], 0FFh", "mov dword ptr [rank], 0"];

/// Taken while symbols remain to be ranked
pub const RANK_NEXT: &[&str] = &["mov eax, [rank]", "cmp eax, [total]", "jb next_rank"];

/// `steps = number % unranked + 1`
pub const RANK_LEAP: &[&str] = &[
    "call getnum",
    "mov ecx, 256",
    "sub ecx, [rank]",
    "call modulo",
    "inc eax",
    "mov [steps], eax",
];

/// Moves the cursor one byte on; taken when it lands on a ranked byte
pub const LEAP: &[&str] = &[
    "mov eax, [cursor]",
    "inc al",
    "mov [cursor], eax",
    "movzx ebx, byte ptr [eax+ranked]",
    "test ebx, ebx",
    "jnz leap",
];

/// Taken while steps remain
pub const LEAP_COUNT: &[&str] = &["dec dword ptr [steps]", "jnz leap"];

pub const RANK_PLACE: &[&str] = &[
    "mov eax, [cursor]",
    "mov byte ptr [eax+ranked], 1",
    "mov ecx, [rank]",
    "mov byte ptr [ecx+symbols], al",
    "inc dword ptr [rank]",
];

const CANONICAL_START: &[&str] = &["xor eax, eax", "xor ebx, ebx", "mov ecx, 1"];

/// First code and first rank of length `ecx`; taken while lengths remain
const CANONICAL_ROW: &[&str] = &[
    "mov [ecx*4+first_code], eax",
    "mov [ecx*4+first_index], ebx",
    "add eax, [ecx*4+counts]",
    "add ebx, [ecx*4+counts]",
    "shl eax, 1",
    "inc ecx",
    "cmp ecx, 17",
    "jb canonical_row",
];

/// Offset of the top `ecx` bits of `eax` among the codes of that length;
/// taken when it is one of them
const RESOLVE_TRY: &[&str] = &[
    "mov ebx, eax",
    "push ecx",
    "neg ecx",
    "add ecx, 32",
    "shr ebx, cl",
    "pop ecx",
    "sub ebx, [ecx*4+first_code]",
    "cmp ebx, [ecx*4+counts]",
    "jb resolved",
];

/// `ebx = symbol`, `ecx` keeps the code length
const RESOLVED: &[&str] = &[
    "add ebx, [ecx*4+first_index]",
    "movzx ebx, byte ptr [ebx+symbols]",
];

/// Taken while the code may still fit the quick table
const QUICK_LONGER: &[&str] = &["inc ecx", "cmp ecx, 9", "jb resolve_try"];

/// Taken while longer codes remain
const LONG_LONGER: &[&str] = &["inc ecx", "cmp ecx, 17", "jb resolve_try"];

const QUICK_START: &[&str] = &["mov dword ptr [entry], 0"];

const QUICK_ENTRY: &[&str] = &["mov eax, [entry]", "shl eax, 24", "mov ecx, 1"];

const QUICK_FILL: &[&str] = &[
    "mov eax, [entry]",
    "mov byte ptr [eax+quick_len], cl",
    "mov byte ptr [eax+quick_sym], bl",
];

/// Taken while window bytes remain
const QUICK_NEXT: &[&str] = &[
    "inc dword ptr [entry]",
    "cmp dword ptr [entry], 256",
    "jb quick_entry",
];

/// Taken when the top window byte has no code of eight bits or fewer
pub const LOOKUP: &[&str] = &[
    "mov eax, ebp",
    "shr eax, 24",
    "movzx ecx, byte ptr [eax+quick_len]",
    "test ecx, ecx",
    "jz long_code",
];

pub const QUICK_SYMBOL: &[&str] = &["movzx ebx, byte ptr [eax+quick_sym]"];

/// Codes up to eight bits are in the quick table
pub const LONG_CODE: &[&str] = &["mov eax, ebp", "mov ecx, 9"];

/// Drops the code bits, `al = symbol`; taken on the escape symbol
pub const CONSUME: &[&str] = &[
    "push ebx",
    "call getbits",
    "pop eax",
    "cmp al, escape",
    "jz escape_code",
];

pub const LITERAL: &[&str] = &["mov byte ptr [edi], al", "inc edi"];

/// Taken when the escape is followed by a zero, i.e. no copy
pub const ESCAPE: &[&str] = &["call getnum", "test eax, eax", "jz control"];

/// Taken on the end of stream marker
pub const CONTROL: &[&str] = &[
    "mov ecx, 1",
    "call getbits",
    "test eax, eax",
    "jnz end_of_stream",
];

pub const ESCAPED_LITERAL: &[&str] = &["mov al, escape", "mov byte ptr [edi], al", "inc edi"];

/// `ecx = length`, `eax = distance`
pub const COPY_OPERANDS: &[&str] = &["push eax", "call getnum", "inc eax", "pop ecx"];

pub const COPY: &[&str] = &[
    "push esi",
    "mov esi, edi",
    "sub esi, eax",
    "rep movsb",
    "pop esi",
];

pub const SUM_START: &[&str] = &[
    "mov esi, output",
    "mov ecx, output_len",
    "xor eax, eax",
    "xor ebx, ebx",
];

/// One byte of `b += a += byte`; taken while bytes remain
pub const DOUBLE_SUM: &[&str] = &[
    "add al, byte ptr [esi]",
    "add bl, al",
    "mov byte ptr [esi], bl",
    "inc esi",
    "dec ecx",
    "jnz double_sum",
];

/// One byte of `a += byte`; taken while bytes remain
pub const SINGLE_SUM: &[&str] = &[
    "add al, byte ptr [esi]",
    "mov byte ptr [esi], al",
    "inc esi",
    "dec ecx",
    "jnz single_sum",
];

/// `call getbits`: `eax` = next `ecx` bits, `ecx` in `1..=16`
pub fn getbits(machine: &mut Interpreter) -> Result<(), InterpreterError> {
    if machine.run_block(GETBITS)? == Some(true) {
        machine.run_block(REFILL)?;
    }
    Ok(())
}

/// `call getnum`: `eax` = next variable length number
///
/// # Errors
/// [InterpreterError::RoutineFault] when the zero prefix is longer than
/// [MAX_NUMBER_PREFIX]
pub fn getnum(machine: &mut Interpreter) -> Result<(), InterpreterError> {
    if machine.run_block(NUMBER_FORM)? == Some(true) {
        machine.run_block(SHORT_NUMBER)?;
        return Ok(());
    }

    machine.run_block(NUMBER_PREFIX_START)?;
    while machine.run_block(NUMBER_PREFIX_BIT)? == Some(false) {
        machine.run_block(NUMBER_PREFIX_ZERO)?;
        let esp = i64::from(machine.registers().read(Register::Esp));
        let prefix = machine.memory().load(esp, 4)?;
        if prefix > MAX_NUMBER_PREFIX {
            return Err(InterpreterError::RoutineFault(format!(
                "number prefix of {prefix} zero bits"
            )));
        }
    }

    if machine.run_block(NUMBER_WIDTH)? == Some(true) {
        machine.run_block(NARROW_NUMBER)?;
    } else {
        machine.run_block(WIDE_NUMBER)?;
    }
    machine.run_block(NUMBER_FINISH)?;
    Ok(())
}

/// `call modulo`: `eax %= ecx` by shift and subtract, clobbers `ebx`
///
/// # Errors
/// [InterpreterError::RoutineFault] when `ecx` is zero
pub fn modulo(machine: &mut Interpreter) -> Result<(), InterpreterError> {
    if machine.registers().read(Register::Ecx) == 0 {
        return Err(InterpreterError::RoutineFault("modulo by zero".to_string()));
    }

    machine.run_block(MODULO_START)?;
    while machine.run_block(MODULO_REACHED)? == Some(false) {
        if machine.run_block(MODULO_TOP_BIT)? == Some(true) {
            break;
        }
        machine.run_block(MODULO_WIDEN)?;
    }
    loop {
        if machine.run_block(MODULO_FITS)? == Some(false) {
            machine.run_block(MODULO_SUBTRACT)?;
        }
        if machine.run_block(MODULO_DONE)? == Some(true) {
            return Ok(());
        }
        machine.run_block(MODULO_NARROW)?;
    }
}

/// Find the code at the top of `eax`, trying lengths from `ecx` up. On a
/// match `ebx` is the symbol and `ecx` the code length.
///
/// With `quick` set only codes of up to eight bits are tried.
///
/// # Errors
/// Any [InterpreterError] from the blocks
pub fn resolve(machine: &mut Interpreter, quick: bool) -> Result<bool, InterpreterError> {
    let longer = if quick { QUICK_LONGER } else { LONG_LONGER };
    loop {
        if machine.run_block(RESOLVE_TRY)? == Some(true) {
            machine.run_block(RESOLVED)?;
            return Ok(true);
        }
        if machine.run_block(longer)? != Some(true) {
            return Ok(false);
        }
    }
}

/// Canonical first codes per length from `counts`, then the quick table for
/// every code of up to eight bits
///
/// # Errors
/// Any [InterpreterError] from the blocks
pub fn build_tables(machine: &mut Interpreter) -> Result<(), InterpreterError> {
    machine.run_block(CANONICAL_START)?;
    while machine.run_block(CANONICAL_ROW)? == Some(true) {}

    machine.run_block(QUICK_START)?;
    loop {
        machine.run_block(QUICK_ENTRY)?;
        if resolve(machine, true)? {
            machine.run_block(QUICK_FILL)?;
        }
        if machine.run_block(QUICK_NEXT)? != Some(true) {
            return Ok(());
        }
    }
}

/// A machine with every routine bound
#[must_use]
pub fn machine(memory_capacity: usize) -> Interpreter {
    let mut machine = Interpreter::new(memory_capacity);
    machine.bind_routine("getbits", getbits);
    machine.bind_routine("getnum", getnum);
    machine.bind_routine("modulo", modulo);
    machine
}
