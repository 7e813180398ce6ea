////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::machine::flags::{FlagEngine, Flags, OpClass};
use crate::machine::memory::{check_size, VirtualMemory};
use crate::machine::parser::{
    parse_line, Expr, Instruction, Mnemonic, Operand, OperandKind, Sign,
};
use crate::machine::registers::{Register, RegisterFile};
use crate::machine::InterpreterError;

/// Handler invoked by `call name`
pub type Routine = fn(&mut Interpreter) -> Result<(), InterpreterError>;

/// A resolved operand. `size` is `None` for bare literals that were not given
/// a width by their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub value: i64,
    pub size: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Variable {
    value: u32,
    size: u8,
}

#[inline]
fn mask(size: u8) -> u32 {
    if size >= 4 {
        u32::MAX
    } else {
        (1 << (u32::from(size) * 8)) - 1
    }
}

/// Wrap `value` into the unsigned range of a `size` byte destination
#[inline]
fn wrap(value: i64, size: u8) -> u32 {
    value.rem_euclid(1i64 << (u32::from(size.min(4)) * 8)) as u32
}

fn fold_size(left: Option<u8>, right: Option<u8>, pick: fn(u8, u8) -> u8) -> Option<u8> {
    match (left, right) {
        (Some(left), Some(right)) => Some(pick(left, right)),
        (size, None) | (None, size) => size,
    }
}

/// Executes instruction text against its own register file, flags and memory.
///
/// Parsed lines are cached by their text, so a micro-program run once per
/// decoded symbol is only parsed on its first pass.
pub struct Interpreter {
    registers: RegisterFile,
    flags: FlagEngine,
    memory: VirtualMemory,
    variables: HashMap<String, Variable>,
    routines: HashMap<String, Routine>,
    cache: HashMap<String, Arc<Instruction>>,
}

impl Interpreter {
    #[must_use]
    pub fn new(memory_capacity: usize) -> Self {
        Self::with_flags(memory_capacity, FlagEngine::new())
    }

    /// An interpreter driving a caller supplied flag engine, e.g. one built
    /// with [FlagEngine::with_statistics]
    #[must_use]
    pub fn with_flags(memory_capacity: usize, flags: FlagEngine) -> Self {
        Self {
            registers: RegisterFile::new(),
            flags,
            memory: VirtualMemory::new(memory_capacity),
            variables: HashMap::new(),
            routines: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    #[must_use]
    pub fn flags(&self) -> &FlagEngine {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagEngine {
        &mut self.flags
    }

    #[must_use]
    pub fn memory(&self) -> &VirtualMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut VirtualMemory {
        &mut self.memory
    }

    /// Name `value`. Memory references through the variable are `size`
    /// bytes wide; the value itself is kept whole so it can be any offset.
    ///
    /// # Errors
    /// - [InterpreterError::DuplicateVariable]: `name` already exists
    /// - [InterpreterError::UnsupportedSize]: `size` is not 1, 2 or 4
    pub fn define_variable(
        &mut self,
        name: &str,
        value: u32,
        size: u8,
    ) -> Result<(), InterpreterError> {
        let size = check_size(size)?;
        if self.variables.contains_key(name) {
            return Err(InterpreterError::DuplicateVariable(name.to_string()));
        }
        self.variables.insert(name.to_string(), Variable { value, size });
        Ok(())
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<u32> {
        self.variables.get(name).map(|variable| variable.value)
    }

    pub fn bind_routine(&mut self, name: &str, routine: Routine) {
        self.routines.insert(name.to_string(), routine);
    }

    /// Execute one line. Branches return whether they are taken and change
    /// nothing; every other instruction returns `None`.
    ///
    /// # Errors
    /// Any [InterpreterError] raised while parsing or executing the line
    pub fn run_line(&mut self, line: &str) -> Result<Option<bool>, InterpreterError> {
        let instruction = match self.cache.get(line) {
            Some(instruction) => Arc::clone(instruction),
            None => {
                let instruction = Arc::new(parse_line(line)?);
                self.cache.insert(line.to_string(), Arc::clone(&instruction));
                instruction
            }
        };
        trace!(line, "execute");
        self.execute(&instruction)
    }

    /// Execute lines in order. Only the last one may be a branch.
    ///
    /// # Errors
    /// - [InterpreterError::BranchNotLast]: a branch appears before the last line
    /// - any error from [run_line](Self::run_line)
    pub fn run_block(&mut self, lines: &[&str]) -> Result<Option<bool>, InterpreterError> {
        for (index, line) in lines.iter().enumerate() {
            if let Some(taken) = self.run_line(line)? {
                if index + 1 != lines.len() {
                    return Err(InterpreterError::BranchNotLast(index, lines.len()));
                }
                return Ok(Some(taken));
            }
        }
        Ok(None)
    }

    /// Pointer width in a memory reference: the agreed size of its symbolic
    /// variables, if it has any
    fn variable_size(&self, expr: &Expr) -> Result<Option<u8>, InterpreterError> {
        match expr {
            Expr::Variable(name) => Ok(self.variables.get(name).map(|variable| variable.size)),
            Expr::Sum(terms) => self.agreed_size(terms.iter().map(|(_, term)| term)),
            Expr::Product(factors) => self.agreed_size(factors.iter()),
            Expr::Register(_) | Expr::Immediate(_) => Ok(None),
        }
    }

    fn agreed_size<'a>(
        &self,
        exprs: impl Iterator<Item = &'a Expr>,
    ) -> Result<Option<u8>, InterpreterError> {
        let mut agreed = None;
        for expr in exprs {
            match (agreed, self.variable_size(expr)?) {
                (Some(first), Some(size)) if first != size => {
                    return Err(InterpreterError::AmbiguousPointerSize(first, size));
                }
                (None, size) => agreed = size,
                _ => {}
            }
        }
        Ok(agreed)
    }

    fn evaluate(
        &self,
        expr: &Expr,
        forced: Option<u8>,
        in_pointer: bool,
        optimistic: bool,
    ) -> Result<Option<Resolved>, InterpreterError> {
        let resolved = match expr {
            Expr::Register(register) => Resolved {
                value: i64::from(self.registers.read(*register)),
                size: Some(register.size()),
            },
            Expr::Immediate(value) => Resolved {
                value: *value,
                size: forced,
            },
            Expr::Variable(name) => match self.variables.get(name) {
                Some(variable) => Resolved {
                    value: i64::from(variable.value),
                    size: Some(variable.size),
                },
                None if optimistic => return Ok(None),
                None => return Err(InterpreterError::UnknownOperand(name.clone())),
            },
            Expr::Sum(terms) => {
                let pick = if in_pointer { u8::min } else { u8::max };
                let mut total = Resolved { value: 0, size: None };
                for (sign, term) in terms {
                    let Some(term) = self.evaluate(term, None, in_pointer, optimistic)? else {
                        return Ok(None);
                    };
                    total.value = match sign {
                        Sign::Plus => total.value.wrapping_add(term.value),
                        Sign::Minus => total.value.wrapping_sub(term.value),
                    };
                    total.size = fold_size(total.size, term.size, pick);
                }
                Resolved {
                    value: total.value,
                    size: forced.or(total.size),
                }
            }
            Expr::Product(factors) => {
                let mut total = Resolved { value: 1, size: None };
                for factor in factors {
                    let Some(factor) = self.evaluate(factor, None, in_pointer, optimistic)? else {
                        return Ok(None);
                    };
                    total.value = total.value.wrapping_mul(factor.value);
                    total.size = fold_size(total.size, factor.size, u8::max);
                }
                Resolved {
                    value: total.value,
                    size: forced.or(total.size),
                }
            }
        };
        Ok(Some(resolved))
    }

    /// Address and access width of a memory reference
    fn address(
        &self,
        expr: &Expr,
        forced: Option<u8>,
        optimistic: bool,
    ) -> Result<Option<(i64, u8)>, InterpreterError> {
        let inferred = self.variable_size(expr)?;
        let Some(address) = self.evaluate(expr, None, true, optimistic)? else {
            return Ok(None);
        };
        let size = forced.or(inferred).or(address.size).unwrap_or(4);
        Ok(Some((address.value, size)))
    }

    /// Resolve an operand to its value and width.
    ///
    /// A `byte ptr` style qualifier wins over `forced`, which only sizes bare
    /// literals and memory references. With `optimistic` set, operands naming
    /// undefined variables resolve to `None` instead of failing.
    ///
    /// # Errors
    /// - [InterpreterError::UnknownOperand]: an undefined variable when not optimistic
    /// - [InterpreterError::AmbiguousPointerSize]: a memory reference over variables of
    ///   different widths
    /// - [InterpreterError::OutOfRangeMemoryAccess]: the referenced memory does not exist
    pub fn resolve(
        &self,
        operand: &Operand,
        forced: Option<u8>,
        optimistic: bool,
    ) -> Result<Option<Resolved>, InterpreterError> {
        let forced = operand.qualifier.or(forced);
        match &operand.kind {
            OperandKind::Value(expr) => self.evaluate(expr, forced, false, optimistic),
            OperandKind::Memory(expr) => {
                let Some((address, size)) = self.address(expr, forced, optimistic)? else {
                    return Ok(None);
                };
                Ok(Some(Resolved {
                    value: i64::from(self.memory.load(address, size)?),
                    size: Some(size),
                }))
            }
        }
    }

    fn resolve_known(
        &self,
        operand: &Operand,
        forced: Option<u8>,
    ) -> Result<Resolved, InterpreterError> {
        self.resolve(operand, forced, false)?
            .ok_or_else(|| InterpreterError::UnknownOperand(operand.to_string()))
    }

    /// Width an operand would be written with, defaulting to 4
    fn destination_size(&self, operand: &Operand) -> Result<u8, InterpreterError> {
        Ok(self
            .resolve(operand, None, true)?
            .and_then(|resolved| resolved.size)
            .unwrap_or(4))
    }

    /// Store `value` wrapped to `size` bytes into a register, memory reference
    /// or variable
    ///
    /// # Errors
    /// - [InterpreterError::NotAssignable]: the operand is a literal or arithmetic
    /// - [InterpreterError::UnknownOperand]: the variable does not exist
    /// - [InterpreterError::OutOfRangeMemoryAccess]: the memory does not exist
    pub fn assign(
        &mut self,
        operand: &Operand,
        value: i64,
        size: u8,
    ) -> Result<(), InterpreterError> {
        let wrapped = wrap(value, size);
        match &operand.kind {
            OperandKind::Value(Expr::Register(register)) => {
                self.registers.write(*register, wrapped);
                Ok(())
            }
            OperandKind::Value(Expr::Variable(name)) => match self.variables.get_mut(name) {
                Some(variable) => {
                    variable.value = wrapped & mask(variable.size);
                    Ok(())
                }
                None => Err(InterpreterError::UnknownOperand(name.clone())),
            },
            OperandKind::Memory(expr) => {
                let forced = operand.qualifier.or(Some(size));
                let (address, size) = self
                    .address(expr, forced, false)?
                    .ok_or_else(|| InterpreterError::UnknownOperand(operand.to_string()))?;
                self.memory.store(address, wrapped, size)
            }
            OperandKind::Value(_) => Err(InterpreterError::NotAssignable(operand.to_string())),
        }
    }

    fn push(&mut self, value: u32) -> Result<(), InterpreterError> {
        let esp = self.registers.read(Register::Esp).wrapping_sub(4);
        self.registers.write(Register::Esp, esp);
        self.memory.store(i64::from(esp), value, 4)
    }

    fn pop(&mut self) -> Result<u32, InterpreterError> {
        let esp = self.registers.read(Register::Esp);
        let value = self.memory.load(i64::from(esp), 4)?;
        self.registers.write(Register::Esp, esp.wrapping_add(4));
        Ok(value)
    }

    fn taken(&self, mnemonic: Mnemonic) -> bool {
        let flag = |flag| self.flags.get(flag);
        let less = flag(Flags::SIGN) != flag(Flags::OVERFLOW);
        match mnemonic {
            Mnemonic::Jb => flag(Flags::CARRY),
            Mnemonic::Jnb => !flag(Flags::CARRY),
            Mnemonic::Jz => flag(Flags::ZERO),
            Mnemonic::Jnz => !flag(Flags::ZERO),
            Mnemonic::Jbe => flag(Flags::CARRY) || flag(Flags::ZERO),
            Mnemonic::Jl => less,
            Mnemonic::Jge => !less,
            Mnemonic::Jle => less || flag(Flags::ZERO),
            Mnemonic::Js => flag(Flags::SIGN),
            Mnemonic::Jns => !flag(Flags::SIGN),
            _ => true,
        }
    }

    fn execute(&mut self, instruction: &Instruction) -> Result<Option<bool>, InterpreterError> {
        let mnemonic = instruction.mnemonic;
        let operands = instruction.operands.as_slice();
        if operands.len() != mnemonic.arity() {
            return Err(InterpreterError::OperandCount(mnemonic.to_string(), operands.len()));
        }
        if mnemonic.is_branch() {
            return Ok(Some(self.taken(mnemonic)));
        }

        match mnemonic {
            Mnemonic::Push => {
                let source = self.resolve_known(&operands[0], Some(4))?;
                match source.size {
                    Some(4) => self.push(wrap(source.value, 4))?,
                    size => {
                        return Err(InterpreterError::OperandSize(
                            mnemonic.to_string(),
                            size.unwrap_or(0),
                        ))
                    }
                }
            }
            Mnemonic::Pop => {
                let value = self.pop()?;
                self.assign(&operands[0], i64::from(value), 4)?;
            }
            Mnemonic::Mov | Mnemonic::Movzx => {
                let size = self.destination_size(&operands[0])?;
                let source = self.resolve_known(&operands[1], Some(size))?;
                self.assign(&operands[0], source.value, size)?;
            }
            Mnemonic::Lea => {
                let size = self.destination_size(&operands[0])?;
                let address = match &operands[1].kind {
                    OperandKind::Memory(expr) | OperandKind::Value(expr) => self
                        .evaluate(expr, None, true, false)?
                        .ok_or_else(|| InterpreterError::UnknownOperand(operands[1].to_string()))?,
                };
                self.assign(&operands[0], address.value, size)?;
            }
            Mnemonic::Call => {
                let name = operands[0].to_string();
                let routine = *self
                    .routines
                    .get(&name)
                    .ok_or_else(|| InterpreterError::UnknownRoutine(name.clone()))?;
                debug!(routine = %name, "call");
                self.push(0)?;
                routine(self)?;
                self.pop()?;
            }
            Mnemonic::RepMovsb => self.rep_movs(1)?,
            Mnemonic::RepMovsd => self.rep_movs(4)?,
            Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Neg => {
                let target = self.resolve_known(&operands[0], None)?;
                let size = target.size.unwrap_or(4);
                let op1 = wrap(target.value, size);
                let (class, result) = match mnemonic {
                    Mnemonic::Inc => (OpClass::Inc, op1.wrapping_add(1)),
                    Mnemonic::Dec => (OpClass::Dec, op1.wrapping_sub(1)),
                    _ => (OpClass::Neg, 0u32.wrapping_sub(op1)),
                };
                let result = result & mask(size);
                let carry = self.flags.get(Flags::CARRY);
                self.flags.apply(class, op1, 1, result, size);
                if class != OpClass::Neg {
                    self.flags.set(Flags::CARRY, carry);
                }
                self.assign(&operands[0], i64::from(result), size)?;
            }
            _ => self.binary(mnemonic, &operands[0], &operands[1])?,
        }
        Ok(None)
    }

    fn binary(
        &mut self,
        mnemonic: Mnemonic,
        target: &Operand,
        source: &Operand,
    ) -> Result<(), InterpreterError> {
        let destination = self.resolve_known(target, None)?;
        let size = destination.size.unwrap_or(4);
        let bits = u32::from(size) * 8;
        let op1 = wrap(destination.value, size);
        let op2 = wrap(self.resolve_known(source, Some(size))?.value, size);

        let (class, result, store) = match mnemonic {
            Mnemonic::Add => (OpClass::Add, op1.wrapping_add(op2), true),
            Mnemonic::Sub => (OpClass::Sub, op1.wrapping_sub(op2), true),
            Mnemonic::Cmp => (OpClass::Sub, op1.wrapping_sub(op2), false),
            Mnemonic::And => (OpClass::Logic, op1 & op2, true),
            Mnemonic::Test => (OpClass::Logic, op1 & op2, false),
            Mnemonic::Or => (OpClass::Logic, op1 | op2, true),
            Mnemonic::Xor => (OpClass::Logic, op1 ^ op2, true),
            Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Rol => {
                let count = op2 & 0x1F;
                let (class, result) = match mnemonic {
                    Mnemonic::Shl => (OpClass::Shl, (u64::from(op1) << count) as u32),
                    Mnemonic::Shr => (OpClass::Shr, op1 >> count),
                    _ => {
                        let steps = count % bits;
                        let wide = u64::from(op1);
                        let rotated = (wide << steps) | (wide >> ((bits - steps) % bits));
                        (OpClass::Rol, rotated as u32)
                    }
                };
                let result = result & mask(size);
                self.flags.apply(class, op1, count, result, size);
                return self.assign(target, i64::from(result), size);
            }
            _ => return Err(InterpreterError::UnknownOperator(mnemonic.to_string())),
        };
        let result = result & mask(size);
        self.flags.apply(class, op1, op2, result, size);
        if store {
            self.assign(target, i64::from(result), size)?;
        }
        Ok(())
    }

    /// Copy `ecx` units of `unit` bytes from `[esi]` to `[edi]`, one unit at
    /// a time so overlapping ranges repeat like the real instruction
    fn rep_movs(&mut self, unit: u8) -> Result<(), InterpreterError> {
        let count = self.registers.read(Register::Ecx);
        let step = if self.flags.get(Flags::DIRECTION) {
            u32::from(unit).wrapping_neg()
        } else {
            u32::from(unit)
        };
        let mut source = self.registers.read(Register::Esi);
        let mut destination = self.registers.read(Register::Edi);
        for _ in 0..count {
            let value = self.memory.load(i64::from(source), unit)?;
            self.memory.store(i64::from(destination), value, unit)?;
            source = source.wrapping_add(step);
            destination = destination.wrapping_add(step);
        }
        self.registers.write(Register::Esi, source);
        self.registers.write(Register::Edi, destination);
        self.registers.write(Register::Ecx, 0);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn run(interpreter: &mut Interpreter, lines: &[&str]) {
        for line in lines {
            interpreter.run_line(line).unwrap();
        }
    }

    #[test]
    fn equal_sum_takes_jz() {
        let mut interpreter = Interpreter::new(0);
        let taken = interpreter
            .run_block(&["mov eax,5", "mov ebx,5", "add eax,ebx", "cmp eax,10", "jz target"])
            .unwrap();
        assert_eq!(taken, Some(true));
    }

    #[test]
    fn dec_wraps_and_keeps_carry() {
        for carry in [false, true] {
            let mut interpreter = Interpreter::new(0);
            interpreter.flags_mut().set(Flags::CARRY, carry);
            run(&mut interpreter, &["mov al,0", "dec al"]);
            assert_eq!(interpreter.registers().read(Register::Al), 0xFF);
            assert_eq!(interpreter.flags().get(Flags::CARRY), carry);
            assert!(!interpreter.flags().get(Flags::ZERO));
            assert!(interpreter.flags().get(Flags::SIGN));
        }
    }

    #[test]
    fn branch_must_end_block() {
        let mut interpreter = Interpreter::new(0);
        assert_eq!(
            interpreter.run_block(&["xor eax, eax", "jz skip", "inc eax"]),
            Err(InterpreterError::BranchNotLast(1, 3))
        );
        assert_eq!(interpreter.run_block(&["inc eax"]), Ok(None));
    }

    #[test]
    fn push_pop_through_memory() {
        let mut interpreter = Interpreter::new(64);
        run(
            &mut interpreter,
            &["mov esp, 64", "mov eax, 12345678h", "push eax", "push 7", "pop ebx", "pop ecx"],
        );
        assert_eq!(interpreter.registers().read(Register::Ebx), 7);
        assert_eq!(interpreter.registers().read(Register::Ecx), 0x1234_5678);
        assert_eq!(interpreter.registers().read(Register::Esp), 64);
        assert_eq!(interpreter.memory().load(60, 4).unwrap(), 0x1234_5678);

        assert_eq!(
            interpreter.run_line("push al"),
            Err(InterpreterError::OperandSize("push".to_string(), 1))
        );
    }

    #[test]
    fn variables_size_memory_references() {
        let mut interpreter = Interpreter::new(32);
        interpreter.define_variable("table", 16, 1).unwrap();
        interpreter.define_variable("wide", 0, 4).unwrap();
        interpreter.memory_mut().write_slice(16, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();

        run(&mut interpreter, &["mov eax, 1", "movzx ecx, byte ptr [eax+table]"]);
        assert_eq!(interpreter.registers().read(Register::Ecx), 0xBB);

        // no destination width to borrow, so the variable sizes the access
        run(&mut interpreter, &["cmp [eax+table], 0BBh"]);
        assert!(interpreter.flags().get(Flags::ZERO));
        run(&mut interpreter, &["inc [eax+table]"]);
        assert_eq!(interpreter.memory().read_bytes(16, 4).unwrap(), &[0xAA, 0xBC, 0xCC, 0xDD]);

        run(&mut interpreter, &["mov edx, [esi+16]"]);
        assert_eq!(interpreter.registers().read(Register::Edx), 0xDDCC_BBAA);

        assert_eq!(
            interpreter.run_line("mov eax, [table+wide]"),
            Err(InterpreterError::AmbiguousPointerSize(1, 4))
        );
        assert_eq!(
            interpreter.define_variable("table", 0, 1),
            Err(InterpreterError::DuplicateVariable("table".to_string()))
        );
    }

    #[test]
    fn variable_widths() {
        let mut interpreter = Interpreter::new(8);
        for size in [0, 3, 8] {
            assert_eq!(
                interpreter.define_variable("odd", 0, size),
                Err(InterpreterError::UnsupportedSize(size))
            );
        }
        assert_eq!(
            interpreter.run_line("add odd, 1"),
            Err(InterpreterError::UnknownOperand("odd".to_string()))
        );

        // a byte wide variable can still name an offset past 255
        let mut interpreter = Interpreter::new(512);
        interpreter.define_variable("far", 300, 1).unwrap();
        interpreter.memory_mut().write_slice(302, &[0x5A, 0x11]).unwrap();
        run(&mut interpreter, &["mov eax, 2", "cmp [eax+far], 5Ah"]);
        assert_eq!(interpreter.variable("far"), Some(300));
        assert!(interpreter.flags().get(Flags::ZERO));
    }

    #[test]
    fn byte_qualifier_narrows_store() {
        let mut interpreter = Interpreter::new(8);
        run(
            &mut interpreter,
            &["mov eax, 11223344h", "mov [esi], eax", "mov byte ptr [esi+1], 0FFh"],
        );
        assert_eq!(interpreter.memory().load(0, 4).unwrap(), 0x1122_FF44);
    }

    #[test]
    fn lea_computes_without_loading() {
        let mut interpreter = Interpreter::new(0);
        interpreter.define_variable("table", 100, 4).unwrap();
        run(&mut interpreter, &["mov eax, 3", "lea ebx, [eax*8+table]"]);
        assert_eq!(interpreter.registers().read(Register::Ebx), 124);
    }

    #[test]
    fn assignment_wraps_modulo_width() {
        let mut interpreter = Interpreter::new(0);
        run(&mut interpreter, &["mov eax, -1", "mov bl, 300", "sub cx, 1"]);
        assert_eq!(interpreter.registers().read(Register::Eax), u32::MAX);
        assert_eq!(interpreter.registers().read(Register::Bl), 300 % 256);
        assert_eq!(interpreter.registers().read(Register::Cx), 0xFFFF);
        assert_eq!(interpreter.registers().read(Register::Ecx), 0xFFFF);
        assert!(interpreter.flags().get(Flags::CARRY));

        assert_eq!(
            interpreter.run_line("mov 5, eax"),
            Err(InterpreterError::NotAssignable("5".to_string()))
        );
    }

    #[test]
    fn unknown_names() {
        let mut interpreter = Interpreter::new(0);
        assert_eq!(
            interpreter.run_line("add eax, nowhere"),
            Err(InterpreterError::UnknownOperand("nowhere".to_string()))
        );
        assert_eq!(
            interpreter.run_line("call nothing"),
            Err(InterpreterError::UnknownRoutine("nothing".to_string()))
        );
        assert_eq!(
            interpreter.run_line("inc eax, ebx"),
            Err(InterpreterError::OperandCount("inc".to_string(), 2))
        );
    }

    #[test]
    fn shifts_and_rotates() {
        let mut interpreter = Interpreter::new(0);
        run(&mut interpreter, &["mov eax, 80000001h", "shl eax, 1"]);
        assert_eq!(interpreter.registers().read(Register::Eax), 2);
        assert!(interpreter.flags().get(Flags::CARRY));

        run(&mut interpreter, &["mov cl, 33", "mov eax, 4", "shr eax, cl"]);
        assert_eq!(interpreter.registers().read(Register::Eax), 2);
        assert!(!interpreter.flags().get(Flags::CARRY));

        run(&mut interpreter, &["mov al, 81h", "rol al, 9"]);
        assert_eq!(interpreter.registers().read(Register::Al), 0x03);
        assert!(interpreter.flags().get(Flags::CARRY));

        // zero count keeps the carry but still sets the result flags
        run(&mut interpreter, &["mov ebx, 7", "shl ebx, 32"]);
        assert_eq!(interpreter.registers().read(Register::Ebx), 7);
        assert!(interpreter.flags().get(Flags::CARRY));
        assert!(!interpreter.flags().get(Flags::OVERFLOW));
        assert!(!interpreter.flags().get(Flags::PARITY));
    }

    #[test]
    fn zero_count_shift_recomputes_zero_flag() {
        let mut interpreter = Interpreter::new(0);
        run(&mut interpreter, &["mov eax, 1", "cmp eax, 1"]);
        assert!(interpreter.flags().get(Flags::ZERO));

        run(&mut interpreter, &["mov ebx, 5", "shl ebx, 32"]);
        assert_eq!(interpreter.registers().read(Register::Ebx), 5);
        assert!(!interpreter.flags().get(Flags::ZERO));
        assert_eq!(interpreter.run_line("jz skip").unwrap(), Some(false));

        run(&mut interpreter, &["xor ecx, ecx", "mov edx, 80000000h", "shr edx, cl"]);
        assert!(interpreter.flags().get(Flags::SIGN));
        assert!(!interpreter.flags().get(Flags::OVERFLOW));
        assert!(!interpreter.flags().get(Flags::ZERO));
    }

    #[test]
    fn routines_see_the_machine() {
        fn double(interpreter: &mut Interpreter) -> Result<(), InterpreterError> {
            interpreter.run_line("add eax, eax")?;
            Ok(())
        }

        let mut interpreter = Interpreter::new(16);
        interpreter.bind_routine("double", double);
        run(&mut interpreter, &["mov esp, 16", "mov eax, 21", "call double"]);
        assert_eq!(interpreter.registers().read(Register::Eax), 42);
        assert_eq!(interpreter.registers().read(Register::Esp), 16);
    }

    #[test]
    fn rep_movsb_repeats_overlap() {
        let mut interpreter = Interpreter::new(16);
        interpreter.memory_mut().write_slice(0, b"ab").unwrap();
        run(&mut interpreter, &["mov esi, 0", "mov edi, 2", "mov ecx, 6", "rep movsb"]);
        assert_eq!(interpreter.memory().read_bytes(0, 8).unwrap(), b"abababab");
        assert_eq!(interpreter.registers().read(Register::Ecx), 0);
        assert_eq!(interpreter.registers().read(Register::Esi), 6);
        assert_eq!(interpreter.registers().read(Register::Edi), 8);
    }

    #[test]
    fn rep_movsd_backwards() {
        let mut interpreter = Interpreter::new(16);
        interpreter.memory_mut().write_slice(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        interpreter.flags_mut().set(Flags::DIRECTION, true);
        run(&mut interpreter, &["mov esi, 4", "mov edi, 12", "mov ecx, 2", "rep movsd"]);
        assert_eq!(interpreter.memory().read_bytes(8, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(interpreter.registers().read(Register::Esi), 4u32.wrapping_sub(8));
    }

    #[test]
    fn signed_branches() {
        let mut interpreter = Interpreter::new(0);
        run(&mut interpreter, &["mov eax, -3", "cmp eax, 2"]);
        for (branch, expected) in [
            ("jl x", true),
            ("jle x", true),
            ("jge x", false),
            ("jb x", false),
            ("jnb x", true),
            ("js x", true),
            ("jns x", false),
            ("jbe x", false),
            ("jmp x", true),
        ] {
            assert_eq!(interpreter.run_line(branch).unwrap(), Some(expected), "{branch}");
        }
    }

    #[test]
    fn optimistic_resolution_reports_unknown() {
        let interpreter = Interpreter::new(0);
        let mut instruction = parse_line("inc mystery").unwrap();
        let operand = instruction.operands.remove(0);
        assert_eq!(interpreter.resolve(&operand, None, true), Ok(None));
        assert!(interpreter.resolve(&operand, None, false).is_err());
    }

    #[test]
    fn lines_are_parsed_once() {
        let mut interpreter = Interpreter::new(0);
        for _ in 0..3 {
            interpreter.run_line("inc eax").unwrap();
        }
        assert_eq!(interpreter.cache.len(), 1);
        assert_eq!(interpreter.registers().read(Register::Eax), 3);
    }

    #[proptest]
    fn add_matches_wrapping_arithmetic(a: u32, b: u32) {
        let mut interpreter = Interpreter::new(0);
        interpreter.registers_mut().write(Register::Eax, a);
        interpreter.registers_mut().write(Register::Ebx, b);
        interpreter.run_line("add eax, ebx").unwrap();
        prop_assert_eq!(interpreter.registers().read(Register::Eax), a.wrapping_add(b));
        prop_assert_eq!(interpreter.flags().get(Flags::CARRY), a.checked_add(b).is_none());
    }
}
