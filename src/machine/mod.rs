////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! A small x86-flavoured machine that executes instruction text.
//!
//! Some decoders are only known as disassembled instruction traces whose
//! output depends on carry and overflow side effects. Instead of re-deriving
//! them, those traces are replayed here line by line against a
//! [RegisterFile], a [FlagEngine] and a [VirtualMemory].
//!
//! ```
//! use qfs_codec::machine::{Interpreter, Register};
//!
//! let mut machine = Interpreter::new(0);
//! machine.run_line("mov eax, 0FFh").unwrap();
//! machine.run_line("add al, 1").unwrap();
//! assert_eq!(machine.registers().read(Register::Eax), 0);
//! assert_eq!(machine.run_line("jb overflowed").unwrap(), Some(true));
//! ```

mod error;
pub mod flags;
pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod registers;

pub use crate::machine::error::InterpreterError;
pub use crate::machine::flags::{FlagEngine, Flags, OpClass};
pub use crate::machine::interpreter::{Interpreter, Resolved, Routine};
pub use crate::machine::memory::VirtualMemory;
pub use crate::machine::parser::{parse_line, Instruction, Mnemonic, Operand};
pub use crate::machine::registers::{Register, RegisterFile};
