////////////////////////////////////////////////////////////////////////////////
// This Source Code Form is subject to the terms of the Mozilla Public         /
// License, v. 2.0. If a copy of the MPL was not distributed with this         /
// file, You can obtain one at https://mozilla.org/MPL/2.0/.                   /
//                                                                             /
////////////////////////////////////////////////////////////////////////////////

//! Parser for single instruction lines.
//!
//! ```text
//! line     := mnemonic (operand (',' operand)*)? (';' comment)?
//! mnemonic := IDENT | 'rep' IDENT
//! operand  := (('byte' | 'word' | 'dword') 'ptr')? ('[' sum ']' | sum)
//! sum      := ('+' | '-')? product (('+' | '-') product)*
//! product  := atom ('*' atom)*
//! atom     := NUMBER | IDENT
//! ```
//!
//! Numbers are decimal, or hexadecimal with a trailing `h` and a leading
//! decimal digit (`0FFh`). An identifier is a register if it names one and a
//! symbolic variable otherwise.

use std::fmt::{Display, Formatter};

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{
        alpha1, alphanumeric1, char, digit1, hex_digit0, one_of, satisfy, space0, space1,
    },
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0, many0_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use parse_display::{Display, FromStr};

use crate::machine::{InterpreterError, Register};

/// The closed set of executable operators
#[derive(Display, FromStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[display(style = "lowercase")]
pub enum Mnemonic {
    Push,
    Pop,
    Mov,
    Movzx,
    Add,
    Sub,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Lea,
    Inc,
    Dec,
    Neg,
    Test,
    Cmp,
    Call,
    #[display("rep movsb")]
    RepMovsb,
    #[display("rep movsd")]
    RepMovsd,
    Rol,
    Jb,
    Jnb,
    Jz,
    Jnz,
    Jbe,
    Jl,
    Jge,
    Jle,
    Js,
    Jns,
    Jmp,
}

impl Mnemonic {
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Jb
                | Self::Jnb
                | Self::Jz
                | Self::Jnz
                | Self::Jbe
                | Self::Jl
                | Self::Jge
                | Self::Jle
                | Self::Js
                | Self::Jns
                | Self::Jmp
        )
    }

    /// How many operands the mnemonic is written with
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::RepMovsb | Self::RepMovsd => 0,
            Self::Push | Self::Pop | Self::Inc | Self::Dec | Self::Neg | Self::Call => 1,
            branch if branch.is_branch() => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Register(Register),
    Immediate(i64),
    Variable(String),
    Sum(Vec<(Sign, Expr)>),
    Product(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    /// Register, immediate, variable or arithmetic on them
    Value(Expr),
    /// Bracketed memory reference holding an address expression
    Memory(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Width forced by a `byte ptr` style qualifier
    pub qualifier: Option<u8>,
    pub kind: OperandKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Register(register) => write!(f, "{register}"),
            Expr::Immediate(value) => write!(f, "{value}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Sum(terms) => {
                for (index, (sign, term)) in terms.iter().enumerate() {
                    match (index, sign) {
                        (0, Sign::Plus) => {}
                        (_, Sign::Plus) => write!(f, "+")?,
                        (_, Sign::Minus) => write!(f, "-")?,
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
            Expr::Product(factors) => {
                for (index, factor) in factors.iter().enumerate() {
                    if index > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{factor}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.qualifier {
            Some(1) => write!(f, "byte ptr ")?,
            Some(2) => write!(f, "word ptr ")?,
            Some(_) => write!(f, "dword ptr ")?,
            None => {}
        }
        match &self.kind {
            OperandKind::Value(expr) => write!(f, "{expr}"),
            OperandKind::Memory(expr) => write!(f, "[{expr}]"),
        }
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag_no_case("_"))),
        many0_count(alt((alphanumeric1, tag_no_case("_")))),
    ))(input)
}

fn number(input: &str) -> IResult<&str, i64> {
    alt((
        map_res(
            terminated(
                recognize(pair(satisfy(|c| c.is_ascii_digit()), hex_digit0)),
                one_of("hH"),
            ),
            |digits| i64::from_str_radix(digits, 16),
        ),
        map_res(digit1, |digits: &str| digits.parse::<i64>()),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        map(number, Expr::Immediate),
        map(identifier, |name| {
            name.to_ascii_lowercase()
                .parse::<Register>()
                .map_or_else(|_| Expr::Variable(name.to_string()), Expr::Register)
        }),
    ))(input)
}

fn product(input: &str) -> IResult<&str, Expr> {
    let (input, first) = atom(input)?;
    let (input, rest) = many0(preceded(delimited(space0, char('*'), space0), atom))(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    let mut factors = Vec::with_capacity(rest.len() + 1);
    factors.push(first);
    factors.extend(rest);
    Ok((input, Expr::Product(factors)))
}

fn sign(input: &str) -> IResult<&str, Sign> {
    alt((value(Sign::Plus, char('+')), value(Sign::Minus, char('-'))))(input)
}

fn sum(input: &str) -> IResult<&str, Expr> {
    let (input, lead) = opt(terminated(sign, space0))(input)?;
    let (input, first) = product(input)?;
    let (input, rest) = many0(pair(delimited(space0, sign, space0), product))(input)?;

    let expr = match (lead, first, rest.is_empty()) {
        (None | Some(Sign::Plus), first, true) => first,
        (Some(Sign::Minus), Expr::Immediate(value), true) => Expr::Immediate(-value),
        (lead, first, _) => {
            let mut terms = Vec::with_capacity(rest.len() + 1);
            terms.push((lead.unwrap_or(Sign::Plus), first));
            terms.extend(rest);
            Expr::Sum(terms)
        }
    };
    Ok((input, expr))
}

fn qualifier(input: &str) -> IResult<&str, u8> {
    terminated(
        alt((
            value(1, tag_no_case("byte")),
            value(2, tag_no_case("word")),
            value(4, tag_no_case("dword")),
        )),
        tuple((space1, tag_no_case("ptr"), space0)),
    )(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    let (input, qualifier) = opt(qualifier)(input)?;
    let (input, kind) = alt((
        map(
            delimited(pair(char('['), space0), sum, pair(space0, char(']'))),
            OperandKind::Memory,
        ),
        map(sum, OperandKind::Value),
    ))(input)?;
    Ok((input, Operand { qualifier, kind }))
}

fn mnemonic(input: &str) -> IResult<&str, String> {
    let (input, first) = identifier(input)?;
    if first.eq_ignore_ascii_case("rep") {
        let (input, second) = preceded(space1, identifier)(input)?;
        return Ok((input, format!("rep {}", second.to_ascii_lowercase())));
    }
    Ok((input, first.to_ascii_lowercase()))
}

fn instruction(input: &str) -> IResult<&str, (String, Vec<Operand>)> {
    let (input, name) = mnemonic(input)?;
    let (input, operands) = opt(preceded(
        space1,
        separated_list1(delimited(space0, char(','), space0), operand),
    ))(input)?;
    Ok((input, (name, operands.unwrap_or_default())))
}

/// Parse one line of instruction text. Anything after `;` is ignored.
///
/// # Errors
/// - [InterpreterError::UnparsableInstruction]: the line does not follow the grammar
/// - [InterpreterError::UnknownOperator]: the mnemonic is not in [Mnemonic]
pub fn parse_line(line: &str) -> Result<Instruction, InterpreterError> {
    let code = line.split_once(';').map_or(line, |(code, _)| code).trim();
    let (_, (name, operands)) = all_consuming(instruction)(code)
        .map_err(|_| InterpreterError::UnparsableInstruction(line.to_string()))?;
    let mnemonic = name
        .parse::<Mnemonic>()
        .map_err(|_| InterpreterError::UnknownOperator(name))?;
    Ok(Instruction { mnemonic, operands })
}
