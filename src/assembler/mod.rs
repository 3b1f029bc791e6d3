/*!
  The two-pass assembler. Source is scanned one line at a time into
  statements; pass 1 walks the statements with an explicit address
  accumulator, binding labels and EQU/VAR names into the symbol table; pass
  2 re-walks them identically, matching every instruction's operand pattern
  against the ISA table and emitting the byte image plus the debugger
  sidecars (breakpoint descriptions, assertion conditions, line-to-address
  annotations).

  Assembly never partially succeeds: the first failure wins and is returned
  with the offending source fragment. The fallback policy on failure (load
  an empty program, surface the error) belongs to the caller.
*/

mod cursor;
mod scanner;
mod symbols;
mod token;

pub use scanner::TokenScanner;
pub use symbols::SymbolTable;
pub use token::Token;

use string_cache::DefaultAtom;

use crate::errors::{CompileError, CompileErrorKind};
use crate::isa::{self, Mnemonic, Pat, Target, PROGRAM_BASE};

/// A runtime assertion compiled from an ASSERT directive. The condition is
/// evaluated against live register state; `text` is the source line, used
/// as the breakpoint description when the condition fails.
#[derive(Clone, Debug, PartialEq)]
pub struct Assertion {
  pub condition : Condition,
  pub text      : String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Condition {
  /// Vx == literal
  RegByte(usize, u8),
  /// Vx == Vy
  RegReg(usize, usize),
}

impl Assertion {
  pub fn holds(&self, v: &[u8; 16]) -> bool {
    match self.condition {
      Condition::RegByte(x, value) => v[x] == value,
      Condition::RegReg(x, y)      => v[x] == v[y],
    }
  }
}

/// The output of a successful assembly: the byte image starting at the
/// program base plus everything the debugger wants to know about it.
#[derive(Debug)]
pub struct Assembly {
  pub rom         : Vec<u8>,
  pub target      : Target,
  pub breakpoints : Vec<String>,
  pub asserts     : Vec<Assertion>,
  /// (address, 1-based source line) for every emitting statement.
  pub lines       : Vec<(u16, usize)>,
  pub symbols     : SymbolTable,
}

impl Assembly {
  /// The empty program, used as the load fallback after a failed assembly.
  pub fn empty() -> Assembly {
    Assembly {
      rom         : Vec::new(),
      target      : Target::default(),
      breakpoints : Vec::new(),
      asserts     : Vec::new(),
      lines       : Vec::new(),
      symbols     : SymbolTable::new(),
    }
  }
}

/// Compiles assembly source into an `Assembly`.
pub fn assemble(source: &str) -> Result<Assembly, CompileError> {
  let (statements, target) = scan_statements(source)?;

  let mut symbols = SymbolTable::new();
  pass1(&statements, target, &mut symbols)?;
  pass2(&statements, target, symbols)
}

// region Statements

struct Statement {
  line_no : usize,
  text    : String,
  label   : Option<DefaultAtom>,
  body    : Body,
}

enum Body {
  Empty,
  Instruction(Mnemonic, Vec<Token>),
  Break(Option<String>),
  Assert(Vec<Token>),
  Equ(Token),
  Var(Option<Token>),
}

impl Statement {
  fn err(&self, kind: CompileErrorKind, text: impl Into<String>) -> CompileError {
    CompileError::new(kind, self.line_no, text)
  }
}

fn scan_statements(source: &str) -> Result<(Vec<Statement>, Target), CompileError> {
  let mut statements = Vec::new();
  let mut target = Target::default();

  for (index, raw) in source.lines().enumerate() {
    let line_no = index + 1;
    let mut scanner = TokenScanner::new(raw, line_no);

    let mut label = None;
    let mut token = scanner.scan_token()?;
    if let Token::Label(name) = token {
      label = Some(name);
      token = scanner.scan_token()?;
      if token == Token::Char(':') {
        token = scanner.scan_token()?;
      }
    }

    let body = match token {
      Token::End(_) => Body::Empty,

      Token::Instruction(mnemonic) => {
        Body::Instruction(mnemonic, scanner.scan_operands()?)
      }

      Token::Break => {
        match scanner.scan_token()? {
          Token::End(comment) => Body::Break(comment),
          other => {
            return Err(CompileError::new(
              CompileErrorKind::UnexpectedToken, line_no, format!("{}", other)
            ));
          }
        }
      }

      Token::Assert => Body::Assert(scanner.scan_operands()?),

      Token::Equ => {
        if label.is_none() {
          return Err(CompileError::new(CompileErrorKind::UnexpectedToken, line_no, "EQU"));
        }
        let value = scanner.scan_token()?;
        if value.is_end() {
          return Err(CompileError::new(CompileErrorKind::MissingOperand, line_no, "EQU"));
        }
        expect_end(&mut scanner, line_no)?;
        Body::Equ(value)
      }

      Token::Var => {
        if label.is_none() {
          return Err(CompileError::new(CompileErrorKind::UnexpectedToken, line_no, "VAR"));
        }
        match scanner.scan_token()? {
          Token::End(_) => Body::Var(None),
          size => {
            expect_end(&mut scanner, line_no)?;
            Body::Var(Some(size))
          }
        }
      }

      Token::Super => {
        target.super_chip = true;
        expect_end(&mut scanner, line_no)?;
        Body::Empty
      }

      Token::Extended => {
        target.extended = true;
        expect_end(&mut scanner, line_no)?;
        Body::Empty
      }

      other => {
        return Err(CompileError::new(
          CompileErrorKind::UnexpectedToken, line_no, format!("{}", other)
        ));
      }
    };

    statements.push(Statement { line_no, text: raw.trim().to_string(), label, body });
  }

  Ok((statements, target))
}

fn expect_end(scanner: &mut TokenScanner, line_no: usize) -> Result<(), CompileError> {
  match scanner.scan_token()? {
    Token::End(_) => Ok(()),
    other => Err(CompileError::new(
      CompileErrorKind::UnexpectedToken, line_no, format!("{}", other)
    )),
  }
}

// endregion

// region Pass 1

/// Walks the statements with a running address cursor, binding every label
/// to its address and every EQU/VAR name to its value.
fn pass1(
  statements: &[Statement],
  target: Target,
  symbols: &mut SymbolTable
) -> Result<(), CompileError> {
  let mut address = PROGRAM_BASE as i64;
  let mut data_cursor = target.memory_size() as i64;

  for statement in statements {
    if let Some(name) = &statement.label {
      let is_binding = matches!(statement.body, Body::Equ(_) | Body::Var(_));
      if !is_binding && !symbols.bind_label(name, address as u16) {
        return Err(statement.err(CompileErrorKind::DuplicateLabel, name.to_string()));
      }
    }

    match &statement.body {
      Body::Empty => {}

      Body::Equ(value) => {
        let value = eval_const(value, address as u16, symbols, statement)?;
        let name = statement.label.as_ref().map(|n| n.clone());
        if let Some(name) = name {
          if !symbols.bind_constant(&name, value) {
            return Err(statement.err(CompileErrorKind::DuplicateLabel, name.to_string()));
          }
        }
      }

      Body::Var(size) => {
        let size = match size {
          Some(token) => eval_const(token, address as u16, symbols, statement)?,
          None        => 1,
        };
        if size < 1 {
          return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
        }
        data_cursor -= size as i64;
        if data_cursor < PROGRAM_BASE as i64 {
          return Err(statement.err(CompileErrorKind::ProgramTooLarge, statement.text.as_str()));
        }
        let name = statement.label.as_ref().map(|n| n.clone());
        if let Some(name) = name {
          if !symbols.bind_constant(&name, data_cursor as i32) {
            return Err(statement.err(CompileErrorKind::DuplicateLabel, name.to_string()));
          }
        }
      }

      Body::Break(_) | Body::Assert(_) => address += 2,

      Body::Instruction(mnemonic, operands) => {
        address += statement_size(*mnemonic, operands, address as u16, symbols, statement)? as i64;
      }
    }

    if address > target.memory_size() as i64 {
      return Err(statement.err(CompileErrorKind::ProgramTooLarge, statement.text.as_str()));
    }
  }

  Ok(())
}

/// The emitted size of one instruction or pseudo-op. Statically 2 bytes for
/// real instructions; computed from the operands for the data pseudo-ops.
fn statement_size(
  mnemonic: Mnemonic,
  operands: &[Token],
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<usize, CompileError> {
  match mnemonic {
    Mnemonic::Byte => {
      let mut size = 0;
      for operand in operands {
        size += match operand {
          Token::Text(text) => text.len(),
          _                 => 1,
        };
      }
      Ok(size)
    }

    Mnemonic::Word => Ok(2 * operands.len()),

    Mnemonic::Ascii => {
      let mut size = 0;
      for operand in operands {
        match operand {
          Token::Text(text) => size += text.len(),
          other => {
            return Err(statement.err(CompileErrorKind::BadOperands, format!("{}", other)));
          }
        }
      }
      Ok(size)
    }

    Mnemonic::Align => {
      let n = single_const(operands, address, symbols, statement)?;
      if n < 1 {
        return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
      }
      let n = n as usize;
      Ok((n - address as usize % n) % n)
    }

    Mnemonic::Pad => {
      let n = single_const(operands, address, symbols, statement)?;
      if n < 0 {
        return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
      }
      Ok(n as usize)
    }

    _ => Ok(2),
  }
}

/// Evaluates a token that must already be a known value in pass 1: a
/// literal, the here-pointer, or a previously bound name.
fn eval_const(
  token: &Token,
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<i32, CompileError> {
  match token {
    Token::Lit(value) => Ok(*value),
    Token::Here       => Ok(address as i32),
    Token::Id(name)   => symbols
      .resolve(name)
      .ok_or_else(|| statement.err(CompileErrorKind::UnresolvedSymbol, name.to_string())),
    other => Err(statement.err(CompileErrorKind::UnexpectedToken, format!("{}", other))),
  }
}

fn single_const(
  operands: &[Token],
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<i32, CompileError> {
  match operands {
    [token] => eval_const(token, address, symbols, statement),
    _ => Err(statement.err(CompileErrorKind::BadOperands, statement.text.as_str())),
  }
}

// endregion

// region Pass 2

/// Re-walks the statements, selecting encodings from the ISA table and
/// emitting the byte image and debugger sidecars.
fn pass2(
  statements: &[Statement],
  target: Target,
  symbols: SymbolTable
) -> Result<Assembly, CompileError> {
  let mut rom: Vec<u8> = Vec::new();
  let mut breakpoints: Vec<String> = Vec::new();
  let mut asserts: Vec<Assertion> = Vec::new();
  let mut lines: Vec<(u16, usize)> = Vec::new();

  for statement in statements {
    let address = PROGRAM_BASE + rom.len() as u16;

    match &statement.body {
      Body::Empty | Body::Equ(_) | Body::Var(_) => {}

      Body::Break(comment) => {
        lines.push((address, statement.line_no));
        let slot = breakpoints.len();
        if slot > 0xFF {
          return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
        }
        emit_word(&mut rom, isa::BREAK_BITS | slot as u16);
        breakpoints.push(comment.clone().unwrap_or_else(|| "breakpoint".to_string()));
      }

      Body::Assert(operands) => {
        lines.push((address, statement.line_no));
        let slot = asserts.len();
        if slot > 0xFF {
          return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
        }
        let condition = parse_condition(operands, address, &symbols, statement)?;
        emit_word(&mut rom, isa::ASSERT_BITS | slot as u16);
        asserts.push(Assertion { condition, text: statement.text.clone() });
      }

      Body::Instruction(mnemonic, operands) => {
        lines.push((address, statement.line_no));
        if mnemonic.is_data() {
          emit_data(&mut rom, *mnemonic, operands, address, &symbols, statement)?;
        } else {
          let word = encode_instruction(*mnemonic, operands, address, target, &symbols, statement)?;
          emit_word(&mut rom, word);
        }
      }
    }
  }

  Ok(Assembly { rom, target, breakpoints, asserts, lines, symbols })
}

fn emit_word(rom: &mut Vec<u8>, word: u16) {
  rom.push((word >> 8) as u8);
  rom.push((word & 0xFF) as u8);
}

/// An operand token resolved against the symbol table, ready for pattern
/// matching against the ISA table.
enum Operand {
  V(usize),
  Value(i32),
  I,
  Ea,
  F,
  Hf,
  K,
  Dt,
  St,
  R,
  Ascii,
  Text(String),
}

fn resolve_operand(
  token: &Token,
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<Operand, CompileError> {
  match token {
    Token::V(index)          => Ok(Operand::V(*index)),
    Token::Lit(value)        => Ok(Operand::Value(*value)),
    Token::Here              => Ok(Operand::Value(address as i32)),
    Token::Id(name)          => symbols
      .resolve(name)
      .map(Operand::Value)
      .ok_or_else(|| statement.err(CompileErrorKind::UnresolvedSymbol, name.to_string())),
    Token::I                 => Ok(Operand::I),
    Token::EffectiveAddress  => Ok(Operand::Ea),
    Token::F                 => Ok(Operand::F),
    Token::Hf                => Ok(Operand::Hf),
    Token::K                 => Ok(Operand::K),
    Token::Dt                => Ok(Operand::Dt),
    Token::St                => Ok(Operand::St),
    Token::R                 => Ok(Operand::R),
    Token::Ascii             => Ok(Operand::Ascii),
    Token::Text(text)        => Ok(Operand::Text(text.clone())),
    other => Err(statement.err(CompileErrorKind::UnexpectedToken, format!("{}", other))),
  }
}

fn matches_pattern(pattern: &[Pat], operands: &[Operand]) -> bool {
  if pattern.len() != operands.len() {
    return false;
  }
  pattern.iter().zip(operands).all(|(pat, operand)| match (pat, operand) {
    (Pat::Vx, Operand::V(_))                             => true,
    (Pat::Vy, Operand::V(_))                             => true,
    (Pat::V0, Operand::V(index))                         => *index == 0,
    (Pat::Addr, Operand::Value(_))                       => true,
    (Pat::Byte, Operand::Value(_))                       => true,
    (Pat::Nibble, Operand::Value(_))                     => true,
    (Pat::I, Operand::I)                                 => true,
    (Pat::Ea, Operand::Ea)                               => true,
    (Pat::F, Operand::F)                                 => true,
    (Pat::Hf, Operand::Hf)                               => true,
    (Pat::K, Operand::K)                                 => true,
    (Pat::Dt, Operand::Dt)                               => true,
    (Pat::St, Operand::St)                               => true,
    (Pat::R, Operand::R)                                 => true,
    (Pat::Ascii, Operand::Ascii)                         => true,
    _                                                    => false,
  })
}

/// Selects the encoding for a mnemonic plus resolved operands and
/// substitutes the register and literal fields into the template.
fn encode_instruction(
  mnemonic: Mnemonic,
  operands: &[Token],
  address: u16,
  target: Target,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<u16, CompileError> {
  let resolved = operands
    .iter()
    .map(|token| resolve_operand(token, address, symbols, statement))
    .collect::<Result<Vec<Operand>, CompileError>>()?;

  let mut gated = false;
  for entry in isa::encodings(mnemonic) {
    if !matches_pattern(entry.operands, &resolved) {
      continue;
    }
    if !target.allows(entry.caps) {
      gated = true;
      continue;
    }

    let mut word = entry.bits;
    for (pat, operand) in entry.operands.iter().zip(&resolved) {
      word |= encode_field(*pat, operand, statement)?;
    }
    return Ok(word);
  }

  match gated {
    true  => Err(statement.err(CompileErrorKind::RequiresTarget, statement.text.as_str())),
    false => Err(statement.err(CompileErrorKind::BadOperands, statement.text.as_str())),
  }
}

fn encode_field(
  pat: Pat,
  operand: &Operand,
  statement: &Statement
) -> Result<u16, CompileError> {
  let range_err = || statement.err(CompileErrorKind::OperandRange, statement.text.as_str());

  match (pat, operand) {
    (Pat::Vx, Operand::V(index)) => Ok((*index as u16) << 8),
    (Pat::Vy, Operand::V(index)) => Ok((*index as u16) << 4),

    (Pat::Addr, Operand::Value(value)) => {
      if !(0..=0xFFF).contains(value) {
        return Err(range_err());
      }
      Ok(*value as u16)
    }

    (Pat::Byte, Operand::Value(value)) => {
      if !(-128..=255).contains(value) {
        return Err(range_err());
      }
      Ok((*value & 0xFF) as u16)
    }

    (Pat::Nibble, Operand::Value(value)) => {
      if !(0..=15).contains(value) {
        return Err(range_err());
      }
      Ok(*value as u16)
    }

    // Register tags and V0 contribute no bits.
    _ => Ok(0),
  }
}

/// Emits the data pseudo-ops: BYTE, WORD, ASCII, ALIGN, PAD.
fn emit_data(
  rom: &mut Vec<u8>,
  mnemonic: Mnemonic,
  operands: &[Token],
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<(), CompileError> {
  match mnemonic {
    Mnemonic::Byte => {
      for operand in operands {
        match resolve_operand(operand, address, symbols, statement)? {
          Operand::Text(text) => rom.extend_from_slice(text.as_bytes()),
          Operand::Value(value) => {
            if !(-128..=255).contains(&value) {
              return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
            }
            rom.push((value & 0xFF) as u8);
          }
          _ => return Err(statement.err(CompileErrorKind::BadOperands, statement.text.as_str())),
        }
      }
    }

    Mnemonic::Word => {
      for operand in operands {
        match resolve_operand(operand, address, symbols, statement)? {
          Operand::Value(value) => {
            if !(-32768..=65535).contains(&value) {
              return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
            }
            emit_word(rom, (value & 0xFFFF) as u16);
          }
          _ => return Err(statement.err(CompileErrorKind::BadOperands, statement.text.as_str())),
        }
      }
    }

    Mnemonic::Ascii => {
      for operand in operands {
        match operand {
          Token::Text(text) => rom.extend_from_slice(text.as_bytes()),
          other => {
            return Err(statement.err(CompileErrorKind::BadOperands, format!("{}", other)));
          }
        }
      }
    }

    Mnemonic::Align | Mnemonic::Pad => {
      let size = statement_size(mnemonic, operands, address, symbols, statement)?;
      rom.extend(std::iter::repeat(0).take(size));
    }

    _ => unreachable!("emit_data called for a non-data mnemonic"),
  }

  Ok(())
}

/// ASSERT conditions: `ASSERT Vx, #nn` and `ASSERT Vx, Vy`.
fn parse_condition(
  operands: &[Token],
  address: u16,
  symbols: &SymbolTable,
  statement: &Statement
) -> Result<Condition, CompileError> {
  let resolved = operands
    .iter()
    .map(|token| resolve_operand(token, address, symbols, statement))
    .collect::<Result<Vec<Operand>, CompileError>>()?;

  match resolved.as_slice() {
    [Operand::V(x), Operand::V(y)] => Ok(Condition::RegReg(*x, *y)),

    [Operand::V(x), Operand::Value(value)] => {
      if !(0..=255).contains(value) {
        return Err(statement.err(CompileErrorKind::OperandRange, statement.text.as_str()));
      }
      Ok(Condition::RegByte(*x, *value as u8))
    }

    _ => Err(statement.err(CompileErrorKind::BadOperands, statement.text.as_str())),
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cls_assembles() {
    let assembly = assemble("CLS").unwrap();
    assert_eq!(assembly.rom, vec![0x00, 0xE0]);
  }

  #[test]
  fn ld_byte_assembles() {
    let assembly = assemble("LD V1, #05").unwrap();
    assert_eq!(assembly.rom, vec![0x61, 0x05]);
  }

  #[test]
  fn register_register_forms() {
    assert_eq!(assemble("SE V1, V2").unwrap().rom, vec![0x51, 0x20]);
    assert_eq!(assemble("SE V1, #02").unwrap().rom, vec![0x31, 0x02]);
    assert_eq!(assemble("ADD V0, V1").unwrap().rom, vec![0x80, 0x14]);
    assert_eq!(assemble("ADD V0, #01").unwrap().rom, vec![0x70, 0x01]);
    assert_eq!(assemble("SHR V3").unwrap().rom, vec![0x83, 0x06]);
  }

  #[test]
  fn special_register_forms() {
    assert_eq!(assemble("LD I, #0300").unwrap().rom, vec![0xA3, 0x00]);
    assert_eq!(assemble("LD V2, DT").unwrap().rom, vec![0xF2, 0x07]);
    assert_eq!(assemble("LD DT, V2").unwrap().rom, vec![0xF2, 0x15]);
    assert_eq!(assemble("LD ST, V2").unwrap().rom, vec![0xF2, 0x18]);
    assert_eq!(assemble("LD V3, K").unwrap().rom, vec![0xF3, 0x0A]);
    assert_eq!(assemble("LD F, V4").unwrap().rom, vec![0xF4, 0x29]);
    assert_eq!(assemble("LD [I], V5").unwrap().rom, vec![0xF5, 0x55]);
    assert_eq!(assemble("LD V5, [I]").unwrap().rom, vec![0xF5, 0x65]);
    assert_eq!(assemble("ADD I, V6").unwrap().rom, vec![0xF6, 0x1E]);
    assert_eq!(assemble("JP V0, #0300").unwrap().rom, vec![0xB3, 0x00]);
  }

  #[test]
  fn forward_label_resolves() {
    let assembly = assemble("JP LOOP\nCLS\nLOOP: CLS").unwrap();
    assert_eq!(assembly.rom, vec![0x12, 0x04, 0x00, 0xE0, 0x00, 0xE0]);
    assert_eq!(
      assembly.symbols.resolve(&DefaultAtom::from("LOOP")),
      Some(0x204)
    );
  }

  #[test]
  fn here_pointer() {
    let assembly = assemble("CLS\nJP *").unwrap();
    assert_eq!(assembly.rom, vec![0x00, 0xE0, 0x12, 0x02]);
  }

  #[test]
  fn duplicate_label_is_rejected() {
    let e = assemble("LOOP: CLS\nLOOP: RET").unwrap_err();
    assert_eq!(e.kind, CompileErrorKind::DuplicateLabel);
    assert_eq!(e.line, 2);
  }

  #[test]
  fn unresolved_symbol_is_rejected() {
    let e = assemble("JP NOWHERE").unwrap_err();
    assert_eq!(e.kind, CompileErrorKind::UnresolvedSymbol);
    assert_eq!(e.text, "NOWHERE");
  }

  #[test]
  fn literal_overflow_is_rejected() {
    assert_eq!(
      assemble("LD V1, #1FF").unwrap_err().kind,
      CompileErrorKind::OperandRange
    );
    assert_eq!(
      assemble("JP #1000").unwrap_err().kind,
      CompileErrorKind::OperandRange
    );
    assert_eq!(
      assemble("SUPER\nSCD 16").unwrap_err().kind,
      CompileErrorKind::OperandRange
    );
  }

  #[test]
  fn missing_operand_is_rejected() {
    let e = assemble("LD V1,").unwrap_err();
    assert_eq!(e.kind, CompileErrorKind::MissingOperand);
  }

  #[test]
  fn unmatched_pattern_is_rejected() {
    let e = assemble("JP V1, #0300").unwrap_err();
    assert_eq!(e.kind, CompileErrorKind::BadOperands);
  }

  #[test]
  fn super_gating() {
    assert_eq!(
      assemble("SCD 4").unwrap_err().kind,
      CompileErrorKind::RequiresTarget
    );
    assert_eq!(assemble("SUPER\nSCD 4").unwrap().rom, vec![0x00, 0xC4]);
    assert_eq!(assemble("SUPER\nHIGH").unwrap().rom, vec![0x00, 0xFF]);
  }

  #[test]
  fn extended_gating() {
    assert_eq!(
      assemble("MUL V1, V2").unwrap_err().kind,
      CompileErrorKind::RequiresTarget
    );
    assert_eq!(assemble("EXTENDED\nMUL V1, V2").unwrap().rom, vec![0x91, 0x21]);
    assert_eq!(assemble("EXTENDED\nLD A, V1").unwrap().rom, vec![0xF1, 0x94]);
  }

  #[test]
  fn data_pseudo_ops() {
    let assembly = assemble("BYTE 1, 2, #FF\nL: CLS").unwrap();
    assert_eq!(assembly.rom, vec![1, 2, 0xFF, 0x00, 0xE0]);
    assert_eq!(assembly.symbols.resolve(&DefaultAtom::from("L")), Some(0x203));

    let assembly = assemble("WORD #1234, TAB\nTAB: CLS").unwrap();
    assert_eq!(assembly.rom, vec![0x12, 0x34, 0x02, 0x04, 0x00, 0xE0]);

    let assembly = assemble("ASCII \"AB\"").unwrap();
    assert_eq!(assembly.rom, vec![0x41, 0x42]);

    let assembly = assemble("BYTE 1\nALIGN 2\nL: CLS").unwrap();
    assert_eq!(assembly.rom, vec![1, 0, 0x00, 0xE0]);
    assert_eq!(assembly.symbols.resolve(&DefaultAtom::from("L")), Some(0x202));

    let assembly = assemble("PAD 3\nCLS").unwrap();
    assert_eq!(assembly.rom, vec![0, 0, 0, 0x00, 0xE0]);
  }

  #[test]
  fn equ_and_var_bindings() {
    let assembly = assemble("SPEED EQU #05\nLD V0, SPEED").unwrap();
    assert_eq!(assembly.rom, vec![0x60, 0x05]);

    // VAR allocates downward from the top of memory.
    let assembly = assemble("COUNT VAR 2\nLD I, COUNT").unwrap();
    assert_eq!(assembly.rom, vec![0xAF, 0xFE]);

    let assembly = assemble("FLAG VAR\nSECOND VAR\nLD I, SECOND").unwrap();
    assert_eq!(assembly.rom, vec![0xAF, 0xFE]);
  }

  #[test]
  fn break_directive() {
    let assembly = assemble("BREAK ; watch this\nCLS").unwrap();
    assert_eq!(assembly.rom, vec![0x0E, 0x00, 0x00, 0xE0]);
    assert_eq!(assembly.breakpoints, vec!["watch this".to_string()]);

    let assembly = assemble("BREAK\nBREAK").unwrap();
    assert_eq!(assembly.rom, vec![0x0E, 0x00, 0x0E, 0x01]);
    assert_eq!(assembly.breakpoints.len(), 2);
  }

  #[test]
  fn assert_directive() {
    let assembly = assemble("ASSERT V1, #05").unwrap();
    assert_eq!(assembly.rom, vec![0x0F, 0x00]);
    assert_eq!(assembly.asserts[0].condition, Condition::RegByte(1, 5));
    assert_eq!(assembly.asserts[0].text, "ASSERT V1, #05");

    let assembly = assemble("ASSERT V1, V2").unwrap();
    assert_eq!(assembly.asserts[0].condition, Condition::RegReg(1, 2));
  }

  #[test]
  fn line_annotations() {
    let assembly = assemble("CLS\n\nLOOP: JP LOOP").unwrap();
    assert_eq!(assembly.lines, vec![(0x200, 1), (0x202, 3)]);
  }

  #[test]
  fn labels_without_colons() {
    let assembly = assemble("LOOP CLS\nJP LOOP").unwrap();
    assert_eq!(assembly.rom, vec![0x00, 0xE0, 0x12, 0x00]);
  }

  #[test]
  fn align_forward_reference_is_rejected() {
    let e = assemble("ALIGN GAP\nGAP EQU 4").unwrap_err();
    assert_eq!(e.kind, CompileErrorKind::UnresolvedSymbol);
  }
}
