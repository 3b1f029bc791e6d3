/*!
  The instruction-set table. A single ordered list of `(mask, bits)` entries
  is the authority for all three consumers: the assembler matches a mnemonic
  plus operand pattern against it to select an encoding, the execution
  engine decodes a fetched word against it to select an operation, and the
  disassembler renders a word back to text from the same row.

  Entries are ordered by mask precedence: full 16-bit matches first, then
  the progressively wider masks that capture whole instruction families.
  Decoding groups by the top 4 bits and then takes the first match in table
  order, so more specific rows always win.
*/

use std::collections::HashMap;

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// Programs load at this offset; everything below it is font data.
pub const PROGRAM_BASE: u16 = 0x200;

/// Reserved word for a compiled BREAK; the low byte indexes the breakpoint
/// description table carried beside the byte image.
pub const BREAK_BITS: u16 = 0x0E00;

/// Reserved word for a compiled ASSERT; the low byte indexes the assertion
/// table carried beside the byte image.
pub const ASSERT_BITS: u16 = 0x0F00;

/**
  Assembly mnemonics, including the data pseudo-ops and the two directives
  that compile to reserved words. The serialized names are the keyword
  table consulted by the token scanner via `Mnemonic::from_str`.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString,
  Clone,        Copy,          Eq, PartialEq, Debug, Hash
)]
pub enum Mnemonic {
  #[strum(serialize = "CLS")]    Cls,
  #[strum(serialize = "RET")]    Ret,
  #[strum(serialize = "EXIT")]   Exit,
  #[strum(serialize = "LOW")]    Low,
  #[strum(serialize = "HIGH")]   High,
  #[strum(serialize = "SCU")]    Scu,
  #[strum(serialize = "SCD")]    Scd,
  #[strum(serialize = "SCR")]    Scr,
  #[strum(serialize = "SCL")]    Scl,
  #[strum(serialize = "SYS")]    Sys,
  #[strum(serialize = "JP")]     Jp,
  #[strum(serialize = "CALL")]   Call,
  #[strum(serialize = "SE")]     Se,
  #[strum(serialize = "SNE")]    Sne,
  #[strum(serialize = "SGT")]    Sgt,
  #[strum(serialize = "SLT")]    Slt,
  #[strum(serialize = "SKP")]    Skp,
  #[strum(serialize = "SKNP")]   Sknp,
  #[strum(serialize = "LD")]     Ld,
  #[strum(serialize = "OR")]     Or,
  #[strum(serialize = "AND")]    And,
  #[strum(serialize = "XOR")]    Xor,
  #[strum(serialize = "ADD")]    Add,
  #[strum(serialize = "SUB")]    Sub,
  #[strum(serialize = "SUBN")]   Subn,
  #[strum(serialize = "MUL")]    Mul,
  #[strum(serialize = "DIV")]    Div,
  #[strum(serialize = "SHR")]    Shr,
  #[strum(serialize = "SHL")]    Shl,
  #[strum(serialize = "BCD")]    Bcd,
  #[strum(serialize = "RND")]    Rnd,
  #[strum(serialize = "DRW")]    Drw,
  #[strum(serialize = "ASCII")]  Ascii,
  #[strum(serialize = "BYTE")]   Byte,
  #[strum(serialize = "WORD")]   Word,
  #[strum(serialize = "ALIGN")]  Align,
  #[strum(serialize = "PAD")]    Pad,
  #[strum(serialize = "BREAK")]  Break,
  #[strum(serialize = "ASSERT")] Assert,
}

impl Mnemonic {
  /// The pseudo-ops that emit raw bytes instead of an encoded word.
  pub fn is_data(&self) -> bool {
    matches!(
      self,
      Mnemonic::Ascii | Mnemonic::Byte | Mnemonic::Word | Mnemonic::Align | Mnemonic::Pad
    )
  }
}

/// One element of an encoding's operand pattern. Register and tag elements
/// match the corresponding token kinds; `Addr`/`Byte`/`Nibble` match any
/// resolved literal and name the field width it must fit.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Pat {
  Vx,
  Vy,
  V0,
  Addr,
  Byte,
  Nibble,
  I,
  Ea,
  F,
  Hf,
  K,
  Dt,
  St,
  R,
  Ascii,
}

/// Which target a row belongs to. `Base` rows always encode; the others
/// need the matching directive in the source.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Caps {
  Base,
  Super,
  Extended,
}

/// Target-capability flags configured by the SUPER and EXTENDED directives.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Target {
  pub super_chip : bool,
  pub extended   : bool,
}

impl Target {
  pub fn memory_size(&self) -> usize {
    match self.extended {
      true  => 0x10000,
      false => 0x1000,
    }
  }

  pub fn stack_depth(&self) -> usize {
    match self.extended {
      true  => 64,
      false => 16,
    }
  }

  pub fn allows(&self, caps: Caps) -> bool {
    match caps {
      Caps::Base     => true,
      Caps::Super    => self.super_chip,
      Caps::Extended => self.extended,
    }
  }
}

/// Semantic operation identifier, one per encoding row. The engine
/// dispatches on this; mnemonics alone are ambiguous (LD has eleven rows).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Op {
  Cls, Ret, Exit, Low, High, Scr, Scl, Scu, Scd, Sys, Break, Assert,
  Jp, JpV0, Call,
  SeByte, SeReg, Sgt, Slt, SneByte, SneReg,
  LdByte, LdReg, Or, And, Xor, AddByte, AddReg, Sub, Shr, Subn, Shl,
  Mul, Div, BcdPair,
  LdI, Rnd, Drw, Skp, Sknp,
  GetDelay, WaitKey, SetDelay, SetSound, AddI,
  LdFont, LdHiFont, Bcd, Save, Restore, SaveFlags, RestoreFlags, LdAscii,
}

/// One row of the instruction-set table.
pub struct IsaEntry {
  pub mask     : u16,
  pub bits     : u16,
  pub op       : Op,
  pub mnemonic : Mnemonic,
  pub operands : &'static [Pat],
  pub caps     : Caps,
}

/// The table itself, in decode-precedence order.
pub static ISA: [IsaEntry; 53] = [
  IsaEntry { mask: 0xFFFF, bits: 0x00E0, op: Op::Cls,          mnemonic: Mnemonic::Cls,    operands: &[],                              caps: Caps::Base },
  IsaEntry { mask: 0xFFFF, bits: 0x00EE, op: Op::Ret,          mnemonic: Mnemonic::Ret,    operands: &[],                              caps: Caps::Base },
  IsaEntry { mask: 0xFFFF, bits: 0x00FE, op: Op::Low,          mnemonic: Mnemonic::Low,    operands: &[],                              caps: Caps::Super },
  IsaEntry { mask: 0xFFFF, bits: 0x00FF, op: Op::High,         mnemonic: Mnemonic::High,   operands: &[],                              caps: Caps::Super },
  IsaEntry { mask: 0xFFFF, bits: 0x00FB, op: Op::Scr,          mnemonic: Mnemonic::Scr,    operands: &[],                              caps: Caps::Super },
  IsaEntry { mask: 0xFFFF, bits: 0x00FC, op: Op::Scl,          mnemonic: Mnemonic::Scl,    operands: &[],                              caps: Caps::Super },
  IsaEntry { mask: 0xFFFF, bits: 0x00FD, op: Op::Exit,         mnemonic: Mnemonic::Exit,   operands: &[],                              caps: Caps::Super },
  IsaEntry { mask: 0xFFF0, bits: 0x00B0, op: Op::Scu,          mnemonic: Mnemonic::Scu,    operands: &[Pat::Nibble],                   caps: Caps::Super },
  IsaEntry { mask: 0xFFF0, bits: 0x00C0, op: Op::Scd,          mnemonic: Mnemonic::Scd,    operands: &[Pat::Nibble],                   caps: Caps::Super },
  IsaEntry { mask: 0xFF00, bits: BREAK_BITS,  op: Op::Break,   mnemonic: Mnemonic::Break,  operands: &[Pat::Byte],                     caps: Caps::Base },
  IsaEntry { mask: 0xFF00, bits: ASSERT_BITS, op: Op::Assert,  mnemonic: Mnemonic::Assert, operands: &[Pat::Byte],                     caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x0000, op: Op::Sys,          mnemonic: Mnemonic::Sys,    operands: &[Pat::Addr],                     caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x1000, op: Op::Jp,           mnemonic: Mnemonic::Jp,     operands: &[Pat::Addr],                     caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x2000, op: Op::Call,         mnemonic: Mnemonic::Call,   operands: &[Pat::Addr],                     caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x3000, op: Op::SeByte,       mnemonic: Mnemonic::Se,     operands: &[Pat::Vx, Pat::Byte],            caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x4000, op: Op::SneByte,      mnemonic: Mnemonic::Sne,    operands: &[Pat::Vx, Pat::Byte],            caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x5000, op: Op::SeReg,        mnemonic: Mnemonic::Se,     operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x5001, op: Op::Sgt,          mnemonic: Mnemonic::Sgt,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Extended },
  IsaEntry { mask: 0xF00F, bits: 0x5002, op: Op::Slt,          mnemonic: Mnemonic::Slt,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Extended },
  IsaEntry { mask: 0xF000, bits: 0x6000, op: Op::LdByte,       mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::Byte],            caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0x7000, op: Op::AddByte,      mnemonic: Mnemonic::Add,    operands: &[Pat::Vx, Pat::Byte],            caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8000, op: Op::LdReg,        mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8001, op: Op::Or,           mnemonic: Mnemonic::Or,     operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8002, op: Op::And,          mnemonic: Mnemonic::And,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8003, op: Op::Xor,          mnemonic: Mnemonic::Xor,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8004, op: Op::AddReg,       mnemonic: Mnemonic::Add,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8005, op: Op::Sub,          mnemonic: Mnemonic::Sub,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8006, op: Op::Shr,          mnemonic: Mnemonic::Shr,    operands: &[Pat::Vx],                       caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x8007, op: Op::Subn,         mnemonic: Mnemonic::Subn,   operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x800E, op: Op::Shl,          mnemonic: Mnemonic::Shl,    operands: &[Pat::Vx],                       caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x9000, op: Op::SneReg,       mnemonic: Mnemonic::Sne,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Base },
  IsaEntry { mask: 0xF00F, bits: 0x9001, op: Op::Mul,          mnemonic: Mnemonic::Mul,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Extended },
  IsaEntry { mask: 0xF00F, bits: 0x9002, op: Op::Div,          mnemonic: Mnemonic::Div,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Extended },
  IsaEntry { mask: 0xF00F, bits: 0x9003, op: Op::BcdPair,      mnemonic: Mnemonic::Bcd,    operands: &[Pat::Vx, Pat::Vy],              caps: Caps::Extended },
  IsaEntry { mask: 0xF000, bits: 0xA000, op: Op::LdI,          mnemonic: Mnemonic::Ld,     operands: &[Pat::I, Pat::Addr],             caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0xB000, op: Op::JpV0,         mnemonic: Mnemonic::Jp,     operands: &[Pat::V0, Pat::Addr],            caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0xC000, op: Op::Rnd,          mnemonic: Mnemonic::Rnd,    operands: &[Pat::Vx, Pat::Byte],            caps: Caps::Base },
  IsaEntry { mask: 0xF000, bits: 0xD000, op: Op::Drw,          mnemonic: Mnemonic::Drw,    operands: &[Pat::Vx, Pat::Vy, Pat::Nibble], caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xE09E, op: Op::Skp,          mnemonic: Mnemonic::Skp,    operands: &[Pat::Vx],                       caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xE0A1, op: Op::Sknp,         mnemonic: Mnemonic::Sknp,   operands: &[Pat::Vx],                       caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF007, op: Op::GetDelay,     mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::Dt],              caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF00A, op: Op::WaitKey,      mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::K],               caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF015, op: Op::SetDelay,     mnemonic: Mnemonic::Ld,     operands: &[Pat::Dt, Pat::Vx],              caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF018, op: Op::SetSound,     mnemonic: Mnemonic::Ld,     operands: &[Pat::St, Pat::Vx],              caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF01E, op: Op::AddI,         mnemonic: Mnemonic::Add,    operands: &[Pat::I, Pat::Vx],               caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF029, op: Op::LdFont,       mnemonic: Mnemonic::Ld,     operands: &[Pat::F, Pat::Vx],               caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF030, op: Op::LdHiFont,     mnemonic: Mnemonic::Ld,     operands: &[Pat::Hf, Pat::Vx],              caps: Caps::Super },
  IsaEntry { mask: 0xF0FF, bits: 0xF033, op: Op::Bcd,          mnemonic: Mnemonic::Bcd,    operands: &[Pat::Vx],                       caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF055, op: Op::Save,         mnemonic: Mnemonic::Ld,     operands: &[Pat::Ea, Pat::Vx],              caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF065, op: Op::Restore,      mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::Ea],              caps: Caps::Base },
  IsaEntry { mask: 0xF0FF, bits: 0xF075, op: Op::SaveFlags,    mnemonic: Mnemonic::Ld,     operands: &[Pat::R, Pat::Vx],               caps: Caps::Super },
  IsaEntry { mask: 0xF0FF, bits: 0xF085, op: Op::RestoreFlags, mnemonic: Mnemonic::Ld,     operands: &[Pat::Vx, Pat::R],               caps: Caps::Super },
  IsaEntry { mask: 0xF0FF, bits: 0xF094, op: Op::LdAscii,      mnemonic: Mnemonic::Ld,     operands: &[Pat::Ascii, Pat::Vx],           caps: Caps::Extended },
];

lazy_static! {
  // Decode index: entries bucketed by their top nibble, table order kept.
  static ref FAMILIES: Vec<Vec<&'static IsaEntry>> = {
    let mut families: Vec<Vec<&'static IsaEntry>> = (0..16).map(|_| Vec::new()).collect();
    for entry in ISA.iter() {
      families[(entry.bits >> 12) as usize].push(entry);
    }
    families
  };

  // Encoding index: every row for a given mnemonic, table order kept.
  static ref ENCODINGS: HashMap<Mnemonic, Vec<&'static IsaEntry>> = {
    let mut map: HashMap<Mnemonic, Vec<&'static IsaEntry>> = HashMap::new();
    for entry in ISA.iter() {
      map.entry(entry.mnemonic).or_insert_with(Vec::new).push(entry);
    }
    map
  };
}

/// Decodes a fetched word to its table row, grouping by the top 4 bits and
/// then taking the first mask match. `None` means an unknown instruction.
pub fn decode(word: u16) -> Option<&'static IsaEntry> {
  FAMILIES[(word >> 12) as usize]
    .iter()
    .find(|entry| word & entry.mask == entry.bits)
    .copied()
}

/// Every encoding row for a mnemonic, in precedence order.
pub fn encodings(mnemonic: Mnemonic) -> &'static [&'static IsaEntry] {
  ENCODINGS
    .get(&mnemonic)
    .map(|entries| entries.as_slice())
    .unwrap_or(&[])
}

// Field extraction, shared by the engine and the disassembler.

pub fn x(word: u16) -> usize {
  (word >> 8 & 0xF) as usize
}

pub fn y(word: u16) -> usize {
  (word >> 4 & 0xF) as usize
}

pub fn addr(word: u16) -> u16 {
  word & 0xFFF
}

pub fn byte(word: u16) -> u8 {
  (word & 0xFF) as u8
}

pub fn nibble(word: u16) -> u8 {
  (word & 0xF) as u8
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;

  #[test]
  fn full_matches_win_over_families() {
    assert_eq!(decode(0x00E0).unwrap().op, Op::Cls);
    assert_eq!(decode(0x00EE).unwrap().op, Op::Ret);
    // Anything else in the 0 family falls through to SYS.
    assert_eq!(decode(0x0123).unwrap().op, Op::Sys);
  }

  #[test]
  fn reserved_words_decode_before_sys() {
    assert_eq!(decode(0x0E02).unwrap().op, Op::Break);
    assert_eq!(decode(0x0F10).unwrap().op, Op::Assert);
  }

  #[test]
  fn low_nibble_disambiguation() {
    assert_eq!(decode(0x5120).unwrap().op, Op::SeReg);
    assert_eq!(decode(0x5121).unwrap().op, Op::Sgt);
    assert_eq!(decode(0x5122).unwrap().op, Op::Slt);
    assert_eq!(decode(0x8AB4).unwrap().op, Op::AddReg);
    assert_eq!(decode(0x8AB5).unwrap().op, Op::Sub);
  }

  #[test]
  fn unknown_words_do_not_decode() {
    assert!(decode(0x5123).is_none());
    assert!(decode(0x8008).is_none());
    assert!(decode(0xE000).is_none());
    assert!(decode(0xF0FF).is_none());
  }

  #[test]
  fn ld_has_eleven_encodings() {
    assert_eq!(encodings(Mnemonic::Ld).len(), 11);
    assert_eq!(encodings(Mnemonic::Cls).len(), 1);
  }

  #[test]
  fn mnemonic_keyword_table() {
    assert_eq!(Mnemonic::from_str("CLS"), Ok(Mnemonic::Cls));
    assert_eq!(Mnemonic::from_str("SUBN"), Ok(Mnemonic::Subn));
    assert!(Mnemonic::from_str("NOPE").is_err());
  }

  #[test]
  fn field_extraction() {
    assert_eq!(x(0x6105), 1);
    assert_eq!(y(0x8AB4), 0xB);
    assert_eq!(addr(0x1234), 0x234);
    assert_eq!(byte(0x6105), 0x05);
    assert_eq!(nibble(0xD01F), 0xF);
  }

  #[test]
  fn target_capabilities() {
    let base = Target::default();
    assert!(base.allows(Caps::Base));
    assert!(!base.allows(Caps::Super));
    assert_eq!(base.memory_size(), 0x1000);
    assert_eq!(base.stack_depth(), 16);

    let extended = Target { super_chip: true, extended: true };
    assert!(extended.allows(Caps::Extended));
    assert_eq!(extended.memory_size(), 0x10000);
    assert_eq!(extended.stack_depth(), 64);
  }
}
