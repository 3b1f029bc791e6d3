//! The disassembler: a pure function from an address and the memory bytes
//! to mnemonic text, driven by the same ISA table the engine decodes with.
//! Rendering is informational only; a word that matches nothing renders a
//! sentinel, never an error.

use crate::isa::{self, IsaEntry, Pat};

/// Disassemble the instruction at `address`.
///
/// An address with fewer than two remaining bytes renders as an empty
/// string; an all-zero word renders as an end marker; an unmatched word
/// renders as `??`.
pub fn disassemble(memory: &[u8], address: u16) -> String {
  let i = address as usize;
  if i + 1 >= memory.len() {
    return String::new();
  }

  let word = (memory[i] as u16) << 8 | memory[i + 1] as u16;
  if word == 0 {
    return format!("{:04X} -", i);
  }

  match isa::decode(word) {
    Some(entry) => format!("{:04X} - {}", i, render(entry, word)),
    None        => format!("{:04X} - ??", i),
  }
}

fn render(entry: &IsaEntry, word: u16) -> String {
  let mnemonic: &'static str = entry.mnemonic.into();
  if entry.operands.is_empty() {
    return mnemonic.to_string();
  }

  let operands = entry
    .operands
    .iter()
    .map(|pat| operand_text(*pat, word))
    .collect::<Vec<String>>()
    .join(", ");

  format!("{:<6} {}", mnemonic, operands)
}

fn operand_text(pat: Pat, word: u16) -> String {
  match pat {
    Pat::Vx     => format!("V{:X}", isa::x(word)),
    Pat::Vy     => format!("V{:X}", isa::y(word)),
    Pat::V0     => "V0".to_string(),
    Pat::Addr   => format!("#{:04X}", isa::addr(word)),
    Pat::Byte   => format!("#{:02X}", isa::byte(word)),
    Pat::Nibble => format!("{}", isa::nibble(word)),
    Pat::I      => "I".to_string(),
    Pat::Ea     => "[I]".to_string(),
    Pat::F      => "F".to_string(),
    Pat::Hf     => "HF".to_string(),
    Pat::K      => "K".to_string(),
    Pat::Dt     => "DT".to_string(),
    Pat::St     => "ST".to_string(),
    Pat::R      => "R".to_string(),
    Pat::Ascii  => "A".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn memory_with(address: usize, words: &[u16]) -> Vec<u8> {
    let mut memory = vec![0u8; 0x1000];
    for (offset, word) in words.iter().enumerate() {
      memory[address + offset * 2] = (word >> 8) as u8;
      memory[address + offset * 2 + 1] = (word & 0xFF) as u8;
    }
    memory
  }

  #[test]
  fn nullary_and_literal_forms() {
    let memory = memory_with(0x200, &[0x00E0, 0x6105, 0x1234]);
    assert_eq!(disassemble(&memory, 0x200), "0200 - CLS");
    assert_eq!(disassemble(&memory, 0x202), "0202 - LD     V1, #05");
    assert_eq!(disassemble(&memory, 0x204), "0204 - JP     #0234");
  }

  #[test]
  fn register_forms() {
    let memory = memory_with(0x200, &[0x8AB4, 0x8306, 0xD01F, 0x00C4]);
    assert_eq!(disassemble(&memory, 0x200), "0200 - ADD    VA, VB");
    assert_eq!(disassemble(&memory, 0x202), "0202 - SHR    V3");
    assert_eq!(disassemble(&memory, 0x204), "0204 - DRW    V0, V1, 15");
    assert_eq!(disassemble(&memory, 0x206), "0206 - SCD    4");
  }

  #[test]
  fn special_register_forms() {
    let memory = memory_with(0x200, &[0xA300, 0xF555, 0xF565, 0xF394, 0xB300]);
    assert_eq!(disassemble(&memory, 0x200), "0200 - LD     I, #0300");
    assert_eq!(disassemble(&memory, 0x202), "0202 - LD     [I], V5");
    assert_eq!(disassemble(&memory, 0x204), "0204 - LD     V5, [I]");
    assert_eq!(disassemble(&memory, 0x206), "0206 - LD     A, V3");
    assert_eq!(disassemble(&memory, 0x208), "0208 - JP     V0, #0300");
  }

  #[test]
  fn end_marker_and_sentinel() {
    let memory = memory_with(0x200, &[0x0000, 0x5123]);
    assert_eq!(disassemble(&memory, 0x200), "0200 -");
    assert_eq!(disassemble(&memory, 0x202), "0202 - ??");
  }

  #[test]
  fn out_of_range_is_empty() {
    let memory = vec![0u8; 0x1000];
    assert_eq!(disassemble(&memory, 0xFFF), "");
    assert_eq!(disassemble(&memory, 0xFFE), "0FFE -");
  }

  #[test]
  fn reserved_words_render() {
    let memory = memory_with(0x200, &[0x0E01, 0x0F02]);
    assert_eq!(disassemble(&memory, 0x200), "0200 - BREAK  #01");
    assert_eq!(disassemble(&memory, 0x202), "0202 - ASSERT #02");
  }
}
