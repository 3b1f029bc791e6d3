/*!
  The execution engine. One `VM` owns its memory, registers, timers, call
  stack, display, keypad state, and random source; nothing is shared, so a
  host may run any number of independent machines.

  The engine is cooperatively stepped: `step` fetches, decodes, and
  executes at most one instruction and returns immediately in every state.
  Timer decrement lives on the separate `tick` operation because real
  hardware runs the timers at a fixed 60 Hz regardless of instruction
  speed.
*/

use std::fmt;

use prettytable::{format as TableFormat, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::assembler::{Assembly, Assertion};
use crate::disasm;
use crate::display::Display;
use crate::errors::ExecutionError;
use crate::font::{self, FONT, FONT_BASE, FONT_HI, FONT_HI_BASE};
use crate::isa::{self, Op, Target, PROGRAM_BASE};

/// The engine's state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum State {
  Running,
  Paused,
  /// Waiting on LD Vx,K. `seen` is the pressed set observed so far; only a
  /// key transitioning into it resumes execution.
  AwaitingKey { vx: usize, seen: [bool; 16] },
  Halted,
}

/// What one `step` call produced.
#[derive(Clone, Debug, PartialEq)]
pub enum StepResult {
  Continued,
  Paused(String),
  Error(ExecutionError),
}

pub struct VM {
  // Memory stores
  memory  : Vec<u8>,
  program : Vec<u8>, // pristine image, kept for reset()

  // Registers
  v     : [u8; 16],
  i     : u16,
  pc    : u16,
  dt    : u8,
  st    : u8,
  r     : [u8; 8],
  stack : Vec<u16>,

  // Peripherals
  display : Display,
  keys    : [bool; 16],

  // Control
  state       : State,
  halt_reason : String,
  target      : Target,
  breakpoints : Vec<String>,
  asserts     : Vec<Assertion>,
  rng         : StdRng,
}

impl VM {

  // region Construction and loading

  pub fn new(target: Target) -> VM {
    let mut vm = VM {
      memory      : vec![0; target.memory_size()],
      program     : Vec::new(),
      v           : [0; 16],
      i           : 0,
      pc          : PROGRAM_BASE,
      dt          : 0,
      st          : 0,
      r           : [0; 8],
      stack       : Vec::with_capacity(target.stack_depth()),
      display     : Display::new(),
      keys        : [false; 16],
      state       : State::Running,
      halt_reason : String::new(),
      target,
      breakpoints : Vec::new(),
      asserts     : Vec::new(),
      rng         : StdRng::from_entropy(),
    };
    vm.load_fonts();
    vm
  }

  /// Builds a machine from raw, already-assembled program bytes.
  pub fn load_rom(rom: &[u8]) -> Result<VM, ExecutionError> {
    let mut vm = VM::new(Target::default());
    vm.install(rom)?;
    Ok(vm)
  }

  /// Builds a machine from an assembly, installing its byte image and the
  /// breakpoint/assertion sidecars.
  pub fn load_assembly(assembly: &Assembly) -> Result<VM, ExecutionError> {
    let mut vm = VM::new(assembly.target);
    vm.install(&assembly.rom)?;
    vm.breakpoints = assembly.breakpoints.clone();
    vm.asserts = assembly.asserts.clone();
    Ok(vm)
  }

  fn install(&mut self, rom: &[u8]) -> Result<(), ExecutionError> {
    let base = PROGRAM_BASE as usize;
    let end = base + rom.len();
    if end > self.memory.len() {
      return Err(ExecutionError::AddressOutOfRange(end));
    }
    self.memory[base..end].copy_from_slice(rom);
    self.program = rom.to_vec();
    Ok(())
  }

  fn load_fonts(&mut self) {
    self.memory[FONT_BASE..FONT_BASE + FONT.len()].copy_from_slice(&FONT);
    self.memory[FONT_HI_BASE..FONT_HI_BASE + FONT_HI.len()].copy_from_slice(&FONT_HI);
  }

  /// Back to power-on state with the same program image.
  pub fn reset(&mut self) {
    self.memory = vec![0; self.target.memory_size()];
    self.load_fonts();
    let base = PROGRAM_BASE as usize;
    self.memory[base..base + self.program.len()].copy_from_slice(&self.program);

    self.v = [0; 16];
    self.i = 0;
    self.pc = PROGRAM_BASE;
    self.dt = 0;
    self.st = 0;
    self.r = [0; 8];
    self.stack.clear();
    self.display = Display::new();
    self.keys = [false; 16];
    self.state = State::Running;
    self.halt_reason.clear();
  }

  // endregion

  // region External surfaces

  /// Executes at most one instruction. With `suspend` set the engine
  /// performs no fetch at all and reports Paused.
  pub fn step(&mut self, suspend: bool) -> StepResult {
    if suspend {
      if let State::Running = self.state {
        self.state = State::Paused;
      }
      return StepResult::Paused("suspended".to_string());
    }

    match self.state.clone() {
      State::Halted => StepResult::Paused(self.halt_reason.clone()),

      State::AwaitingKey { vx, mut seen } => {
        for key in 0..16 {
          if !self.keys[key] {
            seen[key] = false;
          } else if !seen[key] {
            self.v[vx] = key as u8;
            self.state = State::Running;
            return StepResult::Continued;
          }
        }
        self.state = State::AwaitingKey { vx, seen };
        StepResult::Continued
      }

      _ => {
        self.state = State::Running;
        self.execute_next()
      }
    }
  }

  /// The 60 Hz timer tick, driven separately from instruction execution.
  pub fn tick(&mut self) {
    self.dt = self.dt.saturating_sub(1);
    self.st = self.st.saturating_sub(1);
  }

  pub fn key_down(&mut self, key: usize) {
    if key < 16 {
      self.keys[key] = true;
    }
  }

  pub fn key_up(&mut self, key: usize) {
    if key < 16 {
      self.keys[key] = false;
    }
  }

  pub fn display(&self) -> &Display {
    &self.display
  }

  /// True while the sound timer is nonzero; the host plays a tone.
  pub fn sound_active(&self) -> bool {
    self.st > 0
  }

  pub fn state(&self) -> &State {
    &self.state
  }

  pub fn pc(&self) -> u16 {
    self.pc
  }

  pub fn index(&self) -> u16 {
    self.i
  }

  pub fn registers(&self) -> &[u8; 16] {
    &self.v
  }

  pub fn delay_timer(&self) -> u8 {
    self.dt
  }

  pub fn sound_timer(&self) -> u8 {
    self.st
  }

  pub fn memory(&self) -> &[u8] {
    &self.memory
  }

  pub fn disassemble(&self, address: u16) -> String {
    disasm::disassemble(&self.memory, address)
  }

  /// Reseed the random source, for deterministic replay.
  pub fn seed_random(&mut self, seed: u64) {
    self.rng = StdRng::seed_from_u64(seed);
  }

  // endregion

  // region Fetch/decode/execute

  fn execute_next(&mut self) -> StepResult {
    #[cfg(feature = "trace_execution")]
    println!("{}", disasm::disassemble(&self.memory, self.pc));

    let word = match self.fetch() {
      Ok(word) => word,
      Err(e)   => return self.halt_with(e),
    };
    self.pc = self.pc.wrapping_add(2);

    match self.execute(word) {
      Ok(None) => StepResult::Continued,

      Ok(Some(reason)) => {
        if !matches!(self.state, State::Halted) {
          self.state = State::Paused;
        }
        StepResult::Paused(reason)
      }

      Err(e) => match e.is_fatal() {
        true  => self.halt_with(e),
        false => StepResult::Error(e),
      },
    }
  }

  fn fetch(&self) -> Result<u16, ExecutionError> {
    let pc = self.pc as usize;
    if pc + 1 >= self.memory.len() {
      return Err(ExecutionError::AddressOutOfRange(pc));
    }
    Ok((self.memory[pc] as u16) << 8 | self.memory[pc + 1] as u16)
  }

  fn halt_with(&mut self, e: ExecutionError) -> StepResult {
    self.state = State::Halted;
    self.halt_reason = format!("{}", e);
    StepResult::Error(e)
  }

  /// Applies one decoded instruction. Returns a pause reason for
  /// breakpoints and failed assertions.
  fn execute(&mut self, word: u16) -> Result<Option<String>, ExecutionError> {
    let entry = isa::decode(word).ok_or(ExecutionError::UnknownInstruction(word))?;

    let x = isa::x(word);
    let y = isa::y(word);
    let nnn = isa::addr(word);
    let nn = isa::byte(word);
    let n = isa::nibble(word);

    match entry.op {

      Op::Cls => self.display.clear(),
      Op::Low => self.display.set_high(false),
      Op::High => self.display.set_high(true),
      Op::Scr => self.display.scroll_right(4),
      Op::Scl => self.display.scroll_left(4),
      Op::Scu => self.display.scroll_up(n as usize),
      Op::Scd => self.display.scroll_down(n as usize),

      Op::Sys => {} // historical machine-code call; nothing to do

      Op::Exit => {
        self.state = State::Halted;
        self.halt_reason = "program exited".to_string();
        return Ok(Some(self.halt_reason.clone()));
      }

      Op::Break => {
        let reason = self
          .breakpoints
          .get(nn as usize)
          .cloned()
          .unwrap_or_else(|| "breakpoint".to_string());
        return Ok(Some(reason));
      }

      Op::Assert => {
        if let Some(assertion) = self.asserts.get(nn as usize) {
          if !assertion.holds(&self.v) {
            return Ok(Some(assertion.text.clone()));
          }
        }
      }

      Op::Jp => self.pc = nnn,
      Op::JpV0 => self.pc = nnn.wrapping_add(self.v[0] as u16),

      Op::Call => {
        if self.stack.len() >= self.target.stack_depth() {
          return Err(ExecutionError::StackOverflow);
        }
        self.stack.push(self.pc);
        self.pc = nnn;
      }

      Op::Ret => {
        self.pc = self.stack.pop().ok_or(ExecutionError::StackUnderflow)?;
      }

      Op::SeByte => {
        if self.v[x] == nn {
          self.skip();
        }
      }
      Op::SneByte => {
        if self.v[x] != nn {
          self.skip();
        }
      }
      Op::SeReg => {
        if self.v[x] == self.v[y] {
          self.skip();
        }
      }
      Op::SneReg => {
        if self.v[x] != self.v[y] {
          self.skip();
        }
      }
      Op::Sgt => {
        if self.v[x] > self.v[y] {
          self.skip();
        }
      }
      Op::Slt => {
        if self.v[x] < self.v[y] {
          self.skip();
        }
      }
      Op::Skp => {
        if self.key(self.v[x]) {
          self.skip();
        }
      }
      Op::Sknp => {
        if !self.key(self.v[x]) {
          self.skip();
        }
      }

      Op::LdByte => self.v[x] = nn,
      Op::LdReg => self.v[x] = self.v[y],

      // 7XNN carries no flag; only the register form does.
      Op::AddByte => self.v[x] = self.v[x].wrapping_add(nn),

      Op::Or => self.v[x] |= self.v[y],
      Op::And => self.v[x] &= self.v[y],
      Op::Xor => self.v[x] ^= self.v[y],

      Op::AddReg => {
        let (sum, carry) = self.v[x].overflowing_add(self.v[y]);
        self.v[x] = sum;
        self.v[0xF] = carry as u8;
      }

      Op::Sub => {
        let no_borrow = (self.v[x] >= self.v[y]) as u8;
        self.v[x] = self.v[x].wrapping_sub(self.v[y]);
        self.v[0xF] = no_borrow;
      }

      Op::Subn => {
        let no_borrow = (self.v[y] >= self.v[x]) as u8;
        self.v[x] = self.v[y].wrapping_sub(self.v[x]);
        self.v[0xF] = no_borrow;
      }

      Op::Shr => {
        let out = self.v[x] & 1;
        self.v[x] >>= 1;
        self.v[0xF] = out;
      }

      Op::Shl => {
        let out = self.v[x] >> 7;
        self.v[x] <<= 1;
        self.v[0xF] = out;
      }

      Op::Mul => {
        let product = self.v[x] as u16 * self.v[y] as u16;
        self.v[x] = (product & 0xFF) as u8;
        self.v[0xF] = (product >> 8) as u8;
      }

      Op::Div => {
        if self.v[y] == 0 {
          return Err(ExecutionError::DivisionByZero);
        }
        let remainder = self.v[x] % self.v[y];
        self.v[x] /= self.v[y];
        self.v[0xF] = remainder;
      }

      Op::Bcd => {
        let i = self.i as usize;
        self.check_run(i, 3)?;
        let value = self.v[x];
        self.memory[i] = value / 100;
        self.memory[i + 1] = value / 10 % 10;
        self.memory[i + 2] = value % 10;
      }

      Op::BcdPair => {
        let i = self.i as usize;
        self.check_run(i, 5)?;
        let value = (self.v[x] as u32) << 8 | self.v[y] as u32;
        for (offset, divisor) in [10000u32, 1000, 100, 10, 1].iter().enumerate() {
          self.memory[i + offset] = (value / divisor % 10) as u8;
        }
      }

      Op::LdI => self.i = nnn,
      Op::AddI => self.i = self.i.wrapping_add(self.v[x] as u16),

      Op::Rnd => {
        let value: u8 = self.rng.gen();
        self.v[x] = value & nn;
      }

      Op::Drw => self.draw(x, y, n)?,

      Op::GetDelay => self.v[x] = self.dt,
      Op::SetDelay => self.dt = self.v[x],
      Op::SetSound => self.st = self.v[x],

      Op::WaitKey => {
        self.state = State::AwaitingKey { vx: x, seen: self.keys };
      }

      Op::LdFont => self.i = font::glyph_address(self.v[x]) as u16,
      Op::LdHiFont => self.i = font::hi_glyph_address(self.v[x]) as u16,
      Op::LdAscii => self.i = font::ascii_glyph_address(self.v[x]) as u16,

      Op::Save => {
        let i = self.i as usize;
        self.check_run(i, x + 1)?;
        for offset in 0..=x {
          self.memory[i + offset] = self.v[offset];
        }
      }

      Op::Restore => {
        let i = self.i as usize;
        self.check_run(i, x + 1)?;
        for offset in 0..=x {
          self.v[offset] = self.memory[i + offset];
        }
      }

      Op::SaveFlags => {
        for offset in 0..=x.min(7) {
          self.r[offset] = self.v[offset];
        }
      }

      Op::RestoreFlags => {
        for offset in 0..=x.min(7) {
          self.v[offset] = self.r[offset];
        }
      }

    }

    Ok(None)
  }

  fn skip(&mut self) {
    self.pc = self.pc.wrapping_add(2);
  }

  fn key(&self, value: u8) -> bool {
    self.keys[(value & 0xF) as usize]
  }

  /// Verifies that `[address, address + length)` lies inside memory, so an
  /// instruction either fully applies or applies nothing.
  fn check_run(&self, address: usize, length: usize) -> Result<(), ExecutionError> {
    if address + length > self.memory.len() {
      return Err(ExecutionError::AddressOutOfRange(address + length - 1));
    }
    Ok(())
  }

  fn draw(&mut self, x: usize, y: usize, n: u8) -> Result<(), ExecutionError> {
    let px = self.v[x] as usize;
    let py = self.v[y] as usize;
    let i = self.i as usize;

    if n == 0 && self.target.super_chip {
      self.check_run(i, 32)?;
      let sprite = self.memory[i..i + 32].to_vec();
      self.v[0xF] = self.display.blit_wide(px, py, &sprite);
    } else {
      self.check_run(i, n as usize)?;
      let sprite = self.memory[i..i + n as usize].to_vec();
      self.v[0xF] = self.display.blit(px, py, &sprite);
    }

    Ok(())
  }

  // endregion

}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl fmt::Display for VM {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    table.add_row(row![r->"PC =", self.disassemble(self.pc)]);
    table.add_row(row![r->"I =", format!("#{:04X}", self.i)]);
    table.add_row(row![r->"DT =", format!("#{:02X}", self.dt)]);
    table.add_row(row![r->"ST =", format!("#{:02X}", self.st)]);

    for (index, value) in self.v.iter().enumerate() {
      table.add_row(row![r->format!("V{:X} =", index), format!("#{:02X}", value)]);
    }

    let stack = self
      .stack
      .iter()
      .map(|address| format!("#{:04X}", address))
      .collect::<Vec<String>>()
      .join(" ");
    table.add_row(row![r->"Stack =", stack]);

    write!(f, "{}", table)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::assemble;
  use crate::errors::ExecutionError;

  fn vm_with(words: &[u16]) -> VM {
    let mut rom = Vec::new();
    for word in words {
      rom.push((word >> 8) as u8);
      rom.push((word & 0xFF) as u8);
    }
    VM::load_rom(&rom).unwrap()
  }

  fn vm_from(source: &str) -> VM {
    let assembly = assemble(source).unwrap();
    VM::load_assembly(&assembly).unwrap()
  }

  fn run(vm: &mut VM, steps: usize) {
    for _ in 0..steps {
      assert_eq!(vm.step(false), StepResult::Continued);
    }
  }

  #[test]
  fn power_on_defaults() {
    let vm = VM::new(Target::default());
    assert_eq!(vm.pc(), 0x200);
    assert_eq!(vm.registers(), &[0; 16]);
    assert_eq!(&vm.memory()[FONT_BASE..FONT_BASE + 5], &FONT[..5]);
    assert_eq!(*vm.state(), State::Running);
  }

  #[test]
  fn add_with_carry() {
    let mut vm = vm_from("LD V0, #FA\nLD V1, #0A\nADD V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 4);
    assert_eq!(vm.registers()[0xF], 1);
  }

  #[test]
  fn add_without_carry() {
    let mut vm = vm_from("LD V0, #05\nLD V1, #0A\nADD V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 15);
    assert_eq!(vm.registers()[0xF], 0);
  }

  #[test]
  fn add_byte_leaves_flag_alone() {
    let mut vm = vm_from("LD V8, #F0\nLD VF, #0A\nADD V8, #11");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[8], 0x01);
    assert_eq!(vm.registers()[0xF], 0x0A);
  }

  #[test]
  fn sub_flag_polarity() {
    // SUB sets the flag to 1 when no borrow occurred (Vx >= Vy).
    let mut vm = vm_from("LD V0, #0A\nLD V1, #03\nSUB V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 7);
    assert_eq!(vm.registers()[0xF], 1);

    let mut vm = vm_from("LD V0, #03\nLD V1, #0A\nSUB V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 0xF9);
    assert_eq!(vm.registers()[0xF], 0);
  }

  #[test]
  fn subn_flag_polarity() {
    // SUBN computes Vy - Vx and sets the flag when Vy >= Vx.
    let mut vm = vm_from("LD V0, #03\nLD V1, #0A\nSUBN V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 7);
    assert_eq!(vm.registers()[0xF], 1);
  }

  #[test]
  fn shifts_capture_the_outgoing_bit() {
    let mut vm = vm_from("LD V2, #05\nSHR V2");
    run(&mut vm, 2);
    assert_eq!(vm.registers()[2], 2);
    assert_eq!(vm.registers()[0xF], 1);

    let mut vm = vm_from("LD V2, #81\nSHL V2");
    run(&mut vm, 2);
    assert_eq!(vm.registers()[2], 2);
    assert_eq!(vm.registers()[0xF], 1);
  }

  #[test]
  fn logic_ops() {
    let mut vm = vm_from("LD V0, #F0\nLD V1, #0F\nOR V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 0xFF);

    let mut vm = vm_from("LD V0, #F3\nLD V1, #0F\nAND V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 0x03);

    let mut vm = vm_from("LD V0, #FF\nLD V1, #0F\nXOR V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 0xF0);
  }

  #[test]
  fn mul_keeps_the_high_byte_in_the_flag() {
    let mut vm = vm_from("EXTENDED\nLD V0, #40\nLD V1, #08\nMUL V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 0x00);
    assert_eq!(vm.registers()[0xF], 0x02);
  }

  #[test]
  fn div_keeps_the_remainder_in_the_flag() {
    let mut vm = vm_from("EXTENDED\nLD V0, #17\nLD V1, #05\nDIV V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.registers()[0], 4);
    assert_eq!(vm.registers()[0xF], 3);
  }

  #[test]
  fn division_by_zero_recovers_in_place() {
    let mut vm = vm_from("EXTENDED\nLD V0, #17\nLD V1, #00\nDIV V0, V1\nLD V2, #01");
    run(&mut vm, 2);
    assert_eq!(
      vm.step(false),
      StepResult::Error(ExecutionError::DivisionByZero)
    );
    assert_eq!(vm.registers()[0], 0x17);
    assert_eq!(vm.registers()[1], 0x00);
    assert_eq!(*vm.state(), State::Running);
    // Execution continues past the faulting instruction.
    assert_eq!(vm.step(false), StepResult::Continued);
    assert_eq!(vm.registers()[2], 1);
  }

  #[test]
  fn bcd_forms() {
    let mut vm = vm_from("LD V0, #FE\nLD I, #0400\nBCD V0");
    run(&mut vm, 3);
    assert_eq!(&vm.memory()[0x400..0x403], &[2, 5, 4]);

    let mut vm = vm_from("EXTENDED\nLD V0, #30\nLD V1, #39\nLD I, #0400\nBCD V0, V1");
    run(&mut vm, 4);
    // 0x3039 == 12345
    assert_eq!(&vm.memory()[0x400..0x405], &[1, 2, 3, 4, 5]);
  }

  #[test]
  fn conditional_skips() {
    let mut vm = vm_from("LD V0, #05\nSE V0, #05\nCLS\nRET");
    run(&mut vm, 2);
    assert_eq!(vm.pc(), 0x206);

    let mut vm = vm_from("LD V0, #05\nSNE V0, #05\nCLS");
    run(&mut vm, 2);
    assert_eq!(vm.pc(), 0x204);

    let mut vm = vm_from("EXTENDED\nLD V0, #05\nLD V1, #03\nSGT V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.pc(), 0x208);

    let mut vm = vm_from("EXTENDED\nLD V0, #05\nLD V1, #03\nSLT V0, V1");
    run(&mut vm, 3);
    assert_eq!(vm.pc(), 0x206);
  }

  #[test]
  fn call_and_ret() {
    let mut vm = vm_from("CALL SUBR\nCLS\nSUBR: RET");
    run(&mut vm, 1);
    assert_eq!(vm.pc(), 0x204);
    run(&mut vm, 1);
    assert_eq!(vm.pc(), 0x202);
  }

  #[test]
  fn jp_v0_offsets_the_target() {
    let mut vm = vm_from("LD V0, #04\nJP V0, #0200");
    run(&mut vm, 2);
    assert_eq!(vm.pc(), 0x204);
  }

  #[test]
  fn stack_overflow_on_the_seventeenth_call() {
    // Eighteen nested calls; the 17th must fault on a 16-deep stack.
    let words: Vec<u16> = (0..18)
      .map(|k| 0x2000 | (0x202 + 2 * k as u16))
      .collect();
    let mut vm = vm_with(&words);
    run(&mut vm, 16);
    assert_eq!(
      vm.step(false),
      StepResult::Error(ExecutionError::StackOverflow)
    );
    assert_eq!(*vm.state(), State::Halted);
  }

  #[test]
  fn stack_underflow_on_bare_ret() {
    let mut vm = vm_from("RET");
    assert_eq!(
      vm.step(false),
      StepResult::Error(ExecutionError::StackUnderflow)
    );
    assert_eq!(*vm.state(), State::Halted);
  }

  #[test]
  fn unknown_instruction_is_fatal() {
    let mut vm = vm_with(&[0x5123]);
    assert_eq!(
      vm.step(false),
      StepResult::Error(ExecutionError::UnknownInstruction(0x5123))
    );
    assert_eq!(*vm.state(), State::Halted);
    // A halted machine mutates nothing further.
    assert_eq!(vm.step(false), StepResult::Paused("unknown instruction #5123".to_string()));
  }

  #[test]
  fn fetch_out_of_range_is_fatal() {
    let mut vm = vm_from("JP #0FFF");
    run(&mut vm, 1);
    assert_eq!(
      vm.step(false),
      StepResult::Error(ExecutionError::AddressOutOfRange(0xFFF))
    );
  }

  #[test]
  fn restore_out_of_range_is_fatal() {
    let mut vm = vm_from("LD I, #0FFF\nLD V1, [I]");
    run(&mut vm, 1);
    assert!(matches!(
      vm.step(false),
      StepResult::Error(ExecutionError::AddressOutOfRange(_))
    ));
  }

  #[test]
  fn timers_load_and_tick() {
    let mut vm = vm_from("LD V0, #02\nLD DT, V0\nLD ST, V0\nLD V1, DT");
    run(&mut vm, 4);
    assert_eq!(vm.registers()[1], 2);
    assert!(vm.sound_active());
    vm.tick();
    assert_eq!(vm.delay_timer(), 1);
    vm.tick();
    vm.tick();
    assert_eq!(vm.delay_timer(), 0);
    assert_eq!(vm.sound_timer(), 0);
    assert!(!vm.sound_active());
  }

  #[test]
  fn font_pointers() {
    let mut vm = vm_from("LD V0, #0A\nLD F, V0");
    run(&mut vm, 2);
    assert_eq!(vm.index(), 10 * 5);

    let mut vm = vm_from("SUPER\nLD V0, #01\nLD HF, V0");
    run(&mut vm, 2);
    assert_eq!(vm.index(), (FONT_HI_BASE + 10) as u16);

    // ASCII digit characters map onto the hex font.
    let mut vm = vm_from("EXTENDED\nLD V0, #41\nLD A, V0");
    run(&mut vm, 2);
    assert_eq!(vm.index(), 10 * 5);
  }

  #[test]
  fn save_and_restore_memory() {
    let source = "LD V0, #11\nLD V1, #22\nLD I, #0400\nLD [I], V1\nLD V0, #00\nLD V0, [I]";
    let mut vm = vm_from(source);
    run(&mut vm, 4);
    assert_eq!(&vm.memory()[0x400..0x402], &[0x11, 0x22]);
    run(&mut vm, 2);
    assert_eq!(vm.registers()[0], 0x11);
    // I is left where it was.
    assert_eq!(vm.index(), 0x400);
  }

  #[test]
  fn save_and_restore_flag_bank() {
    let mut vm = vm_from("SUPER\nLD V0, #0A\nLD V1, #0B\nLD R, V1\nLD V0, #00\nLD V1, #00\nLD V1, R");
    run(&mut vm, 6);
    assert_eq!(vm.registers()[0], 0x0A);
    assert_eq!(vm.registers()[1], 0x0B);
  }

  #[test]
  fn rnd_masks_the_random_byte() {
    let mut vm = vm_from("RND V0, #00\nRND V1, #0F");
    run(&mut vm, 2);
    assert_eq!(vm.registers()[0], 0);
    assert!(vm.registers()[1] <= 0x0F);
  }

  #[test]
  fn rnd_is_deterministic_under_a_seed() {
    let mut first = vm_from("RND V0, #FF");
    let mut second = vm_from("RND V0, #FF");
    first.seed_random(7);
    second.seed_random(7);
    run(&mut first, 1);
    run(&mut second, 1);
    assert_eq!(first.registers()[0], second.registers()[0]);
  }

  #[test]
  fn draw_sets_the_collision_flag() {
    let source = "LD V0, #00\nLD V1, #00\nLD I, #0000\nDRW V0, V1, 5\nDRW V0, V1, 5";
    let mut vm = vm_from(source);
    run(&mut vm, 4);
    // The zero glyph was drawn once; no collision yet.
    assert_eq!(vm.registers()[0xF], 0);
    assert!(vm.display().pixel(0, 0));
    run(&mut vm, 1);
    // Drawing it again erases every pixel and reports the collision.
    assert_eq!(vm.registers()[0xF], 1);
    assert!(!vm.display().pixel(0, 0));
  }

  #[test]
  fn draw_wraps_at_the_edges() {
    let source = "LD V0, #3E\nLD V1, #00\nLD I, #0000\nDRW V0, V1, 1";
    let mut vm = vm_from(source);
    run(&mut vm, 4);
    // Glyph row 0xF0 drawn at x=62 wraps onto the left edge.
    assert!(vm.display().pixel(62, 0));
    assert!(vm.display().pixel(63, 0));
    assert!(vm.display().pixel(0, 0));
    assert!(vm.display().pixel(1, 0));
    assert!(!vm.display().pixel(2, 0));
  }

  #[test]
  fn resolution_modes() {
    let mut vm = vm_from("SUPER\nHIGH\nLOW");
    run(&mut vm, 1);
    assert!(vm.display().is_high());
    run(&mut vm, 1);
    assert!(!vm.display().is_high());
  }

  #[test]
  fn key_skips() {
    let mut vm = vm_from("LD V0, #03\nSKP V0\nCLS\nRET");
    vm.key_down(3);
    run(&mut vm, 2);
    assert_eq!(vm.pc(), 0x206);

    let mut vm = vm_from("LD V0, #03\nSKNP V0\nCLS\nRET");
    run(&mut vm, 2);
    assert_eq!(vm.pc(), 0x206);
  }

  #[test]
  fn wait_key_needs_a_fresh_press() {
    let mut vm = vm_from("LD V5, K\nCLS");
    // Key 3 is already held when the wait begins.
    vm.key_down(3);
    run(&mut vm, 1);
    assert!(matches!(vm.state(), State::AwaitingKey { vx: 5, .. }));
    // Still held: the wait does not resume.
    run(&mut vm, 1);
    assert!(matches!(vm.state(), State::AwaitingKey { .. }));
    // Release and press again: the transition resumes execution.
    vm.key_up(3);
    run(&mut vm, 1);
    vm.key_down(3);
    run(&mut vm, 1);
    assert_eq!(*vm.state(), State::Running);
    assert_eq!(vm.registers()[5], 3);
    // The next step executes the next instruction normally.
    run(&mut vm, 1);
    assert_eq!(vm.pc(), 0x204);
  }

  #[test]
  fn break_pauses_and_paused_step_mutates_nothing() {
    let mut vm = vm_from("BREAK ; stop here\nCLS");
    assert_eq!(vm.step(false), StepResult::Paused("stop here".to_string()));
    assert_eq!(*vm.state(), State::Paused);
    let pc = vm.pc();

    // A suspended step performs no further state mutation.
    assert_eq!(vm.step(true), StepResult::Paused("suspended".to_string()));
    assert_eq!(vm.pc(), pc);

    // The caller resumes by stepping without suspension.
    assert_eq!(vm.step(false), StepResult::Continued);
    assert_eq!(vm.pc(), pc + 2);
  }

  #[test]
  fn asserts_pause_only_when_false() {
    let mut vm = vm_from("LD V1, #05\nASSERT V1, #05\nASSERT V1, #06\nCLS");
    run(&mut vm, 2);
    assert_eq!(*vm.state(), State::Running);
    assert_eq!(
      vm.step(false),
      StepResult::Paused("ASSERT V1, #06".to_string())
    );
    assert_eq!(*vm.state(), State::Paused);
    // Diagnostic, not fatal: execution resumes past it.
    assert_eq!(vm.step(false), StepResult::Continued);
  }

  #[test]
  fn exit_halts() {
    let mut vm = vm_from("SUPER\nEXIT\nCLS");
    assert_eq!(
      vm.step(false),
      StepResult::Paused("program exited".to_string())
    );
    assert_eq!(*vm.state(), State::Halted);
    let pc = vm.pc();
    assert_eq!(
      vm.step(false),
      StepResult::Paused("program exited".to_string())
    );
    assert_eq!(vm.pc(), pc);
  }

  #[test]
  fn suspension_blocks_the_fetch() {
    let mut vm = vm_from("CLS\nCLS");
    assert_eq!(vm.step(true), StepResult::Paused("suspended".to_string()));
    assert_eq!(vm.pc(), 0x200);
    assert_eq!(*vm.state(), State::Paused);
    assert_eq!(vm.step(false), StepResult::Continued);
    assert_eq!(vm.pc(), 0x202);
  }

  #[test]
  fn program_too_large_to_load() {
    let rom = vec![0u8; 0x1000];
    assert!(matches!(
      VM::load_rom(&rom),
      Err(ExecutionError::AddressOutOfRange(_))
    ));
  }

  #[test]
  fn reset_restores_power_on_state() {
    let mut vm = vm_from("LD V0, #05\nLD DT, V0\nCALL SUBR\nSUBR: RET");
    run(&mut vm, 3);
    vm.reset();
    assert_eq!(vm.pc(), 0x200);
    assert_eq!(vm.registers()[0], 0);
    assert_eq!(vm.delay_timer(), 0);
    assert_eq!(*vm.state(), State::Running);
    // The program image survives the reset.
    run(&mut vm, 1);
    assert_eq!(vm.registers()[0], 5);
  }

  #[test]
  fn extended_target_widens_memory_and_stack() {
    let assembly = assemble("EXTENDED\nLD I, #0FFF\nLD [I], V0").unwrap();
    let mut vm = VM::load_assembly(&assembly).unwrap();
    assert_eq!(vm.memory().len(), 0x10000);
    run(&mut vm, 2);
    assert_eq!(*vm.state(), State::Running);
  }
}
