/*!
  A CHIP-8 / SuperCHIP virtual machine, with an assembler for its
  label-based assembly language and a disassembler for live debugging
  views.

  The three consumers of the instruction set share one table:

  ```text
  source text -> [assembler::assemble] -> Assembly -> [VM::load_assembly] ->⋯

      ┌──────────────────[isa::ISA]──────────────────┐
  ⋯->*│*-> VM::step (decode/execute)                *│*
      │    disasm::disassemble (decode/render)      *│*->⋯
      └───────────────────────────────────────────────┘
  ```

  The host drives the machine: `step` at its own cadence (historically
  ~500 Hz), `tick` at 60 Hz for the timers, key events into the keypad
  surface, and the display buffer out to a renderer.
*/

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod assembler;
pub mod disasm;
pub mod display;
pub mod errors;
pub mod font;
pub mod isa;
pub mod vm;

pub use assembler::{assemble, Assembly};
pub use disasm::disassemble;
pub use errors::{CompileError, ExecutionError};
pub use isa::Target;
pub use vm::{State, StepResult, VM};
