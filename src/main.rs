//! Command-line driver: assemble a source file to a ROM, print a
//! disassembly listing, or run a program headless with the debugger's
//! register view. Window, audio, and keyboard plumbing belong to a real
//! frontend; this binary only exercises the load/step/disassemble
//! surfaces.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use chip8::isa::PROGRAM_BASE;
use chip8::{assemble, Assembly, StepResult, VM};

fn main() {
  if let Err(error) = run() {
    eprintln!("chip8: {}", error);
    process::exit(1);
  }
}

fn run() -> Result<(), String> {
  let mut args = env::args().skip(1);

  match args.next().as_deref() {
    Some("asm") => asm_command(args.collect()),
    Some("dis") => dis_command(args.collect()),
    Some("run") => run_command(args.collect()),
    _ => Err(usage()),
  }
}

fn usage() -> String {
  "usage: chip8 asm <source> [-o <rom>] | chip8 dis <rom> | chip8 run <file> [--steps <n>]"
    .to_string()
}

/// Assemble a source file into a raw ROM image.
fn asm_command(args: Vec<String>) -> Result<(), String> {
  let mut input: Option<PathBuf> = None;
  let mut output: Option<PathBuf> = None;

  let mut args = args.into_iter();
  while let Some(arg) = args.next() {
    if arg == "-o" || arg == "--out" {
      let path = args.next().ok_or("-o/--out requires a path".to_string())?;
      output = Some(PathBuf::from(path));
    } else if input.is_none() {
      input = Some(PathBuf::from(arg));
    } else {
      return Err(format!("unexpected argument '{}'", arg));
    }
  }

  let input = input.ok_or_else(usage)?;
  let output = output.unwrap_or_else(|| {
    let mut path = input.clone();
    path.set_extension("rom");
    path
  });

  let source = fs::read_to_string(&input)
    .map_err(|error| format!("failed to read {}: {}", input.display(), error))?;

  let assembly = assemble(&source).map_err(|error| format!("{}", error))?;

  fs::write(&output, &assembly.rom)
    .map_err(|error| format!("failed to write {}: {}", output.display(), error))?;

  println!(
    "assembled {} bytes to {}",
    assembly.rom.len(),
    output.display()
  );
  Ok(())
}

/// Print a disassembly listing of a ROM image.
fn dis_command(args: Vec<String>) -> Result<(), String> {
  let path = args.first().ok_or_else(usage)?;
  let rom =
    fs::read(path).map_err(|error| format!("failed to read {}: {}", path, error))?;

  let vm = VM::load_rom(&rom).map_err(|error| format!("{}", error))?;

  let end = PROGRAM_BASE as usize + rom.len();
  let mut address = PROGRAM_BASE as usize;
  while address < end {
    println!("{}", vm.disassemble(address as u16));
    address += 2;
  }
  Ok(())
}

/// Run a program headless for a bounded number of steps, then dump state.
fn run_command(args: Vec<String>) -> Result<(), String> {
  let mut path: Option<String> = None;
  let mut steps: usize = 1_000_000;

  let mut args = args.into_iter();
  while let Some(arg) = args.next() {
    if arg == "--steps" {
      let count = args.next().ok_or("--steps requires a count".to_string())?;
      steps = count
        .parse()
        .map_err(|_| format!("bad step count '{}'", count))?;
    } else if path.is_none() {
      path = Some(arg);
    } else {
      return Err(format!("unexpected argument '{}'", arg));
    }
  }

  let path = path.ok_or_else(usage)?;
  let mut vm = load(&path)?;

  for count in 0..steps {
    // Timers run on their own 60 Hz cadence, roughly one tick for every
    // eight instruction steps at the historical clock.
    if count % 8 == 7 {
      vm.tick();
    }
    match vm.step(false) {
      StepResult::Continued => {}
      StepResult::Paused(reason) => {
        println!("paused: {}", reason);
        break;
      }
      StepResult::Error(error) => {
        println!("error: {}", error);
        break;
      }
    }
  }

  println!("{}", vm);
  print!("{}", render(&vm));
  Ok(())
}

/// Load either assembly source or a raw ROM, by extension. A failed
/// assembly still yields a machine: the empty program is loaded and the
/// error is surfaced for display.
fn load(path: &str) -> Result<VM, String> {
  let is_source = path
    .rsplit('.')
    .next()
    .map(|ext| ext.eq_ignore_ascii_case("c8") || ext.eq_ignore_ascii_case("chip8"))
    .unwrap_or(false);

  if is_source {
    let source = fs::read_to_string(path)
      .map_err(|error| format!("failed to read {}: {}", path, error))?;
    let assembly = match assemble(&source) {
      Ok(assembly) => assembly,
      Err(error) => {
        eprintln!("{}", error);
        Assembly::empty()
      }
    };
    VM::load_assembly(&assembly).map_err(|error| format!("{}", error))
  } else {
    let rom =
      fs::read(path).map_err(|error| format!("failed to read {}: {}", path, error))?;
    VM::load_rom(&rom).map_err(|error| format!("{}", error))
  }
}

/// The display bitmap as terminal text.
fn render(vm: &VM) -> String {
  let display = vm.display();
  let mut text = String::new();
  for y in 0..display.height() {
    for x in 0..display.width() {
      text.push(if display.pixel(x, y) { '█' } else { ' ' });
    }
    text.push('\n');
  }
  text
}
