//! Lexical assembly tokens. Each kind carries only the payload it needs;
//! an `Operand` wraps exactly one inner token, marking it as having been
//! introduced by a comma.

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::isa::Mnemonic;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
  /// End of the line; carries any trailing comment text.
  End(Option<String>),
  /// An anonymous single character, used for list separators like `]`.
  Char(char),
  /// An identifier at column zero: a label definition.
  Label(DefaultAtom),
  /// An identifier anywhere else: a symbol reference.
  Id(DefaultAtom),
  /// An instruction or data pseudo-op mnemonic.
  Instruction(Mnemonic),
  /// A comma-introduced operand wrapping the token that followed it.
  Operand(Box<Token>),
  /// A general-purpose register V0-VF, carrying its index.
  V(usize),
  /// The flag-register bank.
  R,
  /// The index register.
  I,
  /// The effective address `[I]`.
  EffectiveAddress,
  /// The low-resolution font sprite pointer.
  F,
  /// The high-resolution font sprite pointer.
  Hf,
  /// The key-wait tag.
  K,
  /// The ASCII-digit sprite pointer.
  Ascii,
  /// The delay timer.
  Dt,
  /// The sound timer.
  St,
  /// A numeric literal.
  Lit(i32),
  /// Quoted text.
  Text(String),
  /// The here-pointer `*`, the current address.
  Here,
  // Directives.
  Break,
  Assert,
  Equ,
  Var,
  Super,
  Extended,
}

impl Token {
  pub fn is_end(&self) -> bool {
    matches!(self, Token::End(_))
  }
}

impl Display for Token {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Token::End(_)            => write!(f, "end of line"),
      Token::Char(c)           => write!(f, "'{}'", c),
      Token::Label(name)       => write!(f, "{}:", name),
      Token::Id(name)          => write!(f, "{}", name),
      Token::Instruction(m)    => write!(f, "{}", m),
      Token::Operand(inner)    => write!(f, ", {}", inner),
      Token::V(i)              => write!(f, "V{:X}", i),
      Token::R                 => write!(f, "R"),
      Token::I                 => write!(f, "I"),
      Token::EffectiveAddress  => write!(f, "[I]"),
      Token::F                 => write!(f, "F"),
      Token::Hf                => write!(f, "HF"),
      Token::K                 => write!(f, "K"),
      Token::Ascii             => write!(f, "A"),
      Token::Dt                => write!(f, "DT"),
      Token::St                => write!(f, "ST"),
      Token::Lit(value)        => write!(f, "#{:X}", value),
      Token::Text(text)        => write!(f, "\"{}\"", text),
      Token::Here              => write!(f, "*"),
      Token::Break             => write!(f, "BREAK"),
      Token::Assert            => write!(f, "ASSERT"),
      Token::Equ               => write!(f, "EQU"),
      Token::Var               => write!(f, "VAR"),
      Token::Super             => write!(f, "SUPER"),
      Token::Extended          => write!(f, "EXTENDED"),
    }
  }
}
