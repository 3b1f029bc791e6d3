//! The token scanner. One scanner is created per source line; `scan_token`
//! classifies and returns one token per call, and `scan_operands` collects
//! a comma-separated list. All failures surface as compile errors carrying
//! the offending fragment.

use std::str::FromStr;

use string_cache::DefaultAtom;

use crate::errors::{CompileError, CompileErrorKind};
use crate::isa::Mnemonic;
use super::cursor::Cursor;
use super::token::Token;

pub struct TokenScanner<'a> {
  cursor : Cursor<'a>,
  line   : usize,
}

impl<'a> TokenScanner<'a> {
  pub fn new(text: &'a str, line: usize) -> TokenScanner<'a> {
    TokenScanner { cursor: Cursor::new(text), line }
  }

  fn err(&self, kind: CompileErrorKind, text: impl Into<String>) -> CompileError {
    CompileError::new(kind, self.line, text)
  }

  /// Reads the next token, advancing past whitespace first.
  pub fn scan_token(&mut self) -> Result<Token, CompileError> {
    while let Some(c) = self.cursor.peek() {
      if c > ' ' {
        break;
      }
      self.cursor.bump();
    }

    match self.cursor.peek() {
      None => Ok(Token::End(None)),
      Some(';') => Ok(self.scan_to_end()),
      Some('[') => self.scan_effective_address(),
      Some(',') => self.scan_operand(),
      Some('#') => self.scan_hex(),
      Some('%') => self.scan_bin(),
      Some(c) if c == '-' || c.is_ascii_digit() => self.scan_dec(),
      Some(c) if c.is_ascii_uppercase() => Ok(self.scan_identifier()),
      Some(c) if c == '"' || c == '\'' || c == '`' => self.scan_text(c),
      Some(_) => Ok(self.scan_char()),
    }
  }

  /// Scan a list of comma-separated tokens. Every token after the first
  /// must arrive wrapped as an operand continuation.
  pub fn scan_operands(&mut self) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::with_capacity(3);

    let mut token = self.scan_token()?;
    while !token.is_end() {
      tokens.push(token);

      token = match self.scan_token()? {
        Token::Operand(inner) => *inner,
        end @ Token::End(_)   => end,
        other                 => {
          return Err(self.err(CompileErrorKind::MalformedOperands, format!("{}", other)));
        }
      };
    }

    Ok(tokens)
  }

  /// Consume the rest of the line as a comment.
  fn scan_to_end(&mut self) -> Token {
    self.cursor.bump(); // the ';'
    let text = self.cursor.rest().trim().to_string();
    self.cursor.take_while(|_| true);
    match text.is_empty() {
      true  => Token::End(None),
      false => Token::End(Some(text)),
    }
  }

  /// A comma introduces exactly one operand token.
  fn scan_operand(&mut self) -> Result<Token, CompileError> {
    self.cursor.bump(); // the ','

    let token = self.scan_token()?;
    if token.is_end() {
      return Err(self.err(CompileErrorKind::MissingOperand, ","));
    }

    Ok(Token::Operand(Box::new(token)))
  }

  /// The only legal bracketed expression is `[I]`.
  fn scan_effective_address(&mut self) -> Result<Token, CompileError> {
    let start = self.cursor.pos();
    self.cursor.bump(); // the '['

    if self.scan_token()? != Token::I {
      return Err(self.err(CompileErrorKind::IllegalIndirection, self.cursor.slice(start)));
    }
    if self.scan_token()? != Token::Char(']') {
      return Err(self.err(CompileErrorKind::IllegalIndirection, self.cursor.slice(start)));
    }

    Ok(Token::EffectiveAddress)
  }

  /// Classify an identifier via the fixed keyword table: registers first,
  /// then directives, then the mnemonic set, and finally label definitions
  /// (column zero) or bare references.
  fn scan_identifier(&mut self) -> Token {
    let start = self.cursor.pos();
    let id = self
      .cursor
      .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

    if let Some(index) = register_index(id) {
      return Token::V(index);
    }

    match id {
      "R"        => Token::R,
      "I"        => Token::I,
      "F"        => Token::F,
      "HF"       => Token::Hf,
      "K"        => Token::K,
      "A"        => Token::Ascii,
      "D" | "DT" => Token::Dt,
      "S" | "ST" => Token::St,
      "BREAK"    => Token::Break,
      "ASSERT"   => Token::Assert,
      "EQU"      => Token::Equ,
      "VAR"      => Token::Var,
      "SUPER"    => Token::Super,
      "EXTENDED" => Token::Extended,
      _ => {
        if let Ok(mnemonic) = Mnemonic::from_str(id) {
          return Token::Instruction(mnemonic);
        }
        match start == 0 {
          true  => Token::Label(DefaultAtom::from(id)),
          false => Token::Id(DefaultAtom::from(id)),
        }
      }
    }
  }

  /// Scan a decimal literal, optionally signed.
  fn scan_dec(&mut self) -> Result<Token, CompileError> {
    let start = self.cursor.pos();
    if self.cursor.peek() == Some('-') {
      self.cursor.bump();
    }
    self.cursor.take_while(|c| c.is_ascii_digit());

    let text = self.cursor.slice(start);
    match text.parse::<i32>() {
      Ok(value) => Ok(Token::Lit(value)),
      Err(_)    => Err(self.err(CompileErrorKind::BadLiteral, text)),
    }
  }

  /// Scan a `#`-prefixed hexadecimal literal. Digits are uppercase only.
  fn scan_hex(&mut self) -> Result<Token, CompileError> {
    let start = self.cursor.pos();
    self.cursor.bump(); // the '#'
    let digits = self
      .cursor
      .take_while(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));

    match i32::from_str_radix(digits, 16) {
      Ok(value) => Ok(Token::Lit(value)),
      Err(_)    => Err(self.err(CompileErrorKind::BadLiteral, self.cursor.slice(start))),
    }
  }

  /// Scan a `%`-prefixed binary literal; `.` is a zero placeholder.
  fn scan_bin(&mut self) -> Result<Token, CompileError> {
    let start = self.cursor.pos();
    self.cursor.bump(); // the '%'
    let digits = self.cursor.take_while(|c| c == '.' || c == '0' || c == '1');

    let normalized = digits.replace('.', "0");
    match i32::from_str_radix(&normalized, 2) {
      Ok(value) => Ok(Token::Lit(value)),
      Err(_)    => Err(self.err(CompileErrorKind::BadLiteral, self.cursor.slice(start))),
    }
  }

  /// Scan raw text delimited by a matching quote character.
  fn scan_text(&mut self, term: char) -> Result<Token, CompileError> {
    let start = self.cursor.pos();
    self.cursor.bump(); // the opening quote

    let text = self.cursor.take_while(|c| c != term).to_string();
    if self.cursor.is_empty() {
      return Err(self.err(CompileErrorKind::UnterminatedText, self.cursor.slice(start)));
    }
    self.cursor.bump(); // the terminator

    Ok(Token::Text(text))
  }

  /// Anything else is a single-character token; `*` is the here-pointer.
  fn scan_char(&mut self) -> Token {
    match self.cursor.bump() {
      Some('*') => Token::Here,
      Some(c)   => Token::Char(c),
      None      => Token::End(None),
    }
  }
}

/// V0-VF map to general-register tokens carrying their index.
fn register_index(id: &str) -> Option<usize> {
  let mut chars = id.chars();
  match (chars.next(), chars.next(), chars.next()) {
    (Some('V'), Some(digit), None) => digit.to_digit(16).map(|d| d as usize),
    _                              => None,
  }
}
