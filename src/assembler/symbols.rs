//! The symbol table: label ⇄ address bindings plus EQU/VAR constant
//! bindings. Names are unique across both maps; a second binding of any
//! name is rejected. The bimap lets debug listings look labels up by
//! address as well.

use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

#[derive(Debug)]
pub struct SymbolTable {
  labels    : BiMap<DefaultAtom, u16>,
  constants : HashMap<DefaultAtom, i32>,
}

impl SymbolTable {
  pub fn new() -> SymbolTable {
    SymbolTable {
      labels    : BiMap::new(),
      constants : HashMap::new(),
    }
  }

  /// Binds a label to an address. Returns false if the name is taken.
  pub fn bind_label(&mut self, name: &DefaultAtom, address: u16) -> bool {
    if self.constants.contains_key(name) {
      return false;
    }
    self.labels.insert_no_overwrite(name.clone(), address).is_ok()
  }

  /// Binds an EQU value or VAR address. Returns false if the name is taken.
  pub fn bind_constant(&mut self, name: &DefaultAtom, value: i32) -> bool {
    if self.labels.contains_left(name) || self.constants.contains_key(name) {
      return false;
    }
    self.constants.insert(name.clone(), value);
    true
  }

  /// Resolves a name to its value: constants first, then label addresses.
  pub fn resolve(&self, name: &DefaultAtom) -> Option<i32> {
    self
      .constants
      .get(name)
      .copied()
      .or_else(|| self.labels.get_by_left(name).map(|address| *address as i32))
  }

  /// The label bound at an address, if any.
  pub fn label_at(&self, address: u16) -> Option<&DefaultAtom> {
    self.labels.get_by_right(&address)
  }
}
