//! The TinyC type lattice: four nominal types plus the size and width
//! queries the later stages need. Equality is plain `==`; the language has
//! no conversions, so there is nothing else to model.

use std::fmt;

/// Types a TinyC expression or declaration can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
  Int,
  Char,
  Void,
  CharPtr,
}

impl DataType {
  /// INT and CHAR participate in arithmetic and boolean contexts.
  pub fn is_numeric(self) -> bool {
    matches!(self, DataType::Int | DataType::Char)
  }

  /// Size of a value of this type in bytes.
  pub fn size(self) -> i64 {
    match self {
      DataType::Int => 4,
      DataType::Char => 1,
      DataType::CharPtr => 8,
      DataType::Void => 0,
    }
  }

  /// GAS mnemonic suffix for a store of this width.
  pub fn suffix(self) -> &'static str {
    match self {
      DataType::Int => "l",
      DataType::Char => "b",
      DataType::CharPtr => "q",
      DataType::Void => "l",
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DataType::Int => "int",
      DataType::Char => "char",
      DataType::Void => "void",
      DataType::CharPtr => "char*",
    };
    f.write_str(name)
  }
}
