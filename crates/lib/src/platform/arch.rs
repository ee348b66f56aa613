use std::fmt;

/// CPU architectures a target triple may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  I686,
  Armv7,
  Arm,
  Riscv64,
}

impl Arch {
  /// Detect the host CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "x86" => Some(Self::I686),
      "arm" => Some(Self::Arm),
      "riscv64" => Some(Self::Riscv64),
      _ => None,
    }
  }

  /// Parse the architecture component of a target triple
  pub fn from_triple_component(component: &str) -> Option<Self> {
    match component {
      "x86_64" => Some(Self::X86_64),
      "aarch64" | "arm64" => Some(Self::Aarch64),
      "i686" | "i586" => Some(Self::I686),
      "armv7" => Some(Self::Armv7),
      "arm" => Some(Self::Arm),
      "riscv64gc" => Some(Self::Riscv64),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::I686 => "i686",
      Self::Armv7 => "armv7",
      Self::Arm => "arm",
      Self::Riscv64 => "riscv64gc",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
