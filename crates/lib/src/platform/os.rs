use std::fmt;

/// Operating system families that carry a binary naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the host operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Classify a full target triple by its vendor/os/abi components.
  ///
  /// `*-windows-*` is Windows regardless of ABI, `*-apple-darwin` is macOS and
  /// `*-linux-*` is Linux regardless of vendor or libc.
  pub fn from_triple(triple: &str) -> Option<Self> {
    let rest: Vec<&str> = triple.split('-').skip(1).collect();
    if rest.contains(&"windows") {
      Some(Self::Windows)
    } else if rest.ends_with(&["apple", "darwin"]) {
      Some(Self::MacOs)
    } else if rest.contains(&"linux") {
      Some(Self::Linux)
    } else {
      None
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
