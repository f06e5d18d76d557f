use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    Io,
    /// The save (or a catalog file) is not in the expected format.
    Format,
    /// Bytes at a recorded offset no longer hold the expected old value.
    PatchVerification,
    PatchLength,
    PatchOutOfBounds,
    NotFound,
    UnsupportedOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map a parser error: `InvalidData` and truncation are format errors,
    /// everything else stays an I/O error.
    pub fn from_io(context: &str, error: io::Error) -> Self {
        let code = match error.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => CoreErrorCode::Format,
            io::ErrorKind::Unsupported => CoreErrorCode::UnsupportedOperation,
            _ => CoreErrorCode::Io,
        };
        Self::new(code, format!("{context}: {error}"))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for CoreError {}
