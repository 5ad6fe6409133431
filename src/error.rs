// error.rs
//
// Copyright (c) 2026  Douglas Lau
//
use std::fmt;
use std::io;

/// Errors encountered while encoding
#[derive(Debug)]
pub enum Error {
    /// A wrapped I/O error.
    Io(io::Error),
    /// Operation on a [Writer](struct.Writer.html) that was already
    /// closed.
    ClosedWriter,
    /// Palette bit depth outside of 1 to 8.
    InvalidBitDepth(u8),
    /// Frame dimensions do not match the writer, or the pixel buffer has
    /// the wrong length.
    InvalidFrameDimensions,
}

/// Giffer result type
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(fmt),
            _ => fmt::Debug::fmt(self, fmt),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
