// Copyright 2022 Oxide Computer Company

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// The underlying reader or writer failed.
    Io(io::Error),

    /// A table frame ended mid-entry: the header promised more entries
    /// than the stream contains.
    Truncated { expected: usize, read: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Truncated { expected, read } => {
                write!(
                    f,
                    "incomplete routing table: header promised {} \
                     entries, stream held {}",
                    expected, read
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Truncated { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
