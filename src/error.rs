use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// `Error` provides an enumeration of all possible errors reported by hexop.
#[derive(Debug)]
pub enum Error {
    /// An out-of-range or otherwise invalid patch or engine parameter.
    ParameterError(String),
    /// A malformed plain-text patch file.
    PatchFormatError(String),
    /// A malformed SysEx voice frame (bad header constants or checksum mismatch).
    SysexError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::PatchFormatError(str) => write!(f, "Invalid patch file: {str}"),
            Self::SysexError(str) => write!(f, "Invalid SysEx frame: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
