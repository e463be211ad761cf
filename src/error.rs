use std::{error, fmt, io};

use crate::cluster::ClusterId;

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by nimbus.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    ParameterError(String),
    SoundBufferError(String),
    SceneFormatError { line: usize, message: String },
    ClusterNotFoundError(ClusterId),
    SendError(String),
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SoundBufferError(str) => write!(f, "Invalid sound buffer: {str}"),
            Self::SceneFormatError { line, message } => {
                write!(f, "Malformed scene file at line {line}: {message}")
            }
            Self::ClusterNotFoundError(id) => write!(f, "Grain cluster with id {id} not found"),
            Self::SendError(str) => write!(f, "Failed to send cluster message: {str}"),
            Self::OutputDeviceError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
