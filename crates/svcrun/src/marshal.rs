//! Payload marshalling boundary.
//!
//! The wire format belongs to the application. Call handles only need a way
//! to turn typed values into bytes and back.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    Serialize(String),
    Deserialize(String),
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(msg) => write!(f, "Serialize error: {}", msg),
            Self::Deserialize(msg) => write!(f, "Deserialize error: {}", msg),
        }
    }
}

impl std::error::Error for MarshalError {}

pub type Result<T> = std::result::Result<T, MarshalError>;

pub trait Marshaller<T>: Send + Sync + 'static {
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Passes bytes through untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct Raw;

impl Marshaller<Vec<u8>> for Raw {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 text.
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf8;

impl Marshaller<String> for Utf8 {
    fn serialize(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| MarshalError::Deserialize(e.to_string()))
    }
}
