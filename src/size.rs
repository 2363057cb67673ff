use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Pixel dimensions of one rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1080,
        }
    }
}

#[derive(Debug, Error)]
pub enum SizeParseError {
    #[error("Invalid size format: expected WIDTHxHEIGHT (e.g., 1080x1080)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
}

impl FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return Err(SizeParseError::InvalidFormat);
        }

        let width: u32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| SizeParseError::InvalidWidth(parts[0].to_string()))?;

        let height: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| SizeParseError::InvalidHeight(parts[1].to_string()))?;

        if width == 0 {
            return Err(SizeParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(SizeParseError::ZeroHeight);
        }

        Ok(Size { width, height })
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
