//! Fixed-width PCM sample encodings
//!
//! Each encoding carries its element width and the full-scale magnitude
//! used to map raw values into the normalized `[-1.0, 1.0]` range.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Supported PCM sample encodings
///
/// Textual names (TOML, CLI, environment) are parsed case-insensitively;
/// anything outside this set is rejected with [`Error::UnsupportedEncoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum SampleEncoding {
    /// 8-bit signed integer, full scale 128
    I8,
    /// 16-bit signed integer, full scale 32768
    #[default]
    I16,
    /// 32-bit signed integer, full scale 2147483648
    I32,
    /// 32-bit IEEE float, already normalized
    F32,
}

impl SampleEncoding {
    /// All supported encodings
    pub const ALL: [SampleEncoding; 4] = [
        SampleEncoding::I8,
        SampleEncoding::I16,
        SampleEncoding::I32,
        SampleEncoding::F32,
    ];

    /// Size of one sample in bytes
    pub const fn width(&self) -> usize {
        match self {
            SampleEncoding::I8 => 1,
            SampleEncoding::I16 => 2,
            SampleEncoding::I32 | SampleEncoding::F32 => 4,
        }
    }

    /// Divisor that maps a raw sample value onto [-1.0, 1.0]
    pub const fn full_scale(&self) -> f32 {
        match self {
            SampleEncoding::I8 => 128.0,
            SampleEncoding::I16 => 32768.0,
            SampleEncoding::I32 => 2147483648.0,
            SampleEncoding::F32 => 1.0,
        }
    }

    /// Canonical lowercase name
    pub const fn as_str(&self) -> &'static str {
        match self {
            SampleEncoding::I8 => "i8",
            SampleEncoding::I16 => "i16",
            SampleEncoding::I32 => "i32",
            SampleEncoding::F32 => "f32",
        }
    }

    /// Number of whole samples in `byte_len` bytes
    ///
    /// # Errors
    /// [`Error::MalformedChunk`] when `byte_len` is not a multiple of the width.
    pub fn sample_count(&self, byte_len: usize) -> Result<usize> {
        let width = self.width();
        if byte_len % width != 0 {
            return Err(Error::MalformedChunk {
                len: byte_len,
                width,
            });
        }
        Ok(byte_len / width)
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i8" | "s8" | "int8" => Ok(SampleEncoding::I8),
            "i16" | "s16" | "int16" => Ok(SampleEncoding::I16),
            "i32" | "s32" | "int32" => Ok(SampleEncoding::I32),
            "f32" | "float32" => Ok(SampleEncoding::F32),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for SampleEncoding {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_i16() {
        assert_eq!(SampleEncoding::default(), SampleEncoding::I16);
    }

    #[test]
    fn test_widths_and_full_scale() {
        assert_eq!(SampleEncoding::I8.width(), 1);
        assert_eq!(SampleEncoding::I16.width(), 2);
        assert_eq!(SampleEncoding::I32.width(), 4);
        assert_eq!(SampleEncoding::F32.width(), 4);

        assert_eq!(SampleEncoding::I8.full_scale(), 128.0);
        assert_eq!(SampleEncoding::I16.full_scale(), 32768.0);
        assert_eq!(SampleEncoding::I32.full_scale(), 2147483648.0);
        assert_eq!(SampleEncoding::F32.full_scale(), 1.0);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("i8".parse::<SampleEncoding>().unwrap(), SampleEncoding::I8);
        assert_eq!("Int16".parse::<SampleEncoding>().unwrap(), SampleEncoding::I16);
        assert_eq!(" S32 ".parse::<SampleEncoding>().unwrap(), SampleEncoding::I32);
        assert_eq!("FLOAT32".parse::<SampleEncoding>().unwrap(), SampleEncoding::F32);

        for encoding in SampleEncoding::ALL {
            assert_eq!(encoding.to_string().parse::<SampleEncoding>().unwrap(), encoding);
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "u24".parse::<SampleEncoding>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(ref name) if name == "u24"));
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(SampleEncoding::I16.sample_count(0).unwrap(), 0);
        assert_eq!(SampleEncoding::I16.sample_count(8).unwrap(), 4);
        assert_eq!(SampleEncoding::I8.sample_count(3).unwrap(), 3);

        let err = SampleEncoding::I32.sample_count(6).unwrap_err();
        assert!(matches!(err, Error::MalformedChunk { len: 6, width: 4 }));
    }
}
