//! PCM format normalization
//!
//! Converts raw fixed-width PCM into normalized `f32` samples in `[-1.0, 1.0]`.
//!
//! Raw bytes are reinterpreted in native byte order as the configured
//! encoding's element type. No byte swapping or resampling happens here; the
//! producer is responsible for supplying bytes already laid out for the
//! encoding.

use pcmflow_common::{Error, Result, SampleEncoding};

/// Normalize a chunk of raw PCM bytes
///
/// Output has one `f32` per input sample. A zero-length chunk yields an
/// empty vector.
///
/// # Errors
/// [`Error::MalformedChunk`] if `raw.len()` is not a multiple of the encoding
/// width. The whole chunk is rejected.
pub fn normalize(raw: &[u8], encoding: SampleEncoding) -> Result<Vec<f32>> {
    let count = encoding.sample_count(raw.len())?;
    let scale = encoding.full_scale();
    let mut out = Vec::with_capacity(count);

    match encoding {
        SampleEncoding::I8 => {
            out.extend(raw.iter().map(|&b| i8::from_ne_bytes([b]) as f32 / scale));
        }
        SampleEncoding::I16 => {
            out.extend(
                raw.chunks_exact(2)
                    .map(|c| i16::from_ne_bytes([c[0], c[1]]) as f32 / scale),
            );
        }
        SampleEncoding::I32 => {
            out.extend(
                raw.chunks_exact(4)
                    .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f32 / scale),
            );
        }
        SampleEncoding::F32 => {
            out.extend(
                raw.chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]) / scale),
            );
        }
    }

    Ok(out)
}

/// A native sample type bound to one [`SampleEncoding`]
pub trait PcmSample: Copy + Send + Sync + 'static {
    /// Encoding this type represents
    const ENCODING: SampleEncoding;

    /// Normalized value of this sample
    fn normalized(self) -> f32;
}

impl PcmSample for i8 {
    const ENCODING: SampleEncoding = SampleEncoding::I8;

    fn normalized(self) -> f32 {
        self as f32 / Self::ENCODING.full_scale()
    }
}

impl PcmSample for i16 {
    const ENCODING: SampleEncoding = SampleEncoding::I16;

    fn normalized(self) -> f32 {
        self as f32 / Self::ENCODING.full_scale()
    }
}

impl PcmSample for i32 {
    const ENCODING: SampleEncoding = SampleEncoding::I32;

    fn normalized(self) -> f32 {
        self as f32 / Self::ENCODING.full_scale()
    }
}

impl PcmSample for f32 {
    const ENCODING: SampleEncoding = SampleEncoding::F32;

    fn normalized(self) -> f32 {
        self
    }
}

/// Normalize typed samples for a player configured with `expected`
///
/// # Errors
/// [`Error::EncodingMismatch`] when `T` does not match `expected`.
pub fn normalize_samples<T: PcmSample>(
    samples: &[T],
    expected: SampleEncoding,
) -> Result<Vec<f32>> {
    if T::ENCODING != expected {
        return Err(Error::EncodingMismatch {
            expected,
            actual: T::ENCODING,
        });
    }
    Ok(samples.iter().map(|s| s.normalized()).collect())
}
