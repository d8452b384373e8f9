//! Fallible allocation helpers.
//!
//! Token storage grows with image size, so every large buffer is reserved
//! through `try_reserve` and failures surface as [`Error::AllocationFailed`]
//! instead of aborting the process.

use crate::consts::JPEG_MAX_DIMENSION;
use crate::error::{Error, Result};

/// Validate frame dimensions against JPEG limits.
///
/// Checks:
/// - Neither dimension is zero
/// - Neither dimension exceeds `JPEG_MAX_DIMENSION`
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions {
            width,
            height,
            reason: "dimensions cannot be zero",
        });
    }

    if width > JPEG_MAX_DIMENSION || height > JPEG_MAX_DIMENSION {
        return Err(Error::InvalidDimensions {
            width,
            height,
            reason: "exceeds JPEG_MAX_DIMENSION (65500)",
        });
    }

    Ok(())
}

/// Calculate size for a 2D array with overflow checking.
#[inline]
pub fn checked_size_2d(dim1: usize, dim2: usize, context: &'static str) -> Result<usize> {
    dim1.checked_mul(dim2).ok_or(Error::SizeOverflow { context })
}

/// Allocate a Vec with specific capacity (no initialization).
#[inline]
pub fn try_with_capacity<T>(capacity: usize, context: &'static str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    try_reserve(&mut v, capacity, context)?;
    Ok(v)
}

/// Reserve room for `additional` more elements in `v`.
#[inline]
pub fn try_reserve<T>(v: &mut Vec<T>, additional: usize, context: &'static str) -> Result<()> {
    let byte_size = additional
        .checked_mul(std::mem::size_of::<T>())
        .ok_or(Error::SizeOverflow { context })?;

    v.try_reserve(additional)
        .map_err(|_| Error::AllocationFailed {
            bytes: byte_size,
            context,
        })
}
