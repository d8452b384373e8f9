//! Error types for the entropy encoder.

use std::fmt;

/// Result type for encoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing a JPEG codestream.
///
/// Every variant is fatal for the encode call that produced it. Bytes already
/// handed to the sink must be discarded by the caller.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame dimensions (zero or too large).
    InvalidDimensions {
        /// Width provided
        width: u32,
        /// Height provided
        height: u32,
        /// Reason for invalidity
        reason: &'static str,
    },
    /// Invalid component description in the frame.
    InvalidComponent {
        /// Component index
        index: usize,
        /// Description of the issue
        reason: &'static str,
    },
    /// Coefficient buffer does not match the frame geometry.
    InvalidBufferSize {
        /// Expected number of blocks
        expected: usize,
        /// Actual number of blocks
        actual: usize,
    },
    /// Invalid Huffman table.
    InvalidHuffmanTable {
        /// Table index
        table_idx: u8,
        /// Description of the issue
        reason: &'static str,
    },
    /// Invalid quantization table.
    InvalidQuantTable {
        /// Table index
        table_idx: u8,
        /// Description of the issue
        reason: &'static str,
    },
    /// A component references a table that was never provided.
    MissingTable {
        /// Kind of table ("quantization", "DC Huffman", "AC Huffman")
        kind: &'static str,
        /// Table index
        index: u8,
    },
    /// Unsupported JPEG feature.
    UnsupportedFeature {
        /// Description of unsupported feature
        feature: &'static str,
    },
    /// Invalid scan script.
    InvalidScanScript(String),
    /// More AC histogram contexts than the context id space allows.
    TooManyContexts {
        /// Number of AC contexts requested
        count: usize,
        /// Maximum allowed
        limit: usize,
    },
    /// An interleaved MCU holds more blocks than a decoder has to support.
    McuTooLarge {
        /// Scan index
        scan: usize,
        /// Blocks per MCU
        blocks: usize,
        /// Maximum allowed
        limit: usize,
    },
    /// A coefficient or DC difference needs more bits than 8-bit JPEG allows.
    CoefficientOutOfRange {
        /// Scan index
        scan: usize,
        /// Frame component index
        component: usize,
    },
    /// A symbol without a Huffman code was written during a scan.
    UnhealthyBitWriter {
        /// Scan index
        scan: usize,
    },
    /// The sink stopped accepting bytes.
    OutputSuspended {
        /// Where the suspension happened
        context: &'static str,
    },
    /// Streaming encode finished before every row was supplied.
    IncompleteImage {
        /// Expected iMCU rows
        expected: usize,
        /// Rows received
        received: usize,
    },
    /// Streaming encode received more rows than the frame holds.
    TooManyRows {
        /// iMCU rows in the frame
        limit: usize,
    },
    /// I/O error reported by the sink.
    IoError {
        /// Description
        reason: String,
    },
    /// Memory allocation failed.
    AllocationFailed {
        /// Number of bytes requested
        bytes: usize,
        /// Context where allocation failed
        context: &'static str,
    },
    /// Size calculation overflowed.
    SizeOverflow {
        /// Context where overflow occurred
        context: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions {
                width,
                height,
                reason,
            } => {
                write!(f, "invalid dimensions {}x{}: {}", width, height, reason)
            }
            Self::InvalidComponent { index, reason } => {
                write!(f, "invalid component {}: {}", index, reason)
            }
            Self::InvalidBufferSize { expected, actual } => {
                write!(
                    f,
                    "invalid coefficient buffer: expected {} blocks, got {}",
                    expected, actual
                )
            }
            Self::InvalidHuffmanTable { table_idx, reason } => {
                write!(f, "invalid Huffman table {}: {}", table_idx, reason)
            }
            Self::InvalidQuantTable { table_idx, reason } => {
                write!(f, "invalid quantization table {}: {}", table_idx, reason)
            }
            Self::MissingTable { kind, index } => {
                write!(f, "missing {} table {}", kind, index)
            }
            Self::UnsupportedFeature { feature } => {
                write!(f, "unsupported feature: {}", feature)
            }
            Self::InvalidScanScript(reason) => {
                write!(f, "invalid scan script: {}", reason)
            }
            Self::TooManyContexts { count, limit } => {
                write!(
                    f,
                    "too many AC scans: {} contexts exceeds limit of {}",
                    count, limit
                )
            }
            Self::McuTooLarge {
                scan,
                blocks,
                limit,
            } => {
                write!(
                    f,
                    "MCU size too big in scan {}: {} blocks exceeds limit of {}",
                    scan, blocks, limit
                )
            }
            Self::CoefficientOutOfRange { scan, component } => {
                write!(
                    f,
                    "DCT coefficient out of range in scan {}, component {}",
                    scan, component
                )
            }
            Self::UnhealthyBitWriter { scan } => {
                write!(f, "unknown Huffman coded symbol found in scan {}", scan)
            }
            Self::OutputSuspended { context } => {
                write!(f, "output suspension is not supported in {}", context)
            }
            Self::IncompleteImage { expected, received } => {
                write!(
                    f,
                    "incomplete image: expected {} iMCU rows, got {}",
                    expected, received
                )
            }
            Self::TooManyRows { limit } => {
                write!(f, "too many rows: frame holds {} iMCU rows", limit)
            }
            Self::IoError { reason } => {
                write!(f, "I/O error: {}", reason)
            }
            Self::AllocationFailed { bytes, context } => {
                write!(f, "allocation of {} bytes failed while {}", bytes, context)
            }
            Self::SizeOverflow { context } => {
                write!(f, "size calculation overflow while {}", context)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnhealthyBitWriter { scan: 3 };
        assert_eq!(
            err.to_string(),
            "unknown Huffman coded symbol found in scan 3"
        );

        let err = Error::OutputSuspended {
            context: "finish_compress",
        };
        assert!(err.to_string().contains("finish_compress"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError { .. }));
    }
}
