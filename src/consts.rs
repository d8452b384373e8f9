//! JPEG constants used by the entropy coder and marker writer.

/// DCT block dimension (8x8)
pub const DCT_SIZE: usize = 8;

/// DCT block size (64 coefficients)
pub const DCT_BLOCK_SIZE: usize = 64;

/// Maximum number of color components in a frame
pub const MAX_COMPONENTS: usize = 4;

/// Maximum number of components in a single scan
pub const MAX_COMPS_IN_SCAN: usize = 4;

/// Maximum number of quantization tables
pub const MAX_QUANT_TABLES: usize = 4;

/// Number of Huffman table slots per class (DC or AC)
pub const NUM_HUFFMAN_SLOTS: usize = 4;

/// Maximum sampling factor
pub const MAX_SAMP_FACTOR: u8 = 4;

/// Maximum number of blocks in an interleaved MCU
pub const MAX_BLOCKS_IN_MCU: usize = 10;

/// JPEG sample precision (8 bits)
pub const JPEG_PRECISION: u8 = 8;

/// Maximum image dimension accepted by the encoder
pub const JPEG_MAX_DIMENSION: u32 = 65500;

/// Maximum Huffman code bit length
pub const HUFFMAN_MAX_BIT_LENGTH: usize = 16;

/// Huffman alphabet size
pub const HUFFMAN_ALPHABET_SIZE: usize = 256;

/// Histogram size: the alphabet plus one sentinel bin
pub const HISTOGRAM_SIZE: usize = HUFFMAN_ALPHABET_SIZE + 1;

/// Number of histogram contexts reserved for DC coding
pub const NUM_DC_CONTEXTS: usize = 4;

/// Maximum number of AC histogram contexts
pub const MAX_AC_CONTEXTS: usize = 252;

/// Highest successive-approximation bit position accepted in a scan script
pub const MAX_REFINEMENT_BIT: u8 = 10;

/// Largest size category of an AC coefficient at 8-bit precision
pub const MAX_COEF_BITS: u32 = 10;

/// Largest size category of a DC difference at 8-bit precision
pub const MAX_DC_DIFF_BITS: u32 = MAX_COEF_BITS + 1;

/// Longest EOB run representable by one token (EOB14 with 14 extra bits)
pub const MAX_EOB_RUN: u32 = 0x7FFF;

/// Refinement bits one coalesced EOB token may carry
pub const MAX_EOB_REFBITS: u32 = 255;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start of Image marker
pub const MARKER_SOI: u8 = 0xD8;
/// End of Image marker
pub const MARKER_EOI: u8 = 0xD9;
/// Start of Frame (Baseline)
pub const MARKER_SOF0: u8 = 0xC0;
/// Start of Frame (Extended Sequential)
pub const MARKER_SOF1: u8 = 0xC1;
/// Start of Frame (Progressive)
pub const MARKER_SOF2: u8 = 0xC2;
/// Define Huffman Table
pub const MARKER_DHT: u8 = 0xC4;
/// Define Quantization Table
pub const MARKER_DQT: u8 = 0xDB;
/// Define Restart Interval
pub const MARKER_DRI: u8 = 0xDD;
/// Start of Scan
pub const MARKER_SOS: u8 = 0xDA;
/// Restart marker base (0-7)
pub const MARKER_RST0: u8 = 0xD0;
/// Application marker 0 (JFIF)
pub const MARKER_APP0: u8 = 0xE0;
/// Application marker 14 (Adobe)
pub const MARKER_APP14: u8 = 0xEE;

// =============================================================================
// Zigzag Order Tables
// =============================================================================

/// JPEG natural order (zigzag to linear).
/// Maps zigzag index to linear 8x8 block index.
/// Extra entries (64-79) are set to 63 so that a decoder overrunning the
/// block on corrupt input stays in bounds.
#[rustfmt::skip]
pub const JPEG_NATURAL_ORDER: [u8; 80] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
    63, 63, 63, 63, 63, 63, 63, 63,
    63, 63, 63, 63, 63, 63, 63, 63,
];

/// JPEG zigzag order (linear to zigzag).
/// Maps linear 8x8 block index to zigzag index.
#[rustfmt::skip]
pub const JPEG_ZIGZAG_ORDER: [u8; 64] = [
     0,  1,  5,  6, 14, 15, 27, 28,
     2,  4,  7, 13, 16, 26, 29, 42,
     3,  8, 12, 17, 25, 30, 41, 43,
     9, 11, 18, 24, 31, 40, 44, 53,
    10, 19, 23, 32, 39, 45, 52, 54,
    20, 22, 33, 38, 46, 51, 55, 60,
    21, 34, 37, 47, 50, 56, 59, 61,
    35, 36, 48, 49, 57, 58, 62, 63,
];
