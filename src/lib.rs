//! # jpegli-entropy - JPEG Entropy Encoder
//!
//! Turns quantized DCT coefficients into a complete JPEG codestream:
//! markers, Huffman-coded scan data, restart markers and byte stuffing.
//!
//! ## Key Features
//!
//! - **Sequential and progressive**: baseline, extended sequential and
//!   progressive frames, with built-in or caller-supplied scan scripts
//! - **Optimized Huffman codes**: per-image tables with histogram clustering
//!   into the four table slots a decoder holds at once
//! - **Restart markers**: fixed MCU intervals or whole MCU rows
//! - **Streaming**: single-scan frames can be written one iMCU row at a time
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jpegli_entropy::{ComponentCoefficients, Encoder, EncoderConfig};
//!
//! let mut plane = ComponentCoefficients::new(2, 2);
//! plane.block_mut(0, 0)[0] = 42;
//!
//! let encoder = Encoder::from_config(EncoderConfig::grayscale(16, 16)).progressive_level(2);
//! let jpeg_data = encoder.encode_to_vec(&[plane])?;
//! ```
//!
//! Coefficients are given in natural (row-major) order, already quantized
//! with the tables configured in [`EncoderConfig::quant_tables`].

// Core modules
mod alloc;
pub mod consts;
mod error;
mod types;

// Tables and scan layout
mod huffman;
mod huffman_opt;
mod scan_script;

// Encoding pipeline
mod bitstream;
mod encode;
mod entropy;
mod marker;
mod streaming;
mod tokenize;

// Public API
pub use bitstream::{BitWriter, Destination, DEFAULT_OUTPUT_BUFFER_SIZE};
pub use encode::{Encoder, EncoderConfig};
pub use entropy::ScanEncoder;
pub use error::{Error, Result};
pub use huffman::{create_huffman_tree, validate_huffman_table, HuffmanCodeTable, HuffmanTable};
pub use huffman_opt::{
    build_jpeg_huffman_table, cluster_jpeg_histograms, histogram_cost, ClusteredHistograms, Histogram,
    HuffmanPlan,
};
pub use marker::{slots_allow_baseline, MarkerWriter, ScanComponent};
pub use scan_script::{
    default_scan_script, is_progressive_script, validate_scan_script, ScanInfo, ScanKind,
};
pub use streaming::StreamingEncoder;
pub use tokenize::{
    estimate_num_tokens, max_num_tokens_per_mcu_row, tokenize_scan, RefToken, ScanLayout,
    ScanTokenInfo, ScanTokenizer, Token, TokenStore,
};
pub use types::{
    CoeffBlock, ColorSpace, ComponentCoefficients, ComponentGeometry, ComponentInfo, DensityUnit,
    FrameGeometry, JfifHeader, QuantTable, Subsampling,
};
