//! Huffman table construction and lookup.
//!
//! This module provides:
//! - Standard JPEG Huffman tables (DC and AC for luminance and chrominance)
//! - Length-limited Huffman tree construction from symbol counts
//! - Table validation and symbol-to-code lookup for the scan encoder

use crate::consts::{HUFFMAN_ALPHABET_SIZE, HUFFMAN_MAX_BIT_LENGTH};
use crate::error::{Error, Result};

/// Standard DC luminance Huffman table (bits).
pub const STD_DC_LUMINANCE_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];

/// Standard DC luminance Huffman table (values).
pub const STD_DC_LUMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Standard DC chrominance Huffman table (bits).
pub const STD_DC_CHROMINANCE_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];

/// Standard DC chrominance Huffman table (values).
pub const STD_DC_CHROMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Standard AC luminance Huffman table (bits).
pub const STD_AC_LUMINANCE_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];

/// Standard AC luminance Huffman table (values).
pub const STD_AC_LUMINANCE_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Standard AC chrominance Huffman table (bits).
pub const STD_AC_CHROMINANCE_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];

/// Standard AC chrominance Huffman table (values).
pub const STD_AC_CHROMINANCE_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Extra bits implied by each Huffman symbol.
///
/// DC symbols and AC run/size symbols carry `size` bits; `r<<4` with
/// `0 < r < 15` is an EOB run carrying `r` bits; 0x00 and 0xF0 carry none.
#[rustfmt::skip]
pub const NUM_EXTRA_BITS: [u8; 256] = [
     0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     1, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     2, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     3, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     4, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     5, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     6, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     7, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     9, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    10, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    11, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    12, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    13, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    14, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
     0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// A Huffman table in DHT wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    /// Number of codes of each length (1-16 bits)
    pub bits: [u8; 16],
    /// Symbol values in code order
    pub values: Vec<u8>,
}

impl Default for HuffmanTable {
    fn default() -> Self {
        Self {
            bits: [0; 16],
            values: Vec::new(),
        }
    }
}

impl HuffmanTable {
    /// Creates a table from code-length counts and symbol values.
    #[must_use]
    pub fn from_bits_values(bits: &[u8; 16], values: &[u8]) -> Self {
        Self {
            bits: *bits,
            values: values.to_vec(),
        }
    }

    /// Creates the standard DC luminance table.
    #[must_use]
    pub fn std_dc_luminance() -> Self {
        Self::from_bits_values(&STD_DC_LUMINANCE_BITS, &STD_DC_LUMINANCE_VALUES)
    }

    /// Creates the standard DC chrominance table.
    #[must_use]
    pub fn std_dc_chrominance() -> Self {
        Self::from_bits_values(&STD_DC_CHROMINANCE_BITS, &STD_DC_CHROMINANCE_VALUES)
    }

    /// Creates the standard AC luminance table.
    #[must_use]
    pub fn std_ac_luminance() -> Self {
        Self::from_bits_values(&STD_AC_LUMINANCE_BITS, &STD_AC_LUMINANCE_VALUES)
    }

    /// Creates the standard AC chrominance table.
    #[must_use]
    pub fn std_ac_chrominance() -> Self {
        Self::from_bits_values(&STD_AC_CHROMINANCE_BITS, &STD_AC_CHROMINANCE_VALUES)
    }

    /// Total number of coded symbols.
    #[must_use]
    pub fn num_symbols(&self) -> usize {
        self.bits.iter().map(|&b| b as usize).sum()
    }

    /// Builds a table from per-symbol code lengths.
    ///
    /// Values are ordered by code length, then by symbol.
    #[must_use]
    pub fn from_depths(depths: &[u8]) -> Self {
        let mut bits = [0u8; 16];
        for &d in depths.iter().take(HUFFMAN_ALPHABET_SIZE) {
            if (1..=16).contains(&d) {
                bits[d as usize - 1] += 1;
            }
        }
        let mut values = Vec::with_capacity(bits.iter().map(|&b| b as usize).sum());
        for len in 1..=HUFFMAN_MAX_BIT_LENGTH as u8 {
            for (symbol, &d) in depths.iter().take(HUFFMAN_ALPHABET_SIZE).enumerate() {
                if d == len {
                    values.push(symbol as u8);
                }
            }
        }
        Self { bits, values }
    }
}

/// Checks that a Huffman table can be used for encoding.
///
/// The code lengths plus one reserved all-ones code of the maximum length
/// must exactly fill the code space, there must be one value per code, and
/// every symbol must be unique.
pub fn validate_huffman_table(table: &HuffmanTable, table_idx: u8) -> Result<()> {
    let mut total_symbols = 0usize;
    let mut total_p = 0u32;
    let mut max_depth = 0usize;
    for (i, &count) in table.bits.iter().enumerate() {
        let d = i + 1;
        if count > 0 {
            total_symbols += count as usize;
            total_p += (1u32 << (HUFFMAN_MAX_BIT_LENGTH - d)) * count as u32;
            max_depth = d;
        }
    }
    if total_symbols == 0 {
        return Err(Error::InvalidHuffmanTable {
            table_idx,
            reason: "empty Huffman table",
        });
    }
    if total_symbols > HUFFMAN_ALPHABET_SIZE {
        return Err(Error::InvalidHuffmanTable {
            table_idx,
            reason: "too many symbols in Huffman table",
        });
    }
    total_p += 1u32 << (HUFFMAN_MAX_BIT_LENGTH - max_depth);
    if total_p != 1u32 << HUFFMAN_MAX_BIT_LENGTH {
        return Err(Error::InvalidHuffmanTable {
            table_idx,
            reason: "invalid bit length distribution",
        });
    }
    if table.values.len() != total_symbols {
        return Err(Error::InvalidHuffmanTable {
            table_idx,
            reason: "number of values does not match code counts",
        });
    }
    let mut seen = [false; HUFFMAN_ALPHABET_SIZE];
    for &symbol in &table.values {
        if seen[symbol as usize] {
            return Err(Error::InvalidHuffmanTable {
                table_idx,
                reason: "duplicate symbol in Huffman table",
            });
        }
        seen[symbol as usize] = true;
    }
    Ok(())
}

/// Symbol-to-code lookup used by the scan encoder.
///
/// The extra bits implied by each symbol are folded into `depth` and `code`,
/// so a symbol and its extra bits go out as one `write_bits(depth, code | bits)`.
/// Symbols without a code have depth 0.
#[derive(Debug, Clone)]
pub struct HuffmanCodeTable {
    /// Code length plus extra bits, per symbol
    pub depth: [u8; HUFFMAN_ALPHABET_SIZE],
    /// Code shifted left by the extra bits, per symbol
    pub code: [u32; HUFFMAN_ALPHABET_SIZE],
}

impl Default for HuffmanCodeTable {
    fn default() -> Self {
        Self {
            depth: [0; HUFFMAN_ALPHABET_SIZE],
            code: [0; HUFFMAN_ALPHABET_SIZE],
        }
    }
}

impl HuffmanCodeTable {
    /// Assigns canonical codes to the symbols of `table`.
    #[must_use]
    pub fn from_table(table: &HuffmanTable) -> Self {
        let mut out = Self::default();
        let mut code: u32 = 0;
        let mut p = 0usize;
        for (length_minus_1, &count) in table.bits.iter().enumerate() {
            let length = (length_minus_1 + 1) as u8;
            for _ in 0..count {
                let Some(&symbol) = table.values.get(p) else {
                    return out;
                };
                let extra = NUM_EXTRA_BITS[symbol as usize];
                out.depth[symbol as usize] = length + extra;
                out.code[symbol as usize] = code << extra;
                code += 1;
                p += 1;
            }
            code <<= 1;
        }
        out
    }

    /// Code length of `symbol` without its extra bits, 0 if absent.
    #[inline]
    #[must_use]
    pub fn code_length(&self, symbol: u8) -> u8 {
        let depth = self.depth[symbol as usize];
        if depth == 0 {
            0
        } else {
            depth - NUM_EXTRA_BITS[symbol as usize]
        }
    }
}

/// A node in the Huffman tree.
#[derive(Clone)]
struct TreeNode {
    /// Symbol count, or the sum of both children
    weight: u64,
    /// Left child index (-1 for leaf nodes)
    left_child: i16,
    /// Right child index, or the symbol of a leaf
    right_or_symbol: i16,
}

impl TreeNode {
    const SENTINEL: Self = Self {
        weight: u64::MAX,
        left_child: -1,
        right_or_symbol: -1,
    };

    fn leaf(count: u64, symbol: i16) -> Self {
        Self {
            weight: count,
            left_child: -1,
            right_or_symbol: symbol,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left_child < 0
    }
}

/// Set depths recursively from a tree node.
fn assign_depths(tree: &[TreeNode], node_idx: usize, depth: &mut [u8], level: u8) {
    let node = &tree[node_idx];
    if node.is_leaf() {
        depth[node.right_or_symbol as usize] = level;
    } else {
        assign_depths(tree, node.left_child as usize, depth, level + 1);
        assign_depths(tree, node.right_or_symbol as usize, depth, level + 1);
    }
}

/// Builds length-limited Huffman code lengths from symbol counts.
///
/// Every used symbol gets a depth in `1..=tree_limit`. When the optimal tree
/// is too deep, small counts are raised to `count_limit - 1` and the tree is
/// rebuilt with `count_limit` doubled until it fits. A lone used symbol gets
/// depth 1.
///
/// Once every count is raised the tree is balanced and cannot get shallower,
/// so more than `2^tree_limit` used symbols cannot be coded within the limit.
///
/// # Arguments
/// * `counts` - Count of each symbol (index = symbol value, at most 32767 symbols)
/// * `tree_limit` - Maximum code length
///
/// # Returns
/// Code length for each symbol (0 = symbol not present)
#[must_use]
pub fn create_huffman_tree(counts: &[u32], tree_limit: usize) -> Vec<u8> {
    let length = counts.len();
    let mut depth = vec![0u8; length];

    let max_count = counts.iter().copied().max().unwrap_or(0) as u64;
    let mut count_limit: u64 = 1;
    loop {
        let mut tree: Vec<TreeNode> = Vec::with_capacity(2 * length + 1);

        // Reverse symbol order; the stable sort below then breaks count ties
        // toward higher symbols first.
        for i in (0..length).rev() {
            if counts[i] > 0 {
                let count = (counts[i] as u64).max(count_limit - 1);
                tree.push(TreeNode::leaf(count, i as i16));
            }
        }

        let n = tree.len();
        if n == 0 {
            return depth;
        }
        if n == 1 {
            depth[tree[0].right_or_symbol as usize] = 1;
            return depth;
        }

        tree.sort_by_key(|node| node.weight);

        // [0, n): sorted leaves, [n]: sentinel, [n + 1, 2n): parents, [2n]: sentinel
        tree.push(TreeNode::SENTINEL);
        tree.push(TreeNode::SENTINEL);

        let mut i = 0;
        let mut j = n + 1;
        for _ in 1..n {
            let left = if tree[i].weight <= tree[j].weight {
                i += 1;
                i - 1
            } else {
                j += 1;
                j - 1
            };
            let right = if tree[i].weight <= tree[j].weight {
                i += 1;
                i - 1
            } else {
                j += 1;
                j - 1
            };

            // The trailing sentinel becomes the parent.
            let j_end = tree.len() - 1;
            tree[j_end].weight = tree[left].weight + tree[right].weight;
            tree[j_end].left_child = left as i16;
            tree[j_end].right_or_symbol = right as i16;
            tree.push(TreeNode::SENTINEL);
        }

        depth.iter_mut().for_each(|d| *d = 0);
        assign_depths(&tree, 2 * n - 1, &mut depth, 0);

        let max_depth = depth.iter().copied().max().unwrap_or(0) as usize;
        if max_depth <= tree_limit {
            return depth;
        }
        if count_limit > max_count {
            debug_assert!(
                max_depth <= tree_limit,
                "{} symbols do not fit codes of {} bits",
                n,
                tree_limit
            );
            return depth;
        }
        count_limit *= 2;
    }
}
