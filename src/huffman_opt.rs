//! Huffman table selection: histogram clustering and explicit tables.
//!
//! Tokens are counted per histogram context. DC contexts `0..num_components`
//! and AC contexts `4..` are clustered separately into at most four live
//! slots each; a slot evicted by a newer table is re-sent with a DHT marker
//! right before the scan that first needs the newer table.
//!
//! The result is a [`HuffmanPlan`]: the tables in DHT order, their slot ids,
//! and a map from histogram context to table.

use crate::consts::{
    HISTOGRAM_SIZE, HUFFMAN_ALPHABET_SIZE, HUFFMAN_MAX_BIT_LENGTH, NUM_DC_CONTEXTS,
    NUM_HUFFMAN_SLOTS,
};
use crate::error::{Error, Result};
use crate::huffman::{create_huffman_tree, validate_huffman_table, HuffmanCodeTable, HuffmanTable};
use crate::scan_script::ScanInfo;
use crate::types::ComponentInfo;

/// Symbol counts of one histogram context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    /// Count per symbol
    pub counts: [u32; HUFFMAN_ALPHABET_SIZE],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// Creates an empty histogram.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [0; HUFFMAN_ALPHABET_SIZE],
        }
    }

    /// Counts one occurrence of `symbol`.
    #[inline]
    pub fn count(&mut self, symbol: u8) {
        let c = &mut self.counts[symbol as usize];
        *c = c.saturating_add(1);
    }

    /// True if no symbol was counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Adds another histogram's counts to this one.
    pub fn add(&mut self, other: &Histogram) {
        for (a, &b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a = a.saturating_add(b);
        }
    }

    /// Returns the sum of two histograms.
    #[must_use]
    pub fn combined(&self, other: &Histogram) -> Histogram {
        let mut result = self.clone();
        result.add(other);
        result
    }

    /// Code lengths for the counts plus the reserved sentinel symbol.
    fn depths(&self) -> Vec<u8> {
        let mut counts = [0u32; HISTOGRAM_SIZE];
        counts[..HUFFMAN_ALPHABET_SIZE].copy_from_slice(&self.counts);
        counts[HUFFMAN_ALPHABET_SIZE] = 1;
        create_huffman_tree(&counts, HUFFMAN_MAX_BIT_LENGTH)
    }
}

/// Estimated size in bits of a DHT entry plus the data coded with it.
///
/// The header is the slot byte and 16 length counts, then one byte per
/// used symbol.
#[must_use]
pub fn histogram_cost(histogram: &Histogram) -> i64 {
    let depths = histogram.depths();
    let mut header_bits = ((1 + HUFFMAN_MAX_BIT_LENGTH) * 8) as i64;
    let mut data_bits = 0i64;
    for (&count, &depth) in histogram.counts.iter().zip(depths.iter()) {
        if depth > 0 {
            header_bits += 8;
            data_bits += count as i64 * depth as i64;
        }
    }
    header_bits + data_bits
}

/// Output of [`cluster_jpeg_histograms`].
#[derive(Clone, Debug, Default)]
pub struct ClusteredHistograms {
    /// One merged histogram per emitted table
    pub histograms: Vec<Histogram>,
    /// Table index for each input histogram (0 for empty inputs)
    pub histogram_indexes: Vec<usize>,
    /// Slot (0-3) of each emitted table
    pub slot_ids: Vec<u8>,
}

/// Greedily groups histograms into tables sharing at most four slots.
///
/// Each non-empty histogram either starts a new table or merges into a live
/// slot, whichever adds fewer estimated bits. With all four slots live, a new
/// table evicts the slot after the one used by the previous new table.
#[must_use]
pub fn cluster_jpeg_histograms(histograms: &[Histogram]) -> ClusteredHistograms {
    let mut clusters = ClusteredHistograms {
        histogram_indexes: vec![0; histograms.len()],
        ..Default::default()
    };
    let mut slot_histograms: Vec<usize> = Vec::with_capacity(NUM_HUFFMAN_SLOTS);
    let mut slot_costs: Vec<i64> = Vec::with_capacity(NUM_HUFFMAN_SLOTS);

    for (i, cur) in histograms.iter().enumerate() {
        if cur.is_empty() {
            continue;
        }
        let mut best_cost = histogram_cost(cur);
        let mut best_slot = slot_histograms.len();
        for (j, &prev_idx) in slot_histograms.iter().enumerate() {
            let combined = clusters.histograms[prev_idx].combined(cur);
            let cost = histogram_cost(&combined) - slot_costs[j];
            if cost < best_cost {
                best_cost = cost;
                best_slot = j;
            }
        }

        if best_slot == slot_histograms.len() {
            let histogram_index = clusters.histograms.len();
            clusters.histograms.push(cur.clone());
            clusters.histogram_indexes[i] = histogram_index;
            if best_slot < NUM_HUFFMAN_SLOTS {
                slot_histograms.push(histogram_index);
                slot_costs.push(best_cost);
            } else {
                let last = clusters.slot_ids.last().copied().unwrap_or(0) as usize;
                best_slot = (last + 1) % NUM_HUFFMAN_SLOTS;
                log::trace!("histogram {} evicts slot {}", i, best_slot);
            }
            slot_histograms[best_slot] = histogram_index;
            slot_costs[best_slot] = best_cost;
            clusters.slot_ids.push(best_slot as u8);
        } else {
            let histogram_index = slot_histograms[best_slot];
            clusters.histograms[histogram_index].add(cur);
            clusters.histogram_indexes[i] = histogram_index;
            slot_costs[best_slot] += best_cost;
        }
    }
    clusters
}

/// Builds an optimal length-limited table for `histogram`.
///
/// One all-ones code of the longest length stays reserved.
#[must_use]
pub fn build_jpeg_huffman_table(histogram: &Histogram) -> HuffmanTable {
    HuffmanTable::from_depths(&histogram.depths())
}

/// Tables used by one frame and the context to table mapping.
#[derive(Clone, Debug, Default)]
pub struct HuffmanPlan {
    /// Tables in DHT emission order
    pub tables: Vec<HuffmanTable>,
    /// DHT slot id per table (0x00-0x03 DC, 0x10-0x13 AC)
    pub slot_ids: Vec<u8>,
    /// Table index per histogram context
    pub context_map: Vec<u8>,
    /// Encoding form of each table
    pub code_tables: Vec<HuffmanCodeTable>,
}

impl HuffmanPlan {
    fn with_tables(tables: Vec<HuffmanTable>, slot_ids: Vec<u8>, context_map: Vec<u8>) -> Self {
        let code_tables = tables.iter().map(HuffmanCodeTable::from_table).collect();
        Self {
            tables,
            slot_ids,
            context_map,
            code_tables,
        }
    }

    /// Builds image-specific tables from per-context histograms.
    ///
    /// `histograms[..num_components]` are DC contexts and `histograms[4..]`
    /// AC contexts.
    #[must_use]
    pub fn optimize(histograms: &[Histogram], num_components: usize) -> Self {
        let num_dc = num_components.min(histograms.len());
        let dc_clusters = cluster_jpeg_histograms(&histograms[..num_dc]);
        let ac_clusters =
            cluster_jpeg_histograms(histograms.get(NUM_DC_CONTEXTS..).unwrap_or_default());
        let num_dc_huff = dc_clusters.histograms.len();

        let mut tables = Vec::with_capacity(num_dc_huff + ac_clusters.histograms.len());
        let mut slot_ids = Vec::with_capacity(tables.capacity());
        for (i, h) in dc_clusters.histograms.iter().enumerate() {
            tables.push(build_jpeg_huffman_table(h));
            slot_ids.push(i as u8);
        }
        for (h, &slot) in ac_clusters.histograms.iter().zip(&ac_clusters.slot_ids) {
            tables.push(build_jpeg_huffman_table(h));
            slot_ids.push(0x10 + slot);
        }

        let mut context_map = vec![0u8; histograms.len()];
        for (i, entry) in context_map.iter_mut().enumerate() {
            if i < num_dc {
                *entry = dc_clusters.histogram_indexes[i] as u8;
            } else if i >= NUM_DC_CONTEXTS {
                *entry = (num_dc_huff + ac_clusters.histogram_indexes[i - NUM_DC_CONTEXTS]) as u8;
            }
        }

        log::debug!(
            "optimized Huffman codes: {} DC tables, {} AC tables for {} contexts",
            num_dc_huff,
            ac_clusters.histograms.len(),
            histograms.len()
        );
        Self::with_tables(tables, slot_ids, context_map)
    }

    /// Uses the tables the components name, without optimization.
    ///
    /// Each (class, index) pair is copied once, in component order with DC
    /// before AC. AC contexts are assigned per component of every scan that
    /// codes AC coefficients.
    pub fn from_explicit_tables(
        dc_tables: &[Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
        ac_tables: &[Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
        components: &[ComponentInfo],
        scans: &[ScanInfo],
    ) -> Result<Self> {
        let mut tables = Vec::with_capacity(2 * components.len());
        let mut slot_ids = Vec::with_capacity(2 * components.len());
        // Table position per (class, index); DC at 0..4, AC at 4..8.
        let mut inv_slot_map = [None::<u8>; 2 * NUM_HUFFMAN_SLOTS];

        let mut copy_table = |index: u8, is_dc: bool| -> Result<()> {
            let kind = if is_dc { "DC Huffman" } else { "AC Huffman" };
            if index as usize >= NUM_HUFFMAN_SLOTS {
                return Err(Error::MissingTable { kind, index });
            }
            let slot_idx = index as usize + if is_dc { 0 } else { NUM_HUFFMAN_SLOTS };
            if inv_slot_map[slot_idx].is_some() {
                return Ok(());
            }
            let source = if is_dc { dc_tables } else { ac_tables };
            let table = source[index as usize]
                .as_ref()
                .ok_or(Error::MissingTable { kind, index })?;
            validate_huffman_table(table, index)?;
            inv_slot_map[slot_idx] = Some(tables.len() as u8);
            slot_ids.push(index + if is_dc { 0 } else { 0x10 });
            tables.push(table.clone());
            Ok(())
        };
        for comp in components {
            copy_table(comp.dc_table, true)?;
            copy_table(comp.ac_table, false)?;
        }

        let mut context_map = vec![0u8; NUM_DC_CONTEXTS];
        for (c, comp) in components.iter().enumerate().take(NUM_DC_CONTEXTS) {
            context_map[c] = inv_slot_map[comp.dc_table as usize].unwrap_or(0);
        }
        for scan in scans.iter().filter(|s| s.se > 0) {
            for &ci in scan.components() {
                let ac_table = components
                    .get(ci as usize)
                    .map_or(0, |comp| comp.ac_table as usize);
                context_map.push(inv_slot_map[ac_table + NUM_HUFFMAN_SLOTS].unwrap_or(0));
            }
        }

        Ok(Self::with_tables(tables, slot_ids, context_map))
    }

    /// Encoding table for a histogram context.
    #[inline]
    #[must_use]
    pub fn code_table(&self, context: usize) -> Option<&HuffmanCodeTable> {
        let table = *self.context_map.get(context)? as usize;
        self.code_tables.get(table)
    }

    /// Slot id of the table serving a histogram context.
    #[must_use]
    pub fn slot_for_context(&self, context: usize) -> Option<u8> {
        let table = *self.context_map.get(context)? as usize;
        self.slot_ids.get(table).copied()
    }
}
