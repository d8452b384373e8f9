//! Scan data writer.
//!
//! Replays the tokens of one scan through the Huffman plan into a
//! [`BitWriter`], inserting restart markers at the recorded positions and
//! draining complete bytes to the destination as the writer fills up.

use std::io::Write;

use crate::bitstream::{BitWriter, Destination};
use crate::consts::MARKER_RST0;
use crate::error::{Error, Result};
use crate::huffman::HuffmanCodeTable;
use crate::huffman_opt::HuffmanPlan;
use crate::scan_script::ScanKind;
use crate::tokenize::{ScanTokenInfo, Token};

/// Suspension context of scan data written after tokenization.
const CONTEXT: &str = "finish_compress";

/// Walks a scan's restart positions and emits `RSTn` markers.
struct RestartMarkers<'a> {
    positions: &'a [usize],
    idx: usize,
    next_marker: u8,
}

impl<'a> RestartMarkers<'a> {
    fn new(positions: &'a [usize]) -> Self {
        Self {
            positions,
            idx: 0,
            next_marker: 0,
        }
    }

    /// Emits a marker for every restart recorded at position `i`.
    #[inline]
    fn before(&mut self, i: usize, bw: &mut BitWriter) {
        while self.positions.get(self.idx) == Some(&i) {
            bw.jump_to_byte_boundary();
            bw.emit_marker(MARKER_RST0 + self.next_marker);
            self.next_marker = (self.next_marker + 1) & 7;
            self.idx += 1;
        }
    }
}

/// Writes entropy-coded scan data.
pub struct ScanEncoder<'a, W: Write> {
    bw: &'a mut BitWriter,
    dest: &'a mut Destination<W>,
    plan: &'a HuffmanPlan,
    drain_threshold: usize,
    missing: HuffmanCodeTable,
}

impl<'a, W: Write> ScanEncoder<'a, W> {
    /// Creates an encoder that drains `bw` into `dest` whenever it holds
    /// `drain_threshold` bytes.
    pub fn new(
        bw: &'a mut BitWriter,
        dest: &'a mut Destination<W>,
        plan: &'a HuffmanPlan,
        drain_threshold: usize,
    ) -> Self {
        Self {
            bw,
            dest,
            plan,
            drain_threshold: drain_threshold.max(1),
            missing: HuffmanCodeTable::default(),
        }
    }

    #[inline]
    fn maybe_drain(&mut self, context: &'static str) -> Result<()> {
        if self.bw.len() >= self.drain_threshold {
            self.bw.empty_into(self.dest, context)?;
        }
        Ok(())
    }

    /// Writes the data of one scan, then byte-aligns and drains.
    ///
    /// A symbol missing from its table is reported once the scan is done as
    /// [`Error::UnhealthyBitWriter`].
    pub fn write_scan(&mut self, info: &ScanTokenInfo, tokens: &[Token]) -> Result<()> {
        match info.kind {
            Some(ScanKind::AcRefine) => self.write_ac_refinement_tokens(info)?,
            Some(ScanKind::DcRefine) => self.write_dc_refinement_bits(info)?,
            _ => self.write_tokens_with_restarts(tokens, &info.restarts, CONTEXT)?,
        }
        self.finish_scan(info.scan_index, CONTEXT)
    }

    /// Checks health, pads to a byte boundary and drains the writer.
    pub fn finish_scan(&mut self, scan_index: usize, context: &'static str) -> Result<()> {
        if !self.bw.is_healthy() {
            return Err(Error::UnhealthyBitWriter { scan: scan_index });
        }
        self.bw.jump_to_byte_boundary();
        self.bw.empty_into(self.dest, context)
    }

    /// Writes `tokens` with restart markers at `restarts`.
    pub fn write_tokens_with_restarts(
        &mut self,
        tokens: &[Token],
        restarts: &[usize],
        context: &'static str,
    ) -> Result<()> {
        let mut markers = RestartMarkers::new(restarts);
        for (i, t) in tokens.iter().enumerate() {
            markers.before(i, self.bw);
            let code = self
                .plan
                .code_table(t.context as usize)
                .unwrap_or(&self.missing);
            let symbol = t.symbol as usize;
            self.bw.write_bits(
                code.depth[symbol] as u32,
                (code.code[symbol] | t.bits as u32) as u64,
            );
            self.maybe_drain(context)?;
        }
        Ok(())
    }

    /// Writes tokens that never cross a restart boundary.
    pub fn write_tokens(&mut self, tokens: &[Token], context: &'static str) -> Result<()> {
        self.write_tokens_with_restarts(tokens, &[], context)
    }

    /// Side arrays shorter than the tokens claim are reported as
    /// [`Error::UnhealthyBitWriter`].
    fn write_ac_refinement_tokens(&mut self, info: &ScanTokenInfo) -> Result<()> {
        let truncated = Error::UnhealthyBitWriter {
            scan: info.scan_index,
        };
        let mut markers = RestartMarkers::new(&info.restarts);
        let mut eobruns = info.eobruns.iter();
        let mut refbits = info.refbits.iter();
        for (i, t) in info.ref_tokens.iter().enumerate() {
            markers.before(i, self.bw);
            let symbol = (t.symbol & 253) as usize;
            let mut bits = 0u32;
            if symbol & 1 == 0 {
                let r = symbol >> 4;
                if r > 0 && r < 15 {
                    bits = *eobruns.next().ok_or_else(|| truncated.clone())? as u32;
                }
            } else {
                bits = ((t.symbol >> 1) & 1) as u32;
            }
            let code = self
                .plan
                .code_table(info.ac_context as usize)
                .unwrap_or(&self.missing);
            self.bw
                .write_bits(code.depth[symbol] as u32, (code.code[symbol] | bits) as u64);
            for _ in 0..t.refbits {
                let bit = *refbits.next().ok_or_else(|| truncated.clone())?;
                self.bw.write_bits(1, bit as u64);
            }
            self.maybe_drain(CONTEXT)?;
        }
        Ok(())
    }

    fn write_dc_refinement_bits(&mut self, info: &ScanTokenInfo) -> Result<()> {
        let bits = info
            .refbits
            .get(..info.num_tokens)
            .ok_or(Error::UnhealthyBitWriter {
                scan: info.scan_index,
            })?;
        let mut markers = RestartMarkers::new(&info.restarts);
        for (i, &bit) in bits.iter().enumerate() {
            markers.before(i, self.bw);
            self.bw.write_bits(1, bit as u64);
            self.maybe_drain(CONTEXT)?;
        }
        Ok(())
    }
}
