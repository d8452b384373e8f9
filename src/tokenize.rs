//! Scan tokenization.
//!
//! Every scan is turned into a token stream before any entropy-coded byte is
//! written, so Huffman tables can be fitted to the actual symbols. DC and
//! sequential/first-pass AC scans produce [`Token`]s in one shared
//! [`TokenStore`]; AC refinement scans produce compact [`RefToken`]s plus
//! side arrays of refinement bits and EOB run values; DC refinement scans
//! produce one raw bit per block.

use crate::alloc::try_reserve;
use crate::consts::{
    DCT_BLOCK_SIZE, JPEG_NATURAL_ORDER, MAX_COEF_BITS, MAX_COMPS_IN_SCAN, MAX_DC_DIFF_BITS,
    MAX_EOB_REFBITS, MAX_EOB_RUN,
};
use crate::error::{Error, Result};
use crate::huffman_opt::Histogram;
use crate::scan_script::{ScanInfo, ScanKind};
use crate::types::{CoeffBlock, ComponentCoefficients, FrameGeometry};

/// All-zero block standing in for positions outside a component's grid.
pub(crate) const DUMMY_BLOCK: CoeffBlock = [0; DCT_BLOCK_SIZE];

/// One Huffman symbol with its extra bits.
///
/// The number of extra bits is implied by the symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Token {
    /// Histogram context
    pub context: u8,
    /// Huffman symbol
    pub symbol: u8,
    /// Extra bits, already masked to their length
    pub bits: u16,
}

impl Token {
    /// Creates a new token.
    #[inline]
    pub const fn new(context: u8, symbol: u8, bits: u16) -> Self {
        Self {
            context,
            symbol,
            bits,
        }
    }
}

/// Token of an AC refinement scan.
///
/// Bit 1 of `symbol` is the sign of a newly nonzero coefficient (1 =
/// positive) and is masked off with `& 253` before coding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefToken {
    /// Huffman symbol, possibly with the sign bit set
    pub symbol: u8,
    /// Number of refinement bits that follow this token
    pub refbits: u8,
}

impl RefToken {
    /// Creates a new refinement token.
    #[inline]
    pub const fn new(symbol: u8, refbits: u8) -> Self {
        Self { symbol, refbits }
    }
}

/// Block walk of one scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanLayout {
    /// MCUs per row
    pub mcus_per_row: usize,
    /// MCU rows
    pub mcu_rows: usize,
    /// Per component in scan: (component index, blocks across, blocks down)
    pub components: Vec<(usize, usize, usize)>,
}

impl ScanLayout {
    /// Derives the MCU grid of `scan` from the frame geometry.
    ///
    /// A single-component scan walks that component's blocks one at a
    /// time; an interleaved scan walks the iMCU grid.
    #[must_use]
    pub fn new(scan: &ScanInfo, geometry: &FrameGeometry) -> Self {
        if scan.is_interleaved() {
            let components = scan
                .components()
                .iter()
                .map(|&ci| {
                    let c = &geometry.components[ci as usize];
                    (ci as usize, c.h_samp_factor, c.v_samp_factor)
                })
                .collect();
            Self {
                mcus_per_row: geometry.imcu_cols,
                mcu_rows: geometry.imcu_rows,
                components,
            }
        } else {
            let ci = scan.component_index[0] as usize;
            let c = &geometry.components[ci];
            Self {
                mcus_per_row: c.width_in_blocks,
                mcu_rows: c.height_in_blocks,
                components: vec![(ci, 1, 1)],
            }
        }
    }

    /// Blocks in one MCU.
    #[must_use]
    pub fn blocks_per_mcu(&self) -> usize {
        self.components.iter().map(|&(_, h, v)| h * v).sum()
    }

    /// Total number of blocks visited by the scan, dummies included.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.mcus_per_row * self.mcu_rows * self.blocks_per_mcu()
    }

    /// Restart interval covering `rows` MCU rows.
    #[must_use]
    pub fn restart_interval_for_rows(&self, rows: u16) -> u16 {
        let mcus = self.mcus_per_row.saturating_mul(rows as usize);
        mcus.min(u16::MAX as usize) as u16
    }
}

/// Worst-case number of tokens for one iMCU row of a sequential frame.
#[must_use]
pub fn max_num_tokens_per_mcu_row(geometry: &FrameGeometry) -> usize {
    DCT_BLOCK_SIZE * geometry.blocks_per_imcu() * geometry.imcu_cols
}

/// Capacity to add when a row's worst case no longer fits.
///
/// The first row reserves room for sixteen rows; later rows extrapolate
/// the tokens seen so far with a 4/3 margin. The result is never below one
/// row and never above what the remaining rows can produce.
#[must_use]
pub fn estimate_num_tokens(
    mcu_y: usize,
    ysize_mcus: usize,
    num_tokens: usize,
    max_per_row: usize,
) -> usize {
    let estimate = if mcu_y == 0 {
        max_per_row.saturating_mul(16)
    } else {
        4usize.saturating_mul(ysize_mcus).saturating_mul(num_tokens) / (3 * mcu_y)
    };
    let mcus_left = ysize_mcus.saturating_sub(mcu_y);
    mcus_left
        .saturating_mul(max_per_row)
        .min(max_per_row.max(estimate.saturating_sub(num_tokens)))
}

/// Tokens and side data of one scan.
#[derive(Clone, Debug, Default)]
pub struct ScanTokenInfo {
    /// Scan index in the script
    pub scan_index: usize,
    /// How the scan is coded
    pub kind: Option<ScanKind>,
    /// First AC histogram context of the scan
    pub ac_context: u8,
    /// Restart interval in MCUs (0 = none)
    pub restart_interval: u16,
    /// Offset of the first token in the [`TokenStore`]
    pub token_offset: usize,
    /// Tokens, refinement tokens or blocks, depending on the kind
    pub num_tokens: usize,
    /// Restart positions relative to the scan start, closed by `num_tokens`
    pub restarts: Vec<usize>,
    /// AC refinement tokens
    pub ref_tokens: Vec<RefToken>,
    /// Refinement bits, one per byte
    pub refbits: Vec<u8>,
    /// Extra-bit values of EOB runs in an AC refinement scan
    pub eobruns: Vec<u16>,
    /// Coefficients coded as nonzero in this scan
    pub num_nonzeros: usize,
    /// Coefficients that only become nonzero in a later refinement
    pub num_future_nonzeros: usize,
}

/// Token storage shared by every token scan of a frame.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    tokens: Vec<Token>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if no token is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All stored tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokens of one scan.
    #[must_use]
    pub fn scan_tokens(&self, info: &ScanTokenInfo) -> &[Token] {
        let start = info.token_offset.min(self.tokens.len());
        let end = (info.token_offset + info.num_tokens).min(self.tokens.len());
        &self.tokens[start..end]
    }

    /// Makes room for `max_per_row` more tokens, growing by an estimate.
    pub fn reserve_row(
        &mut self,
        mcu_y: usize,
        ysize_mcus: usize,
        max_per_row: usize,
    ) -> Result<()> {
        if self.tokens.len() + max_per_row <= self.tokens.capacity() {
            return Ok(());
        }
        let additional = estimate_num_tokens(mcu_y, ysize_mcus, self.tokens.len(), max_per_row);
        try_reserve(&mut self.tokens, additional, "allocating token storage")
    }

    /// Counts every symbol into its histogram context.
    ///
    /// Refinement symbols are counted with the sign bit masked off in the
    /// scan's first AC context.
    #[must_use]
    pub fn histograms(&self, scans: &[ScanTokenInfo], num_contexts: usize) -> Vec<Histogram> {
        let mut histograms = vec![Histogram::new(); num_contexts];
        for t in &self.tokens {
            if let Some(h) = histograms.get_mut(t.context as usize) {
                h.count(t.symbol);
            }
        }
        for info in scans.iter().filter(|s| s.kind == Some(ScanKind::AcRefine)) {
            if let Some(h) = histograms.get_mut(info.ac_context as usize) {
                for t in &info.ref_tokens {
                    h.count(t.symbol & 253);
                }
            }
        }
        histograms
    }

    /// Mutable access to the token vector.
    pub(crate) fn tokens_mut(&mut self) -> &mut Vec<Token> {
        &mut self.tokens
    }
}

/// Bit length of `v` (0 for 0).
#[inline]
fn bit_length(v: u32) -> u32 {
    32 - v.leading_zeros()
}

/// Size category and extra bits of a signed difference or coefficient.
///
/// Negative values carry the ones' complement of their magnitude.
#[inline]
fn category_and_bits(value: i32) -> (u32, u16) {
    let nbits = bit_length(value.unsigned_abs());
    let raw = if value < 0 { value - 1 } else { value };
    let mask = (1u32 << nbits) - 1;
    (nbits, (raw as u32 & mask) as u16)
}

/// EOB run symbol and extra bits for a run of `run` blocks.
#[inline]
fn eob_run_token(context: u8, run: u32) -> Token {
    let nbits = bit_length(run) - 1;
    Token::new(context, (nbits << 4) as u8, (run & ((1 << nbits) - 1)) as u16)
}

/// Incremental tokenizer of one scan.
///
/// Call [`begin_mcu`](Self::begin_mcu) before each MCU, then
/// [`add_block`](Self::add_block) for its blocks in scan order, and
/// [`finish`](Self::finish) after the last MCU.
#[derive(Debug)]
pub struct ScanTokenizer {
    info: ScanTokenInfo,
    ss: usize,
    se: usize,
    al: u32,
    restarts_to_go: usize,
    last_dc: [i32; MAX_COMPS_IN_SCAN],
    eob_run: u32,
    eob_idx: usize,
    eob_refbits: u32,
    block_idx: usize,
}

impl ScanTokenizer {
    /// Creates a tokenizer for `scan`.
    ///
    /// `token_offset` is the number of tokens already stored before this
    /// scan.
    #[must_use]
    pub fn new(
        scan_index: usize,
        scan: &ScanInfo,
        progressive: bool,
        ac_context: u8,
        restart_interval: u16,
        token_offset: usize,
    ) -> Self {
        let kind = scan.kind(progressive);
        Self {
            info: ScanTokenInfo {
                scan_index,
                kind: Some(kind),
                ac_context,
                restart_interval,
                token_offset,
                ..Default::default()
            },
            ss: scan.ss as usize,
            se: scan.se as usize,
            al: scan.al as u32,
            restarts_to_go: restart_interval as usize,
            last_dc: [0; MAX_COMPS_IN_SCAN],
            eob_run: 0,
            eob_idx: 0,
            eob_refbits: 0,
            block_idx: 0,
        }
    }

    #[inline]
    fn kind(&self) -> ScanKind {
        self.info.kind.unwrap_or(ScanKind::Sequential)
    }

    /// Handles a pending restart before the next MCU.
    pub fn begin_mcu(&mut self, tokens: &mut Vec<Token>) {
        if self.info.restart_interval > 0 && self.restarts_to_go == 0 {
            self.restarts_to_go = self.info.restart_interval as usize;
            self.last_dc = [0; MAX_COMPS_IN_SCAN];
            let position = match self.kind() {
                ScanKind::Sequential | ScanKind::DcFirst => tokens.len() - self.info.token_offset,
                ScanKind::AcFirst => {
                    self.flush_eob_run(tokens);
                    tokens.len() - self.info.token_offset
                }
                ScanKind::DcRefine => self.block_idx,
                ScanKind::AcRefine => {
                    self.eob_idx = self.info.ref_tokens.len();
                    self.eob_run = 0;
                    self.eob_refbits = 0;
                    self.info.ref_tokens.len()
                }
            };
            self.info.restarts.push(position);
        }
        self.restarts_to_go = self.restarts_to_go.saturating_sub(1);
    }

    /// Tokenizes one block of component `comp_idx`, the `i`-th component
    /// of the scan.
    ///
    /// Fails if a coefficient or DC difference does not fit its size
    /// category; nothing of the block is kept in the token stream then.
    pub fn add_block(
        &mut self,
        tokens: &mut Vec<Token>,
        i: usize,
        comp_idx: usize,
        block: &CoeffBlock,
    ) -> Result<()> {
        let in_range = match self.kind() {
            ScanKind::Sequential => self.sequential_block(tokens, i, comp_idx, block),
            ScanKind::DcFirst => {
                let value = (block[0] as i32) >> self.al;
                let (nbits, bits) = category_and_bits(value - self.last_dc[i]);
                if nbits <= MAX_DC_DIFF_BITS {
                    self.last_dc[i] = value;
                    tokens.push(Token::new(comp_idx as u8, nbits as u8, bits));
                }
                nbits <= MAX_DC_DIFF_BITS
            }
            ScanKind::DcRefine => {
                self.info.refbits.push((((block[0] as i32) >> self.al) & 1) as u8);
                true
            }
            ScanKind::AcFirst => self.ac_first_block(tokens, block),
            ScanKind::AcRefine => {
                self.ac_refine_block(block);
                true
            }
        };
        if !in_range {
            return Err(Error::CoefficientOutOfRange {
                scan: self.info.scan_index,
                component: comp_idx,
            });
        }
        self.block_idx += 1;
        Ok(())
    }

    fn sequential_block(
        &mut self,
        tokens: &mut Vec<Token>,
        i: usize,
        comp_idx: usize,
        block: &CoeffBlock,
    ) -> bool {
        let start = tokens.len();
        let dc = block[0] as i32;
        let (nbits, bits) = category_and_bits(dc - self.last_dc[i]);
        if nbits > MAX_DC_DIFF_BITS {
            return false;
        }
        tokens.push(Token::new(comp_idx as u8, nbits as u8, bits));

        let context = self.info.ac_context.wrapping_add(i as u8);
        let mut r = 0u32;
        for &pos in &JPEG_NATURAL_ORDER[1..DCT_BLOCK_SIZE] {
            let c = block[pos as usize] as i32;
            if c == 0 {
                r += 1;
                continue;
            }
            let (nbits, bits) = category_and_bits(c);
            if nbits > MAX_COEF_BITS {
                tokens.truncate(start);
                return false;
            }
            while r > 15 {
                tokens.push(Token::new(context, 0xF0, 0));
                r -= 16;
            }
            tokens.push(Token::new(context, ((r << 4) + nbits) as u8, bits));
            r = 0;
        }
        if r > 0 {
            tokens.push(Token::new(context, 0x00, 0));
        }
        self.last_dc[i] = dc;
        true
    }

    fn flush_eob_run(&mut self, tokens: &mut Vec<Token>) {
        if self.eob_run > 0 {
            tokens.push(eob_run_token(self.info.ac_context, self.eob_run));
            self.eob_run = 0;
        }
    }

    fn ac_first_block(&mut self, tokens: &mut Vec<Token>, block: &CoeffBlock) -> bool {
        let band = &JPEG_NATURAL_ORDER[self.ss..=self.se];
        let al = self.al;
        if band
            .iter()
            .any(|&pos| bit_length((block[pos as usize] as i32).unsigned_abs() >> al) > MAX_COEF_BITS)
        {
            return false;
        }

        let context = self.info.ac_context;
        let mut r = 0u32;
        for &pos in band {
            let c = block[pos as usize] as i32;
            if c == 0 {
                r += 1;
                continue;
            }
            let (temp, temp2) = if c < 0 {
                let t = (-c) >> self.al;
                (t, !t)
            } else {
                let t = c >> self.al;
                (t, t)
            };
            if temp == 0 {
                r += 1;
                self.info.num_future_nonzeros += 1;
                continue;
            }
            self.flush_eob_run(tokens);
            while r > 15 {
                tokens.push(Token::new(context, 0xF0, 0));
                r -= 16;
            }
            let nbits = bit_length(temp as u32);
            let bits = (temp2 as u32 & ((1 << nbits) - 1)) as u16;
            tokens.push(Token::new(context, ((r << 4) + nbits) as u8, bits));
            self.info.num_nonzeros += 1;
            r = 0;
        }
        if r > 0 {
            self.eob_run += 1;
            if self.eob_run == MAX_EOB_RUN {
                self.flush_eob_run(tokens);
            }
        }
        true
    }

    fn ac_refine_block(&mut self, block: &CoeffBlock) {
        let info = &mut self.info;
        let mut num_eob_refinement_bits = 0u32;
        let mut num_refinement_bits = 0u32;
        let mut r = 0u32;
        for &pos in &JPEG_NATURAL_ORDER[self.ss..=self.se] {
            let c = block[pos as usize] as i32;
            if c == 0 {
                r += 1;
                continue;
            }
            let absval = c.unsigned_abs() >> self.al;
            if absval == 0 {
                r += 1;
                continue;
            }
            while r > 15 {
                info.ref_tokens.push(RefToken::new(0xF0, num_refinement_bits as u8));
                r -= 16;
                num_eob_refinement_bits += num_refinement_bits;
                num_refinement_bits = 0;
            }
            if absval > 1 {
                info.refbits.push((absval & 1) as u8);
                num_refinement_bits += 1;
                continue;
            }
            let sign = if c > 0 { 2 } else { 0 };
            let symbol = (r << 4) + 1 + sign;
            info.ref_tokens.push(RefToken::new(symbol as u8, num_refinement_bits as u8));
            info.num_nonzeros += 1;
            num_refinement_bits = 0;
            num_eob_refinement_bits = 0;
            r = 0;
            self.eob_idx = info.ref_tokens.len();
            self.eob_run = 0;
            self.eob_refbits = 0;
        }

        let pending = num_eob_refinement_bits + num_refinement_bits;
        if r > 0 || pending > 0 {
            self.eob_run += 1;
            self.eob_refbits += pending;
            if self.eob_refbits > MAX_EOB_REFBITS {
                self.eob_idx += 1;
                self.eob_refbits = pending;
                self.eob_run = 1;
            }
            // Zero-run tokens of this block fold into the EOB run.
            let prev_symbol = info.ref_tokens.get(self.eob_idx).map_or(0, |t| t.symbol);
            info.ref_tokens.truncate(self.eob_idx);
            let symbol = match self.eob_run {
                1 => 0,
                2 => {
                    info.eobruns.push(0);
                    16
                }
                run if run.is_power_of_two() => {
                    if let Some(last) = info.eobruns.last_mut() {
                        *last = 0;
                    }
                    prev_symbol.wrapping_add(16)
                }
                _ => {
                    if let Some(last) = info.eobruns.last_mut() {
                        *last += 1;
                    }
                    prev_symbol
                }
            };
            info.ref_tokens.push(RefToken::new(symbol, self.eob_refbits as u8));
            if self.eob_run == MAX_EOB_RUN {
                self.eob_idx = info.ref_tokens.len();
                self.eob_run = 0;
                self.eob_refbits = 0;
            }
        }
    }

    /// Flushes pending state and closes the restart list.
    pub fn finish(mut self, tokens: &mut Vec<Token>) -> ScanTokenInfo {
        let num_tokens = match self.kind() {
            ScanKind::Sequential | ScanKind::DcFirst => tokens.len() - self.info.token_offset,
            ScanKind::AcFirst => {
                self.flush_eob_run(tokens);
                tokens.len() - self.info.token_offset
            }
            ScanKind::DcRefine => self.block_idx,
            ScanKind::AcRefine => self.info.ref_tokens.len(),
        };
        self.info.num_tokens = num_tokens;
        self.info.restarts.push(num_tokens);
        self.info
    }
}

/// Tokenizes a whole scan into `store`.
///
/// Token scans reserve their worst case row by row; refinement scans keep
/// their tokens in the returned info.
#[allow(clippy::too_many_arguments)]
pub fn tokenize_scan(
    scan_index: usize,
    scan: &ScanInfo,
    progressive: bool,
    ac_context: u8,
    restart_interval: u16,
    geometry: &FrameGeometry,
    coefficients: &[ComponentCoefficients],
    store: &mut TokenStore,
) -> Result<ScanTokenInfo> {
    let layout = ScanLayout::new(scan, geometry);
    let kind = scan.kind(progressive);
    let mut tokenizer = ScanTokenizer::new(
        scan_index,
        scan,
        progressive,
        ac_context,
        restart_interval,
        store.len(),
    );

    let blocks_per_row = layout.mcus_per_row * layout.blocks_per_mcu();
    let coeffs_in_band = (scan.se - scan.ss) as usize + 1;
    let max_per_row = match kind {
        ScanKind::Sequential => max_num_tokens_per_mcu_row(geometry),
        ScanKind::DcFirst => blocks_per_row,
        ScanKind::AcFirst => 1 + blocks_per_row * coeffs_in_band,
        ScanKind::DcRefine => {
            try_reserve(&mut tokenizer.info.refbits, layout.num_blocks(), "allocating refinement bits")?;
            0
        }
        ScanKind::AcRefine => 0,
    };

    for mcu_y in 0..layout.mcu_rows {
        if max_per_row > 0 {
            store.reserve_row(mcu_y, layout.mcu_rows, max_per_row)?;
        } else if kind == ScanKind::AcRefine {
            try_reserve(&mut tokenizer.info.ref_tokens, blocks_per_row * coeffs_in_band, "allocating refinement tokens")?;
            try_reserve(&mut tokenizer.info.refbits, blocks_per_row * coeffs_in_band, "allocating refinement bits")?;
        }

        let tokens = store.tokens_mut();
        for mcu_x in 0..layout.mcus_per_row {
            tokenizer.begin_mcu(tokens);
            for (i, &(comp_idx, n_x, n_y)) in layout.components.iter().enumerate() {
                let plane = coefficients.get(comp_idx).ok_or(Error::InvalidBufferSize {
                    expected: geometry.components.len(),
                    actual: coefficients.len(),
                })?;
                for iy in 0..n_y {
                    for ix in 0..n_x {
                        let bx = mcu_x * n_x + ix;
                        let by = mcu_y * n_y + iy;
                        let block = if bx >= plane.width_in_blocks || by >= plane.height_in_blocks {
                            &DUMMY_BLOCK
                        } else {
                            plane.block(bx, by)
                        };
                        tokenizer.add_block(tokens, i, comp_idx, block)?;
                    }
                }
            }
        }
    }

    let info = tokenizer.finish(store.tokens_mut());
    log::trace!(
        "scan {}: {:?}, {} tokens, {} restarts",
        scan_index,
        kind,
        info.num_tokens,
        info.restarts.len() - 1
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentInfo;

    fn gray_geometry(width: u32, height: u32) -> FrameGeometry {
        FrameGeometry::new(width, height, &[ComponentInfo::new(1, 0)])
    }

    fn tokenize_one(
        scan: &ScanInfo,
        progressive: bool,
        restart_interval: u16,
        plane: &ComponentCoefficients,
    ) -> (TokenStore, ScanTokenInfo) {
        let geometry = gray_geometry(
            (plane.width_in_blocks * 8) as u32,
            (plane.height_in_blocks * 8) as u32,
        );
        let mut store = TokenStore::new();
        let info = tokenize_scan(
            0,
            scan,
            progressive,
            4,
            restart_interval,
            &geometry,
            std::slice::from_ref(plane),
            &mut store,
        )
        .unwrap();
        (store, info)
    }

    #[test]
    fn test_category_and_bits() {
        assert_eq!(category_and_bits(0), (0, 0));
        assert_eq!(category_and_bits(5), (3, 0b101));
        assert_eq!(category_and_bits(-5), (3, 0b010));
        assert_eq!(category_and_bits(-1), (1, 0));
        assert_eq!(category_and_bits(1023), (10, 1023));
        assert_eq!(category_and_bits(-1024), (11, 1023));
    }

    #[test]
    fn test_eob_run_token() {
        assert_eq!(eob_run_token(4, 1), Token::new(4, 0x00, 0));
        assert_eq!(eob_run_token(4, 3), Token::new(4, 0x10, 1));
        assert_eq!(eob_run_token(4, 0x7FFF), Token::new(4, 0xE0, 0x3FFF));
    }

    #[test]
    fn test_sequential_dc_only_block() {
        let mut plane = ComponentCoefficients::new(1, 1);
        plane.blocks[0][0] = 5;
        let (store, info) = tokenize_one(&ScanInfo::sequential(&[0]), false, 0, &plane);
        assert_eq!(
            store.tokens(),
            &[Token::new(0, 3, 0b101), Token::new(4, 0x00, 0)]
        );
        assert_eq!(info.num_tokens, 2);
        assert_eq!(info.restarts, vec![2]);
    }

    #[test]
    fn test_sequential_ac_runs() {
        let mut plane = ComponentCoefficients::new(2, 1);
        {
            let block = plane.block_mut(0, 0);
            block[0] = -3;
            // Zig-zag positions 1 and 20 (natural 1 and 40).
            block[1] = 1;
            block[40] = -2;
            // Last coefficient: no EOB.
            block[63] = 1;
        }
        plane.block_mut(1, 0)[0] = -3;
        let (store, _) = tokenize_one(&ScanInfo::sequential(&[0]), false, 0, &plane);
        let expected = [
            Token::new(0, 2, 0b00),
            Token::new(4, 0x01, 1),
            Token::new(4, 0xF0, 0),
            Token::new(4, 0x22, 0b01),
            Token::new(4, 0xF0, 0),
            Token::new(4, 0xF0, 0),
            Token::new(4, (10 << 4) + 1, 1),
            // Second block: same DC, zero difference.
            Token::new(0, 0, 0),
            Token::new(4, 0x00, 0),
        ];
        assert_eq!(store.tokens(), &expected);
    }

    #[test]
    fn test_dc_first_with_al() {
        let mut plane = ComponentCoefficients::new(3, 1);
        plane.blocks[0][0] = 9;
        plane.blocks[1][0] = -9;
        plane.blocks[2][0] = -9;
        let scan = ScanInfo::new(&[0], 0, 0, 0, 1);
        let (store, info) = tokenize_one(&scan, true, 0, &plane);
        // 9 >> 1 = 4, -9 >> 1 = -5: diffs 4, -9, 0.
        assert_eq!(
            store.tokens(),
            &[
                Token::new(0, 3, 0b100),
                Token::new(0, 4, 0b0110),
                Token::new(0, 0, 0)
            ]
        );
        assert_eq!(info.num_tokens, 3);
    }

    #[test]
    fn test_dc_refine_bits_and_restarts() {
        let mut plane = ComponentCoefficients::new(5, 1);
        for (i, block) in plane.blocks.iter_mut().enumerate() {
            block[0] = i as i16;
        }
        let scan = ScanInfo::new(&[0], 0, 0, 1, 0);
        let (store, info) = tokenize_one(&scan, true, 2, &plane);
        assert!(store.is_empty());
        assert_eq!(info.refbits, vec![0, 1, 0, 1, 0]);
        assert_eq!(info.restarts, vec![2, 4, 5]);
        assert_eq!(info.num_tokens, 5);
    }

    #[test]
    fn test_ac_first_eob_run_before_restart() {
        // Three empty blocks, then a restart, then a block with one value.
        let mut plane = ComponentCoefficients::new(4, 1);
        plane.block_mut(3, 0)[1] = 3;
        let scan = ScanInfo::new(&[0], 1, 63, 0, 0);
        let (store, info) = tokenize_one(&scan, true, 3, &plane);
        assert_eq!(
            store.tokens(),
            &[
                Token::new(4, 0x10, 1),
                Token::new(4, 0x02, 0b11),
                Token::new(4, 0x00, 0)
            ]
        );
        assert_eq!(info.restarts, vec![1, 3]);
    }

    #[test]
    fn test_ac_first_future_nonzeros() {
        let mut plane = ComponentCoefficients::new(1, 1);
        {
            let block = plane.block_mut(0, 0);
            block[1] = 1;
            block[8] = -6;
        }
        let scan = ScanInfo::new(&[0], 1, 63, 0, 2);
        let (store, info) = tokenize_one(&scan, true, 0, &plane);
        // 1 >> 2 = 0 is deferred; -6 -> 6 >> 2 = 1 after one zero.
        assert_eq!(
            store.tokens(),
            &[Token::new(4, 0x11, 0), Token::new(4, 0x00, 0)]
        );
        assert_eq!(info.num_nonzeros, 1);
        assert_eq!(info.num_future_nonzeros, 1);
    }

    #[test]
    fn test_ac_refine_tokens() {
        let mut plane = ComponentCoefficients::new(3, 1);
        {
            let block = plane.block_mut(0, 0);
            // Previously nonzero: refinement bit 1.
            block[1] = 3;
            // Newly nonzero, negative, after one zero.
            block[16] = -1;
        }
        let scan = ScanInfo::new(&[0], 1, 63, 1, 0);
        let (_, info) = tokenize_one(&scan, true, 0, &plane);
        // Block 0: (1<<4)+1 carrying one refbit, then EOB; blocks 1 and 2
        // extend the run to 3.
        assert_eq!(
            info.ref_tokens,
            vec![RefToken::new(0x11, 1), RefToken::new(16, 0)]
        );
        assert_eq!(info.refbits, vec![1]);
        assert_eq!(info.eobruns, vec![1]);
        assert_eq!(info.restarts, vec![2]);

        let mut plane = ComponentCoefficients::new(1, 1);
        plane.block_mut(0, 0)[1] = 1;
        let (_, info) = tokenize_one(&scan, true, 0, &plane);
        // Positive sign sets bit 1.
        assert_eq!(
            info.ref_tokens,
            vec![RefToken::new(0x03, 0), RefToken::new(0, 0)]
        );
    }

    #[test]
    fn test_ac_refine_eob_run_growth() {
        let plane = ComponentCoefficients::new(9, 1);
        let scan = ScanInfo::new(&[0], 1, 63, 1, 0);
        let (_, info) = tokenize_one(&scan, true, 0, &plane);
        // Run of 9: EOB3 with extra value 1.
        assert_eq!(info.ref_tokens, vec![RefToken::new(0x30, 0)]);
        assert_eq!(info.eobruns, vec![1]);

        let (_, info) = tokenize_one(&scan, true, 4, &plane);
        assert_eq!(
            info.ref_tokens,
            vec![
                RefToken::new(0x20, 0),
                RefToken::new(0x20, 0),
                RefToken::new(0x00, 0)
            ]
        );
        assert_eq!(info.eobruns, vec![0, 0]);
        assert_eq!(info.restarts, vec![1, 2, 3]);
    }

    #[test]
    fn test_ac_refine_pending_bits_join_eob() {
        let mut plane = ComponentCoefficients::new(2, 1);
        plane.block_mut(0, 0)[1] = -2;
        plane.block_mut(1, 0)[1] = 3;
        let scan = ScanInfo::new(&[0], 1, 63, 1, 0);
        let (_, info) = tokenize_one(&scan, true, 0, &plane);
        assert_eq!(info.ref_tokens, vec![RefToken::new(16, 2)]);
        assert_eq!(info.refbits, vec![0, 1]);
        assert_eq!(info.eobruns, vec![0]);
    }

    #[test]
    fn test_ac_refine_splits_run_past_refbit_limit() {
        let mut plane = ComponentCoefficients::new(5, 1);
        for block in plane.blocks.iter_mut() {
            block[1..].fill(2);
        }
        let scan = ScanInfo::new(&[0], 1, 63, 1, 0);
        let (_, info) = tokenize_one(&scan, true, 0, &plane);
        // Four blocks of 63 bits fit one EOB2 token; the fifth starts a new run.
        assert_eq!(
            info.ref_tokens,
            vec![RefToken::new(0x20, 252), RefToken::new(0x00, 63)]
        );
        assert_eq!(info.eobruns, vec![0]);
        assert_eq!(info.refbits.len(), 5 * 63);
        assert_eq!(info.restarts, vec![2]);
    }

    #[test]
    fn test_out_of_range_coefficients() {
        let mut plane = ComponentCoefficients::new(2, 1);
        plane.block_mut(1, 0)[1] = i16::MIN;
        let geometry = gray_geometry(16, 8);
        let planes = std::slice::from_ref(&plane);
        let mut store = TokenStore::new();
        let sequential = ScanInfo::sequential(&[0]);
        let err = tokenize_scan(3, &sequential, false, 4, 0, &geometry, planes, &mut store).unwrap_err();
        assert_eq!(err, Error::CoefficientOutOfRange { scan: 3, component: 0 });

        // 1024 needs 11 bits: too many for an AC coefficient, unless the
        // point transform brings it back into range.
        plane.block_mut(1, 0)[1] = 1024;
        let planes = std::slice::from_ref(&plane);
        let first = ScanInfo::new(&[0], 1, 63, 0, 0);
        let mut store = TokenStore::new();
        assert!(tokenize_scan(0, &first, true, 4, 0, &geometry, planes, &mut store).is_err());
        let shifted = ScanInfo::new(&[0], 1, 63, 0, 1);
        let mut store = TokenStore::new();
        assert!(tokenize_scan(0, &shifted, true, 4, 0, &geometry, planes, &mut store).is_ok());

        // DC differences may use 11 bits.
        let mut plane = ComponentCoefficients::new(2, 1);
        plane.block_mut(0, 0)[0] = -1024;
        plane.block_mut(1, 0)[0] = 1023;
        let (store, info) = tokenize_one(&ScanInfo::sequential(&[0]), false, 0, &plane);
        assert_eq!(info.num_tokens, 4);
        assert_eq!(store.tokens()[2].symbol, 11);
        plane.block_mut(1, 0)[0] = 1024;
        let dc_first = ScanInfo::new(&[0], 0, 0, 0, 0);
        let planes = std::slice::from_ref(&plane);
        let mut store = TokenStore::new();
        let err = tokenize_scan(0, &dc_first, true, 4, 0, &geometry, planes, &mut store).unwrap_err();
        assert!(matches!(err, Error::CoefficientOutOfRange { scan: 0, .. }));
    }

    #[test]
    fn test_interleaved_dummy_blocks() {
        let comps = [
            ComponentInfo::new(1, 0).with_sampling(2, 2),
            ComponentInfo::new(2, 1),
        ];
        // 24x8: luma 3x1 blocks, chroma 2x1, two MCUs.
        let geometry = FrameGeometry::new(24, 8, &comps);
        let planes = [ComponentCoefficients::new(3, 1), ComponentCoefficients::new(2, 1)];
        let mut store = TokenStore::new();
        let scan = ScanInfo::sequential(&[0, 1]);
        let info =
            tokenize_scan(0, &scan, false, 4, 0, &geometry, &planes, &mut store).unwrap();
        let layout = ScanLayout::new(&scan, &geometry);
        assert_eq!(layout.mcus_per_row, 2);
        assert_eq!(layout.num_blocks(), 10);
        // Every block is empty: DC + EOB each.
        assert_eq!(info.num_tokens, 20);
        let contexts: Vec<u8> = store.tokens()[..10].iter().map(|t| t.context).collect();
        assert_eq!(contexts, vec![0, 4, 0, 4, 0, 4, 0, 4, 1, 5]);
    }

    #[test]
    fn test_histograms_mask_sign_bit() {
        let mut plane = ComponentCoefficients::new(1, 1);
        plane.block_mut(0, 0)[1] = 1;
        let scan = ScanInfo::new(&[0], 1, 63, 1, 0);
        let (store, info) = tokenize_one(&scan, true, 0, &plane);
        let histograms = store.histograms(&[info], 5);
        assert_eq!(histograms[4].counts[0x01], 1);
        assert_eq!(histograms[4].counts[0x03], 0);
        assert_eq!(histograms[4].counts[0x00], 1);
    }

    #[test]
    fn test_estimate_num_tokens() {
        assert_eq!(estimate_num_tokens(0, 100, 0, 10), 160);
        assert_eq!(estimate_num_tokens(0, 4, 0, 10), 40);
        // 4 * 100 * 300 / (3 * 10) = 4000 estimated, 3700 more.
        assert_eq!(estimate_num_tokens(10, 100, 300, 50), 3700);
        assert_eq!(estimate_num_tokens(99, 100, 300, 50), 50);
        // Estimate below what is stored: still one row.
        assert_eq!(estimate_num_tokens(50, 100, 10, 50), 50);
    }

    #[test]
    fn test_restart_interval_for_rows() {
        let geometry = gray_geometry(64, 64);
        let layout = ScanLayout::new(&ScanInfo::sequential(&[0]), &geometry);
        assert_eq!(layout.restart_interval_for_rows(2), 16);
        let geometry = gray_geometry(65500, 8);
        let layout = ScanLayout::new(&ScanInfo::sequential(&[0]), &geometry);
        assert_eq!(layout.restart_interval_for_rows(10), u16::MAX);
    }
}
