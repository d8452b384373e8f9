//! Encoder configuration and the whole-frame encode session.
//!
//! A session validates the configuration before any byte is written, then
//! tokenizes every scan, fits the Huffman plan to the tokens and finally
//! writes markers and scan data to the sink:
//!
//! ```text
//! SOI [APP0] [APP14] DQT SOF ( [DRI] [DHT] SOS data )* EOI
//! ```

use std::io::Write;

use crate::alloc::{checked_size_2d, try_with_capacity, validate_dimensions};
use crate::bitstream::{BitWriter, Destination, DEFAULT_OUTPUT_BUFFER_SIZE};
use crate::consts::{
    JPEG_PRECISION, MAX_AC_CONTEXTS, MAX_COMPONENTS, MAX_QUANT_TABLES, MAX_SAMP_FACTOR,
    NUM_DC_CONTEXTS, NUM_HUFFMAN_SLOTS,
};
use crate::entropy::ScanEncoder;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTable;
use crate::huffman_opt::HuffmanPlan;
use crate::marker::{slots_allow_baseline, MarkerWriter, ScanComponent};
use crate::scan_script::{default_scan_script, validate_scan_script, ScanInfo};
use crate::tokenize::{tokenize_scan, ScanLayout, ScanTokenInfo, TokenStore};
use crate::types::{
    ColorSpace, ComponentCoefficients, ComponentInfo, FrameGeometry, JfifHeader, QuantTable,
    Subsampling,
};

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Frame components in SOF order
    pub components: Vec<ComponentInfo>,
    /// Color space, used for the Adobe transform flag
    pub color_space: ColorSpace,
    /// Write a JFIF APP0 segment
    pub write_jfif: bool,
    /// JFIF header contents
    pub jfif: JfifHeader,
    /// Write an Adobe APP14 segment
    pub write_adobe: bool,
    /// Quantization tables the coefficients were quantized with
    pub quant_tables: [Option<QuantTable>; MAX_QUANT_TABLES],
    /// DC Huffman tables used without optimization
    pub dc_huffman_tables: [Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
    /// AC Huffman tables used without optimization
    pub ac_huffman_tables: [Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
    /// Explicit scan script; `None` selects one by `progressive_level`
    pub scans: Option<Vec<ScanInfo>>,
    /// Built-in scan script level (0 = sequential)
    pub progressive_level: u8,
    /// Restart interval in MCUs (0 = disabled)
    pub restart_interval: u16,
    /// Restart interval in MCU rows, overrides `restart_interval` when set
    pub restart_in_rows: u16,
    /// Fit Huffman tables to the image (always on for progressive)
    pub optimize_coding: bool,
    /// Request arithmetic coding (rejected)
    pub arithmetic_coding: bool,
    /// Sample precision in bits
    pub data_precision: u8,
    /// Capacity of the output buffer in front of the sink
    pub output_buffer_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::grayscale(0, 0)
    }
}

fn standard_huffman_tables() -> (
    [Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
    [Option<HuffmanTable>; NUM_HUFFMAN_SLOTS],
) {
    (
        [
            Some(HuffmanTable::std_dc_luminance()),
            Some(HuffmanTable::std_dc_chrominance()),
            None,
            None,
        ],
        [
            Some(HuffmanTable::std_ac_luminance()),
            Some(HuffmanTable::std_ac_chrominance()),
            None,
            None,
        ],
    )
}

impl EncoderConfig {
    /// Single-component frame using table set 0.
    #[must_use]
    pub fn grayscale(width: u32, height: u32) -> Self {
        let (dc_huffman_tables, ac_huffman_tables) = standard_huffman_tables();
        Self {
            width,
            height,
            components: vec![ComponentInfo::new(1, 0)],
            color_space: ColorSpace::Grayscale,
            write_jfif: true,
            jfif: JfifHeader::default(),
            write_adobe: false,
            quant_tables: [Some(QuantTable::default()), None, None, None],
            dc_huffman_tables,
            ac_huffman_tables,
            scans: None,
            progressive_level: 0,
            restart_interval: 0,
            restart_in_rows: 0,
            optimize_coding: true,
            arithmetic_coding: false,
            data_precision: JPEG_PRECISION,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
        }
    }

    /// Three-component YCbCr frame: luma uses table set 0, chroma set 1.
    #[must_use]
    pub fn ycbcr(width: u32, height: u32, subsampling: Subsampling) -> Self {
        let mut config = Self::grayscale(width, height);
        config.components = vec![
            ComponentInfo::new(1, 0).with_sampling(
                subsampling.h_samp_factor_luma(),
                subsampling.v_samp_factor_luma(),
            ),
            ComponentInfo::new(2, 1),
            ComponentInfo::new(3, 1),
        ];
        config.color_space = ColorSpace::YCbCr;
        config.quant_tables[1] = Some(QuantTable::default());
        config
    }

    /// Checks everything that does not depend on the scan script.
    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.width, self.height)?;

        let n = self.components.len();
        if n == 0 || n > MAX_COMPONENTS {
            return Err(Error::InvalidComponent {
                index: n,
                reason: "number of components must be 1-4",
            });
        }
        if self.color_space != ColorSpace::Unknown && self.color_space.num_components() != n {
            return Err(Error::InvalidComponent {
                index: n,
                reason: "component count does not match color space",
            });
        }
        if self.data_precision != JPEG_PRECISION {
            return Err(Error::UnsupportedFeature {
                feature: "data precision other than 8 bits",
            });
        }
        if self.arithmetic_coding {
            return Err(Error::UnsupportedFeature {
                feature: "arithmetic coding",
            });
        }

        let max_h = self.components.iter().map(|c| c.h_samp_factor).max().unwrap_or(1);
        let max_v = self.components.iter().map(|c| c.v_samp_factor).max().unwrap_or(1);
        for (index, comp) in self.components.iter().enumerate() {
            if !(1..=MAX_SAMP_FACTOR).contains(&comp.h_samp_factor)
                || !(1..=MAX_SAMP_FACTOR).contains(&comp.v_samp_factor)
            {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "sampling factor must be 1-4",
                });
            }
            if n == 1 && (comp.h_samp_factor != 1 || comp.v_samp_factor != 1) {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "single component must use 1x1 sampling",
                });
            }
            if max_h % comp.h_samp_factor != 0 || max_v % comp.v_samp_factor != 0 {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "non-integral subsampling ratio",
                });
            }
            if self.components[..index].iter().any(|c| c.id == comp.id) {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "duplicate component id",
                });
            }
            let quant_idx = comp.quant_idx as usize;
            if quant_idx >= MAX_QUANT_TABLES {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "quantization table index out of range",
                });
            }
            let table = self.quant_tables[quant_idx]
                .as_ref()
                .ok_or(Error::MissingTable {
                    kind: "quantization",
                    index: comp.quant_idx,
                })?;
            if table.values.contains(&0) {
                return Err(Error::InvalidQuantTable {
                    table_idx: comp.quant_idx,
                    reason: "zero quantization value",
                });
            }
        }
        Ok(())
    }

    /// Single-scan sequential frames with fixed tables can be written row by
    /// row.
    #[must_use]
    pub fn is_streaming_supported(&self) -> bool {
        let num_scans = match &self.scans {
            Some(scans) => scans.len(),
            None => default_scan_script(self.progressive_level, &self.components).len(),
        };
        self.restart_interval == 0
            && self.restart_in_rows == 0
            && num_scans == 1
            && !self.optimize_coding
    }
}

/// Validated frame layout shared by the whole-frame and streaming paths.
#[derive(Debug, Clone)]
pub(crate) struct FrameSetup {
    pub(crate) geometry: FrameGeometry,
    pub(crate) scans: Vec<ScanInfo>,
    pub(crate) progressive: bool,
    pub(crate) ac_ctx_offset: Vec<u8>,
    pub(crate) num_contexts: usize,
    pub(crate) restart_intervals: Vec<u16>,
}

impl FrameSetup {
    /// Validates `config` and derives scans, contexts and restart intervals.
    pub(crate) fn new(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;
        let scans = match &config.scans {
            Some(scans) => scans.clone(),
            None => default_scan_script(config.progressive_level, &config.components),
        };
        let progressive = validate_scan_script(&scans, &config.components)?;
        let geometry = FrameGeometry::new(config.width, config.height, &config.components);

        let mut ac_ctx_offset = Vec::with_capacity(scans.len());
        let mut num_ac = 0usize;
        for scan in &scans {
            ac_ctx_offset.push((NUM_DC_CONTEXTS + num_ac).min(u8::MAX as usize) as u8);
            if scan.se > 0 {
                num_ac += scan.comps_in_scan as usize;
                if num_ac > MAX_AC_CONTEXTS {
                    return Err(Error::TooManyContexts {
                        count: num_ac,
                        limit: MAX_AC_CONTEXTS,
                    });
                }
            }
        }

        let restart_intervals = scans
            .iter()
            .map(|scan| {
                if config.restart_in_rows > 0 {
                    ScanLayout::new(scan, &geometry).restart_interval_for_rows(config.restart_in_rows)
                } else {
                    config.restart_interval
                }
            })
            .collect();

        log::debug!(
            "{}x{} frame, {} components, {} {} scans, {} contexts",
            config.width,
            config.height,
            config.components.len(),
            scans.len(),
            if progressive { "progressive" } else { "sequential" },
            NUM_DC_CONTEXTS + num_ac
        );

        Ok(Self {
            geometry,
            scans,
            progressive,
            ac_ctx_offset,
            num_contexts: NUM_DC_CONTEXTS + num_ac,
            restart_intervals,
        })
    }

    /// Checks that each coefficient plane matches the frame geometry.
    pub(crate) fn check_coefficients(&self, coefficients: &[ComponentCoefficients]) -> Result<()> {
        if coefficients.len() != self.geometry.components.len() {
            return Err(Error::InvalidBufferSize {
                expected: self.geometry.components.len(),
                actual: coefficients.len(),
            });
        }
        for (plane, comp) in coefficients.iter().zip(&self.geometry.components) {
            let expected =
                checked_size_2d(comp.width_in_blocks, comp.height_in_blocks, "sizing coefficients")?;
            if plane.width_in_blocks != comp.width_in_blocks
                || plane.height_in_blocks != comp.height_in_blocks
                || plane.blocks.len() != expected
            {
                return Err(Error::InvalidBufferSize {
                    expected,
                    actual: plane.blocks.len(),
                });
            }
        }
        Ok(())
    }
}

/// Writes SOI through SOF.
pub(crate) fn write_frame_header<W: Write>(
    config: &EncoderConfig,
    setup: &FrameSetup,
    plan: &HuffmanPlan,
    dest: &mut Destination<W>,
) -> Result<()> {
    let mut mw = MarkerWriter::new(dest);
    mw.write_soi()?;
    if config.write_jfif {
        mw.write_app0(&config.jfif)?;
    }
    if config.write_adobe {
        mw.write_app14(config.color_space)?;
    }
    let dqt_baseline = mw.write_dqt(&config.quant_tables, &config.components)?;
    let baseline = dqt_baseline && !setup.progressive && slots_allow_baseline(&plan.slot_ids);
    log::debug!(
        "frame is {}",
        if setup.progressive {
            "progressive"
        } else if baseline {
            "baseline"
        } else {
            "extended sequential"
        }
    );
    mw.write_sof(
        setup.progressive,
        baseline,
        config.data_precision,
        config.width,
        config.height,
        &config.components,
    )
}

/// Marker state carried from one scan header to the next.
#[derive(Debug, Default)]
pub(crate) struct ScanHeaderWriter {
    next_dht_index: usize,
    last_restart_interval: u16,
}

impl ScanHeaderWriter {
    /// Writes DRI and DHT when needed, then SOS.
    ///
    /// The first scan sends every DC table and up to four AC tables. A later
    /// AC scan sends the next table if its context is the first to use it.
    pub(crate) fn write<W: Write>(
        &mut self,
        config: &EncoderConfig,
        setup: &FrameSetup,
        plan: &HuffmanPlan,
        scan_index: usize,
        dest: &mut Destination<W>,
    ) -> Result<()> {
        let scan = &setup.scans[scan_index];
        let ac_ctx_offset = setup.ac_ctx_offset[scan_index] as usize;
        let mut mw = MarkerWriter::new(dest);

        let restart_interval = setup.restart_intervals[scan_index];
        if restart_interval != self.last_restart_interval {
            mw.write_dri(restart_interval)?;
            self.last_restart_interval = restart_interval;
        }

        let num_dht = if scan_index == 0 {
            let mut num_ac = 0;
            let mut num = 0;
            for &slot in &plan.slot_ids {
                if slot >= 0x10 {
                    if num_ac >= NUM_HUFFMAN_SLOTS {
                        break;
                    }
                    num_ac += 1;
                }
                num += 1;
            }
            num
        } else if scan.ss > 0
            && plan.context_map.get(ac_ctx_offset).map(|&t| t as usize) == Some(self.next_dht_index)
        {
            1
        } else {
            0
        };
        if num_dht > 0 {
            let end = (self.next_dht_index + num_dht).min(plan.tables.len());
            let tables: Vec<(u8, &HuffmanTable)> = (self.next_dht_index..end)
                .map(|i| (plan.slot_ids[i], &plan.tables[i]))
                .collect();
            log::trace!(
                "scan {}: DHT tables {}..{}",
                scan_index,
                self.next_dht_index,
                end
            );
            mw.write_dht(&tables)?;
            self.next_dht_index = end;
        }

        let components: Vec<ScanComponent> = scan
            .components()
            .iter()
            .enumerate()
            .map(|(i, &ci)| ScanComponent {
                id: config.components[ci as usize].id,
                dc_slot: plan.slot_for_context(ci as usize).unwrap_or(0),
                ac_slot: plan.slot_for_context(ac_ctx_offset + i).unwrap_or(0x10),
            })
            .collect();
        mw.write_sos(scan, &components)
    }
}

/// Tokenizes every scan of the frame.
fn tokenize_frame(
    setup: &FrameSetup,
    coefficients: &[ComponentCoefficients],
) -> Result<(TokenStore, Vec<ScanTokenInfo>)> {
    let mut store = TokenStore::new();
    let mut infos = try_with_capacity(setup.scans.len(), "allocating scan info")?;
    for (scan_index, scan) in setup.scans.iter().enumerate() {
        infos.push(tokenize_scan(
            scan_index,
            scan,
            setup.progressive,
            setup.ac_ctx_offset[scan_index],
            setup.restart_intervals[scan_index],
            &setup.geometry,
            coefficients,
            &mut store,
        )?);
    }
    log::debug!("tokenized {} scans into {} tokens", infos.len(), store.len());
    Ok((store, infos))
}

/// JPEG entropy encoder for quantized DCT coefficients.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    /// Creates a new encoder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder from configuration.
    #[must_use]
    pub fn from_config(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Sets the image width.
    #[must_use]
    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    /// Sets the image height.
    #[must_use]
    pub fn height(mut self, height: u32) -> Self {
        self.config.height = height;
        self
    }

    /// Sets the frame components.
    #[must_use]
    pub fn components(mut self, components: Vec<ComponentInfo>) -> Self {
        self.config.components = components;
        self
    }

    /// Sets the color space.
    #[must_use]
    pub fn color_space(mut self, color_space: ColorSpace) -> Self {
        self.config.color_space = color_space;
        self
    }

    /// Enables the JFIF APP0 segment.
    #[must_use]
    pub fn write_jfif(mut self, enable: bool) -> Self {
        self.config.write_jfif = enable;
        self
    }

    /// Sets the JFIF header contents.
    #[must_use]
    pub fn jfif(mut self, jfif: JfifHeader) -> Self {
        self.config.jfif = jfif;
        self
    }

    /// Enables the Adobe APP14 segment.
    #[must_use]
    pub fn write_adobe(mut self, enable: bool) -> Self {
        self.config.write_adobe = enable;
        self
    }

    /// Sets quantization table `index` (0-3).
    #[must_use]
    pub fn quant_table(mut self, index: u8, table: QuantTable) -> Self {
        if let Some(slot) = self.config.quant_tables.get_mut(index as usize) {
            *slot = Some(table);
        }
        self
    }

    /// Sets DC Huffman table `index` (0-3).
    #[must_use]
    pub fn dc_huffman_table(mut self, index: u8, table: HuffmanTable) -> Self {
        if let Some(slot) = self.config.dc_huffman_tables.get_mut(index as usize) {
            *slot = Some(table);
        }
        self
    }

    /// Sets AC Huffman table `index` (0-3).
    #[must_use]
    pub fn ac_huffman_table(mut self, index: u8, table: HuffmanTable) -> Self {
        if let Some(slot) = self.config.ac_huffman_tables.get_mut(index as usize) {
            *slot = Some(table);
        }
        self
    }

    /// Sets an explicit scan script.
    #[must_use]
    pub fn scans(mut self, scans: Vec<ScanInfo>) -> Self {
        self.config.scans = Some(scans);
        self
    }

    /// Selects a built-in scan script (0 = sequential).
    #[must_use]
    pub fn progressive_level(mut self, level: u8) -> Self {
        self.config.progressive_level = level;
        self
    }

    /// Sets the restart interval in MCUs.
    #[must_use]
    pub fn restart_interval(mut self, interval: u16) -> Self {
        self.config.restart_interval = interval;
        self
    }

    /// Sets the restart interval in MCU rows.
    #[must_use]
    pub fn restart_in_rows(mut self, rows: u16) -> Self {
        self.config.restart_in_rows = rows;
        self
    }

    /// Enables optimized Huffman tables.
    #[must_use]
    pub fn optimize_coding(mut self, enable: bool) -> Self {
        self.config.optimize_coding = enable;
        self
    }

    /// Requests arithmetic coding.
    #[must_use]
    pub fn arithmetic_coding(mut self, enable: bool) -> Self {
        self.config.arithmetic_coding = enable;
        self
    }

    /// Sets the sample precision.
    #[must_use]
    pub fn data_precision(mut self, precision: u8) -> Self {
        self.config.data_precision = precision;
        self
    }

    /// Sets the output buffer capacity.
    #[must_use]
    pub fn output_buffer_size(mut self, size: usize) -> Self {
        self.config.output_buffer_size = size;
        self
    }

    /// Encodes one frame of coefficients into `sink` and returns the sink.
    ///
    /// `coefficients` holds one plane per component, sized to the frame
    /// geometry. On error, bytes already written to the sink are not a
    /// valid JPEG and must be discarded.
    pub fn encode<W: Write>(&self, coefficients: &[ComponentCoefficients], sink: W) -> Result<W> {
        let config = &self.config;
        let setup = FrameSetup::new(config)?;
        setup.check_coefficients(coefficients)?;

        let (store, infos) = tokenize_frame(&setup, coefficients)?;

        let plan = if setup.progressive || config.optimize_coding {
            let histograms = store.histograms(&infos, setup.num_contexts);
            HuffmanPlan::optimize(&histograms, config.components.len())
        } else {
            HuffmanPlan::from_explicit_tables(
                &config.dc_huffman_tables,
                &config.ac_huffman_tables,
                &config.components,
                &setup.scans,
            )?
        };

        let mut dest = Destination::new(sink, config.output_buffer_size);
        write_frame_header(config, &setup, &plan, &mut dest)?;

        let mut headers = ScanHeaderWriter::default();
        let mut bw = BitWriter::with_capacity(config.output_buffer_size.min(DEFAULT_OUTPUT_BUFFER_SIZE));
        for info in &infos {
            let start = dest.bytes_written();
            headers.write(config, &setup, &plan, info.scan_index, &mut dest)?;
            ScanEncoder::new(&mut bw, &mut dest, &plan, config.output_buffer_size)
                .write_scan(info, store.scan_tokens(info))?;
            log::debug!(
                "scan {}: {} bytes",
                info.scan_index,
                dest.bytes_written() - start
            );
        }

        MarkerWriter::new(&mut dest).write_eoi()?;
        log::debug!("encoded {} bytes", dest.bytes_written());
        dest.finish()
    }

    /// Encodes one frame into a new `Vec<u8>`.
    pub fn encode_to_vec(&self, coefficients: &[ComponentCoefficients]) -> Result<Vec<u8>> {
        self.encode(coefficients, Vec::new())
    }
}
