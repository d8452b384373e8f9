//! Row-by-row encoding of single-scan sequential frames.
//!
//! Tokens of each iMCU row are written as soon as the row arrives, so the
//! frame's coefficients never need to be held in memory at once. This
//! requires fixed Huffman tables and no restart markers.

use std::io::Write;

use crate::alloc::checked_size_2d;
use crate::bitstream::{BitWriter, Destination};
use crate::encode::{write_frame_header, Encoder, EncoderConfig, FrameSetup, ScanHeaderWriter};
use crate::entropy::ScanEncoder;
use crate::error::{Error, Result};
use crate::huffman_opt::HuffmanPlan;
use crate::marker::MarkerWriter;
use crate::tokenize::{max_num_tokens_per_mcu_row, ScanLayout, ScanTokenizer, Token, DUMMY_BLOCK};
use crate::types::ComponentCoefficients;

const CONTEXT: &str = "write_mcu_row";

impl Encoder {
    /// Writes the headers and returns an encoder that accepts one iMCU row
    /// of coefficients at a time.
    ///
    /// Only single-scan sequential frames without restart markers and with
    /// fixed Huffman tables can be streamed; anything else returns
    /// [`Error::UnsupportedFeature`].
    pub fn start_streaming<W: Write>(&self, sink: W) -> Result<StreamingEncoder<W>> {
        let config = self.config().clone();
        let setup = FrameSetup::new(&config)?;
        if config.optimize_coding {
            return Err(Error::UnsupportedFeature {
                feature: "streaming with optimized Huffman tables",
            });
        }
        if config.restart_interval != 0 || config.restart_in_rows != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "streaming with restart markers",
            });
        }
        if setup.scans.len() != 1 || setup.progressive {
            return Err(Error::UnsupportedFeature {
                feature: "streaming with more than one scan",
            });
        }

        let plan = HuffmanPlan::from_explicit_tables(
            &config.dc_huffman_tables,
            &config.ac_huffman_tables,
            &config.components,
            &setup.scans,
        )?;
        let mut dest = Destination::new(sink, config.output_buffer_size);
        write_frame_header(&config, &setup, &plan, &mut dest)?;
        ScanHeaderWriter::default().write(&config, &setup, &plan, 0, &mut dest)?;

        let scan = &setup.scans[0];
        let layout = ScanLayout::new(scan, &setup.geometry);
        let tokenizer = ScanTokenizer::new(0, scan, false, setup.ac_ctx_offset[0], 0, 0);
        let tokens = Vec::with_capacity(max_num_tokens_per_mcu_row(&setup.geometry));
        log::debug!(
            "streaming {} iMCU rows of {} MCUs",
            layout.mcu_rows,
            layout.mcus_per_row
        );

        Ok(StreamingEncoder {
            config,
            setup,
            plan,
            layout,
            tokenizer,
            tokens,
            bw: BitWriter::new(),
            dest,
            rows_written: 0,
        })
    }
}

/// Encoder session fed one iMCU row at a time.
///
/// Created by [`Encoder::start_streaming`].
#[derive(Debug)]
pub struct StreamingEncoder<W: Write> {
    config: EncoderConfig,
    setup: FrameSetup,
    plan: HuffmanPlan,
    layout: ScanLayout,
    tokenizer: ScanTokenizer,
    tokens: Vec<Token>,
    bw: BitWriter,
    dest: Destination<W>,
    rows_written: usize,
}

impl<W: Write> StreamingEncoder<W> {
    /// Number of iMCU rows in the frame.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.layout.mcu_rows
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Encodes the next iMCU row.
    ///
    /// `rows[c]` holds the blocks of component `c` for this row: the
    /// component's full width in blocks, and as many block rows as the
    /// component contributes to one MCU row. Blocks below the bottom of the
    /// component are ignored.
    pub fn write_mcu_row(&mut self, rows: &[ComponentCoefficients]) -> Result<()> {
        if self.rows_written >= self.layout.mcu_rows {
            return Err(Error::TooManyRows {
                limit: self.layout.mcu_rows,
            });
        }
        self.check_rows(rows)?;

        let mcu_y = self.rows_written;
        self.tokens.clear();
        for mcu_x in 0..self.layout.mcus_per_row {
            self.tokenizer.begin_mcu(&mut self.tokens);
            for (i, &(comp_idx, n_x, n_y)) in self.layout.components.iter().enumerate() {
                let comp = &self.setup.geometry.components[comp_idx];
                let plane = &rows[comp_idx];
                for iy in 0..n_y {
                    for ix in 0..n_x {
                        let bx = mcu_x * n_x + ix;
                        let by = mcu_y * n_y + iy;
                        let block = if bx >= comp.width_in_blocks || by >= comp.height_in_blocks {
                            &DUMMY_BLOCK
                        } else {
                            plane.block(bx, iy)
                        };
                        self.tokenizer.add_block(&mut self.tokens, i, comp_idx, block)?;
                    }
                }
            }
        }

        let mut encoder = ScanEncoder::new(
            &mut self.bw,
            &mut self.dest,
            &self.plan,
            self.config.output_buffer_size,
        );
        encoder.write_tokens(&self.tokens, CONTEXT)?;
        if !self.bw.is_healthy() {
            return Err(Error::UnhealthyBitWriter { scan: 0 });
        }
        self.bw.empty_into(&mut self.dest, CONTEXT)?;
        self.dest.drain(CONTEXT)?;

        self.rows_written += 1;
        log::trace!(
            "row {}/{}: {} tokens",
            self.rows_written,
            self.layout.mcu_rows,
            self.tokens.len()
        );
        Ok(())
    }

    fn check_rows(&self, rows: &[ComponentCoefficients]) -> Result<()> {
        let components = &self.setup.geometry.components;
        if rows.len() != components.len() {
            return Err(Error::InvalidBufferSize {
                expected: components.len(),
                actual: rows.len(),
            });
        }
        for &(comp_idx, _, n_y) in &self.layout.components {
            let width = components[comp_idx].width_in_blocks;
            let plane = &rows[comp_idx];
            let expected = checked_size_2d(width, n_y, "sizing coefficient row")?;
            if plane.width_in_blocks != width
                || plane.height_in_blocks != n_y
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

    /// Finishes the scan, writes EOI and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        if self.rows_written < self.layout.mcu_rows {
            return Err(Error::IncompleteImage {
                expected: self.layout.mcu_rows,
                received: self.rows_written,
            });
        }
        ScanEncoder::new(
            &mut self.bw,
            &mut self.dest,
            &self.plan,
            self.config.output_buffer_size,
        )
        .finish_scan(0, "finish_compress")?;
        MarkerWriter::new(&mut self.dest).write_eoi()?;
        log::debug!("streamed {} bytes", self.dest.bytes_written());
        self.dest.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subsampling;

    fn fixed(config: EncoderConfig) -> Encoder {
        Encoder::from_config(config).optimize_coding(false)
    }

    fn row_planes(encoder: &StreamingEncoder<Vec<u8>>) -> Vec<ComponentCoefficients> {
        encoder
            .layout
            .components
            .iter()
            .map(|&(comp_idx, _, n_y)| {
                ComponentCoefficients::new(encoder.setup.geometry.components[comp_idx].width_in_blocks, n_y)
            })
            .collect()
    }

    #[test]
    fn test_streaming_matches_whole_frame() {
        let config = EncoderConfig::grayscale(24, 20);
        let mut whole = ComponentCoefficients::new(3, 3);
        for (i, block) in whole.blocks.iter_mut().enumerate() {
            block[0] = (i as i16) * 3 - 7;
            block[1] = (i % 4) as i16 - 1;
        }
        let expected = fixed(config.clone()).encode_to_vec(&[whole.clone()]).unwrap();

        let mut stream = fixed(config).start_streaming(Vec::new()).unwrap();
        assert_eq!(stream.total_rows(), 3);
        for by in 0..3 {
            let mut row = ComponentCoefficients::new(3, 1);
            for bx in 0..3 {
                *row.block_mut(bx, 0) = *whole.block(bx, by);
            }
            stream.write_mcu_row(&[row]).unwrap();
        }
        assert_eq!(stream.finish().unwrap(), expected);
    }

    #[test]
    fn test_streaming_interleaved_subsampled() {
        let config = EncoderConfig::ycbcr(40, 24, Subsampling::S420);
        let encoder = fixed(config);
        let mut stream = encoder.start_streaming(Vec::new()).unwrap();
        assert_eq!(stream.total_rows(), 2);
        while stream.rows_written() < stream.total_rows() {
            let rows = row_planes(&stream);
            assert_eq!(rows[0].height_in_blocks, 2);
            assert_eq!(rows[1].height_in_blocks, 1);
            stream.write_mcu_row(&rows).unwrap();
        }
        let rows = row_planes(&stream);
        assert_eq!(
            stream.write_mcu_row(&rows).unwrap_err(),
            Error::TooManyRows { limit: 2 }
        );
        let jpeg = stream.finish().unwrap();
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_streaming_incomplete() {
        let stream = fixed(EncoderConfig::grayscale(8, 16))
            .start_streaming(Vec::new())
            .unwrap();
        assert_eq!(
            stream.finish().unwrap_err(),
            Error::IncompleteImage {
                expected: 2,
                received: 0
            }
        );
    }

    #[test]
    fn test_streaming_rejects_unsupported_modes() {
        let config = EncoderConfig::grayscale(16, 16);
        assert!(Encoder::from_config(config.clone())
            .start_streaming(Vec::new())
            .is_err());
        assert!(fixed(config.clone())
            .restart_interval(1)
            .start_streaming(Vec::new())
            .is_err());
        assert!(fixed(config.clone())
            .progressive_level(1)
            .start_streaming(Vec::new())
            .is_err());
        assert!(!config.is_streaming_supported());
        let mut fixed_config = config;
        fixed_config.optimize_coding = false;
        assert!(fixed_config.is_streaming_supported());
    }

    #[test]
    fn test_streaming_row_shape_checked() {
        let mut stream = fixed(EncoderConfig::grayscale(16, 16))
            .start_streaming(Vec::new())
            .unwrap();
        let err = stream
            .write_mcu_row(&[ComponentCoefficients::new(1, 1)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBufferSize { .. }));
    }
}
