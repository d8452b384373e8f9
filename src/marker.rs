//! JPEG marker segments.
//!
//! Each method of [`MarkerWriter`] builds one complete segment, computes its
//! big-endian length and hands it to the destination.

use std::io::Write;

use crate::bitstream::Destination;
use crate::consts::{
    DCT_BLOCK_SIZE, JPEG_NATURAL_ORDER, JPEG_PRECISION, MARKER_APP0, MARKER_APP14, MARKER_DHT,
    MARKER_DQT, MARKER_DRI, MARKER_EOI, MARKER_SOF0, MARKER_SOF1, MARKER_SOF2, MARKER_SOI,
    MARKER_SOS, MAX_QUANT_TABLES,
};
use crate::error::{Error, Result};
use crate::huffman::HuffmanTable;
use crate::scan_script::ScanInfo;
use crate::types::{ColorSpace, ComponentInfo, JfifHeader, QuantTable};

const CONTEXT: &str = "markers";

/// Component selector of an SOS segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    /// Component id from the frame header
    pub id: u8,
    /// DC table slot (0x00..=0x03)
    pub dc_slot: u8,
    /// AC table slot (0x10..=0x13)
    pub ac_slot: u8,
}

/// True if the Huffman slot ids allow a baseline (SOF0) frame.
///
/// Baseline decoders only know DC slots 0-1 and AC slots 0x10-0x11.
#[must_use]
pub fn slots_allow_baseline(slot_ids: &[u8]) -> bool {
    slot_ids
        .iter()
        .all(|&slot| slot <= 0x11 && !(0x02..=0x0F).contains(&slot))
}

/// Starts a segment: marker plus a placeholder length.
fn begin_segment(marker: u8, capacity: usize) -> Vec<u8> {
    let mut seg = Vec::with_capacity(capacity + 4);
    seg.extend_from_slice(&[0xFF, marker, 0, 0]);
    seg
}

/// Patches the length field once the payload is complete.
fn end_segment(seg: &mut [u8]) {
    let len = (seg.len() - 2) as u16;
    seg[2..4].copy_from_slice(&len.to_be_bytes());
}

/// Writes marker segments into a [`Destination`].
pub struct MarkerWriter<'a, W: Write> {
    dest: &'a mut Destination<W>,
}

impl<'a, W: Write> MarkerWriter<'a, W> {
    /// Creates a writer borrowing `dest`.
    pub fn new(dest: &'a mut Destination<W>) -> Self {
        Self { dest }
    }

    fn emit(&mut self, mut seg: Vec<u8>) -> Result<()> {
        end_segment(&mut seg);
        self.dest.write_all(&seg, CONTEXT)
    }

    /// Start of image.
    pub fn write_soi(&mut self) -> Result<()> {
        self.dest.write_all(&[0xFF, MARKER_SOI], CONTEXT)
    }

    /// End of image.
    pub fn write_eoi(&mut self) -> Result<()> {
        self.dest.write_all(&[0xFF, MARKER_EOI], CONTEXT)
    }

    /// JFIF APP0 segment without thumbnail.
    pub fn write_app0(&mut self, jfif: &JfifHeader) -> Result<()> {
        let mut seg = begin_segment(MARKER_APP0, 14);
        seg.extend_from_slice(b"JFIF\0");
        seg.push(jfif.major_version);
        seg.push(jfif.minor_version);
        seg.push(jfif.density_unit as u8);
        seg.extend_from_slice(&jfif.x_density.to_be_bytes());
        seg.extend_from_slice(&jfif.y_density.to_be_bytes());
        seg.extend_from_slice(&[0, 0]);
        self.emit(seg)
    }

    /// Adobe APP14 segment carrying the color transform flag.
    pub fn write_app14(&mut self, color_space: ColorSpace) -> Result<()> {
        let mut seg = begin_segment(MARKER_APP14, 12);
        seg.extend_from_slice(b"Adobe");
        seg.extend_from_slice(&[0x00, 0x64]);
        seg.extend_from_slice(&[0, 0, 0, 0]);
        seg.push(color_space.adobe_transform());
        self.emit(seg)
    }

    /// Writes every quantization table referenced by `components`.
    ///
    /// Returns true if all tables fit 8-bit precision.
    pub fn write_dqt(
        &mut self,
        tables: &[Option<QuantTable>; MAX_QUANT_TABLES],
        components: &[ComponentInfo],
    ) -> Result<bool> {
        let mut used = [false; MAX_QUANT_TABLES];
        for (index, comp) in components.iter().enumerate() {
            let idx = comp.quant_idx as usize;
            if idx >= MAX_QUANT_TABLES {
                return Err(Error::InvalidComponent {
                    index,
                    reason: "quantization table index out of range",
                });
            }
            used[idx] = true;
        }

        let mut seg = begin_segment(MARKER_DQT, MAX_QUANT_TABLES * (1 + 2 * DCT_BLOCK_SIZE));
        let mut is_baseline = true;
        for (idx, _) in used.iter().enumerate().filter(|(_, &u)| u) {
            let table = tables[idx].as_ref().ok_or(Error::MissingTable {
                kind: "quantization",
                index: idx as u8,
            })?;
            if table.values.contains(&0) {
                return Err(Error::InvalidQuantTable {
                    table_idx: idx as u8,
                    reason: "zero quantization value",
                });
            }
            let precision = table.precision();
            if precision != 0 {
                is_baseline = false;
            }
            seg.push((precision << 4) + idx as u8);
            for &pos in &JPEG_NATURAL_ORDER[..DCT_BLOCK_SIZE] {
                let value = table.values[pos as usize];
                if precision != 0 {
                    seg.extend_from_slice(&value.to_be_bytes());
                } else {
                    seg.push(value as u8);
                }
            }
        }
        self.emit(seg)?;
        Ok(is_baseline)
    }

    /// Start of frame. The marker is SOF2, SOF0 or SOF1.
    pub fn write_sof(
        &mut self,
        progressive: bool,
        baseline: bool,
        data_precision: u8,
        width: u32,
        height: u32,
        components: &[ComponentInfo],
    ) -> Result<()> {
        if data_precision != JPEG_PRECISION {
            return Err(Error::UnsupportedFeature {
                feature: "data precision other than 8 bits",
            });
        }
        let marker = if progressive {
            MARKER_SOF2
        } else if baseline {
            MARKER_SOF0
        } else {
            MARKER_SOF1
        };
        let mut seg = begin_segment(marker, 6 + 3 * components.len());
        seg.push(data_precision);
        seg.extend_from_slice(&(height as u16).to_be_bytes());
        seg.extend_from_slice(&(width as u16).to_be_bytes());
        seg.push(components.len() as u8);
        for comp in components {
            seg.push(comp.id);
            seg.push((comp.h_samp_factor << 4) | comp.v_samp_factor);
            seg.push(comp.quant_idx);
        }
        self.emit(seg)
    }

    /// One DHT segment holding every `(slot_id, table)` pair.
    pub fn write_dht(&mut self, tables: &[(u8, &HuffmanTable)]) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        let payload: usize = tables.iter().map(|(_, t)| 17 + t.num_symbols()).sum();
        let mut seg = begin_segment(MARKER_DHT, payload);
        for (slot_id, table) in tables {
            let values =
                table
                    .values
                    .get(..table.num_symbols())
                    .ok_or(Error::InvalidHuffmanTable {
                        table_idx: slot_id & 0x0F,
                        reason: "number of values does not match code counts",
                    })?;
            seg.push(*slot_id);
            seg.extend_from_slice(&table.bits);
            seg.extend_from_slice(values);
        }
        self.emit(seg)
    }

    /// Define restart interval.
    pub fn write_dri(&mut self, restart_interval: u16) -> Result<()> {
        let mut seg = begin_segment(MARKER_DRI, 2);
        seg.extend_from_slice(&restart_interval.to_be_bytes());
        self.emit(seg)
    }

    /// Start of scan.
    pub fn write_sos(&mut self, scan: &ScanInfo, components: &[ScanComponent]) -> Result<()> {
        let mut seg = begin_segment(MARKER_SOS, 4 + 2 * components.len());
        seg.push(components.len() as u8);
        for comp in components {
            seg.push(comp.id);
            seg.push((comp.dc_slot << 4) + comp.ac_slot.wrapping_sub(0x10));
        }
        seg.push(scan.ss);
        seg.push(scan.se);
        seg.push((scan.ah << 4) | scan.al);
        self.emit(seg)
    }
}
