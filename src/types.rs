//! Core types shared by the entropy coder and marker writer.

use crate::consts::{DCT_BLOCK_SIZE, DCT_SIZE};

/// Color space of the encoded components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ColorSpace {
    /// Unknown or unspecified color space
    #[default]
    Unknown = 0,
    /// Grayscale (single channel)
    Grayscale = 1,
    /// RGB color space
    Rgb = 2,
    /// YCbCr color space (typical JPEG)
    YCbCr = 3,
    /// CMYK color space
    Cmyk = 4,
    /// YCCK color space (CMYK encoded as YCbCr + K)
    Ycck = 5,
}

impl ColorSpace {
    /// Returns the number of components for this color space.
    #[must_use]
    pub const fn num_components(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Grayscale => 1,
            Self::Rgb | Self::YCbCr => 3,
            Self::Cmyk | Self::Ycck => 4,
        }
    }

    /// Transform flag written into the Adobe APP14 segment.
    #[must_use]
    pub const fn adobe_transform(self) -> u8 {
        match self {
            Self::YCbCr => 1,
            Self::Ycck => 2,
            _ => 0,
        }
    }
}

/// Chroma subsampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subsampling {
    /// 4:4:4 - No subsampling
    #[default]
    S444,
    /// 4:2:2 - Horizontal subsampling only
    S422,
    /// 4:2:0 - Both horizontal and vertical subsampling
    S420,
    /// 4:4:0 - Vertical subsampling only (rare)
    S440,
}

impl Subsampling {
    /// Returns the horizontal sampling factor for luma.
    #[must_use]
    pub const fn h_samp_factor_luma(self) -> u8 {
        match self {
            Self::S444 | Self::S440 => 1,
            Self::S422 | Self::S420 => 2,
        }
    }

    /// Returns the vertical sampling factor for luma.
    #[must_use]
    pub const fn v_samp_factor_luma(self) -> u8 {
        match self {
            Self::S444 | Self::S422 => 1,
            Self::S420 | Self::S440 => 2,
        }
    }
}

/// A single component of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Component ID written to SOF/SOS (1=Y, 2=Cb, 3=Cr by convention)
    pub id: u8,
    /// Horizontal sampling factor (1-4)
    pub h_samp_factor: u8,
    /// Vertical sampling factor (1-4)
    pub v_samp_factor: u8,
    /// Quantization table index (0-3)
    pub quant_idx: u8,
    /// DC Huffman table index used when codes are not optimized (0-3)
    pub dc_table: u8,
    /// AC Huffman table index used when codes are not optimized (0-3)
    pub ac_table: u8,
}

impl Default for ComponentInfo {
    fn default() -> Self {
        Self {
            id: 1,
            h_samp_factor: 1,
            v_samp_factor: 1,
            quant_idx: 0,
            dc_table: 0,
            ac_table: 0,
        }
    }
}

impl ComponentInfo {
    /// Creates a component with 1x1 sampling and table set `tables`.
    #[must_use]
    pub const fn new(id: u8, tables: u8) -> Self {
        Self {
            id,
            h_samp_factor: 1,
            v_samp_factor: 1,
            quant_idx: tables,
            dc_table: tables,
            ac_table: tables,
        }
    }

    /// Sets the sampling factors.
    #[must_use]
    pub const fn with_sampling(mut self, h: u8, v: u8) -> Self {
        self.h_samp_factor = h;
        self.v_samp_factor = v;
        self
    }

    /// Blocks this component contributes to one interleaved MCU.
    #[must_use]
    pub const fn blocks_in_mcu(&self) -> usize {
        self.h_samp_factor as usize * self.v_samp_factor as usize
    }
}

/// A quantization table.
///
/// The encoder never quantizes; the table is only written to DQT and decides
/// whether the frame can be baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    /// Quantization values in natural (row-major) order
    pub values: [u16; DCT_BLOCK_SIZE],
}

impl Default for QuantTable {
    fn default() -> Self {
        Self {
            values: [1; DCT_BLOCK_SIZE],
        }
    }
}

impl QuantTable {
    /// Creates a table from values in natural order.
    #[must_use]
    pub const fn new(values: [u16; DCT_BLOCK_SIZE]) -> Self {
        Self { values }
    }

    /// Creates a table with every entry set to `value`.
    #[must_use]
    pub const fn flat(value: u16) -> Self {
        Self {
            values: [value; DCT_BLOCK_SIZE],
        }
    }

    /// DQT precision flag: 1 when any value needs 16 bits.
    #[must_use]
    pub fn precision(&self) -> u8 {
        u8::from(self.values.iter().any(|&v| v > 255))
    }
}

/// Density unit of the JFIF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DensityUnit {
    /// Aspect ratio only
    #[default]
    None = 0,
    /// Dots per inch
    PerInch = 1,
    /// Dots per centimeter
    PerCm = 2,
}

/// Contents of the JFIF APP0 segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JfifHeader {
    /// Major version
    pub major_version: u8,
    /// Minor version
    pub minor_version: u8,
    /// Density unit
    pub density_unit: DensityUnit,
    /// Horizontal density
    pub x_density: u16,
    /// Vertical density
    pub y_density: u16,
}

impl Default for JfifHeader {
    fn default() -> Self {
        Self {
            major_version: 1,
            minor_version: 1,
            density_unit: DensityUnit::None,
            x_density: 1,
            y_density: 1,
        }
    }
}

/// DCT coefficient type (after quantization).
pub type Coeff = i16;

/// A single 8x8 block of quantized coefficients in natural order.
pub type CoeffBlock = [Coeff; DCT_BLOCK_SIZE];

/// All quantized blocks of one component, in row-major block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCoefficients {
    /// Blocks per row
    pub width_in_blocks: usize,
    /// Block rows
    pub height_in_blocks: usize,
    /// `width_in_blocks * height_in_blocks` blocks
    pub blocks: Vec<CoeffBlock>,
}

impl ComponentCoefficients {
    /// Creates an all-zero coefficient plane.
    #[must_use]
    pub fn new(width_in_blocks: usize, height_in_blocks: usize) -> Self {
        Self {
            width_in_blocks,
            height_in_blocks,
            blocks: vec![[0; DCT_BLOCK_SIZE]; width_in_blocks * height_in_blocks],
        }
    }

    /// Returns the block at block coordinates `(bx, by)`.
    #[inline]
    #[must_use]
    pub fn block(&self, bx: usize, by: usize) -> &CoeffBlock {
        &self.blocks[by * self.width_in_blocks + bx]
    }

    /// Returns the block at block coordinates `(bx, by)` mutably.
    #[inline]
    pub fn block_mut(&mut self, bx: usize, by: usize) -> &mut CoeffBlock {
        &mut self.blocks[by * self.width_in_blocks + bx]
    }
}

/// Block geometry of one component, derived from the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGeometry {
    /// Horizontal sampling factor
    pub h_samp_factor: usize,
    /// Vertical sampling factor
    pub v_samp_factor: usize,
    /// Blocks per row
    pub width_in_blocks: usize,
    /// Block rows
    pub height_in_blocks: usize,
}

/// Frame geometry: sampling maxima, iMCU grid and per-component block sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Largest horizontal sampling factor
    pub max_h_samp_factor: usize,
    /// Largest vertical sampling factor
    pub max_v_samp_factor: usize,
    /// iMCU columns (MCUs per row of an interleaved scan)
    pub imcu_cols: usize,
    /// iMCU rows (MCU rows of an interleaved scan)
    pub imcu_rows: usize,
    /// Per-component block geometry
    pub components: Vec<ComponentGeometry>,
}

impl FrameGeometry {
    /// Derives the geometry from image size and sampling factors.
    ///
    /// Sampling factors must already be validated as non-zero with integral
    /// ratios to the maxima.
    #[must_use]
    pub fn new(width: u32, height: u32, components: &[ComponentInfo]) -> Self {
        let width = width as usize;
        let height = height as usize;
        let max_h = components
            .iter()
            .map(|c| c.h_samp_factor as usize)
            .max()
            .unwrap_or(1)
            .max(1);
        let max_v = components
            .iter()
            .map(|c| c.v_samp_factor as usize)
            .max()
            .unwrap_or(1)
            .max(1);
        let components = components
            .iter()
            .map(|c| {
                let h = (c.h_samp_factor as usize).max(1);
                let v = (c.v_samp_factor as usize).max(1);
                let downsampled_w = width.div_ceil(max_h / h);
                let downsampled_h = height.div_ceil(max_v / v);
                ComponentGeometry {
                    h_samp_factor: h,
                    v_samp_factor: v,
                    width_in_blocks: downsampled_w.div_ceil(DCT_SIZE),
                    height_in_blocks: downsampled_h.div_ceil(DCT_SIZE),
                }
            })
            .collect();
        Self {
            width,
            height,
            max_h_samp_factor: max_h,
            max_v_samp_factor: max_v,
            imcu_cols: width.div_ceil(DCT_SIZE * max_h),
            imcu_rows: height.div_ceil(DCT_SIZE * max_v),
            components,
        }
    }

    /// Blocks in one interleaved MCU covering every component.
    #[must_use]
    pub fn blocks_per_imcu(&self) -> usize {
        self.components
            .iter()
            .map(|c| c.h_samp_factor * c.v_samp_factor)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_space_components() {
        assert_eq!(ColorSpace::Grayscale.num_components(), 1);
        assert_eq!(ColorSpace::Rgb.num_components(), 3);
        assert_eq!(ColorSpace::YCbCr.num_components(), 3);
        assert_eq!(ColorSpace::Cmyk.num_components(), 4);
    }

    #[test]
    fn test_adobe_transform() {
        assert_eq!(ColorSpace::YCbCr.adobe_transform(), 1);
        assert_eq!(ColorSpace::Ycck.adobe_transform(), 2);
        assert_eq!(ColorSpace::Rgb.adobe_transform(), 0);
        assert_eq!(ColorSpace::Cmyk.adobe_transform(), 0);
    }

    #[test]
    fn test_quant_precision() {
        assert_eq!(QuantTable::flat(255).precision(), 0);
        let mut table = QuantTable::flat(10);
        table.values[63] = 256;
        assert_eq!(table.precision(), 1);
    }

    #[test]
    fn test_geometry_420() {
        let comps = [
            ComponentInfo::new(1, 0).with_sampling(2, 2),
            ComponentInfo::new(2, 1),
            ComponentInfo::new(3, 1),
        ];
        let geom = FrameGeometry::new(33, 17, &comps);
        assert_eq!(geom.max_h_samp_factor, 2);
        assert_eq!(geom.imcu_cols, 3);
        assert_eq!(geom.imcu_rows, 2);
        assert_eq!(geom.components[0].width_in_blocks, 5);
        assert_eq!(geom.components[0].height_in_blocks, 3);
        // 33 -> 17 chroma columns -> 3 blocks
        assert_eq!(geom.components[1].width_in_blocks, 3);
        assert_eq!(geom.components[1].height_in_blocks, 2);
        assert_eq!(geom.blocks_per_imcu(), 6);
    }

    #[test]
    fn test_coefficient_plane_indexing() {
        let mut plane = ComponentCoefficients::new(3, 2);
        plane.block_mut(2, 1)[0] = 7;
        assert_eq!(plane.blocks[5][0], 7);
        assert_eq!(plane.block(2, 1)[0], 7);
    }
}
