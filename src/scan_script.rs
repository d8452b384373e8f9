//! Scan scripts: validation and the built-in progressive levels.
//!
//! A scan script defines how the DCT coefficients are divided into scans.
//! Validation tracks, per component and coefficient, which bit-planes have
//! been coded; a valid script covers bits 0..15 of every coefficient exactly
//! once, with each refinement scan adding the next lower bit.

use crate::consts::{DCT_BLOCK_SIZE, MAX_BLOCKS_IN_MCU, MAX_COMPONENTS, MAX_COMPS_IN_SCAN, MAX_REFINEMENT_BIT};
use crate::error::{Error, Result};
use crate::types::ComponentInfo;

/// A single scan of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanInfo {
    /// Number of components in this scan (1-4)
    pub comps_in_scan: u8,
    /// Component indices (0-based), ascending
    pub component_index: [u8; 4],
    /// Start of spectral selection (0-63)
    pub ss: u8,
    /// End of spectral selection (0-63)
    pub se: u8,
    /// Successive approximation high bit (previous Al)
    pub ah: u8,
    /// Successive approximation low bit
    pub al: u8,
}

/// How a scan is tokenized and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Full spectrum in a non-progressive frame
    Sequential,
    /// Progressive DC, first pass
    DcFirst,
    /// Progressive DC, one refinement bit per block
    DcRefine,
    /// Progressive AC band, first pass
    AcFirst,
    /// Progressive AC band, refinement pass
    AcRefine,
}

impl ScanInfo {
    /// Creates a scan over `components` (at most 4 are used).
    #[must_use]
    pub fn new(components: &[u8], ss: u8, se: u8, ah: u8, al: u8) -> Self {
        let mut component_index = [0u8; MAX_COMPS_IN_SCAN];
        let n = components.len().min(MAX_COMPS_IN_SCAN);
        component_index[..n].copy_from_slice(&components[..n]);
        Self {
            comps_in_scan: n as u8,
            component_index,
            ss,
            se,
            ah,
            al,
        }
    }

    /// Sequential scan covering every coefficient of `components`.
    #[must_use]
    pub fn sequential(components: &[u8]) -> Self {
        Self::new(components, 0, 63, 0, 0)
    }

    /// Component indices of this scan.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[u8] {
        let n = (self.comps_in_scan as usize).min(MAX_COMPS_IN_SCAN);
        &self.component_index[..n]
    }

    /// True if the scan holds more than one component.
    #[inline]
    #[must_use]
    pub fn is_interleaved(&self) -> bool {
        self.comps_in_scan > 1
    }

    /// Check if this is a refinement pass (Ah != 0).
    #[inline]
    #[must_use]
    pub fn is_refinement(&self) -> bool {
        self.ah != 0
    }

    /// Classifies the scan for a frame in the given mode.
    #[must_use]
    pub fn kind(&self, progressive: bool) -> ScanKind {
        match (self.ss > 0, self.ah > 0) {
            _ if !progressive => ScanKind::Sequential,
            (false, false) => ScanKind::DcFirst,
            (false, true) => ScanKind::DcRefine,
            (true, false) => ScanKind::AcFirst,
            (true, true) => ScanKind::AcRefine,
        }
    }
}

/// A frame is progressive unless its first scan covers the full spectrum.
#[must_use]
pub fn is_progressive_script(scans: &[ScanInfo]) -> bool {
    scans.first().is_some_and(|s| s.ss != 0 || s.se != 63)
}

fn script_error(scan_idx: usize, msg: impl std::fmt::Display) -> Error {
    Error::InvalidScanScript(format!("scan {}: {}", scan_idx, msg))
}

/// Validates a scan script against the frame's components.
///
/// Returns whether the script is progressive.
///
/// # Validation Rules
/// 1. At least one scan is required
/// 2. comps_in_scan must be 1-4
/// 3. Component indices must be valid, unique and ascending
/// 4. Ss <= Se <= 63 and Al <= 10
/// 5. Sequential scripts use only full-spectrum scans without approximation
/// 6. Progressive DC scans (Ss = 0) must have Se = 0
/// 7. AC scans (Ss > 0) must have exactly one component
/// 8. DC must be coded before AC for each component
/// 9. A first visit of a coefficient has Ah = 0, a revisit has Ah equal to
///    the previous Al and Al = Ah - 1
/// 10. An interleaved MCU holds at most 10 blocks
/// 11. Every bit of every coefficient is coded
pub fn validate_scan_script(scans: &[ScanInfo], components: &[ComponentInfo]) -> Result<bool> {
    if scans.is_empty() {
        return Err(Error::InvalidScanScript(
            "scan script must contain at least one scan".into(),
        ));
    }
    let progressive = is_progressive_script(scans);
    let num_components = components.len().min(MAX_COMPONENTS);
    let mut comp_mask = [[0u16; DCT_BLOCK_SIZE]; MAX_COMPONENTS];

    for (scan_idx, scan) in scans.iter().enumerate() {
        if scan.comps_in_scan == 0 || scan.comps_in_scan as usize > MAX_COMPS_IN_SCAN {
            return Err(script_error(
                scan_idx,
                format_args!("invalid number of components in scan {}", scan.comps_in_scan),
            ));
        }

        let mut last_ci: Option<u8> = None;
        for &ci in scan.components() {
            if ci as usize >= num_components {
                return Err(script_error(
                    scan_idx,
                    format_args!("invalid component index {} in scan", ci),
                ));
            }
            match last_ci {
                Some(last) if ci == last => {
                    return Err(script_error(
                        scan_idx,
                        format_args!("duplicate component index {} in scan", ci),
                    ))
                }
                Some(last) if ci < last => {
                    return Err(script_error(
                        scan_idx,
                        format_args!("out of order component index {} in scan", ci),
                    ))
                }
                _ => {}
            }
            last_ci = Some(ci);
        }

        if scan.se < scan.ss || scan.se as usize >= DCT_BLOCK_SIZE {
            return Err(script_error(
                scan_idx,
                format_args!("invalid spectral range {} .. {}", scan.ss, scan.se),
            ));
        }
        if scan.al > MAX_REFINEMENT_BIT {
            return Err(script_error(
                scan_idx,
                format_args!("invalid refinement bits {}/{}", scan.ah, scan.al),
            ));
        }
        if !progressive {
            if scan.ss != 0 || scan.se != 63 || scan.ah != 0 || scan.al != 0 {
                return Err(script_error(scan_idx, "invalid scan for sequential mode"));
            }
        } else if scan.ss == 0 && scan.se != 0 {
            return Err(script_error(scan_idx, "DC and AC together in progressive scan"));
        }
        if scan.ss != 0 && scan.comps_in_scan != 1 {
            return Err(script_error(scan_idx, "interleaved AC only scan"));
        }

        for &ci in scan.components() {
            let mask = &mut comp_mask[ci as usize];
            if scan.ss != 0 && mask[0] == 0 {
                return Err(script_error(
                    scan_idx,
                    format_args!("AC before DC in component {}", ci),
                ));
            }
            for k in scan.ss as usize..=scan.se as usize {
                if mask[k] == 0 {
                    if scan.ah != 0 {
                        return Err(script_error(scan_idx, "invalid first scan refinement bit"));
                    }
                    mask[k] = ((0xffffu32 << scan.al) & 0xffff) as u16;
                } else {
                    let expected = ((0xffffu32 << scan.ah) & 0xffff) as u16;
                    if mask[k] != expected || scan.al as i32 != scan.ah as i32 - 1 {
                        return Err(script_error(scan_idx, "invalid refinement bit progression"));
                    }
                    mask[k] |= 1 << scan.al;
                }
            }
        }

        if scan.is_interleaved() {
            let blocks: usize = scan
                .components()
                .iter()
                .map(|&ci| components[ci as usize].blocks_in_mcu())
                .sum();
            if blocks > MAX_BLOCKS_IN_MCU {
                return Err(Error::McuTooLarge {
                    scan: scan_idx,
                    blocks,
                    limit: MAX_BLOCKS_IN_MCU,
                });
            }
        }
    }

    for (c, masks) in comp_mask.iter().enumerate().take(num_components) {
        if let Some(k) = masks.iter().position(|&m| m != 0xffff) {
            return Err(Error::InvalidScanScript(format!(
                "incomplete scan of component {} and frequency {}",
                c, k
            )));
        }
    }

    Ok(progressive)
}

/// One entry of a built-in progression, expanded per component group.
struct ProgressiveScan {
    ss: u8,
    se: u8,
    ah: u8,
    al: u8,
    interleaved: bool,
}

const fn pscan(ss: u8, se: u8, ah: u8, al: u8, interleaved: bool) -> ProgressiveScan {
    ProgressiveScan {
        ss,
        se,
        ah,
        al,
        interleaved,
    }
}

/// Builds the scan script for a progressive level.
///
/// | Level | Scans |
/// |---|---|
/// | 0 | one interleaved sequential scan |
/// | 1 | DC; AC 1..63 Al=1; AC 1..63 refinement |
/// | 2+ | DC; AC 1..2; AC 3..63 Al=2; two refinements of 3..63 |
///
/// DC is interleaved when no component is subsampled. Interleaved entries
/// are split in groups of four components, others into one scan per
/// component.
#[must_use]
pub fn default_scan_script(level: u8, components: &[ComponentInfo]) -> Vec<ScanInfo> {
    let interleave_dc = components
        .iter()
        .all(|c| c.h_samp_factor == 1 && c.v_samp_factor == 1);
    let progression: &[ProgressiveScan] = match level {
        0 => &[pscan(0, 63, 0, 0, true)],
        1 => &[
            pscan(0, 0, 0, 0, interleave_dc),
            pscan(1, 63, 0, 1, false),
            pscan(1, 63, 1, 0, false),
        ],
        _ => &[
            pscan(0, 0, 0, 0, interleave_dc),
            pscan(1, 2, 0, 0, false),
            pscan(3, 63, 0, 2, false),
            pscan(3, 63, 2, 1, false),
            pscan(3, 63, 1, 0, false),
        ],
    };

    let num_components = components.len().min(MAX_COMPONENTS);
    let indices: Vec<u8> = (0..num_components as u8).collect();
    let mut scans = Vec::new();
    for p in progression {
        let group = if p.interleaved { MAX_COMPS_IN_SCAN } else { 1 };
        for chunk in indices.chunks(group) {
            scans.push(ScanInfo::new(chunk, p.ss, p.se, p.ah, p.al));
        }
    }
    scans
}
