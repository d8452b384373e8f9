//! Common test utilities for jpegli-entropy tests.
//!
//! Provides a small coefficient-level JPEG decoder so tests can check that
//! the encoded scans reproduce the input coefficients exactly, plus
//! deterministic coefficient generators.
//!
//! ## Panics
//! The decoder panics on any malformed stream. Tests only feed it output of
//! the encoder under test.

#![allow(dead_code)]

use jpegli_entropy::consts::JPEG_NATURAL_ORDER;
use jpegli_entropy::{ComponentCoefficients, ComponentInfo, FrameGeometry};

/// A decoded frame: headers plus quantized coefficients in natural order.
#[derive(Debug)]
pub struct DecodedFrame {
    pub sof_marker: u8,
    pub width: u32,
    pub height: u32,
    pub components: Vec<ComponentInfo>,
    pub planes: Vec<ComponentCoefficients>,
    pub num_scans: usize,
    pub num_restarts: usize,
    pub restart_intervals: Vec<u16>,
    pub has_jfif: bool,
    pub has_adobe: bool,
    pub num_dht_segments: usize,
}

#[derive(Debug)]
struct HuffDecoder {
    mincode: [i32; 17],
    maxcode: [i32; 18],
    valptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffDecoder {
    fn new(counts: &[u8; 16], values: &[u8]) -> Self {
        let mut mincode = [0; 17];
        let mut maxcode = [-1; 18];
        let mut valptr = [0; 17];
        let mut code = 0i32;
        let mut k = 0usize;
        for l in 1..=16 {
            let n = counts[l - 1] as usize;
            if n > 0 {
                valptr[l] = k;
                mincode[l] = code;
                code += n as i32;
                k += n;
                maxcode[l] = code - 1;
            }
            code <<= 1;
        }
        maxcode[17] = i32::MAX;
        Self {
            mincode,
            maxcode,
            valptr,
            values: values.to_vec(),
        }
    }
}

/// Bit reader over entropy-coded data. Stops at markers and feeds zeros.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    cur: u8,
    bits_left: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            cur: 0,
            bits_left: 0,
        }
    }

    fn bit(&mut self) -> u32 {
        if self.bits_left == 0 {
            let b = self.data[self.pos];
            if b == 0xFF {
                let next = self.data[self.pos + 1];
                if next == 0x00 {
                    self.pos += 2;
                    self.cur = 0xFF;
                } else {
                    self.cur = 0;
                }
            } else {
                self.pos += 1;
                self.cur = b;
            }
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        ((self.cur >> self.bits_left) & 1) as u32
    }

    fn bits(&mut self, n: u32) -> u32 {
        (0..n).fold(0, |acc, _| (acc << 1) | self.bit())
    }

    fn decode(&mut self, table: &HuffDecoder) -> u8 {
        let mut code = self.bit() as i32;
        let mut l = 1;
        while code > table.maxcode[l] {
            code = (code << 1) | self.bit() as i32;
            l += 1;
            assert!(l <= 16, "invalid Huffman code at byte {}", self.pos);
        }
        table.values[table.valptr[l] + (code - table.mincode[l]) as usize]
    }

    fn receive_extend(&mut self, s: u32) -> i32 {
        if s == 0 {
            return 0;
        }
        let v = self.bits(s) as i32;
        if v < (1 << (s - 1)) {
            v - (1 << s) + 1
        } else {
            v
        }
    }

    fn byte_align(&mut self) {
        self.bits_left = 0;
    }

    fn expect_restart(&mut self, n: usize) {
        self.byte_align();
        assert_eq!(
            &self.data[self.pos..self.pos + 2],
            &[0xFF, 0xD0 + (n & 7) as u8],
            "missing restart marker {} at byte {}",
            n,
            self.pos
        );
        self.pos += 2;
    }
}

struct ScanHeader {
    comps: Vec<(usize, usize, usize)>,
    ss: usize,
    se: usize,
    ah: u32,
    al: u32,
}

struct Decoder<'a> {
    data: &'a [u8],
    progressive: bool,
    components: Vec<ComponentInfo>,
    geometry: Option<FrameGeometry>,
    padded: Vec<ComponentCoefficients>,
    dc_tables: [Option<HuffDecoder>; 4],
    ac_tables: [Option<HuffDecoder>; 4],
    restart_interval: usize,
    eobrun: u32,
}

impl<'a> Decoder<'a> {
    fn geometry(&self) -> &FrameGeometry {
        self.geometry.as_ref().expect("SOS before SOF")
    }

    fn decode_block(&mut self, r: &mut BitReader, scan: &ScanHeader, i: usize, pred: &mut [i32; 4], bx: usize, by: usize) {
        let (ci, dc_idx, ac_idx) = scan.comps[i];
        let dc_table = self.dc_tables[dc_idx].as_ref();
        let ac_table = self.ac_tables[ac_idx].as_ref();
        let plane = &mut self.padded[ci];
        let width = plane.width_in_blocks;
        let block = &mut plane.blocks[by * width + bx];

        if !self.progressive {
            let dc_table = dc_table.expect("missing DC table");
            let ac_table = ac_table.expect("missing AC table");
            let s = r.decode(dc_table) as u32;
            pred[i] += r.receive_extend(s);
            block[0] = pred[i] as i16;
            let mut k = 1;
            while k < 64 {
                let rs = r.decode(ac_table);
                let (run, s) = ((rs >> 4) as usize, (rs & 15) as u32);
                if s != 0 {
                    k += run;
                    block[JPEG_NATURAL_ORDER[k] as usize] = r.receive_extend(s) as i16;
                    k += 1;
                } else if run == 15 {
                    k += 16;
                } else {
                    break;
                }
            }
            return;
        }

        if scan.ss == 0 {
            if scan.ah == 0 {
                let s = r.decode(dc_table.expect("missing DC table")) as u32;
                pred[i] += r.receive_extend(s);
                block[0] = (pred[i] << scan.al) as i16;
            } else if r.bit() == 1 {
                block[0] |= (1 << scan.al) as i16;
            }
            return;
        }

        let ac_table = ac_table.expect("missing AC table");
        if scan.ah == 0 {
            if self.eobrun > 0 {
                self.eobrun -= 1;
                return;
            }
            let mut k = scan.ss;
            while k <= scan.se {
                let rs = r.decode(ac_table);
                let (run, s) = ((rs >> 4) as u32, (rs & 15) as u32);
                if s != 0 {
                    k += run as usize;
                    block[JPEG_NATURAL_ORDER[k] as usize] = (r.receive_extend(s) << scan.al) as i16;
                    k += 1;
                } else if run == 15 {
                    k += 16;
                } else {
                    self.eobrun = (1 << run) - 1;
                    if run > 0 {
                        self.eobrun += r.bits(run);
                    }
                    break;
                }
            }
            return;
        }

        let p1 = 1i16 << scan.al;
        let m1 = -1i16 << scan.al;
        let mut k = scan.ss;
        let refine = |r: &mut BitReader, coef: &mut i16| {
            if r.bit() == 1 && (*coef & p1) == 0 {
                *coef += if *coef >= 0 { p1 } else { m1 };
            }
        };
        if self.eobrun == 0 {
            while k <= scan.se {
                let rs = r.decode(ac_table);
                let mut run = (rs >> 4) as i32;
                let s = (rs & 15) as u32;
                let mut value = 0i16;
                if s != 0 {
                    assert_eq!(s, 1, "refinement symbol with size {}", s);
                    value = if r.bit() == 1 { p1 } else { m1 };
                } else if run != 15 {
                    self.eobrun = 1 << run;
                    if run > 0 {
                        self.eobrun += r.bits(run as u32);
                    }
                    break;
                }
                while k <= scan.se {
                    let z = JPEG_NATURAL_ORDER[k] as usize;
                    if block[z] != 0 {
                        refine(r, &mut block[z]);
                    } else {
                        run -= 1;
                        if run < 0 {
                            break;
                        }
                    }
                    k += 1;
                }
                if value != 0 {
                    block[JPEG_NATURAL_ORDER[k] as usize] = value;
                }
                k += 1;
            }
        }
        if self.eobrun > 0 {
            while k <= scan.se {
                let z = JPEG_NATURAL_ORDER[k] as usize;
                if block[z] != 0 {
                    refine(r, &mut block[z]);
                }
                k += 1;
            }
            self.eobrun -= 1;
        }
    }

    /// Decodes one scan starting at `pos`; returns (end position, restarts).
    fn decode_scan(&mut self, scan: &ScanHeader, pos: usize) -> (usize, usize) {
        let mut r = BitReader::new(self.data, pos);
        let mut pred = [0i32; 4];
        let mut restarts = 0;
        self.eobrun = 0;

        let geometry = self.geometry().clone();
        let mcus: Vec<Vec<(usize, usize, usize)>> = if scan.comps.len() > 1 {
            let mut mcus = Vec::new();
            for mcu_y in 0..geometry.imcu_rows {
                for mcu_x in 0..geometry.imcu_cols {
                    let mut blocks = Vec::new();
                    for (i, &(ci, _, _)) in scan.comps.iter().enumerate() {
                        let c = &geometry.components[ci];
                        for iy in 0..c.v_samp_factor {
                            for ix in 0..c.h_samp_factor {
                                blocks.push((
                                    i,
                                    mcu_x * c.h_samp_factor + ix,
                                    mcu_y * c.v_samp_factor + iy,
                                ));
                            }
                        }
                    }
                    mcus.push(blocks);
                }
            }
            mcus
        } else {
            let c = &geometry.components[scan.comps[0].0];
            (0..c.height_in_blocks)
                .flat_map(|by| (0..c.width_in_blocks).map(move |bx| vec![(0, bx, by)]))
                .collect()
        };

        for (mcu_idx, blocks) in mcus.iter().enumerate() {
            if self.restart_interval > 0 && mcu_idx > 0 && mcu_idx % self.restart_interval == 0 {
                r.expect_restart(restarts);
                restarts += 1;
                pred = [0; 4];
                self.eobrun = 0;
            }
            for &(i, bx, by) in blocks {
                self.decode_block(&mut r, scan, i, &mut pred, bx, by);
            }
        }
        r.byte_align();
        (r.pos, restarts)
    }
}

fn be16(data: &[u8], pos: usize) -> usize {
    ((data[pos] as usize) << 8) | data[pos + 1] as usize
}

/// Decodes the headers and every scan of `data` into coefficients.
#[track_caller]
pub fn decode_coefficients(data: &[u8]) -> DecodedFrame {
    assert_eq!(&data[..2], &[0xFF, 0xD8], "missing SOI");
    let mut dec = Decoder {
        data,
        progressive: false,
        components: Vec::new(),
        geometry: None,
        padded: Vec::new(),
        dc_tables: Default::default(),
        ac_tables: Default::default(),
        restart_interval: 0,
        eobrun: 0,
    };
    let mut frame = DecodedFrame {
        sof_marker: 0,
        width: 0,
        height: 0,
        components: Vec::new(),
        planes: Vec::new(),
        num_scans: 0,
        num_restarts: 0,
        restart_intervals: Vec::new(),
        has_jfif: false,
        has_adobe: false,
        num_dht_segments: 0,
    };

    let mut pos = 2;
    loop {
        assert_eq!(data[pos], 0xFF, "expected marker at byte {}", pos);
        let marker = data[pos + 1];
        pos += 2;
        if marker == 0xD9 {
            assert_eq!(pos, data.len(), "trailing bytes after EOI");
            break;
        }
        let len = be16(data, pos);
        let seg = &data[pos + 2..pos + len];
        pos += len;
        match marker {
            0xE0 => frame.has_jfif = &seg[..5] == b"JFIF\0",
            0xEE => frame.has_adobe = &seg[..5] == b"Adobe",
            0xDB => {}
            0xDD => {
                dec.restart_interval = be16(seg, 0);
                frame.restart_intervals.push(dec.restart_interval as u16);
            }
            0xC4 => {
                frame.num_dht_segments += 1;
                let mut p = 0;
                while p < seg.len() {
                    let (class, idx) = (seg[p] >> 4, (seg[p] & 15) as usize);
                    let mut counts = [0u8; 16];
                    counts.copy_from_slice(&seg[p + 1..p + 17]);
                    let n: usize = counts.iter().map(|&c| c as usize).sum();
                    let table = HuffDecoder::new(&counts, &seg[p + 17..p + 17 + n]);
                    if class == 0 {
                        dec.dc_tables[idx] = Some(table);
                    } else {
                        dec.ac_tables[idx] = Some(table);
                    }
                    p += 17 + n;
                }
            }
            0xC0 | 0xC1 | 0xC2 => {
                frame.sof_marker = marker;
                dec.progressive = marker == 0xC2;
                assert_eq!(seg[0], 8);
                frame.height = be16(seg, 1) as u32;
                frame.width = be16(seg, 3) as u32;
                for c in 0..seg[5] as usize {
                    let s = &seg[6 + 3 * c..9 + 3 * c];
                    let mut comp = ComponentInfo::new(s[0], 0).with_sampling(s[1] >> 4, s[1] & 15);
                    comp.quant_idx = s[2];
                    dec.components.push(comp);
                }
                let geometry = FrameGeometry::new(frame.width, frame.height, &dec.components);
                dec.padded = geometry
                    .components
                    .iter()
                    .map(|c| {
                        ComponentCoefficients::new(
                            geometry.imcu_cols * c.h_samp_factor,
                            geometry.imcu_rows * c.v_samp_factor,
                        )
                    })
                    .collect();
                dec.geometry = Some(geometry);
            }
            0xDA => {
                let ns = seg[0] as usize;
                let comps = (0..ns)
                    .map(|i| {
                        let id = seg[1 + 2 * i];
                        let tables = seg[2 + 2 * i];
                        let ci = dec
                            .components
                            .iter()
                            .position(|c| c.id == id)
                            .expect("unknown component in SOS");
                        (ci, (tables >> 4) as usize, (tables & 15) as usize)
                    })
                    .collect();
                let p = 1 + 2 * ns;
                let scan = ScanHeader {
                    comps,
                    ss: seg[p] as usize,
                    se: seg[p + 1] as usize,
                    ah: (seg[p + 2] >> 4) as u32,
                    al: (seg[p + 2] & 15) as u32,
                };
                let (end, restarts) = dec.decode_scan(&scan, pos);
                frame.num_scans += 1;
                frame.num_restarts += restarts;
                pos = end;
            }
            other => panic!("unexpected marker {:02X}", other),
        }
    }

    let geometry = dec.geometry().clone();
    frame.planes = dec
        .padded
        .iter()
        .zip(&geometry.components)
        .map(|(padded, c)| {
            let mut plane = ComponentCoefficients::new(c.width_in_blocks, c.height_in_blocks);
            for by in 0..c.height_in_blocks {
                for bx in 0..c.width_in_blocks {
                    *plane.block_mut(bx, by) = *padded.block(bx, by);
                }
            }
            plane
        })
        .collect();
    frame.components = dec.components;
    frame
}

/// Routes encoder logs to the test harness (`RUST_LOG=debug`).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small deterministic generator (xorshift).
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Uniform value in `-max..=max`.
    pub fn signed(&mut self, max: i16) -> i16 {
        (self.next() % (2 * max as u64 + 1)) as i16 - max
    }
}

/// Coefficient planes sized for `components`, filled with a sparse,
/// natural-image-like distribution: strong DC, decaying AC.
pub fn random_planes(width: u32, height: u32, components: &[ComponentInfo], seed: u64) -> Vec<ComponentCoefficients> {
    let geometry = FrameGeometry::new(width, height, components);
    let mut rng = Rng::new(seed);
    geometry
        .components
        .iter()
        .map(|c| {
            let mut plane = ComponentCoefficients::new(c.width_in_blocks, c.height_in_blocks);
            for block in plane.blocks.iter_mut() {
                block[0] = rng.signed(120);
                for k in 1..64 {
                    let z = JPEG_NATURAL_ORDER[k] as usize;
                    let roll = rng.next() % 64;
                    if roll < (64 - k as u64) / 4 {
                        let max = if k < 6 { 40 } else { 6 };
                        block[z] = rng.signed(max);
                    }
                }
            }
            plane
        })
        .collect()
}

/// Planes where every block carries only DC value `dc[c]` for component `c`.
pub fn flat_planes(width: u32, height: u32, components: &[ComponentInfo], dc: &[i16]) -> Vec<ComponentCoefficients> {
    FrameGeometry::new(width, height, components)
        .components
        .iter()
        .zip(dc)
        .map(|(c, &v)| {
            let mut plane = ComponentCoefficients::new(c.width_in_blocks, c.height_in_blocks);
            for block in plane.blocks.iter_mut() {
                block[0] = v;
            }
            plane
        })
        .collect()
}

/// Positions of `FF xx` markers in `data` (stuffed zeros excluded).
pub fn marker_positions(data: &[u8], marker: u8) -> Vec<usize> {
    data.windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] == 0xFF && w[1] == marker)
        .map(|(i, _)| i)
        .collect()
}
