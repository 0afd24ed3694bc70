use crate::algorithm::Decompressor;
use crate::core::array2d::Array2DTile;
use crate::core::bit_streamer::BitStreamerMsb;
use crate::core::byte_stream::{ByteStream, Endianness};
use crate::core::error::{ErrorContext, ErrorKind, Res, WithContext};
use crate::core::parallel::{run_units, DecodeOptions};
use crate::core::raw_image::{BayerPhase, CfaColor, ColorFilterArray, RawImage};

/// Image rows produced by one decoded line of a block.
const LINE_HEIGHT: usize = 6;
const BLOCK_SIZE: u16 = 0x300;
const MIN_VALUE: i32 = 0x40;
const NUM_GRADIENTS: usize = 41;

// Rows of the per-block line buffer. The first two rows of every color are
// read-only carry-in rows holding the end of the previous line.
const R0: usize = 0;
const R2: usize = 2;
const R4: usize = 4;
const G0: usize = 5;
const G2: usize = 7;
const G7: usize = 12;
const B0: usize = 13;
const B2: usize = 15;
const B4: usize = 17;
const LTOTAL: usize = 18;

/// Line buffer rows decoded by the six passes of a line, as `[comp0, comp1]`.
/// Both layouts walk an RGGB pattern here; X-Trans only differs in which
/// even samples are interpolated instead of read.
const PASSES: [[usize; 2]; 6] = [
    [R2, G2],
    [G2 + 1, B2],
    [R2 + 1, G2 + 2],
    [G2 + 3, B2 + 1],
    [R2 + 2, G2 + 4],
    [G2 + 5, B2 + 2],
];

/// `(first carry-in row, rows of the color)` for every color.
const COLORS: [(usize, usize); 3] = [(R0, 5), (G0, 8), (B0, 5)];

/// The 16-byte big-endian header in front of compressed RAF data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FujiHeader {
    pub signature: u16,
    pub version: u8,
    pub raw_type: u8,
    pub raw_bits: u8,
    pub raw_height: u16,
    pub raw_rounded_width: u16,
    pub raw_width: u16,
    pub block_size: u16,
    pub blocks_in_row: u8,
    pub total_lines: u16,
}

impl ErrorContext for FujiHeader {
    fn describe(&self) -> Option<String> {
        Some(format!("{:?}", self))
    }
}

impl FujiHeader {
    pub const SIZE: usize = 16;

    pub fn parse(bs: &mut ByteStream) -> Res<Self> {
        bs.check(Self::SIZE)?;
        Ok(Self {
            signature: bs.get_u16()?,
            version: bs.get_u8()?,
            raw_type: bs.get_u8()?,
            raw_bits: bs.get_u8()?,
            raw_height: bs.get_u16()?,
            raw_rounded_width: bs.get_u16()?,
            raw_width: bs.get_u16()?,
            block_size: bs.get_u16()?,
            blocks_in_row: bs.get_u8()?,
            total_lines: bs.get_u16()?,
        })
    }

    pub fn is_xtrans(&self) -> bool {
        self.raw_type == 16
    }

    pub fn is_valid(&self) -> bool {
        let lines = LINE_HEIGHT as u16;
        let blocks = u16::from(self.blocks_in_row);
        self.signature == 0x4953
            && self.version == 1
            && self.raw_height <= 0x3000
            && self.raw_height >= lines
            && self.raw_height % lines == 0
            && self.raw_width <= 0x3000
            && self.raw_width >= 0x300
            && self.raw_width % 24 == 0
            && self.raw_rounded_width <= 0x3000
            && self.block_size == BLOCK_SIZE
            && self.raw_rounded_width >= self.block_size
            && self.raw_rounded_width % self.block_size == 0
            && self.raw_rounded_width.saturating_sub(self.raw_width) < self.block_size
            && self.blocks_in_row <= 0x10
            && self.blocks_in_row != 0
            && blocks == self.raw_rounded_width / self.block_size
            && blocks == self.raw_width.div_ceil(self.block_size)
            && self.total_lines <= 0x800
            && self.total_lines != 0
            && self.total_lines == self.raw_height / lines
            && matches!(self.raw_bits, 12 | 14 | 16)
            && matches!(self.raw_type, 0 | 16)
    }

    /// Image columns `(offset, width)` covered by block `n`.
    fn block_columns(&self, n: usize) -> (usize, usize) {
        let offset = usize::from(self.block_size) * n;
        let width = if n + 1 == usize::from(self.blocks_in_row) {
            usize::from(self.raw_width) - offset
        } else {
            self.block_size.into()
        };
        (offset, width)
    }
}

/// Quantisation and coding constants derived from the header.
#[derive(Debug)]
struct FujiParams {
    q_table: Vec<i8>,
    q_point: [i32; 5],
    max_bits: u32,
    raw_bits: u32,
    total_values: i32,
    max_diff: i32,
    line_width: usize,
    xtrans: bool,
    /// Line buffer row feeding each cell of the output pattern.
    source_rows: [[usize; 6]; LINE_HEIGHT],
    total_lines: usize,
}

impl FujiParams {
    fn new(header: &FujiHeader) -> Res<Self> {
        if (header.is_xtrans() && header.block_size % 3 != 0)
            || (!header.is_xtrans() && header.block_size % 2 != 0)
        {
            header.invalid(format!(
                "Block size {} does not fit raw type {}",
                header.block_size, header.raw_type
            ))?
        }
        let (raw_bits, max_bits) = match header.raw_bits {
            16 => (16, 64),
            14 => (14, 56),
            12 => header.raise_kind(
                ErrorKind::Unsupported,
                "12-bit compressed RAF is not supported".into(),
            )?,
            bits => header.invalid(format!("Unexpected bit depth {}", bits))?,
        };
        let q4 = (1i32 << raw_bits) - 1;
        let q_point = [0, 0x12, 0x43, 0x114, q4];
        let q_table = (-q4..=q4)
            .map(|v| match v {
                _ if v <= -q_point[3] => -4,
                _ if v <= -q_point[2] => -3,
                _ if v <= -q_point[1] => -2,
                _ if v < 0 => -1,
                0 => 0,
                _ if v < q_point[1] => 1,
                _ if v < q_point[2] => 2,
                _ if v < q_point[3] => 3,
                _ => 4,
            })
            .collect();

        let cfa = if header.is_xtrans() {
            ColorFilterArray::xtrans(0, 0)
        } else {
            ColorFilterArray::bayer(BayerPhase::Rggb)
        };
        let mut source_rows = [[0; 6]; LINE_HEIGHT];
        for (row, cells) in source_rows.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = match cfa.color_at(row, col) {
                    CfaColor::Red => R2 + (row >> 1),
                    CfaColor::Green => G2 + row,
                    CfaColor::Blue => B2 + (row >> 1),
                    CfaColor::Unknown => cfa.invalid(format!("No color at ({}, {})", row, col))?,
                };
            }
        }

        let block_size = usize::from(header.block_size);
        Ok(Self {
            q_table,
            q_point,
            max_bits,
            raw_bits,
            total_values: 1 << raw_bits,
            max_diff: 1 << (raw_bits - 6),
            line_width: if header.is_xtrans() {
                block_size * 2 / 3
            } else {
                block_size / 2
            },
            xtrans: header.is_xtrans(),
            source_rows,
            total_lines: header.total_lines.into(),
        })
    }

    fn quant_gradient(&self, v1: i32, v2: i32) -> i32 {
        let q = |v: i32| i32::from(self.q_table[(self.q_point[4] + v) as usize]);
        9 * q(v1) + q(v2)
    }

    /// Position of an image column of a block within its color line.
    fn line_index(&self, col: usize) -> usize {
        if self.xtrans {
            (((col * 2 / 3) & !1) | ((col % 3) & 1)) + ((col % 3) >> 1)
        } else {
            col >> 1
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GradientPair {
    value1: i32,
    value2: i32,
}

type Gradients = [[GradientPair; NUM_GRADIENTS]; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parity {
    Even,
    Odd,
}

/// Given two non-negative numbers, how many times must the second be
/// doubled to reach the first, capped at 15.
fn bit_diff(value1: i32, value2: i32) -> u32 {
    debug_assert!(value1 >= 0 && value2 > 0);
    let lz1 = (value1 as u32).leading_zeros();
    let lz2 = (value2 as u32).leading_zeros();
    let mut dec_bits = lz2.saturating_sub(lz1);
    if (value2 << dec_bits) < value1 {
        dec_bits += 1;
    }
    dec_bits.min(15)
}

/// Counts and skips a run of zero bits plus the one bit ending it.
fn zero_bits(bs: &mut BitStreamerMsb) -> Res<u32> {
    let mut count = 0;
    loop {
        bs.fill(32)?;
        let zeros = bs.peek_bits_no_fill(32).leading_zeros();
        count += zeros;
        if zeros == 32 {
            bs.skip_bits_no_fill(32);
        } else {
            bs.skip_bits_no_fill(zeros + 1);
            return Ok(count);
        }
    }
}

/// X-Trans even positions that are predicted only, no bits are read for them.
fn xtrans_interpolated(row: usize, i: usize, comp: usize) -> bool {
    let even = i % 2 == 0;
    if comp == 0 {
        row == 0 || (row == 2 && even) || (row == 4 && !even) || row == 5
    } else {
        row == 1 || row == 2 || (row == 3 && !even) || (row == 5 && even)
    }
}

/// Decoder state of one block: the line buffer and the adaptive gradients.
struct FujiBlock<'p> {
    params: &'p FujiParams,
    lines: Vec<u16>,
    width: usize,
    grad_even: Gradients,
    grad_odd: Gradients,
}

impl ErrorContext for FujiBlock<'_> {
    fn describe(&self) -> Option<String> {
        Some(format!("FujiBlock line width {}", self.params.line_width))
    }
}

impl<'p> FujiBlock<'p> {
    /// A zeroed buffer already satisfies the carry-in rows and helper
    /// columns of the first line.
    fn new(params: &'p FujiParams) -> Self {
        let width = params.line_width + 2;
        let init = GradientPair {
            value1: params.max_diff,
            value2: 1,
        };
        Self {
            params,
            lines: vec![0; LTOTAL * width],
            width,
            grad_even: [[init; NUM_GRADIENTS]; 3],
            grad_odd: [[init; NUM_GRADIENTS]; 3],
        }
    }

    fn at(&self, row: usize, col: usize) -> i32 {
        self.lines[row * self.width + col].into()
    }

    fn put(&mut self, row: usize, col: usize, value: u16) {
        self.lines[row * self.width + col] = value;
    }

    fn decode_sample(
        &mut self,
        bs: &mut BitStreamerMsb,
        grad: i32,
        mut interp: i32,
        parity: Parity,
        set: usize,
    ) -> Res<u16> {
        let p = self.params;
        let gradients = match parity {
            Parity::Even => &mut self.grad_even[set],
            Parity::Odd => &mut self.grad_odd[set],
        };
        let g = &mut gradients[grad.unsigned_abs() as usize];

        let sample_bits = zero_bits(bs)?;
        let (code_bits, delta) = if sample_bits < p.max_bits - p.raw_bits - 1 {
            let code_bits = bit_diff(g.value1, g.value2);
            (code_bits, (sample_bits << code_bits) as i32)
        } else {
            (p.raw_bits, 1)
        };
        bs.fill(32)?;
        let code = bs.get_bits_no_fill(code_bits) as i32 + delta;
        if code < 0 || code >= p.total_values {
            bs.raise(format!("Sample code {} out of range", code))?
        }
        let code = if code & 1 != 0 { -1 - code / 2 } else { code / 2 };

        g.value1 += code.abs();
        if g.value2 == MIN_VALUE {
            g.value1 >>= 1;
            g.value2 >>= 1;
        }
        g.value2 += 1;

        if grad < 0 {
            interp -= code;
        } else {
            interp += code;
        }
        if interp < 0 {
            interp += p.total_values;
        } else if interp > p.q_point[4] {
            interp -= p.total_values;
        }
        Ok(interp.clamp(0, p.q_point[4]) as u16)
    }

    /// Returns `(gradient, prediction)` for even sample `col` of row `c`.
    fn predict_even(&self, c: usize, col: usize) -> (i32, i32) {
        let rb = self.at(c - 1, 1 + 2 * col);
        let rc = self.at(c - 1, 2 * col);
        let rd = self.at(c - 1, 2 + 2 * col);
        let rf = self.at(c - 2, 1 + 2 * col);

        let diff_rc_rb = (rc - rb).abs();
        let diff_rf_rb = (rf - rb).abs();
        let diff_rd_rb = (rd - rb).abs();
        let (term1, term2) = if diff_rc_rb > diff_rf_rb.max(diff_rd_rb) {
            (rf, rd)
        } else if diff_rd_rb > diff_rc_rb.max(diff_rf_rb) {
            (rf, rc)
        } else {
            (rd, rc)
        };

        let grad = self.params.quant_gradient(rb - rf, rc - rb);
        (grad, (2 * rb + term1 + term2) >> 2)
    }

    /// Returns `(gradient, prediction)` for odd sample `col` of row `c`.
    fn predict_odd(&self, c: usize, col: usize) -> (i32, i32) {
        let ra = self.at(c, 1 + 2 * col);
        let rb = self.at(c - 1, 2 + 2 * col);
        let rc = self.at(c - 1, 1 + 2 * col);
        let rd = self.at(c - 1, 3 + 2 * col);
        let rg = self.at(c, 3 + 2 * col);

        let mut interp = ra + rg;
        if rb < rc.min(rd) || rb > rc.max(rd) {
            interp = (interp + 2 * rb) >> 1;
        }
        let grad = self.params.quant_gradient(rb - rc, rc - ra);
        (grad, interp >> 1)
    }

    /// Decodes two line buffer rows side by side. Odd samples trail the even
    /// ones by four positions since they predict from the next even sample.
    fn pass(&mut self, bs: &mut BitStreamerMsb, rows: [usize; 2], row: usize) -> Res<()> {
        let half = self.params.line_width / 2;
        let set = row % 3;
        for i in 0..half + 4 {
            if i < half {
                for (comp, &c) in rows.iter().enumerate() {
                    let (grad, interp) = self.predict_even(c, i);
                    let sample = if self.params.xtrans && xtrans_interpolated(row, i, comp) {
                        interp as u16
                    } else {
                        self.decode_sample(bs, grad, interp, Parity::Even, set)?
                    };
                    self.put(c, 1 + 2 * i, sample);
                }
            }
            if i >= 4 {
                let col = i - 4;
                for &c in rows.iter() {
                    let (grad, interp) = self.predict_odd(c, col);
                    let sample = self.decode_sample(bs, grad, interp, Parity::Odd, set)?;
                    self.put(c, 2 + 2 * col, sample);
                }
            }
        }
        Ok(())
    }

    /// Refreshes the helper columns of every row of the color owning `row`.
    fn extend(&mut self, row: usize) {
        let (start, end) = match row {
            R2..=R4 => (R2, R4),
            G2..=G7 => (G2, G7),
            _ => (B2, B4),
        };
        let w = self.width;
        for i in start..=end {
            self.lines[i * w] = self.lines[(i - 1) * w + 1];
            self.lines[i * w + w - 1] = self.lines[(i - 1) * w + w - 2];
        }
    }

    fn decode_line(&mut self, bs: &mut BitStreamerMsb) -> Res<()> {
        for (row, rows) in PASSES.into_iter().enumerate() {
            self.pass(bs, rows, row)?;
            for r in rows {
                self.extend(r);
            }
        }
        Ok(())
    }

    /// Scatters the color lines into image rows `6 * cur_line ..`.
    fn copy_line(&self, out: &mut Array2DTile<u16>, cur_line: usize) -> Res<()> {
        let p = self.params;
        for row in 0..LINE_HEIGHT {
            for col in 0..out.width() {
                let source = p.source_rows[row][col % 6];
                let value = self.lines[source * self.width + 1 + p.line_index(col)];
                out.set(LINE_HEIGHT * cur_line + row, col, value)?;
            }
        }
        Ok(())
    }

    /// The last two rows of each color become the carry-in rows of the next line.
    fn carry_over(&mut self) {
        let w = self.width;
        for (a, b) in COLORS {
            self.lines.copy_within((a + b - 2) * w..(a + b) * w, a * w);
        }
        for (a, _) in COLORS {
            self.lines[(a + 2) * w + w - 1] = self.lines[(a + 1) * w + w - 2];
        }
    }
}

fn decode_block(params: &FujiParams, input: &[u8], out: &mut Array2DTile<u16>) -> Res<()> {
    let mut block = FujiBlock::new(params);
    let mut bs = BitStreamerMsb::new(input);
    for cur_line in 0..params.total_lines {
        block.decode_line(&mut bs).at(&block)?;
        block.copy_line(out, cur_line)?;
        if cur_line + 1 == params.total_lines {
            break;
        }
        block.carry_over();
    }
    Ok(())
}

/// Fuji compressed RAF: independent vertical blocks, each a
/// gradient-adaptive predictive code.
pub struct FujiDecompressor<'a> {
    img: RawImage<'a>,
    header: FujiHeader,
    params: FujiParams,
    blocks: Vec<&'a [u8]>,
    options: DecodeOptions,
}

impl ErrorContext for FujiDecompressor<'_> {
    fn describe(&self) -> Option<String> {
        self.header.describe()
    }
}

impl<'a> FujiDecompressor<'a> {
    pub fn new(img: RawImage<'a>, mut input: ByteStream<'a>) -> Res<Self> {
        if img.cpp() != 1 {
            img.invalid(format!("Unexpected component count: {}", img.cpp()))?
        }
        input.set_byte_order(Endianness::Big);
        let header = FujiHeader::parse(&mut input)?;
        if !header.is_valid() {
            header.invalid("Compressed RAF header check failed".into())?
        }
        let dim = img.dim();
        if dim != (header.raw_width.into(), header.raw_height.into()) {
            img.invalid(format!(
                "Header specifies {}x{}",
                header.raw_width, header.raw_height
            ))?
        }
        Self::check_cfa(&img, &header)?;
        let params = FujiParams::new(&header)?;

        let mut sizes = Vec::with_capacity(header.blocks_in_row.into());
        for _ in 0..header.blocks_in_row {
            sizes.push(input.get_u32()? as usize);
        }
        let table_size = 4 * usize::from(header.blocks_in_row);
        if table_size & 0xC != 0 {
            input.skip_bytes(0x10 - (table_size & 0xC))?;
        }
        let blocks = sizes
            .into_iter()
            .map(|size| input.get_slice(size))
            .collect::<Res<Vec<_>>>()?;
        log::debug!(
            "Fuji {}x{}, {}-bit, {} blocks of {} lines",
            header.raw_width,
            header.raw_height,
            header.raw_bits,
            blocks.len(),
            header.total_lines
        );
        Ok(Self {
            img,
            header,
            params,
            blocks,
            options: DecodeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn header(&self) -> &FujiHeader {
        &self.header
    }

    fn check_cfa(img: &RawImage, header: &FujiHeader) -> Res<()> {
        let Some(cfa) = img.cfa() else {
            return Ok(img.invalid("Fuji data needs a CFA".into())?);
        };
        match cfa.size() {
            (6, 6) => match cfa.xtrans_phase() {
                None => cfa.invalid("Invalid X-Trans CFA".into())?,
                Some((0, 0)) => {}
                Some((x, y)) => cfa.invalid(format!("Unexpected X-Trans phase: {{{},{}}}", x, y))?,
            },
            (2, 2) => match cfa.bayer_phase() {
                None => cfa.invalid("Invalid Bayer CFA".into())?,
                Some(BayerPhase::Rggb) => {}
                Some(phase) => cfa.invalid(format!("Unexpected Bayer phase: {:?}", phase))?,
            },
            _ => cfa.invalid("Unexpected CFA size".into())?,
        }
        if (cfa.size() == (6, 6)) != header.is_xtrans() {
            cfa.invalid(format!("CFA does not match raw type {}", header.raw_type))?
        }
        Ok(())
    }
}

impl Decompressor for FujiDecompressor<'_> {
    type Output = ();

    fn decompress(&mut self) -> Res<()> {
        let ranges: Vec<_> = (0..self.blocks.len())
            .map(|n| self.header.block_columns(n))
            .collect();
        let tiles = self.img.data.split_columns(&ranges)?;
        let units: Vec<_> = tiles.into_iter().zip(self.blocks.iter().copied()).collect();
        let params = &self.params;
        run_units(units, &self.options, |_, (mut tile, input)| {
            Ok(decode_block(params, input, &mut tile).at(&tile)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::array2d::Array2DRef;
    use crate::core::bit_streamer::Msb;
    use crate::core::bit_vacuumer::BitVacuumer;
    use pretty_assertions::assert_eq;

    /// One escaped sample per 7 bytes: 41 zeros, a one, then a 14-bit literal 0.
    const SAMPLE_14: [u8; 7] = [0, 0, 0, 0, 0, 0x40, 0];
    /// Same for 16 bits: 47 zeros, a one, then a 16-bit literal 0.
    const SAMPLE_16: [u8; 8] = [0, 0, 0, 0, 0, 1, 0, 0];

    fn header(raw_type: u8, raw_bits: u8, width: u16, height: u16) -> FujiHeader {
        let blocks = width.div_ceil(BLOCK_SIZE);
        FujiHeader {
            signature: 0x4953,
            version: 1,
            raw_type,
            raw_bits,
            raw_height: height,
            raw_rounded_width: blocks * BLOCK_SIZE,
            raw_width: width,
            block_size: BLOCK_SIZE,
            blocks_in_row: blocks as u8,
            total_lines: height / 6,
        }
    }

    fn payload(h: &FujiHeader, blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = h.signature.to_be_bytes().to_vec();
        out.extend([h.version, h.raw_type, h.raw_bits]);
        for v in [h.raw_height, h.raw_rounded_width, h.raw_width, h.block_size] {
            out.extend(v.to_be_bytes());
        }
        out.push(h.blocks_in_row);
        out.extend(h.total_lines.to_be_bytes());
        for block in blocks {
            out.extend((block.len() as u32).to_be_bytes());
        }
        let table_size = 4 * blocks.len();
        if table_size & 0xC != 0 {
            out.resize(out.len() + 0x10 - (table_size & 0xC), 0);
        }
        for block in blocks {
            out.extend_from_slice(block);
        }
        out
    }

    fn cfa_for(h: &FujiHeader) -> ColorFilterArray {
        if h.is_xtrans() {
            ColorFilterArray::xtrans(0, 0)
        } else {
            ColorFilterArray::bayer(BayerPhase::Rggb)
        }
    }

    fn decode_with(
        h: &FujiHeader,
        cfa: ColorFilterArray,
        input: &[u8],
        data: &mut [u16],
    ) -> Res<()> {
        let view = Array2DRef::with_width(data, h.raw_width.into())?;
        let img = RawImage::new(view, 1)?.with_cfa(cfa);
        let mut fuji = FujiDecompressor::new(img, ByteStream::new(input, Endianness::Big))?;
        fuji.decompress()
    }

    fn decode(h: &FujiHeader, blocks: &[Vec<u8>]) -> (Res<()>, Vec<u16>) {
        let mut data = vec![0u16; usize::from(h.raw_width) * usize::from(h.raw_height)];
        let res = decode_with(h, cfa_for(h), &payload(h, blocks), &mut data);
        (res, data)
    }

    /// Samples read per block line: six passes over two rows of even and odd samples.
    fn samples_per_line(h: &FujiHeader) -> usize {
        let params = FujiParams::new(h).unwrap();
        6 * 2 * params.line_width
    }

    fn stream_14(h: &FujiHeader) -> Vec<u8> {
        SAMPLE_14.repeat(samples_per_line(h) * usize::from(h.total_lines))
    }

    #[test_log::test]
    fn bayer_block_decodes_escaped_samples() {
        let h = header(0, 14, 768, 12);
        let (res, data) = decode(&h, &[stream_14(&h)]);
        res.unwrap();
        // zero neighbours predict 0, the -1 residual wraps to the top of the range
        assert_eq!(&data[..2], &[0x3FFF, 0x3FFF]);
        assert!(data.iter().all(|&v| v <= 0x3FFF));

        let h = header(0, 16, 768, 6);
        let stream = SAMPLE_16.repeat(samples_per_line(&h));
        let (res, data) = decode(&h, &[stream]);
        res.unwrap();
        assert_eq!(data[0], 0xFFFF);
    }

    /// Every sample codes a zero residual sized by the statistics of gradient 0,
    /// the only gradient in use while the line buffer stays all zero.
    fn zero_stream(params: &FujiParams, lines: usize) -> Vec<u8> {
        let mut stats = [[(params.max_diff, 1); 3]; 2];
        let mut bv = BitVacuumer::<Msb>::new();
        let half = params.line_width / 2;
        for _ in 0..lines {
            for row in 0..LINE_HEIGHT {
                for i in 0..half + 4 {
                    let mut parities = vec![];
                    if i < half {
                        for comp in 0..2 {
                            if !(params.xtrans && xtrans_interpolated(row, i, comp)) {
                                parities.push(0);
                            }
                        }
                    }
                    if i >= 4 {
                        parities.extend([1, 1]);
                    }
                    for parity in parities {
                        let (v1, v2) = &mut stats[parity][row % 3];
                        bv.put(1, 1);
                        bv.put(0, bit_diff(*v1, *v2));
                        if *v2 == MIN_VALUE {
                            *v1 >>= 1;
                            *v2 >>= 1;
                        }
                        *v2 += 1;
                    }
                }
            }
        }
        bv.finish()
    }

    #[test_log::test]
    fn adaptive_codes_follow_the_gradient_statistics() {
        let params = FujiParams::new(&header(0, 14, 768, 6)).unwrap();
        let mut block = FujiBlock::new(&params);
        let mut bv = BitVacuumer::<Msb>::new();
        // no zeros, then an 8-bit code at the initial (256, 1) statistics
        bv.put(1, 1);
        bv.put(5, 8);
        // one zero adds 1 << 8 to the code
        bv.put(0b01, 2);
        bv.put(4, 8);
        // 41 zeros escape to a 14-bit literal
        bv.put(0, 32);
        bv.put(0, 9);
        bv.put(1, 1);
        bv.put(0x1234, 14);
        let bytes = bv.finish();
        let mut bs = BitStreamerMsb::new(&bytes);

        // 5 is odd: -1 - 5 / 2 = -3
        assert_eq!(block.decode_sample(&mut bs, 3, 100, Parity::Even, 0).unwrap(), 97);
        let g = block.grad_even[0][3];
        assert_eq!((g.value1, g.value2), (259, 2));

        // 260 is even: 130, subtracted for a negative gradient and wrapped
        let sample = block.decode_sample(&mut bs, -3, 100, Parity::Even, 0).unwrap();
        assert_eq!(sample, 0x4000 - 30);
        let g = block.grad_even[0][3];
        assert_eq!((g.value1, g.value2), (389, 3));

        // 0x1235 is odd: -1 - 0x91A
        assert_eq!(block.decode_sample(&mut bs, 0, 5000, Parity::Odd, 1).unwrap(), 2669);
        let g = block.grad_odd[1][0];
        assert_eq!((g.value1, g.value2), (256 + 2331, 2));
        assert_eq!(block.grad_odd[0][3].value2, 1);
    }

    #[test_log::test]
    fn statistics_halve_at_the_minimum_count() {
        let params = FujiParams::new(&header(0, 14, 768, 6)).unwrap();
        let mut bv = BitVacuumer::<Msb>::new();
        for count in 1..=64 {
            bv.put(1, 1);
            // value1 stays 256 while the count grows
            bv.put(0, bit_diff(256, count));
        }
        let bytes = bv.finish();
        let mut bs = BitStreamerMsb::new(&bytes);
        let mut block = FujiBlock::new(&params);
        for _ in 0..63 {
            assert_eq!(block.decode_sample(&mut bs, 0, 7, Parity::Odd, 2).unwrap(), 7);
        }
        let g = block.grad_odd[2][0];
        assert_eq!((g.value1, g.value2), (256, MIN_VALUE));
        assert_eq!(block.decode_sample(&mut bs, 0, 7, Parity::Odd, 2).unwrap(), 7);
        let g = block.grad_odd[2][0];
        assert_eq!((g.value1, g.value2), (128, 33));
    }

    #[test_log::test]
    fn zero_residuals_decode_exactly() {
        for raw_type in [0, 16] {
            let h = header(raw_type, 14, 768, 12);
            let params = FujiParams::new(&h).unwrap();
            let (res, data) = decode(&h, &[zero_stream(&params, 2)]);
            res.unwrap();
            assert_eq!(data, vec![0; 768 * 12], "raw type {}", raw_type);
        }
    }

    #[test_log::test]
    fn xtrans_block_decodes() {
        let h = header(16, 14, 768, 6);
        let (res, data) = decode(&h, &[stream_14(&h)]);
        res.unwrap();
        // (0, 0) is green; the red row of the first pass is only predicted
        assert_eq!(data[0], 0x3FFF);
        assert!(data.iter().all(|&v| v <= 0x3FFF));
    }

    #[test_log::test]
    fn carry_in_lines_repeat_previous_trailing_lines() {
        let h = header(0, 14, 768, 12);
        let params = FujiParams::new(&h).unwrap();
        let stream = stream_14(&h);
        let mut bs = BitStreamerMsb::new(&stream);
        let mut block = FujiBlock::new(&params);
        block.decode_line(&mut bs).unwrap();
        let w = block.width;
        let before = block.lines.clone();
        block.carry_over();
        for (a, b) in COLORS {
            for k in 0..2 {
                let carried = &block.lines[(a + k) * w..(a + k + 1) * w];
                let trailing = &before[(a + b - 2 + k) * w..(a + b - 1 + k) * w];
                assert_eq!(carried, trailing, "row {}", a + k);
            }
            assert_eq!(block.at(a + 2, w - 1), block.at(a + 1, w - 2));
        }
        assert!(before[R2 * w + 1..R2 * w + w - 1].iter().any(|&v| v != 0));
        block.decode_line(&mut bs).unwrap();
    }

    #[test_log::test]
    fn blocks_decode_independently() {
        let h = header(0, 14, 1536, 6);
        let stream = stream_14(&h);
        let (res, good) = decode(&h, &[stream.clone(), stream.clone()]);
        res.unwrap();
        for row in good.chunks(1536) {
            assert_eq!(&row[..768], &row[768..]);
        }

        // the second block has no data at all
        let (res, data) = decode(&h, &[stream, Vec::new()]);
        let err = res.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooManyErrors);
        for (row, expected) in data.chunks(1536).zip(good.chunks(1536)) {
            assert_eq!(&row[..768], &expected[..768]);
        }
    }

    #[test_log::test]
    fn header_is_validated() {
        let mut data = vec![0u16; 768 * 6];
        let h = header(0, 14, 768, 6);
        assert!(h.is_valid());
        for bad in [
            FujiHeader { signature: 0x4954, ..h },
            FujiHeader { raw_height: 7, ..h },
            FujiHeader { block_size: 0x200, ..h },
            FujiHeader { total_lines: 2, ..h },
            FujiHeader { raw_type: 1, ..h },
            FujiHeader { raw_bits: 10, ..h },
        ] {
            assert!(!bad.is_valid(), "{:?}", bad);
            let input = payload(&bad, &[vec![0; 16]]);
            let err = decode_with(&bad, cfa_for(&h), &input, &mut data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", bad);
        }

        let twelve = header(0, 12, 768, 6);
        let err = decode_with(&twelve, cfa_for(&twelve), &payload(&twelve, &[]), &mut data)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test_log::test]
    fn image_layout_is_validated() {
        let h = header(0, 14, 768, 6);
        let input = payload(&h, &[vec![0; 16]]);
        let mut data = vec![0u16; 768 * 6];
        let grbg = ColorFilterArray::bayer(BayerPhase::Grbg);
        assert!(decode_with(&h, grbg, &input, &mut data).is_err());
        let shifted = ColorFilterArray::xtrans(1, 0);
        assert!(decode_with(&h, shifted, &input, &mut data).is_err());
        let xtrans = ColorFilterArray::xtrans(0, 0);
        assert!(decode_with(&h, xtrans, &input, &mut data).is_err());

        let mut small = vec![0u16; 768 * 5];
        let view = Array2DRef::with_width(&mut small, 768).unwrap();
        let img = RawImage::new(view, 1).unwrap().with_cfa(cfa_for(&h));
        assert!(FujiDecompressor::new(img, ByteStream::new(&input, Endianness::Big)).is_err());

        // the block table promises more bytes than there are
        let mut truncated = payload(&h, &[vec![0; 16]]);
        truncated.truncate(truncated.len() - 1);
        let err = decode_with(&h, cfa_for(&h), &truncated, &mut data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test_log::test]
    fn gradient_helpers() {
        assert_eq!(bit_diff(256, 1), 8);
        assert_eq!(bit_diff(257, 1), 9);
        assert_eq!(bit_diff(0, 5), 0);
        assert_eq!(bit_diff(i32::MAX, 1), 15);
        let params = FujiParams::new(&header(0, 14, 768, 6)).unwrap();
        assert_eq!(params.quant_gradient(0, 0), 0);
        assert_eq!(params.quant_gradient(0x114, -1), 35);
        assert_eq!(params.quant_gradient(-0x3FFF, 0x11), -35);
        assert_eq!(params.line_index(5), 2);
        let xtrans = FujiParams::new(&header(16, 14, 768, 6)).unwrap();
        assert_eq!(
            (0..6).map(|c| xtrans.line_index(c)).collect::<Vec<_>>(),
            vec![0, 1, 1, 2, 3, 3]
        );
    }
}
