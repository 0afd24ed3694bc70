use crate::algorithm::Decompressor;
use crate::core::bit_streamer::BitStreamerMsb32;
use crate::core::byte_stream::ByteStream;
use crate::core::error::{ErrorContext, Res, WithContext};
use crate::core::parallel::{run_units, DecodeOptions};
use crate::core::raw_image::RawImage;

/// Bit lengths selected by the unary prefix. 14 means a 16-bit literal.
const LENGTHS: [u32; 10] = [8, 7, 6, 9, 11, 10, 5, 12, 14, 13];
const LITERAL: u32 = 14;

/// Compressed data of image row `n`.
#[derive(Debug, Clone)]
pub struct PhaseOneStrip<'a> {
    pub n: usize,
    pub bs: ByteStream<'a>,
}

impl ErrorContext for PhaseOneStrip<'_> {
    fn describe(&self) -> Option<String> {
        Some(format!("PhaseOneStrip row {}, {} bytes", self.n, self.bs.remaining()))
    }
}

impl<'a> PhaseOneStrip<'a> {
    pub fn new(n: usize, bs: ByteStream<'a>) -> Self {
        Self { n, bs }
    }
}

fn decode_row(out: &mut [u16], input: &[u8]) -> Res<()> {
    let width = out.len();
    let mut bs = BitStreamerMsb32::new(input);
    let mut pred = [0i32; 2];
    let mut len = [0u32; 2];
    for col in 0..width {
        bs.fill(32)?;
        if col >= width & !7 {
            len = [LITERAL; 2];
        } else if col % 8 == 0 {
            for l in len.iter_mut() {
                let mut j = 0;
                while j < 5 {
                    if bs.get_bits_no_fill(1) != 0 {
                        // only a full run of five zeros sets the first lengths
                        if col == 0 {
                            bs.raise("Cannot initialize lengths at column 0".into())?
                        }
                        break;
                    }
                    j += 1;
                }
                if j > 0 {
                    *l = LENGTHS[2 * (j - 1) + bs.get_bits_no_fill(1) as usize];
                }
            }
        }

        let lane = col & 1;
        let l = len[lane];
        pred[lane] = if l == LITERAL {
            bs.get_bits_no_fill(16) as i32
        } else {
            pred[lane] + bs.get_bits_no_fill(l) as i32 + 1 - (1 << (l - 1))
        };
        out[col] = pred[lane] as u16;
    }
    Ok(())
}

/// Phase One IIQ: every row is its own variable length code.
pub struct PhaseOneDecompressor<'a> {
    img: RawImage<'a>,
    strips: Vec<PhaseOneStrip<'a>>,
    options: DecodeOptions,
}

impl ErrorContext for PhaseOneDecompressor<'_> {
    fn describe(&self) -> Option<String> {
        self.img.describe()
    }
}

impl<'a> PhaseOneDecompressor<'a> {
    pub fn new(img: RawImage<'a>, mut strips: Vec<PhaseOneStrip<'a>>) -> Res<Self> {
        if img.cpp() != 1 {
            img.invalid(format!("Unexpected cpp: {}", img.cpp()))?
        }
        let (w, h) = img.dim();
        if w == 0 || h == 0 || w % 2 != 0 || w > 11976 || h > 8854 {
            img.invalid(format!("Unexpected image dimensions found: ({}; {})", w, h))?
        }
        if strips.len() != h {
            img.invalid(format!("Height ({}) vs strip count {} mismatch", h, strips.len()))?
        }
        // one strip per row, each row exactly once
        strips.sort_by_key(|s| s.n);
        if let Some((i, strip)) = strips.iter().enumerate().find(|(i, s)| s.n != *i) {
            strip.invalid(format!("Expected the strip of row {}", i))?
        }
        log::debug!("Phase One {}x{}", w, h);
        Ok(Self {
            img,
            strips,
            options: DecodeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }
}

impl Decompressor for PhaseOneDecompressor<'_> {
    type Output = ();

    fn decompress(&mut self) -> Res<()> {
        let units: Vec<_> = self.img.data.rows_mut().zip(self.strips.iter()).collect();
        run_units(units, &self.options, |_, (row, strip)| {
            Ok(decode_row(row, strip.bs.peek_remaining()).at(strip)?)
        })
    }
}
