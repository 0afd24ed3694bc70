use crate::algorithm::Decompressor;
use crate::core::array2d::Array2DRef;
use crate::core::bit_streamer::BitStreamerMsb32;
use crate::core::error::{ErrorContext, Res, WithContext};
use crate::core::parallel::{run_units, DecodeOptions};
use crate::core::prefix_tree::{extend, PrefixCodeDecoder};
use crate::core::raw_image::RawImage;

/// Value-only table plus the predictor every row starts from.
#[derive(Debug, Clone)]
pub struct HasselbladRecipe {
    pub decoder: PrefixCodeDecoder,
    pub init_pred: u16,
}

/// Reads a `len`-bit difference. The all-ones 16-bit pattern means -32768.
fn get_diff(bs: &mut BitStreamerMsb32, len: u8) -> Res<i32> {
    if len == 0 {
        return Ok(0);
    }
    let len = u32::from(len);
    Ok(match extend(bs.get_bits(len)?, len) {
        65535 => -32768,
        diff => diff,
    })
}

// Pixels come in pairs: both length codes first, then both differences.
fn decode_rows(
    recipe: &HasselbladRecipe,
    out: &mut Array2DRef<u16>,
    bs: &mut BitStreamerMsb32,
) -> Res<()> {
    let decoder = &recipe.decoder;
    for row in 0..out.height() {
        let mut p1 = i32::from(recipe.init_pred);
        let mut p2 = i32::from(recipe.init_pred);
        for col in (0..out.width()).step_by(2) {
            let len1 = decoder.decode_code_value(bs)?;
            let len2 = decoder.decode_code_value(bs)?;
            p1 += get_diff(bs, len1)?;
            p2 += get_diff(bs, len2)?;
            out.set(row, col, p1 as u16)?;
            out.set(row, col + 1, p2 as u16)?;
        }
    }
    Ok(())
}

/// Hasselblad lossless JPEG variant with paired pixel codes.
pub struct HasselbladDecompressor<'a> {
    img: RawImage<'a>,
    recipe: HasselbladRecipe,
    input: &'a [u8],
    options: DecodeOptions,
}

impl ErrorContext for HasselbladDecompressor<'_> {
    fn describe(&self) -> Option<String> {
        self.img.describe()
    }
}

impl<'a> HasselbladDecompressor<'a> {
    pub fn new(img: RawImage<'a>, recipe: HasselbladRecipe, input: &'a [u8]) -> Res<Self> {
        if img.cpp() != 1 {
            img.invalid(format!("Unexpected cpp: {}", img.cpp()))?
        }
        let (w, h) = img.dim();
        if w == 0 || h == 0 || w % 2 != 0 || w > 12000 || h > 8816 {
            img.invalid(format!("Unexpected image dimensions found: ({}; {})", w, h))?
        }
        if recipe.decoder.is_full_decode() {
            recipe
                .decoder
                .invalid("Huffman table is of a full decoding variety".into())?
        }
        recipe
            .decoder
            .code()
            .verify_code_values_as_diff_lengths()
            .at(&recipe.decoder)?;
        Ok(Self {
            img,
            recipe,
            input,
            options: DecodeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }
}

impl Decompressor for HasselbladDecompressor<'_> {
    /// Input bytes consumed.
    type Output = usize;

    fn decompress(&mut self) -> Res<usize> {
        let recipe = &self.recipe;
        let mut bs = BitStreamerMsb32::new(self.input);
        // a single bit stream runs through all rows
        let unit = (&mut self.img.data, &mut bs);
        run_units(vec![unit], &self.options, |_, (out, bs)| {
            Ok(decode_rows(recipe, out, bs).at(&*bs)?)
        })?;
        log::debug!(
            "Hasselblad consumed {} of {} bytes",
            bs.stream_position(),
            self.input.len()
        );
        Ok(bs.stream_position())
    }
}
