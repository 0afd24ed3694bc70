mod cr2;
mod fuji;
mod hasselblad;
mod phase_one;

use crate::core::error::Res;

pub use cr2::{Cr2Decompressor, Cr2Format, Cr2Recipe, Cr2SliceWidths};
pub use fuji::{FujiDecompressor, FujiHeader};
pub use hasselblad::{HasselbladDecompressor, HasselbladRecipe};
pub use phase_one::{PhaseOneDecompressor, PhaseOneStrip};

/// A configured decoder for one compressed payload and one destination image.
///
/// Constructors validate everything that can be checked up front, so a
/// `decompress` failure always means the payload itself is bad.
pub trait Decompressor {
    /// What a successful decode reports besides the filled image.
    type Output;

    fn decompress(&mut self) -> Res<Self::Output>;
}
