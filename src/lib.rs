//! Decompressors for the bit-packed sample data inside camera raw files:
//! Canon CR2 lossless JPEG slices, Fuji compressed RAF, Phase One IIQ and
//! Hasselblad 3FR.
//!
//! Each decompressor is built from the already parsed container metadata and
//! a borrowed destination image, validates the combination up front, then
//! fills the image on [`Decompressor::decompress`].

pub mod algorithm;
pub mod core;

pub use crate::algorithm::{
    Cr2Decompressor, Cr2Format, Cr2Recipe, Cr2SliceWidths, Decompressor, FujiDecompressor,
    FujiHeader, HasselbladDecompressor, HasselbladRecipe, PhaseOneDecompressor, PhaseOneStrip,
};
pub use crate::core::array2d::Array2DRef;
pub use crate::core::byte_stream::{ByteStream, Endianness};
pub use crate::core::error::{DecodeError, ErrorKind, Res};
pub use crate::core::huffman::{CodeSymbol, PrefixCode};
pub use crate::core::parallel::DecodeOptions;
pub use crate::core::prefix_tree::PrefixCodeDecoder;
pub use crate::core::raw_image::{BayerPhase, CfaColor, ColorFilterArray, RawImage};
