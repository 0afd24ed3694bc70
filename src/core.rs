//! Machinery shared by the format decompressors: input cursors, bit
//! streamers, the prefix code model and its tree decoder, output views and
//! the strip/block driver.

pub mod array2d;
pub mod bit_streamer;
pub mod bit_vacuumer;
pub mod byte_stream;
pub mod error;
pub mod huffman;
pub mod parallel;
pub mod prefix_tree;
pub mod raw_image;
