use crate::core::error::{ErrorContext, ErrorKind, Res};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Most bits a single `fill` may be asked for.
pub const MAX_FILL_BITS: u32 = 32;

/// 64-bit cache, valid bits are left-aligned and consumed from the top.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitCache {
    pub cache: u64,
    pub fill_level: u32,
}

impl BitCache {
    #[inline]
    pub fn push(&mut self, bits: u64, count: u32) {
        debug_assert!(count <= 32 && self.fill_level + count <= 64);
        debug_assert!(count == 32 || bits >> count == 0);
        if count != 0 {
            self.cache |= bits << (64 - self.fill_level - count);
            self.fill_level += count;
        }
    }

    #[inline]
    pub fn peek(&self, count: u32) -> u32 {
        debug_assert!(count <= MAX_FILL_BITS && count <= self.fill_level);
        if count == 0 {
            0
        } else {
            (self.cache >> (64 - count)) as u32
        }
    }

    #[inline]
    pub fn skip(&mut self, count: u32) {
        debug_assert!(count <= self.fill_level);
        self.cache = if count >= 64 { 0 } else { self.cache << count };
        self.fill_level -= count;
    }
}

/// Byte-to-cache packing of one vendor bit layout.
pub trait BitOrder: Debug {
    /// Input bytes a single `fill_cache` call may look at.
    const MAX_PROCESS_BYTES: usize;

    /// Pushes at least 32 bits into `cache` from `input`, which is exactly
    /// `MAX_PROCESS_BYTES` long. Returns the number of input bytes consumed.
    fn fill_cache(cache: &mut BitCache, input: &[u8], remaining: usize) -> usize;

    /// Inverse of `fill_cache` for one 32-bit chunk, used by `BitVacuumer`.
    fn drain_chunk(chunk: u32, out: &mut Vec<u8>);
}

/// Plain MSB-first bytes.
#[derive(Debug)]
pub struct Msb;

/// MSB-first bits in little-endian 16-bit words.
#[derive(Debug)]
pub struct Msb16;

/// MSB-first bits in little-endian 32-bit words.
#[derive(Debug)]
pub struct Msb32;

/// MSB-first bytes with JPEG `FF 00` stuffing.
#[derive(Debug)]
pub struct Jpeg;

impl BitOrder for Msb {
    const MAX_PROCESS_BYTES: usize = 4;

    fn fill_cache(cache: &mut BitCache, input: &[u8], _: usize) -> usize {
        cache.push(u32::from_be_bytes([input[0], input[1], input[2], input[3]]).into(), 32);
        4
    }

    fn drain_chunk(chunk: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&chunk.to_be_bytes());
    }
}

impl BitOrder for Msb16 {
    const MAX_PROCESS_BYTES: usize = 4;

    fn fill_cache(cache: &mut BitCache, input: &[u8], _: usize) -> usize {
        for word in input[..4].chunks_exact(2) {
            cache.push(u16::from_le_bytes([word[0], word[1]]).into(), 16);
        }
        4
    }

    fn drain_chunk(chunk: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&((chunk >> 16) as u16).to_le_bytes());
        out.extend_from_slice(&(chunk as u16).to_le_bytes());
    }
}

impl BitOrder for Msb32 {
    const MAX_PROCESS_BYTES: usize = 4;

    fn fill_cache(cache: &mut BitCache, input: &[u8], _: usize) -> usize {
        cache.push(u32::from_le_bytes([input[0], input[1], input[2], input[3]]).into(), 32);
        4
    }

    fn drain_chunk(chunk: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&chunk.to_le_bytes());
    }
}

impl BitOrder for Jpeg {
    const MAX_PROCESS_BYTES: usize = 8;

    fn fill_cache(cache: &mut BitCache, input: &[u8], remaining: usize) -> usize {
        let prefetch = [input[0], input[1], input[2], input[3]];
        if !prefetch.contains(&0xFF) {
            cache.push(u32::from_be_bytes(prefetch).into(), 32);
            return 4;
        }

        let mut p = 0;
        for _ in 0..4 {
            let c0 = input[p];
            cache.push(c0.into(), 8);
            if c0 != 0xFF {
                p += 1;
                continue;
            }
            if input[p + 1] == 0 {
                p += 2;
                continue;
            }
            // A marker ends the entropy coded segment: drop the FF and
            // present zero bits from here on.
            cache.fill_level -= 8;
            cache.cache &= !(u64::MAX >> cache.fill_level);
            cache.fill_level = 64;
            return remaining;
        }
        p
    }

    fn drain_chunk(chunk: u32, out: &mut Vec<u8>) {
        for byte in chunk.to_be_bytes() {
            out.push(byte);
            if byte == 0xFF {
                out.push(0);
            }
        }
    }
}

/// Bit reader over an in-memory byte range.
///
/// `fill(n)` must precede every `*_no_fill(n)` call; the `no_fill` variants
/// only check that contract in debug builds. Reads past the end of the input
/// see zero bits for a short while, then `fill` fails.
pub struct BitStreamer<'a, O: BitOrder> {
    input: &'a [u8],
    pos: usize,
    cache: BitCache,
    order: PhantomData<O>,
}

impl<O: BitOrder> ErrorContext for BitStreamer<'_, O> {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "BitStreamer<{:?}> pos: {}/{}, cached bits: {}",
            PhantomData::<O>,
            self.pos,
            self.input.len(),
            self.cache.fill_level
        ))
    }
}

impl<O: BitOrder> Clone for BitStreamer<'_, O> {
    fn clone(&self) -> Self {
        Self {
            input: self.input,
            pos: self.pos,
            cache: self.cache,
            order: PhantomData,
        }
    }
}

impl<'a, O: BitOrder> BitStreamer<'a, O> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            cache: BitCache::default(),
            order: PhantomData,
        }
    }

    fn refill(&mut self) -> Res<()> {
        let remaining = self.input.len().saturating_sub(self.pos);
        let consumed = if remaining >= O::MAX_PROCESS_BYTES {
            O::fill_cache(&mut self.cache, &self.input[self.pos..], remaining)
        } else {
            if self.pos > self.input.len() + 2 * O::MAX_PROCESS_BYTES {
                self.raise_kind(
                    ErrorKind::OutOfBounds,
                    "Buffer overflow read in BitStreamer".into(),
                )?
            }
            let mut tmp = [0u8; 8];
            tmp[..remaining].copy_from_slice(&self.input[self.input.len() - remaining..]);
            O::fill_cache(&mut self.cache, &tmp[..O::MAX_PROCESS_BYTES], remaining)
        };
        self.pos += consumed;
        Ok(())
    }

    /// Makes sure at least `nbits` (at most 32) bits are cached.
    #[inline]
    pub fn fill(&mut self, nbits: u32) -> Res<()> {
        debug_assert!(nbits <= MAX_FILL_BITS);
        if self.cache.fill_level < nbits {
            self.refill()?;
        }
        Ok(())
    }

    #[inline]
    pub fn peek_bits_no_fill(&self, nbits: u32) -> u32 {
        debug_assert!(nbits <= self.cache.fill_level, "peek without fill");
        self.cache.peek(nbits)
    }

    #[inline]
    pub fn skip_bits_no_fill(&mut self, nbits: u32) {
        debug_assert!(nbits <= self.cache.fill_level, "skip without fill");
        self.cache.skip(nbits)
    }

    #[inline]
    pub fn get_bits_no_fill(&mut self, nbits: u32) -> u32 {
        let v = self.peek_bits_no_fill(nbits);
        self.skip_bits_no_fill(nbits);
        v
    }

    pub fn get_bits(&mut self, nbits: u32) -> Res<u32> {
        self.fill(nbits)?;
        Ok(self.get_bits_no_fill(nbits))
    }

    /// Bytes consumed so far, not counting whole bytes still in the cache.
    pub fn stream_position(&self) -> usize {
        self.pos.saturating_sub((self.cache.fill_level / 8) as usize)
    }
}

pub type BitStreamerMsb<'a> = BitStreamer<'a, Msb>;
pub type BitStreamerMsb16<'a> = BitStreamer<'a, Msb16>;
pub type BitStreamerMsb32<'a> = BitStreamer<'a, Msb32>;
pub type BitStreamerJpeg<'a> = BitStreamer<'a, Jpeg>;
