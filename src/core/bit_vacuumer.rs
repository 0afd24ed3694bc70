use crate::core::bit_streamer::{BitCache, BitOrder};
use std::marker::PhantomData;

const CHUNK_BITS: u32 = 32;

/// Bit writer, the inverse of `BitStreamer` for the same `BitOrder`.
pub struct BitVacuumer<O: BitOrder> {
    cache: BitCache,
    output: Vec<u8>,
    order: PhantomData<O>,
}

impl<O: BitOrder> Default for BitVacuumer<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: BitOrder> BitVacuumer<O> {
    pub fn new() -> Self {
        Self {
            cache: BitCache::default(),
            output: Vec::new(),
            order: PhantomData,
        }
    }

    fn drain(&mut self) {
        while self.cache.fill_level >= CHUNK_BITS {
            let chunk = self.cache.peek(CHUNK_BITS);
            self.cache.skip(CHUNK_BITS);
            O::drain_chunk(chunk, &mut self.output);
        }
    }

    /// Appends the low `count` bits of `bits`, most significant first.
    pub fn put(&mut self, bits: u32, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        self.drain();
        let masked = if count == 32 { bits } else { bits & ((1 << count) - 1) };
        self.cache.push(masked.into(), count);
    }

    /// Pads the last chunk with zero bits and returns the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.drain();
        if self.cache.fill_level != 0 {
            let pad = CHUNK_BITS - self.cache.fill_level;
            self.put(0, pad);
            self.drain();
        }
        self.output
    }
}
