use crate::core::bit_streamer::{BitOrder, BitStreamer};
use crate::core::error::{ErrorContext, Res, WithContext};
use crate::core::huffman::{CodeSymbol, PrefixCode, MAX_CODE_LENGTH_BITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    /// Children by next bit, zero first.
    Branch([Option<usize>; 2]),
    Leaf(u8),
}

/// Binary decision tree over code paths. Nodes live in one arena, the root
/// is always at index 0.
#[derive(Debug, Clone)]
pub struct PrefixCodeTree {
    nodes: Vec<Node>,
}

impl ErrorContext for PrefixCodeTree {
    fn describe(&self) -> Option<String> {
        Some(format!("PrefixCodeTree with {} nodes", self.nodes.len()))
    }
}

impl Default for PrefixCodeTree {
    fn default() -> Self {
        Self {
            nodes: vec![Node::Branch([None; 2])],
        }
    }
}

impl PrefixCodeTree {
    pub fn add(&mut self, symbol: CodeSymbol, value: u8) -> Res<()> {
        let mut top = 0;
        for depth in 0..symbol.code_len {
            let bit = symbol.bit(depth);
            let last = depth + 1 == symbol.code_len;
            let buds = match self.nodes[top] {
                Node::Branch(buds) => buds,
                Node::Leaf(_) => self.raise(format!("{:?} passes through a leaf", symbol))?,
            };
            top = match (buds[bit], last) {
                (None, _) => {
                    let idx = self.nodes.len();
                    self.nodes.push(if last {
                        Node::Leaf(value)
                    } else {
                        Node::Branch([None; 2])
                    });
                    if let Node::Branch(buds) = &mut self.nodes[top] {
                        buds[bit] = Some(idx);
                    }
                    idx
                }
                (Some(child), false) => child,
                (Some(_), true) => self.raise(format!("{:?} ends on a taken node", symbol))?,
            };
        }
        Ok(())
    }

    /// Walks one bit at a time. The stream must hold `MAX_CODE_LENGTH_BITS`
    /// filled bits.
    #[inline]
    fn read_symbol<O: BitOrder>(&self, bs: &mut BitStreamer<O>) -> Res<(CodeSymbol, u8)> {
        let mut partial = CodeSymbol::default();
        let mut top = 0;
        while usize::from(partial.code_len) < MAX_CODE_LENGTH_BITS {
            let bit = bs.get_bits_no_fill(1);
            partial.code = (partial.code << 1) | bit as u16;
            partial.code_len += 1;
            let next = match self.nodes[top] {
                Node::Branch(buds) => buds[bit as usize],
                Node::Leaf(_) => None,
            };
            let Some(idx) = next else { break };
            match self.nodes[idx] {
                Node::Leaf(value) => return Ok((partial, value)),
                Node::Branch(_) => top = idx,
            }
        }
        Ok(self.raise(format!(
            "bad Huffman code: {} (len: {})",
            partial.code, partial.code_len
        ))?)
    }
}

/// JPEG lossless sign extension of a `len`-bit difference.
#[inline]
pub fn extend(diff: u32, len: u32) -> i32 {
    debug_assert!(len > 0 && len <= 16);
    let mut ret = diff as i32;
    if diff & (1 << (len - 1)) == 0 {
        ret -= (1 << len) - 1;
    }
    ret
}

/// Tree decoder for one `PrefixCode`.
#[derive(Debug, Clone)]
pub struct PrefixCodeDecoder {
    code: PrefixCode,
    tree: PrefixCodeTree,
    full_decode: bool,
    fix_dng_bug16: bool,
}

impl ErrorContext for PrefixCodeDecoder {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "PrefixCodeDecoder full_decode: {}, fix_dng_bug16: {}",
            self.full_decode, self.fix_dng_bug16
        ))
    }
}

impl PrefixCodeDecoder {
    pub fn new(code: PrefixCode, full_decode: bool, fix_dng_bug16: bool) -> Res<Self> {
        if full_decode {
            code.verify_code_values_as_diff_lengths()?;
        }
        let mut tree = PrefixCodeTree::default();
        for (&symbol, &value) in code.symbols.iter().zip(&code.code_values) {
            tree.add(symbol, value).at(&code)?;
        }
        log::trace!(
            "prefix tree of {} codes, longest {} bits",
            code.symbols.len(),
            code.max_code_length()
        );
        Ok(Self {
            code,
            tree,
            full_decode,
            fix_dng_bug16,
        })
    }

    pub fn code(&self) -> &PrefixCode {
        &self.code
    }

    pub fn is_full_decode(&self) -> bool {
        self.full_decode
    }

    /// Resolves one symbol and returns its literal value.
    #[inline]
    pub fn decode_code_value<O: BitOrder>(&self, bs: &mut BitStreamer<O>) -> Res<u8> {
        debug_assert!(!self.full_decode);
        bs.fill(32)?;
        Ok(self.tree.read_symbol(bs)?.1)
    }

    /// Resolves one symbol as a difference length and reads the difference.
    #[inline]
    pub fn decode_difference<O: BitOrder>(&self, bs: &mut BitStreamer<O>) -> Res<i32> {
        debug_assert!(self.full_decode);
        bs.fill(32)?;
        let (symbol, diff_len) = self.tree.read_symbol(bs)?;
        debug_assert!(u32::from(symbol.code_len) + u32::from(diff_len) <= 32);
        Ok(match diff_len {
            0 => 0,
            16 => {
                if self.fix_dng_bug16 {
                    bs.skip_bits_no_fill(16);
                }
                -32768
            }
            len => extend(bs.get_bits_no_fill(len.into()), len.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bit_streamer::{Jpeg, Msb, Msb32};
    use crate::core::bit_vacuumer::BitVacuumer;
    use crate::core::error::ErrorKind;

    fn diff_code() -> PrefixCode {
        // 17 difference lengths, 0..=16
        let mut counts = [0u32; 16];
        counts[3] = 15;
        counts[4] = 2;
        PrefixCode::from_counts(&counts, &(0..=16).collect::<Vec<_>>()).unwrap()
    }

    /// Inverse of `extend`.
    fn encode_diff(diff: i32, len: u32) -> u32 {
        if diff < 0 {
            (diff + (1 << len) - 1) as u32
        } else {
            diff as u32
        }
    }

    #[test_log::test]
    fn every_symbol_resolves_to_its_value() {
        let code = PrefixCode::from_counts(&[0, 3, 1, 2], &[10, 20, 30, 40, 50, 60]).unwrap();
        let dec = PrefixCodeDecoder::new(code.clone(), false, false).unwrap();
        let mut bv = BitVacuumer::<Msb>::new();
        for s in &code.symbols {
            bv.put(s.code.into(), s.code_len.into());
        }
        let bytes = bv.finish();
        let mut bs = BitStreamer::<Msb>::new(&bytes);
        for &v in &code.code_values {
            assert_eq!(dec.decode_code_value(&mut bs).unwrap(), v);
        }
    }

    #[test_log::test]
    fn differences_round_trip() {
        let code = diff_code();
        let dec = PrefixCodeDecoder::new(code.clone(), true, false).unwrap();
        let mut bv = BitVacuumer::<Jpeg>::new();
        let mut expected = vec![];
        for len in 0..16u32 {
            let diffs: Vec<i32> = if len == 0 {
                vec![0]
            } else {
                let lo = 1 << (len - 1);
                let hi = (1 << len) - 1;
                vec![lo, hi, -lo, -hi]
            };
            for diff in diffs {
                let s = code.symbols[len as usize];
                bv.put(s.code.into(), s.code_len.into());
                bv.put(encode_diff(diff, len), len);
                expected.push(diff);
            }
        }
        let bytes = bv.finish();
        let mut bs = BitStreamer::<Jpeg>::new(&bytes);
        for diff in expected {
            assert_eq!(dec.decode_difference(&mut bs).unwrap(), diff);
        }
    }

    #[test_log::test]
    fn sixteen_bit_difference_is_fixed() {
        let code = diff_code();
        let s = code.symbols[16];
        let mut bv = BitVacuumer::<Msb32>::new();
        bv.put(s.code.into(), s.code_len.into());
        bv.put(0xABCD, 16);
        bv.put(s.code.into(), s.code_len.into());
        let bytes = bv.finish();

        let plain = PrefixCodeDecoder::new(code.clone(), true, false).unwrap();
        let mut bs = BitStreamer::<Msb32>::new(&bytes);
        assert_eq!(plain.decode_difference(&mut bs).unwrap(), -32768);
        // the 16 bits are left in the stream and parsed as codes
        assert_ne!(plain.decode_difference(&mut bs).ok(), Some(-32768));

        let fixed = PrefixCodeDecoder::new(code, true, true).unwrap();
        let mut bs = BitStreamer::<Msb32>::new(&bytes);
        assert_eq!(fixed.decode_difference(&mut bs).unwrap(), -32768);
        assert_eq!(fixed.decode_difference(&mut bs).unwrap(), -32768);
    }

    #[test_log::test]
    fn absent_branch_is_corrupt_data() {
        // only "0" and "10" exist, "11" does not
        let code = PrefixCode::from_counts(&[1, 1], &[1, 2]).unwrap();
        let dec = PrefixCodeDecoder::new(code, false, false).unwrap();
        let bytes = [0xC0, 0, 0, 0];
        let err = dec
            .decode_code_value(&mut BitStreamer::<Msb>::new(&bytes))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert_eq!(err.root_message(), Some("bad Huffman code: 3 (len: 2)"));
    }

    #[test_log::test]
    fn full_decode_needs_diff_lengths() {
        let code = PrefixCode::from_counts(&[1], &[17]).unwrap();
        assert!(PrefixCodeDecoder::new(code.clone(), true, false).is_err());
        assert!(PrefixCodeDecoder::new(code, false, false).is_ok());
    }

    #[test_log::test]
    fn extend_matches_the_jpeg_convention() {
        assert_eq!(extend(0, 1), -1);
        assert_eq!(extend(1, 1), 1);
        assert_eq!(extend(0b011, 3), -4);
        assert_eq!(extend(0b100, 3), 4);
        assert_eq!(extend(0, 15), -32767);
    }
}
