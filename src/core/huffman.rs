use crate::core::byte_stream::ByteStream;
use crate::core::error::{ErrorContext, Res, WithContext};

pub const MAX_CODE_LENGTH_BITS: usize = 16;
pub const MAX_NUM_CODE_VALUES: usize = 162;
/// Longest difference a code value may announce in full-decode mode.
pub const MAX_DIFF_LENGTH: u8 = 16;

/// One path through the code tree, `code_len` bits of `code`, MSB first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeSymbol {
    pub code: u16,
    pub code_len: u8,
}

impl CodeSymbol {
    pub fn new(code: u16, code_len: u8) -> Self {
        Self { code, code_len }
    }

    /// Whether the first `partial.code_len` bits of `self` spell out `partial`.
    pub fn has_common_prefix(&self, partial: &CodeSymbol) -> bool {
        debug_assert!(partial.code_len <= self.code_len);
        let shift = self.code_len - partial.code_len;
        (u32::from(self.code) >> shift) == u32::from(partial.code)
    }

    /// Bit `index` of the path, counting from the root.
    pub fn bit(&self, index: u8) -> usize {
        ((self.code >> (self.code_len - 1 - index)) & 1) as usize
    }
}

/// Canonical prefix code: symbols with their literal values.
///
/// Built from untrusted headers, so every constructor validates the table
/// completely and never hands out a partially checked code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCode {
    /// Number of codes per bit length, index 0 unused, trailing zeros trimmed.
    pub n_codes_per_length: Vec<u32>,
    pub symbols: Vec<CodeSymbol>,
    pub code_values: Vec<u8>,
}

impl ErrorContext for PrefixCode {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "PrefixCode counts: {:?}, {} values",
            self.n_codes_per_length,
            self.code_values.len()
        ))
    }
}

struct Counts<'a>(&'a [u32]);

struct Symbols<'a>(&'a [CodeSymbol]);

impl ErrorContext for Symbols<'_> {
    fn describe(&self) -> Option<String> {
        Some(format!("{} code symbols", self.0.len()))
    }
}

impl ErrorContext for Counts<'_> {
    fn describe(&self) -> Option<String> {
        Some(format!("codes per length {:?}", self.0))
    }
}

/// Leaf-slot recurrence: two slots at length 1, every unused slot splits in two.
fn verify_feasible(counts: &[u32]) -> Res<()> {
    let ctx = Counts(counts);
    let mut max_codes: u64 = 2;
    for (len, &n) in counts.iter().enumerate().skip(1) {
        let n = u64::from(n);
        if n > 1 << len {
            ctx.invalid(format!("Can never have {} codes in {}-bit len", n, len))?
        }
        if n > max_codes {
            ctx.invalid(format!(
                "Can only fit {} out of {} codes in {}-bit len",
                max_codes, n, len
            ))?
        }
        max_codes = (max_codes - n) * 2;
    }
    Ok(())
}

fn trimmed(mut counts: Vec<u32>) -> Vec<u32> {
    while counts.last() == Some(&0) {
        counts.pop();
    }
    counts
}

impl PrefixCode {
    /// Validates an explicit symbol table.
    pub fn new(symbols: Vec<CodeSymbol>, code_values: Vec<u8>) -> Res<Self> {
        let ctx = Symbols(&symbols);
        if symbols.is_empty() {
            ctx.invalid("Empty prefix code".into())?
        }
        if symbols.len() != code_values.len() {
            ctx.invalid(format!(
                "{} symbols but {} code values",
                symbols.len(),
                code_values.len()
            ))?
        }
        if symbols.len() > MAX_NUM_CODE_VALUES {
            ctx.invalid(format!("Too big code-values table: {}", symbols.len()))?
        }
        let mut counts = vec![0u32; 1 + MAX_CODE_LENGTH_BITS];
        for s in &symbols {
            if s.code_len == 0 || usize::from(s.code_len) > MAX_CODE_LENGTH_BITS {
                ctx.invalid(format!("Bad code length: {}", s.code_len))?
            }
            if u32::from(s.code) >> s.code_len != 0 {
                ctx.invalid(format!("Code {:#b} does not fit {} bits", s.code, s.code_len))?
            }
            counts[usize::from(s.code_len)] += 1;
        }
        for w in symbols.windows(2) {
            if !(w[0].code < w[1].code && w[0].code_len <= w[1].code_len) {
                ctx.invalid(format!("Code symbols not ordered: {:?}, {:?}", w[0], w[1]))?
            }
        }
        // every pair, not just neighbours
        for (s_id, s) in symbols.iter().enumerate() {
            for p in &symbols[..s_id] {
                let (long, short) = if p.code_len <= s.code_len { (s, p) } else { (p, s) };
                if long.has_common_prefix(short) {
                    ctx.invalid(format!("Code symbols share a prefix: {:?}, {:?}", p, s))?
                }
            }
        }
        let counts = trimmed(counts);
        verify_feasible(&counts)?;
        Ok(Self {
            n_codes_per_length: counts,
            symbols,
            code_values,
        })
    }

    /// JPEG DHT-style table: codes per length (lengths 1..=16) and the values
    /// in code order. Symbols are assigned canonically.
    pub fn from_counts(counts_per_length: &[u32], code_values: &[u8]) -> Res<Self> {
        let ctx = Counts(counts_per_length);
        if counts_per_length.len() > MAX_CODE_LENGTH_BITS {
            ctx.invalid(format!("More than {} code lengths", MAX_CODE_LENGTH_BITS))?
        }
        let mut counts = vec![0];
        counts.extend_from_slice(counts_per_length);
        let counts = trimmed(counts);
        if counts.len() <= 1 {
            ctx.invalid("Codes-per-length table is empty".into())?
        }
        let total: u64 = counts.iter().map(|&n| u64::from(n)).sum();
        if total > MAX_NUM_CODE_VALUES as u64 {
            ctx.invalid(format!("Too big code-values table: {}", total))?
        }
        verify_feasible(&counts)?;
        if total != code_values.len() as u64 {
            ctx.invalid(format!(
                "Expected {} code values, got {}",
                total,
                code_values.len()
            ))?
        }

        let mut symbols = Vec::with_capacity(code_values.len());
        let mut code = 0u32;
        for (len, &n) in counts.iter().enumerate().skip(1) {
            for _ in 0..n {
                symbols.push(CodeSymbol::new(code as u16, len as u8));
                code += 1;
            }
            code <<= 1;
        }
        log::trace!("generated {} canonical symbols", symbols.len());
        Self::new(symbols, code_values.to_vec())
    }

    /// Reads 16 per-length counts followed by that many code values.
    pub fn parse(bs: &mut ByteStream) -> Res<Self> {
        let counts = bs
            .get_slice(MAX_CODE_LENGTH_BITS)?
            .iter()
            .map(|&n| u32::from(n))
            .collect::<Vec<_>>();
        let total = counts.iter().sum::<u32>() as usize;
        if total > MAX_NUM_CODE_VALUES {
            Counts(&counts).invalid(format!("Too big code-values table: {}", total))?
        }
        let values = bs.get_slice(total).at(&*bs)?;
        Self::from_counts(&counts, values)
    }

    pub fn max_code_length(&self) -> usize {
        self.n_codes_per_length.len() - 1
    }

    /// Full decode reads the code value as a difference length.
    pub fn verify_code_values_as_diff_lengths(&self) -> Res<()> {
        for &v in &self.code_values {
            if v > MAX_DIFF_LENGTH {
                self.raise(format!(
                    "Corrupt Huffman code: difference length {} longer than {}",
                    v, MAX_DIFF_LENGTH
                ))?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::byte_stream::Endianness;
    use crate::core::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test_log::test]
    fn canonical_symbols() {
        let code = PrefixCode::from_counts(&[0, 2, 1], &[7, 8, 9]).unwrap();
        assert_eq!(
            code.symbols,
            vec![
                CodeSymbol::new(0b00, 2),
                CodeSymbol::new(0b01, 2),
                CodeSymbol::new(0b100, 3)
            ]
        );
        assert_eq!(code.n_codes_per_length, vec![0, 0, 2, 1]);
        assert_eq!(code.max_code_length(), 3);
    }

    #[test_log::test]
    fn infeasible_counts_are_rejected() {
        // three 1-bit codes
        let err = PrefixCode::from_counts(&[3], &[0, 1, 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        // 1 one-bit code leaves two 2-bit slots
        assert!(PrefixCode::from_counts(&[1, 3], &[0, 1, 2, 3]).is_err());
        assert!(PrefixCode::from_counts(&[1, 2], &[0, 1, 2]).is_ok());
        assert!(PrefixCode::from_counts(&[0; 16], &[]).is_err());
        assert!(PrefixCode::from_counts(&[2], &[0]).is_err());
    }

    #[test_log::test]
    fn explicit_symbols_are_checked() {
        // not prefix free, and the shorter symbol comes later in code order
        let bad = PrefixCode::new(
            vec![CodeSymbol::new(0b0, 1), CodeSymbol::new(0b01, 2)],
            vec![1, 2],
        );
        assert!(bad.is_err());
        let unordered = PrefixCode::new(
            vec![CodeSymbol::new(0b10, 2), CodeSymbol::new(0b0, 1)],
            vec![1, 2],
        );
        assert!(unordered.is_err());
        let too_long = PrefixCode::new(vec![CodeSymbol::new(0, 17)], vec![1]);
        assert!(too_long.is_err());
        let ok = PrefixCode::new(
            vec![CodeSymbol::new(0b0, 1), CodeSymbol::new(0b10, 2)],
            vec![1, 2],
        )
        .unwrap();
        assert_eq!(ok.n_codes_per_length, vec![0, 1, 1]);
    }

    #[test_log::test]
    fn parse_dht() {
        let mut data = vec![0u8; 16];
        data[1] = 2;
        data.extend_from_slice(&[4, 5, 0xAA]);
        let mut bs = ByteStream::new(&data, Endianness::Big);
        let code = PrefixCode::parse(&mut bs).unwrap();
        assert_eq!(code.code_values, vec![4, 5]);
        assert_eq!(bs.remaining(), 1);

        let short = &data[..17];
        assert!(PrefixCode::parse(&mut ByteStream::new(short, Endianness::Big)).is_err());
    }

    #[test_log::test]
    fn diff_lengths() {
        let code = PrefixCode::from_counts(&[2], &[16, 17]).unwrap();
        assert!(code.verify_code_values_as_diff_lengths().is_err());
        let code = PrefixCode::from_counts(&[2], &[0, 16]).unwrap();
        assert!(code.verify_code_values_as_diff_lengths().is_ok());
    }
}
