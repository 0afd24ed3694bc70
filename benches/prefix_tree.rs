#![feature(test)]

#[cfg(test)]
mod tests {
    extern crate test;

    use rawdecomp::core::bit_streamer::{BitStreamerJpeg, Jpeg};
    use rawdecomp::core::bit_vacuumer::BitVacuumer;
    use rawdecomp::{PrefixCode, PrefixCodeDecoder};

    const SAMPLES: usize = 4096;

    fn diff_code() -> PrefixCode {
        let mut counts = [0u32; 16];
        counts[1] = 1;
        counts[2] = 5;
        counts[3] = 1;
        counts[4] = 1;
        counts[5] = 1;
        counts[6] = 1;
        counts[7] = 1;
        counts[8] = 1;
        let values: Vec<u8> = (0..12).collect();
        PrefixCode::from_counts(&counts, &values).unwrap()
    }

    fn encoded(code: &PrefixCode) -> Vec<u8> {
        let mut bv = BitVacuumer::<Jpeg>::new();
        for i in 0..SAMPLES {
            let len = (i * 7 % 12) as u32;
            let symbol = code.symbols[len as usize];
            bv.put(symbol.code.into(), symbol.code_len.into());
            bv.put((i as u32) & ((1 << len) - 1), len);
        }
        bv.finish()
    }

    fn decode_all(decoder: &PrefixCodeDecoder, input: &[u8]) -> i64 {
        let mut bs = BitStreamerJpeg::new(input);
        (0..SAMPLES)
            .map(|_| i64::from(decoder.decode_difference(&mut bs).unwrap()))
            .sum()
    }

    #[bench]
    fn difference_bench(b: &mut test::Bencher) {
        let code = diff_code();
        let input = encoded(&code);
        let decoder = PrefixCodeDecoder::new(code, true, false).unwrap();
        b.iter(|| decode_all(&decoder, &input));
    }

    #[bench]
    fn code_value_bench(b: &mut test::Bencher) {
        let code = diff_code();
        let input = encoded(&code);
        let decoder = PrefixCodeDecoder::new(code, false, false).unwrap();
        b.iter(|| {
            let mut bs = BitStreamerJpeg::new(&input);
            (0..SAMPLES)
                .map(|_| decoder.decode_code_value(&mut bs).map(u32::from).unwrap_or(0))
                .sum::<u32>()
        });
    }
}
