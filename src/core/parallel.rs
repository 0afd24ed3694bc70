use crate::core::error::{DecodeError, ErrorBuilder, ErrorContext, ErrorKind, Res};

/// Knobs shared by every decompressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Number of failed units that fails the whole call. Values below 1 act as 1.
    pub error_threshold: usize,
    /// Worker count. `None` uses the global pool, sized to the processor count.
    pub num_threads: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            error_threshold: 1,
            num_threads: None,
        }
    }
}

impl ErrorContext for DecodeOptions {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "error threshold {}, threads {:?}",
            self.error_threshold, self.num_threads
        ))
    }
}

impl DecodeOptions {
    pub fn with_error_threshold(mut self, error_threshold: usize) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }
}

/// Failure count plus the failure of the lowest unit index.
#[derive(Debug, Default)]
struct ErrorTally {
    count: usize,
    first: Option<(usize, DecodeError)>,
}

impl ErrorTally {
    fn add(mut self, index: usize, result: Res<()>) -> Self {
        if let Err(err) = result {
            log::debug!("unit {} failed: {}", index, err);
            self.count += 1;
            if self.first.as_ref().map_or(true, |(i, _)| index < *i) {
                self.first = Some((index, err));
            }
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        let count = self.count + other.count;
        let first = match (self.first, other.first) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        Self { count, first }
    }
}

#[cfg(feature = "parallel")]
fn tally_units<U, F>(units: Vec<U>, options: &DecodeOptions, decode: &F) -> Res<ErrorTally>
where
    U: Send,
    F: Fn(usize, U) -> Res<()> + Sync,
{
    use crate::core::error::{ResultBuilder, WithContext};
    use rayon::prelude::*;

    let threads = options
        .num_threads
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    // one contiguous run of units per worker
    let min_len = units.len().div_ceil(threads).max(1);
    let run = move || {
        units
            .into_par_iter()
            .enumerate()
            .with_min_len(min_len)
            .map(|(i, unit)| (i, decode(i, unit)))
            .fold(ErrorTally::default, |t, (i, r)| t.add(i, r))
            .reduce(ErrorTally::default, ErrorTally::merge)
    };
    match options.num_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .at(options)
                .kind(ErrorKind::Validation)?;
            Ok(pool.install(run))
        }
        None => Ok(run()),
    }
}

#[cfg(not(feature = "parallel"))]
fn tally_units<U, F>(units: Vec<U>, _: &DecodeOptions, decode: &F) -> Res<ErrorTally>
where
    F: Fn(usize, U) -> Res<()>,
{
    Ok(units
        .into_iter()
        .enumerate()
        .fold(ErrorTally::default(), |t, (i, unit)| t.add(i, decode(i, unit))))
}

/// Decodes every unit, each on its own, then fails if too many of them did.
///
/// A failing unit never stops its siblings. Units must write to disjoint
/// output, which callers arrange by splitting the destination up front.
pub(crate) fn run_units<U, F>(units: Vec<U>, options: &DecodeOptions, decode: F) -> Res<()>
where
    U: Send,
    F: Fn(usize, U) -> Res<()> + Sync,
{
    let total = units.len();
    let tally = tally_units(units, options, &decode)?;
    log::debug!("decoded {} units, {} failed", total, tally.count);
    match tally.first {
        Some((_, err)) if tally.count >= options.error_threshold.max(1) => {
            Err(DecodeError::from(ErrorBuilder {
                kind: ErrorKind::TooManyErrors,
                message: Some(format!(
                    "Too many errors encountered. Giving up. First Error:\n{}",
                    err.root_message().unwrap_or_default()
                )),
                context: options.describe(),
                source: Some(Box::new(err)),
            }))
        }
        Some((index, err)) => {
            log::warn!(
                "{} of {} units failed, tolerated. First (unit {}): {}",
                tally.count,
                total,
                index,
                err
            );
            Ok(())
        }
        None => Ok(()),
    }
}
