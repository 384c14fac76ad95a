use crate::cancel::CancellationToken;
use crate::coordinator::FlushCoordinator;
use crate::progress::ProgressSink;
use crate::record::Record;
use crate::wide;
use crate::CuboidError;
use fixedbitset::FixedBitSet;
use std::ops::Range;
use std::sync::Arc;

/// Last digits of two squared edges that may sum to a valid last digit for the
/// square of the hypotenuse of a perfect cuboid face.
const COMPATIBLE_LAST_DIGITS: [(usize, &[usize]); 6] = [
    (0, &[0, 1, 4, 5, 6, 9]),
    (1, &[0, 4]),
    (4, &[0, 1, 5, 6]),
    (5, &[0, 4]),
    (6, &[0, 4, 9]),
    (9, &[0, 6]),
];

/// 10x10 compatibility table indexed by the last digits of `x^2` and `y^2`.
#[derive(Clone, Debug)]
pub struct DigitTable {
    bits: FixedBitSet,
}

impl DigitTable {
    pub fn new() -> Self {
        let mut bits = FixedBitSet::with_capacity(100);
        for (row, cols) in COMPATIBLE_LAST_DIGITS {
            for &col in cols {
                bits.insert(row * 10 + col);
            }
        }
        Self { bits }
    }

    pub fn allows(&self, x: u64, y: u64) -> bool {
        self.bits
            .contains(last_digit_of_square(x) * 10 + last_digit_of_square(y))
    }
}

impl Default for DigitTable {
    fn default() -> Self {
        Self::new()
    }
}

fn last_digit_of_square(x: u64) -> usize {
    let d = (x % 10) as usize;
    d * d % 10
}

/// Published lower bounds on the edges of a perfect cuboid.
///
/// Every edge must reach `min_even`; odd edges must also reach `min_odd`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeBounds {
    pub min_odd: u64,
    pub min_even: u64,
}

impl EdgeBounds {
    pub fn admits(&self, edge: u64) -> bool {
        let odd = edge & 1 == 1;
        !(odd && edge < self.min_odd || edge < self.min_even)
    }
}

/// Enumerates `(m^2 - n^2, 2mn, m^2 + n^2)` scaled by odd cofactors `k` for
/// every G with `min_g < G <= max_g`.
#[derive(Clone, Debug)]
pub struct CandidateGenerator {
    min_g: u64,
    max_g: u64,
    bounds: EdgeBounds,
    digits: DigitTable,
}

impl CandidateGenerator {
    pub fn new(min_g: u64, max_g: u64, bounds: EdgeBounds) -> Self {
        Self {
            min_g,
            max_g,
            bounds,
            digits: DigitTable::new(),
        }
    }

    /// Every `m` that can contribute: `m^2 + 1 <= max_g` bounds it from above.
    pub fn m_range(&self) -> Range<u64> {
        2..wide::isqrt_u64(self.max_g) + 2
    }

    /// Emits every surviving candidate for one `m`. Returns the number of
    /// candidates rejected by the digit table.
    pub fn generate_m(
        &self,
        m: u64,
        emit: &mut dyn FnMut(Record) -> Result<(), CuboidError>,
    ) -> Result<u64, CuboidError> {
        let mut filtered = 0;
        let max = u128::from(self.max_g);

        let mut n = 1 + (m & 1);
        while n < m {
            // base_g <= max_g, so every scaled value below fits in u64.
            let base_g = match wide::sum_of_squares(m, n) {
                Some(base_g) if base_g <= max => base_g as u64,
                _ => break,
            };
            let base_x = m * m - n * n;
            let base_y = 2 * m * n;

            // G = k * base_g is divisible by 3 whenever base_g is.
            if base_g % 3 == 0 {
                n += 2;
                continue;
            }

            let mut k = self.max_g / base_g;
            if k & 1 == 0 {
                k -= 1;
            }
            while k > 0 && k * base_g > self.min_g {
                if k % 3 != 0 {
                    let (x, y, g) = (base_x * k, base_y * k, base_g * k);
                    if self.bounds.admits(x) && self.bounds.admits(y) {
                        if self.digits.allows(x, y) {
                            emit(Record::pair(x, y, g))?;
                        } else {
                            filtered += 1;
                        }
                    }
                }
                if k <= 1 {
                    break;
                }
                k -= 2;
            }
            n += 2;
        }
        Ok(filtered)
    }

    /// Runs `generate_m` over `ms`, feeding `worker`'s buffer.
    pub fn generate_range(
        &self,
        ms: Range<u64>,
        worker: usize,
        coordinator: &FlushCoordinator,
        cancel: &CancellationToken,
    ) -> Result<(), CuboidError> {
        for m in ms {
            cancel.check()?;
            let filtered = self.generate_m(m, &mut |record| {
                coordinator.insert(worker, record).map(|_| ())
            })?;
            coordinator.record_filtered(filtered);
        }
        Ok(())
    }
}

/// Brute-force enumeration of `A^2 + B^2 + C^2 = G^2` with `A < B < C` and
/// `min_g < G <= max_g`. Work is split over the smallest edge `A`.
#[derive(Clone, Debug)]
pub struct QuadrupleGenerator {
    min_g: u64,
    max_g: u64,
}

impl QuadrupleGenerator {
    pub fn new(min_g: u64, max_g: u64) -> Self {
        Self { min_g, max_g }
    }

    /// `3A^2 < G^2`, so A stays below `max_g / sqrt(3)`.
    pub fn a_range(&self) -> Range<u64> {
        let limit = wide::isqrt(wide::square(self.max_g) / 3) as u64;
        1..limit + 1
    }

    pub fn generate_a(
        &self,
        a: u64,
        emit: &mut dyn FnMut(Record) -> Result<(), CuboidError>,
    ) -> Result<(), CuboidError> {
        let max_sq = wide::square(self.max_g);

        let mut b = a + 1;
        // B < C, so A^2 + 2B^2 < G^2 bounds B.
        while wide::square(b)
            .checked_mul(2)
            .and_then(|twice| twice.checked_add(wide::square(a)))
            .is_some_and(|low| low < max_sq)
        {
            let mut c = b + 1;
            loop {
                let Some(sum) = wide::sum_of_three_squares(a, b, c) else {
                    break;
                };
                if sum > max_sq {
                    break;
                }
                if let Some(g) = wide::exact_sqrt(sum) {
                    let g = g as u64;
                    if g > self.min_g {
                        emit(Record::quadruple(a, b, c, g))?;
                    }
                }
                c += 1;
            }
            b += 1;
        }
        Ok(())
    }

    pub fn generate_range(
        &self,
        a_values: Range<u64>,
        worker: usize,
        coordinator: &FlushCoordinator,
        cancel: &CancellationToken,
    ) -> Result<(), CuboidError> {
        for a in a_values {
            cancel.check()?;
            self.generate_a(a, &mut |record| {
                coordinator.insert(worker, record).map(|_| ())
            })?;
        }
        Ok(())
    }
}

/// Splits `range` into consecutive chunks of at most `chunk` values.
pub fn chunk_range(range: Range<u64>, chunk: u64) -> impl Iterator<Item = Range<u64>> {
    let chunk = chunk.max(1);
    let end = range.end;
    (range.start..end)
        .step_by(chunk as usize)
        .map(move |start| start..start.saturating_add(chunk).min(end))
}

/// Reports progress every sixteenth of a range of generation work units.
pub struct RangeProgress {
    progress: Arc<ProgressSink>,
    end: u64,
    step: u64,
}

impl RangeProgress {
    pub fn new(progress: Arc<ProgressSink>, range: &Range<u64>) -> Self {
        let span = range.end.saturating_sub(range.start);
        Self {
            progress,
            end: range.end,
            step: (span >> 4).max(1),
        }
    }

    /// Called with each dispatched chunk; logs when it crosses a step boundary.
    pub fn dispatched(&self, chunk: &Range<u64>) {
        if chunk.is_empty() {
            return;
        }
        if chunk.start / self.step != chunk.end / self.step || chunk.end == self.end {
            self.progress.line(format!(
                "[generate] dispatched up to {} of {}",
                chunk.end, self.end
            ));
        }
    }
}

/// Two flushes over two buffers with three groups (G = 270, 271, 272) and
/// duplicates both within a flush and across flushes. Outer index is the
/// flush, inner index the buffer.
pub fn fixture_flushes() -> [[Vec<Record>; 2]; 2] {
    [
        [
            vec![
                Record::pair(44, 267, 271),
                Record::pair(125, 240, 271),
                Record::pair(44, 267, 270),
                Record::pair(125, 120, 270),
                Record::pair(117, 244, 272),
            ],
            vec![
                Record::pair(117, 244, 270),
                Record::pair(44, 267, 272),
                Record::pair(126, 239, 272),
            ],
        ],
        [
            vec![Record::pair(117, 244, 271), Record::pair(220, 240, 271)],
            vec![Record::pair(125, 240, 271), Record::pair(49, 267, 271)],
        ],
    ]
}
