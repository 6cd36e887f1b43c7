/* Adaptive reconstruction level (ARL) statistics collection.
 *
 * A purely additive side pass over the already-finalized tree: it has
 * no effect on mode decisions. Per transform unit it accumulates, for
 * each absolute coefficient level, the sum of pre-rounding levels and
 * the sample count, which a later refinement stage can turn into
 * per-level reconstruction offsets. */

/* absolute levels above this are not tracked */
pub(crate) const LEVEL_RANGE: usize = 30;

#[derive(Debug, Clone)]
pub struct ArlStats {
    /// Sum of absolute pre-rounding levels, indexed by the quantized
    /// absolute level.
    pub c_sum: [f64; LEVEL_RANGE + 1],
    /// Number of coefficients observed per quantized absolute level.
    pub num_samples: [u32; LEVEL_RANGE + 1],
}

impl Default for ArlStats {
    fn default() -> Self {
        ArlStats {
            c_sum: [0.0; LEVEL_RANGE + 1],
            num_samples: [0; LEVEL_RANGE + 1],
        }
    }
}

impl ArlStats {
    pub fn reset(&mut self) {
        *self = ArlStats::default();
    }

    /// Accumulate one transform unit's coefficients. `levels` are the
    /// quantized levels, `arl` the matching pre-rounding levels.
    pub(crate) fn collect_tu(&mut self, levels: &[i16], arl: &[i32]) {
        debug_assert_eq!(levels.len(), arl.len());
        for (&l, &a) in levels.iter().zip(arl.iter()) {
            let abs = l.abs() as usize;
            if abs >= 1 && abs <= LEVEL_RANGE {
                self.c_sum[abs] += a.abs() as f64;
                self.num_samples[abs] += 1;
            }
        }
    }

    /// Total number of tracked coefficients.
    pub fn total_samples(&self) -> u64 {
        self.num_samples.iter().map(|&n| n as u64).sum()
    }
}
