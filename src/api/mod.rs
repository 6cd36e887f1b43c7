use std::fmt;

use thiserror::Error;

use crate::def::*;

/*****************************************************************************
 * error codes
 *****************************************************************************/

/// Fatal errors, surfaced at `create()` time or from the finalize pass.
///
/// Nothing here is raised from inside `compress_ctu`: the search always
/// terminates with a valid committed tree, and per-candidate collaborator
/// failures are excluded from the cost comparison instead of propagated.
#[derive(Debug, Error)]
pub enum CuError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("buffer allocation failed: {0}")]
    BufferAlloc(&'static str),
    #[error("finalize failed: {0}")]
    Finalize(#[from] CollabError),
}

/// Non-fatal per-candidate failure of one of the collaborators.
///
/// The failing candidate is dropped from the mode comparison and the
/// search falls back to the remaining candidates.
#[derive(Debug, Clone, Error)]
pub enum CollabError {
    #[error("prediction search: {0}")]
    PredSearch(String),
    #[error("transform/quantize: {0}")]
    TrQuant(String),
    #[error("entropy coder: {0}")]
    Entropy(String),
}

/*****************************************************************************
 * slice type
 *****************************************************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
}

impl SliceType {
    #[inline]
    pub fn is_inter(self) -> bool {
        !matches!(self, SliceType::I)
    }
}

impl Default for SliceType {
    fn default() -> Self {
        SliceType::I
    }
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceType::I => write!(f, "I"),
            SliceType::P => write!(f, "P"),
            SliceType::B => write!(f, "B"),
        }
    }
}

/*****************************************************************************
 * configuration surface consumed by the CU engine
 *****************************************************************************/
#[derive(Debug, Clone)]
pub struct CuConfig {
    /// Picture dimensions. Must be multiples of the minimum CU size.
    pub pic_width: u16,
    pub pic_height: u16,
    /// log2 of the CTU size, 4..=MAX_CU_LOG2.
    pub log2_ctu_size: u8,
    /// log2 of the minimum CU size, MIN_CU_LOG2..=log2_ctu_size.
    pub log2_min_cu_size: u8,
    /// Base slice QP; also the prediction reference for DQP signalling.
    pub qp: u8,
    pub slice_type: SliceType,
    /// Test asymmetric motion partitions (gated per-depth by
    /// `derive_test_mode_amp`).
    pub amp_enabled: bool,
    /// Test intra prediction on inter slices at extra search cost.
    pub intra_in_inter_enabled: bool,
    pub pcm_enabled: bool,
    /// Inclusive log2 CU-size bounds inside which PCM is considered.
    pub log2_pcm_min_size: u8,
    pub log2_pcm_max_size: u8,
    /// Skip remaining quadrants once the accumulated child cost already
    /// exceeds the best non-split cost (heuristic, not required for
    /// correctness).
    pub early_abort_enabled: bool,
    /// End the mode search at a depth once the cheapest merge/skip
    /// candidate codes no coefficients.
    pub early_skip_enabled: bool,
    /// Allow per-CU delta-QP signalling.
    pub dqp_enabled: bool,
    /// Collect adaptive reconstruction-level statistics during the
    /// finalize pass.
    pub arl_enabled: bool,
    pub dist_metric: DistMetric,
    /// Tie-break bias favoring the shallower depth: a split is committed
    /// only when its cost beats the non-split cost by more than this
    /// margin. Zero reproduces the strict less-than comparison.
    pub split_bias: f64,
}

impl Default for CuConfig {
    fn default() -> Self {
        CuConfig {
            pic_width: 64,
            pic_height: 64,
            log2_ctu_size: MAX_CU_LOG2 as u8,
            log2_min_cu_size: MIN_CU_LOG2 as u8,
            qp: 32,
            slice_type: SliceType::I,
            amp_enabled: false,
            intra_in_inter_enabled: false,
            pcm_enabled: false,
            log2_pcm_min_size: 3,
            log2_pcm_max_size: 5,
            early_abort_enabled: true,
            early_skip_enabled: false,
            dqp_enabled: false,
            arl_enabled: false,
            dist_metric: DistMetric::Sse,
            split_bias: 0.0,
        }
    }
}

impl CuConfig {
    /// Number of quad-tree depth levels, CTU size down to the minimum
    /// CU size inclusive.
    #[inline]
    pub fn total_depth(&self) -> usize {
        (self.log2_ctu_size - self.log2_min_cu_size) as usize + 1
    }

    #[inline]
    pub fn ctu_size(&self) -> usize {
        1 << self.log2_ctu_size
    }

    pub fn validate(&self) -> Result<(), CuError> {
        if self.log2_ctu_size > MAX_CU_LOG2 as u8 || self.log2_ctu_size < 4 {
            return Err(CuError::InvalidConfig("log2_ctu_size out of range"));
        }
        if self.log2_min_cu_size < MIN_CU_LOG2 as u8 || self.log2_min_cu_size > self.log2_ctu_size
        {
            return Err(CuError::InvalidConfig(
                "minimum CU size must be a power-of-two submultiple of the CTU size",
            ));
        }
        if self.pic_width == 0 || self.pic_height == 0 {
            return Err(CuError::InvalidConfig("empty picture"));
        }
        let min_cu = 1u16 << self.log2_min_cu_size;
        if self.pic_width % min_cu != 0 || self.pic_height % min_cu != 0 {
            return Err(CuError::InvalidConfig(
                "picture dimensions must be multiples of the minimum CU size",
            ));
        }
        if self.qp > MAX_QUANT {
            return Err(CuError::InvalidConfig("qp out of range"));
        }
        if self.pcm_enabled
            && (self.log2_pcm_min_size > self.log2_pcm_max_size
                || self.log2_pcm_min_size < self.log2_min_cu_size
                || self.log2_pcm_max_size > self.log2_ctu_size)
        {
            return Err(CuError::InvalidConfig("bad PCM size bounds"));
        }
        if !self.split_bias.is_finite() || self.split_bias < 0.0 {
            return Err(CuError::InvalidConfig("split_bias must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CuConfig::default().validate().is_ok());
        assert_eq!(CuConfig::default().total_depth(), 4);
    }

    #[test]
    fn rejects_bad_min_cu() {
        let mut cfg = CuConfig::default();
        cfg.log2_min_cu_size = 7;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unaligned_picture() {
        let mut cfg = CuConfig::default();
        cfg.pic_width = 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_pcm_bounds() {
        let mut cfg = CuConfig::default();
        cfg.pcm_enabled = true;
        cfg.log2_pcm_min_size = 6;
        cfg.log2_pcm_max_size = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_split_bias() {
        let mut cfg = CuConfig::default();
        cfg.split_bias = -1.0;
        assert!(cfg.validate().is_err());
    }
}
