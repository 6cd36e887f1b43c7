//! Contracts with the numerical collaborators of the CU engine.
//!
//! The engine never computes predictions, transforms or entropy symbols
//! itself; it orchestrates these traits to arrive at a cost-minimal CU
//! tree. Implementations are injected once at construction and never
//! rewired mid-search.

use crate::api::CollabError;
use crate::def::*;
use crate::enc::buf::CuData;

/// Position and size of the CU a collaborator is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuGeom {
    pub depth: u8,
    /// Luma position of the CU origin in the picture.
    pub x: u16,
    pub y: u16,
    pub log2_size: u8,
    pub qp: u8,
}

impl CuGeom {
    #[inline]
    pub fn size(&self) -> usize {
        1 << self.log2_size
    }
}

/// Result of a motion estimation call for one partition.
#[derive(Debug, Clone)]
pub struct MotionEstimate {
    pub motion: MotionInfo,
    /// Predicted samples, sized to the partition.
    pub pred: YuvBuffer,
}

/// Result of an intra mode estimation call for one partition.
#[derive(Debug, Clone)]
pub struct IntraEstimate {
    /// Intra prediction mode index (0 = planar, 1 = DC, 2.. = angular).
    pub mode: u8,
    pub pred: YuvBuffer,
}

/// One merge candidate: neighbor motion plus its prediction.
#[derive(Debug, Clone)]
pub struct MergeCand {
    pub cand_idx: u8,
    pub motion: MotionInfo,
    pub pred: YuvBuffer,
}

/// Quantized transform coefficients for a CU, plus the pre-rounding
/// levels the ARL statistics pass consumes.
#[derive(Debug, Clone, Default)]
pub struct CoeffBlock {
    pub levels: [Vec<i16>; N_C],
    pub arl_levels: [Vec<i32>; N_C],
}

impl CoeffBlock {
    pub fn new(w: usize, h: usize) -> Self {
        CoeffBlock {
            levels: [
                vec![0; w * h],
                vec![0; (w >> 1) * (h >> 1)],
                vec![0; (w >> 1) * (h >> 1)],
            ],
            arl_levels: [
                vec![0; w * h],
                vec![0; (w >> 1) * (h >> 1)],
                vec![0; (w >> 1) * (h >> 1)],
            ],
        }
    }

    pub fn clear(&mut self) {
        for c in 0..N_C {
            for l in self.levels[c].iter_mut() {
                *l = 0;
            }
            for l in self.arl_levels[c].iter_mut() {
                *l = 0;
            }
        }
    }

    /// Coded-block flag over all planes.
    pub fn any_nonzero(&self) -> bool {
        self.levels
            .iter()
            .any(|p| p.iter().any(|&l| l != 0))
    }
}

/// Pixel-level prediction search: motion estimation and intra angular
/// search live behind this boundary.
pub trait PredSearch {
    /// Estimate motion for one partition of an inter CU; the returned
    /// prediction is sized to the partition.
    fn estimate_motion(
        &mut self,
        geom: &CuGeom,
        part: &PartGeom,
        org: &YuvBuffer,
    ) -> Result<MotionEstimate, CollabError>;

    /// Pick the best intra mode for one partition.
    fn estimate_intra(
        &mut self,
        geom: &CuGeom,
        part: &PartGeom,
        org: &YuvBuffer,
    ) -> Result<IntraEstimate, CollabError>;

    /// Merge candidate list for a 2Nx2N CU, in signalling order. An
    /// empty list disables merge/skip for this CU.
    fn merge_candidates(&mut self, geom: &CuGeom) -> Vec<MergeCand>;
}

/// Forward and inverse transform/quantization arithmetic.
pub trait TrQuant {
    fn transform_and_quantize(
        &mut self,
        resi: &CuBuffer<i16>,
        qp: u8,
    ) -> Result<CoeffBlock, CollabError>;

    fn dequantize_and_inverse(
        &mut self,
        coef: &CoeffBlock,
        qp: u8,
        resi: &mut CuBuffer<i16>,
    ) -> Result<(), CollabError>;
}

/// Entropy coder boundary. Bit estimation runs in counting-only mode
/// under a restored context snapshot; only the finalize pass emits.
pub trait EntropyCoder {
    /// Opaque SBAC context snapshot token.
    type Snapshot;

    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&mut self, snap: &Self::Snapshot);

    /// Counting-only estimate of the syntax bits for a CU candidate.
    fn estimate_bits(&mut self, cu: &CuData) -> u32;

    /// Counting-only estimate of the split-flag bits at `depth`.
    fn estimate_split_bits(&mut self, depth: u8, split: bool) -> u32;

    /// Emit final syntax for a committed CU. `reco` carries the raw
    /// samples when the CU is PCM-coded. Called only from the
    /// finalize pass, in encoding order.
    fn encode_final(&mut self, cu: &CuData, reco: &YuvBuffer) -> Result<(), CollabError>;
}

/// Rate control: target QP per CU.
pub trait RateCtrl {
    fn query_qp(&mut self, geom: &CuGeom, depth: u8) -> u8;
}

/// Picture store: original sample input and reconstruction output.
pub trait PicStore {
    /// Copy the original samples at luma position (`x`, `y`) into `org`
    /// (which is already sized to the CU).
    fn read_original(&self, x: u16, y: u16, org: &mut YuvBuffer);

    /// Write a committed reconstruction back into the picture.
    fn write_reconstruction(&mut self, x: u16, y: u16, reco: &YuvBuffer);
}
