use crate::api::*;
use crate::collab::CoeffBlock;
use crate::def::*;

/*****************************************************************************
 * per-depth prediction buffer slots
 *
 * Each candidate family predicts into its own slot so evaluators never
 * clobber each other's partial results before a winner is chosen.
 *****************************************************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PredSlot {
    Inter = 0,
    Intra = 1,
    Rect2NxN = 2,
    RectNx2N = 3,
    Merge = 4,
    IntraInInter = 5,
}

/*****************************************************************************
 * CU metadata
 *****************************************************************************/

/// Everything decided for one CU candidate: geometry, mode, side
/// information, coefficients and the accumulated RD statistics.
///
/// Two instances live per depth ("best" and "temp"); "best" is only
/// ever replaced by a whole-value swap after a cost comparison.
#[derive(Debug, Clone, Default)]
pub struct CuData {
    pub depth: u8,
    /// Luma position of the CU origin in the picture.
    pub x: u16,
    pub y: u16,
    pub log2_size: u8,
    pub part_size: PartSize,
    pub pred_mode: PredMode,
    pub qp: u8,
    /// Whether a delta-QP is actually signalled for this CU.
    pub dqp_coded: bool,
    /// Per-partition motion (inter/merge/skip modes).
    pub motion: [MotionInfo; MAX_NUM_PART],
    pub merge_idx: Option<u8>,
    /// Per-partition intra modes.
    pub intra_modes: [u8; MAX_NUM_PART],
    pub coef: CoeffBlock,
    /* accumulated RD statistics */
    pub cost: f64,
    pub dist: u64,
    pub bits: u32,
}

impl CuData {
    fn with_size(size: usize) -> Self {
        CuData {
            coef: CoeffBlock::new(size, size),
            cost: MAX_COST,
            ..Default::default()
        }
    }

    /// Reset to an undecided candidate covering the given geometry.
    pub(crate) fn init(&mut self, depth: u8, x: u16, y: u16, log2_size: u8, qp: u8) {
        self.depth = depth;
        self.x = x;
        self.y = y;
        self.log2_size = log2_size;
        self.part_size = PartSize::SizeNone;
        self.pred_mode = PredMode::Skip;
        self.qp = qp;
        self.dqp_coded = false;
        self.motion = [MotionInfo::default(); MAX_NUM_PART];
        self.merge_idx = None;
        self.intra_modes = [0; MAX_NUM_PART];
        self.coef.clear();
        self.cost = MAX_COST;
        self.dist = 0;
        self.bits = 0;
    }

    #[inline]
    pub fn size(&self) -> usize {
        1 << self.log2_size
    }

    /// Coded-block flag of the candidate.
    #[inline]
    pub fn has_coef(&self) -> bool {
        self.coef.any_nonzero()
    }
}

/*****************************************************************************
 * buffer pool
 *
 * Eager, depth-indexed scratch storage so no allocation happens inside
 * the hot recursive search. Depth d holds buffers of size ctu >> d.
 *****************************************************************************/
pub(crate) struct CuBufferPool {
    depths: usize,
    /* best/temp CU metadata per depth */
    pub best_cu: Vec<CuData>,
    pub temp_cu: Vec<CuData>,
    /* cheapest merge/skip candidate per depth, feeds the early-skip gate */
    pub merge_cu: Vec<CuData>,
    pub merge_best_cu: Vec<CuData>,
    /* original-sample copy per depth */
    pub org: Vec<YuvBuffer>,
    /* best/temp sample buffers per depth */
    pub pred_best: Vec<YuvBuffer>,
    pub pred_temp: Vec<YuvBuffer>,
    pub resi_best: Vec<CuBuffer<i16>>,
    pub resi_temp: Vec<CuBuffer<i16>>,
    pub reco_best: Vec<YuvBuffer>,
    pub reco_temp: Vec<YuvBuffer>,
    /* per-candidate-family prediction buffers per depth */
    pub pred_mode_buf: Vec<Vec<YuvBuffer>>,
}

impl CuBufferPool {
    /// Allocate every per-depth buffer up front. Fatal on an invalid
    /// geometry; no allocation is attempted afterwards.
    pub(crate) fn create(total_depth: usize, max_cuwh: usize) -> Result<Self, CuError> {
        if total_depth == 0 || total_depth > MAX_CU_DEPTH {
            return Err(CuError::BufferAlloc("total depth out of range"));
        }
        if max_cuwh > MAX_CU_SIZE || !max_cuwh.is_power_of_two() {
            return Err(CuError::BufferAlloc("CTU size out of range"));
        }
        if max_cuwh >> (total_depth - 1) < (1 << MIN_CU_LOG2) {
            return Err(CuError::BufferAlloc("depth exceeds minimum CU size"));
        }

        let mut pool = CuBufferPool {
            depths: total_depth,
            best_cu: Vec::with_capacity(total_depth),
            temp_cu: Vec::with_capacity(total_depth),
            merge_cu: Vec::with_capacity(total_depth),
            merge_best_cu: Vec::with_capacity(total_depth),
            org: Vec::with_capacity(total_depth),
            pred_best: Vec::with_capacity(total_depth),
            pred_temp: Vec::with_capacity(total_depth),
            resi_best: Vec::with_capacity(total_depth),
            resi_temp: Vec::with_capacity(total_depth),
            reco_best: Vec::with_capacity(total_depth),
            reco_temp: Vec::with_capacity(total_depth),
            pred_mode_buf: Vec::with_capacity(total_depth),
        };
        for d in 0..total_depth {
            let size = max_cuwh >> d;
            pool.best_cu.push(CuData::with_size(size));
            pool.temp_cu.push(CuData::with_size(size));
            pool.merge_cu.push(CuData::with_size(size));
            pool.merge_best_cu.push(CuData::with_size(size));
            pool.org.push(YuvBuffer::new(size, size));
            pool.pred_best.push(YuvBuffer::new(size, size));
            pool.pred_temp.push(YuvBuffer::new(size, size));
            pool.resi_best.push(CuBuffer::new(size, size));
            pool.resi_temp.push(CuBuffer::new(size, size));
            pool.reco_best.push(YuvBuffer::new(size, size));
            pool.reco_temp.push(YuvBuffer::new(size, size));
            pool.pred_mode_buf
                .push((0..MAX_PRED_TYPES).map(|_| YuvBuffer::new(size, size)).collect());
        }
        Ok(pool)
    }

    #[inline]
    pub(crate) fn depths(&self) -> usize {
        self.depths
    }

    #[inline]
    pub(crate) fn pred_slot_mut(&mut self, d: usize, slot: PredSlot) -> &mut YuvBuffer {
        &mut self.pred_mode_buf[d][slot as usize]
    }

    /// Promote the candidate at depth `d` to best: whole-value swap of
    /// the CU metadata and every associated sample buffer, never a
    /// partial copy.
    pub(crate) fn swap_best_temp(&mut self, d: usize) {
        std::mem::swap(&mut self.best_cu[d], &mut self.temp_cu[d]);
        std::mem::swap(&mut self.pred_best[d], &mut self.pred_temp[d]);
        std::mem::swap(&mut self.resi_best[d], &mut self.resi_temp[d]);
        std::mem::swap(&mut self.reco_best[d], &mut self.reco_temp[d]);
    }

    /// Promote the merge candidate at depth `d` to merge-best.
    pub(crate) fn swap_merge_best(&mut self, d: usize) {
        std::mem::swap(&mut self.merge_best_cu[d], &mut self.merge_cu[d]);
    }
}
