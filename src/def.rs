use num_derive::FromPrimitive;

/*****************************************************************************
 * types
 *****************************************************************************/

#[allow(non_camel_case_types)]
pub type pel = u16;

pub const BIT_DEPTH: usize = 8;
pub const MAX_SAMPLE_VAL: pel = ((1 << BIT_DEPTH) - 1) as pel;
pub(crate) const MID_SAMPLE_VAL: pel = (1 << (BIT_DEPTH - 1)) as pel;

pub const Y_C: usize = 0; /* Y luma */
pub const U_C: usize = 1; /* Cb chroma */
pub const V_C: usize = 2; /* Cr chroma */
pub const N_C: usize = 3; /* number of color components */

pub const MAX_CU_LOG2: usize = 6; /* 64x64 CTU */
pub const MIN_CU_LOG2: usize = 3; /* 8x8 minimum CU */
pub const MAX_CU_SIZE: usize = 1 << MAX_CU_LOG2;
pub const MAX_CU_DIM: usize = 1 << (MAX_CU_LOG2 + MAX_CU_LOG2);
/* depth levels of the CU quad-tree, 64x64 down to 8x8 */
pub const MAX_CU_DEPTH: usize = MAX_CU_LOG2 - MIN_CU_LOG2 + 1;

/* prediction buffer slots per depth: one per candidate family so partial
 * results of one evaluator never clobber a sibling's */
pub(crate) const MAX_PRED_TYPES: usize = 6;

/* maximum merge candidate count considered per CU */
pub(crate) const MRG_MAX_NUM_CANDS: usize = 5;

/* maximum partitions of a CU under any partition shape */
pub const MAX_NUM_PART: usize = 4;

/* maximum cost value */
pub(crate) const MAX_COST: f64 = 1.7e+308;

/* Max. and min. quantization parameter */
pub const MAX_QUANT: u8 = 51;
pub const MIN_QUANT: u8 = 0;

#[inline]
pub(crate) fn clip_pel(v: i32) -> pel {
    v.max(0).min(MAX_SAMPLE_VAL as i32) as pel
}

/*****************************************************************************
 * partition shape of a CU
 *****************************************************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PartSize {
    Size2Nx2N = 0,
    Size2NxN = 1,
    SizeNx2N = 2,
    SizeNxN = 3,
    /* asymmetric motion partitions */
    Size2NxnU = 4,
    Size2NxnD = 5,
    SizenLx2N = 6,
    SizenRx2N = 7,
    SizeNone = 8,
}

impl Default for PartSize {
    fn default() -> Self {
        PartSize::SizeNone
    }
}

impl PartSize {
    #[inline]
    pub fn is_amp(self) -> bool {
        matches!(
            self,
            PartSize::Size2NxnU | PartSize::Size2NxnD | PartSize::SizenLx2N | PartSize::SizenRx2N
        )
    }

    /// Number of prediction partitions under this shape.
    #[inline]
    pub fn part_num(self) -> usize {
        match self {
            PartSize::Size2Nx2N | PartSize::SizeNone => 1,
            PartSize::SizeNxN => 4,
            _ => 2,
        }
    }

    /// Offset and size of partition `idx` within a `size` x `size` CU.
    pub fn part_geom(self, size: usize, idx: usize) -> PartGeom {
        let n = size >> 1;
        let q = size >> 2;
        let (x, y, w, h) = match self {
            PartSize::Size2Nx2N | PartSize::SizeNone => (0, 0, size, size),
            PartSize::Size2NxN => (0, idx * n, size, n),
            PartSize::SizeNx2N => (idx * n, 0, n, size),
            PartSize::SizeNxN => ((idx & 1) * n, (idx >> 1) * n, n, n),
            PartSize::Size2NxnU => {
                if idx == 0 {
                    (0, 0, size, q)
                } else {
                    (0, q, size, size - q)
                }
            }
            PartSize::Size2NxnD => {
                if idx == 0 {
                    (0, 0, size, size - q)
                } else {
                    (0, size - q, size, q)
                }
            }
            PartSize::SizenLx2N => {
                if idx == 0 {
                    (0, 0, q, size)
                } else {
                    (q, 0, size - q, size)
                }
            }
            PartSize::SizenRx2N => {
                if idx == 0 {
                    (0, 0, size - q, size)
                } else {
                    (size - q, 0, q, size)
                }
            }
        };
        PartGeom { idx, x, y, w, h }
    }
}

/// Geometry of one prediction partition, relative to its CU origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartGeom {
    pub idx: usize,
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/*****************************************************************************
 * prediction mode of a CU
 *****************************************************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PredMode {
    Skip = 0,
    Merge = 1,
    Inter = 2,
    Intra = 3,
    /* intra prediction on an otherwise inter-coded slot */
    IntraInInter = 4,
    /* raw sample pass-through */
    Ipcm = 5,
}

impl Default for PredMode {
    fn default() -> Self {
        PredMode::Skip
    }
}

impl PredMode {
    #[inline]
    pub fn is_intra(self) -> bool {
        matches!(self, PredMode::Intra | PredMode::IntraInInter)
    }
}

/*****************************************************************************
 * motion information of one prediction partition
 *****************************************************************************/
pub const MV_X: usize = 0;
pub const MV_Y: usize = 1;
pub const MV_D: usize = 2;

pub const REFI_INVALID: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionInfo {
    pub mv: [i16; MV_D],
    pub refi: i8,
}

impl MotionInfo {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.refi >= 0
    }

    pub fn zero() -> Self {
        MotionInfo {
            mv: [0, 0],
            refi: 0,
        }
    }
}

/*****************************************************************************
 * distortion metric
 *****************************************************************************/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistMetric {
    /* sum of squared differences */
    Sse,
    /* sum of absolute differences */
    Sad,
}

impl Default for DistMetric {
    fn default() -> Self {
        DistMetric::Sse
    }
}

pub(crate) fn dist_plane(metric: DistMetric, org: &[pel], cur: &[pel]) -> u64 {
    debug_assert_eq!(org.len(), cur.len());
    match metric {
        DistMetric::Sse => org
            .iter()
            .zip(cur.iter())
            .map(|(&o, &c)| {
                let d = o as i64 - c as i64;
                (d * d) as u64
            })
            .sum(),
        DistMetric::Sad => org
            .iter()
            .zip(cur.iter())
            .map(|(&o, &c)| (o as i64 - c as i64).abs() as u64)
            .sum(),
    }
}

/*****************************************************************************
 * lambda derivation
 *****************************************************************************/
lazy_static! {
    /* Lagrangian weight per QP, 0.57 * 2^((qp - 12) / 3) */
    static ref QP_LAMBDA: [f64; (MAX_QUANT + 1) as usize] = {
        let mut tbl = [0.0f64; (MAX_QUANT + 1) as usize];
        for (qp, v) in tbl.iter_mut().enumerate() {
            *v = 0.57f64 * 2.0f64.powf((qp as f64 - 12.0) / 3.0);
        }
        tbl
    };
}

/// Lagrangian weight for the RD cost `dist + lambda * bits`.
///
/// For SAD the square-root of the SSE-based weight is used so it
/// matches the L1 distortion scale.
pub fn lambda_from_qp(qp: u8, metric: DistMetric) -> f64 {
    let l = QP_LAMBDA[qp.min(MAX_QUANT) as usize];
    match metric {
        DistMetric::Sse => l,
        DistMetric::Sad => l.sqrt(),
    }
}

/*****************************************************************************
 * CU sample buffer, one plane per color component (4:2:0)
 *****************************************************************************/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuBuffer<T> {
    pub w: usize,
    pub h: usize,
    pub data: [Vec<T>; N_C],
}

pub type YuvBuffer = CuBuffer<pel>;

impl<T: Default + Copy> CuBuffer<T> {
    pub fn new(w: usize, h: usize) -> Self {
        CuBuffer {
            w,
            h,
            data: [
                vec![T::default(); w * h],
                vec![T::default(); (w >> 1) * (h >> 1)],
                vec![T::default(); (w >> 1) * (h >> 1)],
            ],
        }
    }

    #[inline]
    pub fn plane_dims(&self, c: usize) -> (usize, usize) {
        if c == Y_C {
            (self.w, self.h)
        } else {
            (self.w >> 1, self.h >> 1)
        }
    }

    pub fn fill(&mut self, v: T) {
        for plane in self.data.iter_mut() {
            for p in plane.iter_mut() {
                *p = v;
            }
        }
    }

    /// Copy the whole of `src` into this buffer. Dimensions must match.
    pub fn copy_from(&mut self, src: &CuBuffer<T>) {
        debug_assert_eq!((self.w, self.h), (src.w, src.h));
        for c in 0..N_C {
            self.data[c].copy_from_slice(&src.data[c]);
        }
    }

    /// Paste `blk` at luma offset (`x`, `y`); chroma offsets are halved.
    pub fn paste(&mut self, x: usize, y: usize, blk: &CuBuffer<T>) {
        debug_assert!(x + blk.w <= self.w && y + blk.h <= self.h);
        for c in 0..N_C {
            let (bw, bh) = blk.plane_dims(c);
            let (dw, _) = self.plane_dims(c);
            let (ox, oy) = if c == Y_C { (x, y) } else { (x >> 1, y >> 1) };
            for j in 0..bh {
                let dst = (oy + j) * dw + ox;
                self.data[c][dst..dst + bw].copy_from_slice(&blk.data[c][j * bw..j * bw + bw]);
            }
        }
    }

    /// Extract the block at luma offset (`x`, `y`) of `blk`'s dimensions.
    pub fn extract(&self, x: usize, y: usize, blk: &mut CuBuffer<T>) {
        debug_assert!(x + blk.w <= self.w && y + blk.h <= self.h);
        for c in 0..N_C {
            let (bw, bh) = blk.plane_dims(c);
            let (sw, _) = self.plane_dims(c);
            let (ox, oy) = if c == Y_C { (x, y) } else { (x >> 1, y >> 1) };
            for j in 0..bh {
                let src = (oy + j) * sw + ox;
                blk.data[c][j * bw..j * bw + bw].copy_from_slice(&self.data[c][src..src + bw]);
            }
        }
    }
}

impl YuvBuffer {
    /// Total distortion against `other` over all three planes.
    pub fn dist(&self, metric: DistMetric, other: &YuvBuffer) -> u64 {
        debug_assert_eq!((self.w, self.h), (other.w, other.h));
        (0..N_C)
            .map(|c| dist_plane(metric, &self.data[c], &other.data[c]))
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn part_geoms_tile_cu() {
        let shapes = [
            PartSize::Size2Nx2N,
            PartSize::Size2NxN,
            PartSize::SizeNx2N,
            PartSize::SizeNxN,
            PartSize::Size2NxnU,
            PartSize::Size2NxnD,
            PartSize::SizenLx2N,
            PartSize::SizenRx2N,
        ];
        for &ps in shapes.iter() {
            let size = 32usize;
            let mut area = 0;
            for i in 0..ps.part_num() {
                let g = ps.part_geom(size, i);
                assert!(g.x + g.w <= size && g.y + g.h <= size, "{:?}", ps);
                area += g.w * g.h;
            }
            assert_eq!(area, size * size, "{:?} does not tile", ps);
        }
    }

    #[test]
    fn amp_partitions_are_quarter_split() {
        let g0 = PartSize::Size2NxnU.part_geom(16, 0);
        let g1 = PartSize::Size2NxnU.part_geom(16, 1);
        assert_eq!((g0.w, g0.h), (16, 4));
        assert_eq!((g1.w, g1.h), (16, 12));
        assert_eq!(g1.y, 4);
    }

    #[test]
    fn enums_from_primitive() {
        use num_traits::FromPrimitive;
        assert_eq!(PartSize::from_u8(3), Some(PartSize::SizeNxN));
        assert_eq!(PredMode::from_u8(5), Some(PredMode::Ipcm));
        assert_eq!(PartSize::from_u8(9), None);
    }

    #[test]
    fn lambda_increases_with_qp() {
        assert!(lambda_from_qp(32, DistMetric::Sse) > lambda_from_qp(22, DistMetric::Sse));
        let l = lambda_from_qp(32, DistMetric::Sse);
        assert!((lambda_from_qp(32, DistMetric::Sad) - l.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn paste_extract_round_trip() {
        let mut big = YuvBuffer::new(16, 16);
        let mut blk = YuvBuffer::new(8, 8);
        blk.fill(77);
        big.paste(8, 8, &blk);
        let mut out = YuvBuffer::new(8, 8);
        big.extract(8, 8, &mut out);
        assert_eq!(blk, out);
        assert_eq!(big.data[Y_C][0], 0);
        assert_eq!(big.data[U_C][4 * 8 + 4], 77);
    }

    #[test]
    fn dist_metrics() {
        let mut a = YuvBuffer::new(8, 8);
        let b = YuvBuffer::new(8, 8);
        a.data[Y_C][0] = 3;
        assert_eq!(a.dist(DistMetric::Sse, &b), 9);
        assert_eq!(a.dist(DistMetric::Sad, &b), 3);
    }
}
