//! Deterministic reference collaborators for exercising the CU engine.
//!
//! These implement the collaborator contracts with arithmetic simple
//! enough to reason about in tests: flat-DC intra prediction, zero
//! motion inter, shift quantization and a byte-serializing entropy
//! coder with a counter context.

#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use rhevc::api::CollabError;
use rhevc::collab::*;
use rhevc::def::*;
use rhevc::CuData;

/*****************************************************************************
 * picture store
 *****************************************************************************/
pub struct RefPicStore {
    pub org: YuvBuffer,
    pub rec: YuvBuffer,
}

impl RefPicStore {
    pub fn flat(w: usize, h: usize, v: pel) -> Self {
        let mut org = YuvBuffer::new(w, h);
        org.fill(v);
        RefPicStore {
            org,
            rec: YuvBuffer::new(w, h),
        }
    }

    /// Seeded pseudo-random picture content.
    pub fn noise(w: usize, h: usize, seed: u64) -> Self {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        let mut org = YuvBuffer::new(w, h);
        for c in 0..N_C {
            for p in org.data[c].iter_mut() {
                *p = rng.gen_range(0, 256) as pel;
            }
        }
        RefPicStore {
            org,
            rec: YuvBuffer::new(w, h),
        }
    }

    /// Luma filled from `f(x, y)`; chroma planes take the co-sited
    /// luma value.
    pub fn from_luma<F: Fn(usize, usize) -> pel>(w: usize, h: usize, f: F) -> Self {
        let mut org = YuvBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                org.data[Y_C][y * w + x] = f(x, y);
            }
        }
        for c in 1..N_C {
            for y in 0..h / 2 {
                for x in 0..w / 2 {
                    org.data[c][y * (w / 2) + x] = f(x * 2, y * 2);
                }
            }
        }
        RefPicStore {
            org,
            rec: YuvBuffer::new(w, h),
        }
    }
}

impl PicStore for RefPicStore {
    fn read_original(&self, x: u16, y: u16, org: &mut YuvBuffer) {
        self.org.extract(x as usize, y as usize, org);
    }

    fn write_reconstruction(&mut self, x: u16, y: u16, reco: &YuvBuffer) {
        self.rec.paste(x as usize, y as usize, reco);
    }
}

/*****************************************************************************
 * prediction search
 *****************************************************************************/
#[derive(Default)]
pub struct RefPredSearch {
    pub fail_motion: bool,
    pub fail_intra: bool,
    pub no_merge: bool,
}

/// Flat block at the per-plane mean of the original partition.
pub fn dc_pred_block(org: &YuvBuffer, pg: &PartGeom) -> YuvBuffer {
    let mut blk = YuvBuffer::new(pg.w, pg.h);
    org.extract(pg.x, pg.y, &mut blk);
    for c in 0..N_C {
        let sum: u64 = blk.data[c].iter().map(|&p| p as u64).sum();
        let n = blk.data[c].len() as u64;
        let mean = if n > 0 { ((sum + n / 2) / n) as pel } else { 0 };
        for p in blk.data[c].iter_mut() {
            *p = mean;
        }
    }
    blk
}

fn flat_block(w: usize, h: usize, v: pel) -> YuvBuffer {
    let mut blk = YuvBuffer::new(w, h);
    blk.fill(v);
    blk
}

impl PredSearch for RefPredSearch {
    fn estimate_motion(
        &mut self,
        _geom: &CuGeom,
        part: &PartGeom,
        _org: &YuvBuffer,
    ) -> Result<MotionEstimate, CollabError> {
        if self.fail_motion {
            return Err(CollabError::PredSearch("motion search disabled".into()));
        }
        Ok(MotionEstimate {
            motion: MotionInfo::zero(),
            pred: flat_block(part.w, part.h, 128),
        })
    }

    fn estimate_intra(
        &mut self,
        _geom: &CuGeom,
        part: &PartGeom,
        org: &YuvBuffer,
    ) -> Result<IntraEstimate, CollabError> {
        if self.fail_intra {
            return Err(CollabError::PredSearch("intra search disabled".into()));
        }
        Ok(IntraEstimate {
            mode: 1, /* DC */
            pred: dc_pred_block(org, part),
        })
    }

    fn merge_candidates(&mut self, geom: &CuGeom) -> Vec<MergeCand> {
        if self.no_merge {
            return Vec::new();
        }
        let s = geom.size();
        vec![
            MergeCand {
                cand_idx: 0,
                motion: MotionInfo::zero(),
                pred: flat_block(s, s, 128),
            },
            MergeCand {
                cand_idx: 1,
                motion: MotionInfo {
                    mv: [4, 0],
                    refi: 0,
                },
                pred: flat_block(s, s, 120),
            },
        ]
    }
}

/*****************************************************************************
 * transform / quantize
 *****************************************************************************/
#[derive(Default)]
pub struct RefTrQuant {
    pub fail: bool,
}

pub fn quant_step(qp: u8) -> i32 {
    1 << (qp / 6)
}

impl TrQuant for RefTrQuant {
    fn transform_and_quantize(
        &mut self,
        resi: &CuBuffer<i16>,
        qp: u8,
    ) -> Result<CoeffBlock, CollabError> {
        if self.fail {
            return Err(CollabError::TrQuant("transform disabled".into()));
        }
        let step = quant_step(qp);
        let mut coef = CoeffBlock::new(resi.w, resi.h);
        for c in 0..N_C {
            for (i, &r) in resi.data[c].iter().enumerate() {
                coef.levels[c][i] = (r as i32 / step) as i16;
                coef.arl_levels[c][i] = r as i32;
            }
        }
        Ok(coef)
    }

    fn dequantize_and_inverse(
        &mut self,
        coef: &CoeffBlock,
        qp: u8,
        resi: &mut CuBuffer<i16>,
    ) -> Result<(), CollabError> {
        if self.fail {
            return Err(CollabError::TrQuant("transform disabled".into()));
        }
        let step = quant_step(qp);
        for c in 0..N_C {
            for (r, &l) in resi.data[c].iter_mut().zip(coef.levels[c].iter()) {
                *r = (l as i32 * step) as i16;
            }
        }
        Ok(())
    }
}

/*****************************************************************************
 * entropy coder
 *****************************************************************************/
#[derive(Default)]
pub struct RefEntropyCoder {
    /// Adaptive context stand-in; snapshot/restore copies it.
    pub ctx: u64,
    /// Emitted bitstream fragments (finalize pass only).
    pub out: Vec<u8>,
}

/// Deterministic syntax bit count for a CU candidate.
pub fn cu_bits(cu: &CuData) -> u32 {
    let parts = cu.part_size.part_num() as u32;
    let mut bits = match cu.pred_mode {
        PredMode::Skip => 2,
        PredMode::Merge => 4,
        PredMode::Inter => {
            let mut b = 8 + 6 * parts;
            for m in cu.motion.iter().take(parts as usize) {
                b += m.mv[MV_X].abs() as u32 + m.mv[MV_Y].abs() as u32;
            }
            b
        }
        PredMode::Intra => 6 + 4 * parts,
        PredMode::IntraInInter => 10 + 4,
        PredMode::Ipcm => {
            let s = cu.size() as u32;
            8 + s * s * 8 + 2 * (s / 2) * (s / 2) * 8
        }
    };
    if !matches!(cu.pred_mode, PredMode::Skip | PredMode::Ipcm) {
        bits += coeff_bits(&cu.coef);
    }
    if cu.dqp_coded {
        bits += 6;
    }
    bits
}

fn coeff_bits(coef: &CoeffBlock) -> u32 {
    let mut bits = 3; /* one cbf flag per plane */
    for c in 0..N_C {
        for &l in coef.levels[c].iter() {
            if l != 0 {
                bits += 3 + (l.abs() as u32).min(15);
            }
        }
    }
    bits
}

pub const SPLIT_FLAG_BITS: u32 = 1;

impl EntropyCoder for RefEntropyCoder {
    type Snapshot = u64;

    fn snapshot(&self) -> u64 {
        self.ctx
    }

    fn restore(&mut self, snap: &u64) {
        self.ctx = *snap;
    }

    fn estimate_bits(&mut self, cu: &CuData) -> u32 {
        let bits = cu_bits(cu);
        /* context drifts in counting mode; the engine's snapshot
         * discipline keeps it from leaking between candidates */
        self.ctx = self.ctx.wrapping_add(bits as u64);
        bits
    }

    fn estimate_split_bits(&mut self, _depth: u8, _split: bool) -> u32 {
        self.ctx = self.ctx.wrapping_add(1);
        SPLIT_FLAG_BITS
    }

    fn encode_final(&mut self, cu: &CuData, reco: &YuvBuffer) -> Result<(), CollabError> {
        self.out.push(0xA5);
        self.out.push(cu.depth);
        self.out.push(cu.pred_mode as u8);
        self.out.push(cu.part_size as u8);
        self.out.push(cu.qp);
        self.out.push(cu.dqp_coded as u8);
        self.out.push(cu.merge_idx.unwrap_or(0xFF));
        for m in cu.motion.iter().take(cu.part_size.part_num()) {
            self.out.extend_from_slice(&m.mv[MV_X].to_le_bytes());
            self.out.extend_from_slice(&m.mv[MV_Y].to_le_bytes());
            self.out.push(m.refi as u8);
        }
        if cu.pred_mode == PredMode::Ipcm {
            for c in 0..N_C {
                for &p in reco.data[c].iter() {
                    self.out.push(p as u8);
                }
            }
        } else {
            for c in 0..N_C {
                let n = cu.coef.levels[c].iter().filter(|&&l| l != 0).count() as u16;
                self.out.extend_from_slice(&n.to_le_bytes());
            }
        }
        self.ctx = self.ctx.wrapping_add(1);
        Ok(())
    }
}

/*****************************************************************************
 * rate control
 *****************************************************************************/
pub struct RefRateCtrl {
    pub base: u8,
    /// Vary the returned QP with depth, to exercise DQP signalling.
    pub per_depth: bool,
}

impl RefRateCtrl {
    pub fn constant(base: u8) -> Self {
        RefRateCtrl {
            base,
            per_depth: false,
        }
    }
}

impl RateCtrl for RefRateCtrl {
    fn query_qp(&mut self, _geom: &CuGeom, depth: u8) -> u8 {
        if self.per_depth {
            (self.base + depth).min(MAX_QUANT)
        } else {
            self.base
        }
    }
}
