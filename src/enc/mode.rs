use log::debug;

use super::buf::PredSlot;
use super::{CandStat, HevceCu};
use crate::api::*;
use crate::collab::*;
use crate::def::*;

/// Decide which asymmetric partitions are worth testing at this depth,
/// from the shape of the best candidate so far and the parent's shape.
/// Bounds the AMP search cost: a horizontally-partitioned winner makes
/// only the horizontal AMP shapes promising, and vice versa.
pub(crate) fn derive_test_mode_amp(best: PartSize, parent: PartSize) -> (bool, bool) {
    let hor = best == PartSize::Size2NxN
        || (best == PartSize::Size2Nx2N
            && matches!(parent, PartSize::Size2NxnU | PartSize::Size2NxnD));
    let ver = best == PartSize::SizeNx2N
        || (best == PartSize::Size2Nx2N
            && matches!(parent, PartSize::SizenLx2N | PartSize::SizenRx2N));
    (hor, ver)
}

impl<PS, TQ, EC, RC, PB> HevceCu<PS, TQ, EC, RC, PB>
where
    PS: PredSearch,
    TQ: TrQuant,
    EC: EntropyCoder,
    RC: RateCtrl,
    PB: PicStore,
{
    /// Evaluate every applicable non-split candidate at depth `d`, in
    /// fixed priority order: merge/skip, inter partitions (AMP gated),
    /// intra, intra-in-inter, PCM. Each candidate runs under a restored
    /// entropy-context snapshot and updates the per-depth best only on
    /// strict RD improvement.
    pub(crate) fn mode_analyze_cu(&mut self, d: usize, geom: &CuGeom, parent_part: PartSize) {
        let snap = self.entropy.snapshot();
        let inter_slice = self.cfg.slice_type.is_inter();

        if inter_slice {
            if let Err(e) = self.analyze_merge(d, geom, &snap) {
                self.cand_failed(geom, e);
            }
            if self.cfg.early_skip_enabled && self.merge_best_is_quiet(d) {
                /* the cheapest merge candidate codes nothing; further
                 * candidates cannot justify their signalling cost */
                self.entropy.restore(&snap);
                return;
            }
            if let Err(e) = self.analyze_inter(d, geom, &snap, PartSize::Size2Nx2N) {
                self.cand_failed(geom, e);
            }
            for &part in &[PartSize::Size2NxN, PartSize::SizeNx2N] {
                if let Err(e) = self.analyze_inter(d, geom, &snap, part) {
                    self.cand_failed(geom, e);
                }
            }
            if self.cfg.amp_enabled && geom.size() >= 16 {
                let (hor, ver) =
                    derive_test_mode_amp(self.pool.best_cu[d].part_size, parent_part);
                if hor {
                    for &part in &[PartSize::Size2NxnU, PartSize::Size2NxnD] {
                        if let Err(e) = self.analyze_inter(d, geom, &snap, part) {
                            self.cand_failed(geom, e);
                        }
                    }
                }
                if ver {
                    for &part in &[PartSize::SizenLx2N, PartSize::SizenRx2N] {
                        if let Err(e) = self.analyze_inter(d, geom, &snap, part) {
                            self.cand_failed(geom, e);
                        }
                    }
                }
            }
        }

        if let Err(e) = self.analyze_intra(d, geom, &snap, PartSize::Size2Nx2N) {
            self.cand_failed(geom, e);
        }
        if !inter_slice && geom.log2_size == self.cfg.log2_min_cu_size {
            /* NxN only at the minimum CU size */
            if let Err(e) = self.analyze_intra(d, geom, &snap, PartSize::SizeNxN) {
                self.cand_failed(geom, e);
            }
        }

        if inter_slice && self.cfg.intra_in_inter_enabled {
            if let Err(e) = self.analyze_intra_in_inter(d, geom, &snap) {
                self.cand_failed(geom, e);
            }
        }

        if self.cfg.pcm_enabled
            && geom.log2_size >= self.cfg.log2_pcm_min_size
            && geom.log2_size <= self.cfg.log2_pcm_max_size
        {
            self.analyze_pcm(d, geom, &snap);
        }

        self.entropy.restore(&snap);
    }

    /// Merge/skip evaluation: for every merge candidate, try the skip
    /// variant (no residual) and the merge variant (with residual).
    /// The cheapest of all variants additionally survives in the
    /// per-depth merge-best slot, which drives the early-skip gate.
    fn analyze_merge(
        &mut self,
        d: usize,
        geom: &CuGeom,
        snap: &EC::Snapshot,
    ) -> Result<(), CollabError> {
        self.pool.merge_best_cu[d].init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
        let cands = self.pred.merge_candidates(geom);
        if cands.is_empty() {
            return Ok(());
        }

        for cand in cands.into_iter().take(MRG_MAX_NUM_CANDS) {
            self.pool
                .pred_slot_mut(d, PredSlot::Merge)
                .copy_from(&cand.pred);

            /* skip variant: reconstruction is the prediction itself */
            {
                let tc = &mut self.pool.temp_cu[d];
                tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
                tc.pred_mode = PredMode::Skip;
                tc.part_size = PartSize::Size2Nx2N;
                tc.merge_idx = Some(cand.cand_idx);
                tc.motion[0] = cand.motion;
            }
            self.pool.pred_temp[d].copy_from(&self.pool.pred_mode_buf[d][PredSlot::Merge as usize]);
            self.pool.reco_temp[d].copy_from(&self.pool.pred_temp[d]);
            let dist = self.pool.org[d].dist(self.cfg.dist_metric, &self.pool.reco_temp[d]);
            self.finish_candidate(d, geom, snap, dist);
            self.track_merge_best(d);
            self.check_best_mode(d);

            /* merge variant: same motion, residual coded */
            {
                let tc = &mut self.pool.temp_cu[d];
                tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
                tc.pred_mode = PredMode::Merge;
                tc.part_size = PartSize::Size2Nx2N;
                tc.merge_idx = Some(cand.cand_idx);
                tc.motion[0] = cand.motion;
            }
            let dist = self.encode_residual(d, geom.qp, PredSlot::Merge)?;
            self.finish_candidate(d, geom, snap, dist);
            self.track_merge_best(d);
            self.check_best_mode(d);
        }
        Ok(())
    }

    /// Keep the cheapest merge/skip variant of this depth in the
    /// merge-best slot. Runs before `check_best_mode` so the candidate
    /// is still in the temp slot.
    fn track_merge_best(&mut self, d: usize) {
        if self.pool.temp_cu[d].cost < self.pool.merge_best_cu[d].cost {
            self.pool.merge_cu[d] = self.pool.temp_cu[d].clone();
            self.pool.swap_merge_best(d);
        }
    }

    /// True when merge evaluation produced a winner that codes no
    /// coefficients, so nothing beyond its merge index would be
    /// signalled at this depth.
    fn merge_best_is_quiet(&self, d: usize) -> bool {
        let mb = &self.pool.merge_best_cu[d];
        mb.cost < MAX_COST && !mb.has_coef()
    }

    /// Inter evaluation for one partition shape: motion estimation per
    /// partition, then residual coding cost.
    fn analyze_inter(
        &mut self,
        d: usize,
        geom: &CuGeom,
        snap: &EC::Snapshot,
        part: PartSize,
    ) -> Result<(), CollabError> {
        let slot = match part {
            PartSize::Size2NxN => PredSlot::Rect2NxN,
            PartSize::SizeNx2N => PredSlot::RectNx2N,
            _ => PredSlot::Inter,
        };
        {
            let tc = &mut self.pool.temp_cu[d];
            tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
            tc.pred_mode = PredMode::Inter;
            tc.part_size = part;
        }
        for i in 0..part.part_num() {
            let pg = part.part_geom(geom.size(), i);
            let est = self.pred.estimate_motion(geom, &pg, &self.pool.org[d])?;
            if !est.motion.is_valid() {
                return Err(CollabError::PredSearch(
                    "invalid reference index".to_string(),
                ));
            }
            if est.pred.w != pg.w || est.pred.h != pg.h {
                return Err(CollabError::PredSearch(
                    "prediction block does not match partition".to_string(),
                ));
            }
            self.pool.temp_cu[d].motion[i] = est.motion;
            self.pool.pred_slot_mut(d, slot).paste(pg.x, pg.y, &est.pred);
        }
        let dist = self.encode_residual(d, geom.qp, slot)?;
        self.finish_candidate(d, geom, snap, dist);
        self.check_best_mode(d);
        Ok(())
    }

    /// Intra evaluation for 2Nx2N (and NxN at the minimum depth).
    fn analyze_intra(
        &mut self,
        d: usize,
        geom: &CuGeom,
        snap: &EC::Snapshot,
        part: PartSize,
    ) -> Result<(), CollabError> {
        {
            let tc = &mut self.pool.temp_cu[d];
            tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
            tc.pred_mode = PredMode::Intra;
            tc.part_size = part;
        }
        for i in 0..part.part_num() {
            let pg = part.part_geom(geom.size(), i);
            let est = self.pred.estimate_intra(geom, &pg, &self.pool.org[d])?;
            if est.pred.w != pg.w || est.pred.h != pg.h {
                return Err(CollabError::PredSearch(
                    "prediction block does not match partition".to_string(),
                ));
            }
            self.pool.temp_cu[d].intra_modes[i] = est.mode;
            self.pool
                .pred_slot_mut(d, PredSlot::Intra)
                .paste(pg.x, pg.y, &est.pred);
        }
        let dist = self.encode_residual(d, geom.qp, PredSlot::Intra)?;
        self.finish_candidate(d, geom, snap, dist);
        self.check_best_mode(d);
        Ok(())
    }

    /// Mixed mode: intra prediction on an otherwise inter-coded slot.
    fn analyze_intra_in_inter(
        &mut self,
        d: usize,
        geom: &CuGeom,
        snap: &EC::Snapshot,
    ) -> Result<(), CollabError> {
        {
            let tc = &mut self.pool.temp_cu[d];
            tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
            tc.pred_mode = PredMode::IntraInInter;
            tc.part_size = PartSize::Size2Nx2N;
        }
        let pg = PartSize::Size2Nx2N.part_geom(geom.size(), 0);
        let est = self.pred.estimate_intra(geom, &pg, &self.pool.org[d])?;
        if est.pred.w != pg.w || est.pred.h != pg.h {
            return Err(CollabError::PredSearch(
                "prediction block does not match partition".to_string(),
            ));
        }
        self.pool.temp_cu[d].intra_modes[0] = est.mode;
        self.pool
            .pred_slot_mut(d, PredSlot::IntraInInter)
            .copy_from(&est.pred);
        let dist = self.encode_residual(d, geom.qp, PredSlot::IntraInInter)?;
        self.finish_candidate(d, geom, snap, dist);
        self.check_best_mode(d);
        Ok(())
    }

    /// PCM: raw sample pass-through, zero distortion, rate only.
    fn analyze_pcm(&mut self, d: usize, geom: &CuGeom, snap: &EC::Snapshot) {
        {
            let tc = &mut self.pool.temp_cu[d];
            tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
            tc.pred_mode = PredMode::Ipcm;
            tc.part_size = PartSize::Size2Nx2N;
        }
        /* fill the PCM buffer: reconstruction equals the original */
        self.pool.pred_temp[d].copy_from(&self.pool.org[d]);
        self.pool.reco_temp[d].copy_from(&self.pool.org[d]);
        for c in 0..N_C {
            for r in self.pool.resi_temp[d].data[c].iter_mut() {
                *r = 0;
            }
        }
        self.finish_candidate(d, geom, snap, 0);
        self.check_best_mode(d);
    }

    /// Residual pipeline shared by every predicted candidate: copy the
    /// mode-slot prediction, transform/quantize the residual, rebuild
    /// the reconstruction and return the distortion.
    fn encode_residual(
        &mut self,
        d: usize,
        qp: u8,
        slot: PredSlot,
    ) -> Result<u64, CollabError> {
        self.pool.pred_temp[d].copy_from(&self.pool.pred_mode_buf[d][slot as usize]);
        for c in 0..N_C {
            let org = &self.pool.org[d].data[c];
            let pred = &self.pool.pred_temp[d].data[c];
            for (r, (&o, &p)) in self.pool.resi_temp[d].data[c]
                .iter_mut()
                .zip(org.iter().zip(pred.iter()))
            {
                *r = o as i16 - p as i16;
            }
        }
        let coef = self.tq.transform_and_quantize(&self.pool.resi_temp[d], qp)?;
        if coef.any_nonzero() {
            self.tq
                .dequantize_and_inverse(&coef, qp, &mut self.pool.resi_temp[d])?;
            for c in 0..N_C {
                let pred = &self.pool.pred_temp[d].data[c];
                let resi = &self.pool.resi_temp[d].data[c];
                for (q, (&p, &r)) in self.pool.reco_temp[d].data[c]
                    .iter_mut()
                    .zip(pred.iter().zip(resi.iter()))
                {
                    *q = clip_pel(p as i32 + r as i32);
                }
            }
        } else {
            self.pool.reco_temp[d].copy_from(&self.pool.pred_temp[d]);
        }
        self.pool.temp_cu[d].coef = coef;
        Ok(self.pool.org[d].dist(self.cfg.dist_metric, &self.pool.reco_temp[d]))
    }

    /// Count the candidate's bits under a restored context snapshot and
    /// fold distortion and rate into the RD cost.
    fn finish_candidate(&mut self, d: usize, geom: &CuGeom, snap: &EC::Snapshot, dist: u64) {
        self.entropy.restore(snap);
        let bits = self.entropy.estimate_bits(&self.pool.temp_cu[d]);
        let lambda = lambda_from_qp(geom.qp, self.cfg.dist_metric);
        let tc = &mut self.pool.temp_cu[d];
        tc.dist = dist;
        tc.bits = bits;
        tc.cost = dist as f64 + lambda * bits as f64;
        self.stats.tested.push(CandStat {
            depth: tc.depth,
            x: tc.x,
            y: tc.y,
            pred_mode: tc.pred_mode,
            part_size: tc.part_size,
            cost: tc.cost,
        });
    }

    /// Commit the candidate if it strictly improves on the best: lower
    /// cost wins; exact cost ties fall to lower distortion, then fewer
    /// bits. The swap is whole-value, never partial.
    pub(crate) fn check_best_mode(&mut self, d: usize) {
        let t = &self.pool.temp_cu[d];
        let b = &self.pool.best_cu[d];
        let better = t.cost < b.cost
            || (t.cost == b.cost && (t.dist < b.dist || (t.dist == b.dist && t.bits < b.bits)));
        if better {
            self.pool.swap_best_temp(d);
        }
    }

    /// Delta-QP signalling is finalized only once the winning mode for
    /// the depth is fixed: a CU without coded coefficients carries no
    /// delta, so its QP snaps back to the predicted one.
    pub(crate) fn check_dqp(&mut self, d: usize) {
        let base = self.cfg.qp;
        let dqp_enabled = self.cfg.dqp_enabled;
        let cu = &mut self.pool.best_cu[d];
        if !dqp_enabled {
            cu.qp = base;
            cu.dqp_coded = false;
            return;
        }
        if cu.has_coef() && cu.pred_mode != PredMode::Ipcm {
            cu.dqp_coded = cu.qp != base;
        } else {
            cu.qp = base;
            cu.dqp_coded = false;
        }
    }

    /// Safe default when every candidate at an unsplittable depth
    /// failed: zero-motion skip, predicted from the first merge
    /// candidate if one exists, flat mid-gray otherwise.
    pub(crate) fn force_safe_mode(&mut self, d: usize, geom: &CuGeom) {
        {
            let tc = &mut self.pool.temp_cu[d];
            tc.init(geom.depth, geom.x, geom.y, geom.log2_size, geom.qp);
            tc.pred_mode = PredMode::Skip;
            tc.part_size = PartSize::Size2Nx2N;
            tc.motion[0] = MotionInfo::zero();
        }
        let cands = self.pred.merge_candidates(geom);
        if let Some(c0) = cands.into_iter().next() {
            self.pool.temp_cu[d].merge_idx = Some(c0.cand_idx);
            self.pool.temp_cu[d].motion[0] = c0.motion;
            self.pool.pred_temp[d].copy_from(&c0.pred);
        } else {
            self.pool.pred_temp[d].fill(MID_SAMPLE_VAL);
        }
        self.pool.reco_temp[d].copy_from(&self.pool.pred_temp[d]);
        let dist = self.pool.org[d].dist(self.cfg.dist_metric, &self.pool.reco_temp[d]);
        let snap = self.entropy.snapshot();
        self.finish_candidate(d, geom, &snap, dist);
        self.entropy.restore(&snap);
        self.check_best_mode(d);
        debug!(
            "cu d{} ({},{}): all candidates failed, forced safe skip",
            geom.depth, geom.x, geom.y
        );
    }

    fn cand_failed(&mut self, geom: &CuGeom, e: CollabError) {
        self.stats.num_cand_failures += 1;
        debug!(
            "cu d{} ({},{}): candidate excluded: {}",
            geom.depth, geom.x, geom.y, e
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn amp_gating_follows_best_shape() {
        assert_eq!(
            derive_test_mode_amp(PartSize::Size2NxN, PartSize::SizeNone),
            (true, false)
        );
        assert_eq!(
            derive_test_mode_amp(PartSize::SizeNx2N, PartSize::SizeNone),
            (false, true)
        );
        assert_eq!(
            derive_test_mode_amp(PartSize::Size2Nx2N, PartSize::Size2NxnU),
            (true, false)
        );
        assert_eq!(
            derive_test_mode_amp(PartSize::Size2Nx2N, PartSize::SizenRx2N),
            (false, true)
        );
        assert_eq!(
            derive_test_mode_amp(PartSize::SizeNxN, PartSize::SizeNone),
            (false, false)
        );
    }
}
