pub(crate) mod arl;
pub(crate) mod buf;
pub(crate) mod mode;

use log::debug;

use crate::api::*;
use crate::collab::*;
use crate::def::*;

use arl::ArlStats;
use buf::{CuBufferPool, CuData};

/*****************************************************************************
 * committed CU tree
 *****************************************************************************/

/// A node of the committed quad-tree. Leaves own the winning CU
/// metadata and reconstruction so the finalize pass is a pure read.
#[derive(Debug, Clone)]
pub enum CuNode {
    Leaf {
        cu: CuData,
        reco: YuvBuffer,
    },
    Split {
        depth: u8,
        x: u16,
        y: u16,
        log2_size: u8,
        /// Children in raster sub-block order; `None` marks a quadrant
        /// entirely outside the picture.
        children: [Option<usize>; 4],
    },
}

/// The cost-minimal CU tree committed for one CTU, stored as an arena.
#[derive(Debug, Clone)]
pub struct CuTree {
    nodes: Vec<CuNode>,
    root: usize,
}

impl CuTree {
    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    #[inline]
    pub fn node(&self, idx: usize) -> &CuNode {
        &self.nodes[idx]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Leaf CUs in encoding (depth-first, raster quadrant) order.
    pub fn leaves(&self) -> Vec<(&CuData, &YuvBuffer)> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, idx: usize, out: &mut Vec<(&'a CuData, &'a YuvBuffer)>) {
        match &self.nodes[idx] {
            CuNode::Leaf { cu, reco } => out.push((cu, reco)),
            CuNode::Split { children, .. } => {
                for c in children.iter().flatten() {
                    self.collect_leaves(*c, out);
                }
            }
        }
    }
}

/*****************************************************************************
 * search observability
 *****************************************************************************/

/// One evaluated (not necessarily committed) candidate.
#[derive(Debug, Clone, Copy)]
pub struct CandStat {
    pub depth: u8,
    pub x: u16,
    pub y: u16,
    pub pred_mode: PredMode,
    pub part_size: PartSize,
    pub cost: f64,
}

/// One committed decision (leaf or split) of the quad-tree walk.
/// Entries pushed inside abandoned speculative subtrees are dropped
/// again, so the ledger matches the final tree exactly.
#[derive(Debug, Clone, Copy)]
pub struct CommitStat {
    pub depth: u8,
    pub x: u16,
    pub y: u16,
    pub split: bool,
    /// Committed cost including the split-flag rate at this depth.
    pub cost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub tested: Vec<CandStat>,
    pub committed: Vec<CommitStat>,
    pub num_aborts: u32,
    pub num_cand_failures: u32,
}

/// Result of one CTU search.
#[derive(Debug, Clone)]
pub struct CtuResult {
    pub tree: CuTree,
    /// Committed RD cost of the whole CTU.
    pub cost: f64,
    pub stats: SearchStats,
}

/// What one recursion level reports upward: the committed cost of its
/// subtree and whether the early-abort heuristic fired below it. The
/// abort state travels in the result instead of a shared flag.
#[derive(Debug, Clone, Copy)]
struct SearchOutcome {
    cost: f64,
    aborted: bool,
    node: Option<usize>,
}

/*****************************************************************************
 * CU engine
 *****************************************************************************/

/// Coding-unit decision engine: decides, for every leaf of the CTU
/// quad-tree, whether to split and which mode/partition to code, so as
/// to minimize `dist + lambda * bits`.
///
/// Collaborators are injected once at construction; the engine owns the
/// depth-indexed buffer pool and the snapshot lifecycle of the entropy
/// context during speculative evaluation.
pub struct HevceCu<PS, TQ, EC, RC, PB> {
    pub(crate) cfg: CuConfig,
    pub(crate) pool: CuBufferPool,
    pub(crate) pred: PS,
    pub(crate) tq: TQ,
    pub(crate) entropy: EC,
    pub(crate) rate_ctrl: RC,
    pub(crate) pic: PB,
    pub(crate) stats: SearchStats,
    arl: ArlStats,
}

impl<PS, TQ, EC, RC, PB> HevceCu<PS, TQ, EC, RC, PB>
where
    PS: PredSearch,
    TQ: TrQuant,
    EC: EntropyCoder,
    RC: RateCtrl,
    PB: PicStore,
{
    /// Validate the configuration and eagerly allocate the per-depth
    /// buffer pool. Fatal errors surface here, before any CTU is
    /// processed.
    pub fn create(
        cfg: CuConfig,
        pred: PS,
        tq: TQ,
        entropy: EC,
        rate_ctrl: RC,
        pic: PB,
    ) -> Result<Self, CuError> {
        cfg.validate()?;
        let pool = CuBufferPool::create(cfg.total_depth(), cfg.ctu_size())?;
        Ok(HevceCu {
            cfg,
            pool,
            pred,
            tq,
            entropy,
            rate_ctrl,
            pic,
            stats: SearchStats::default(),
            arl: ArlStats::default(),
        })
    }

    pub fn config(&self) -> &CuConfig {
        &self.cfg
    }

    pub fn entropy(&self) -> &EC {
        &self.entropy
    }

    pub fn entropy_mut(&mut self) -> &mut EC {
        &mut self.entropy
    }

    pub fn pic_store(&self) -> &PB {
        &self.pic
    }

    pub fn pic_store_mut(&mut self) -> &mut PB {
        &mut self.pic
    }

    pub fn arl_stats(&self) -> &ArlStats {
        &self.arl
    }

    pub fn reset_arl_stats(&mut self) {
        self.arl.reset();
    }

    /// Decide the cost-minimal CU tree for the CTU at luma position
    /// (`ctu_x`, `ctu_y`). Always terminates with a valid committed
    /// tree; per-candidate collaborator failures are excluded from the
    /// comparison, never propagated.
    pub fn compress_ctu(&mut self, ctu_x: u16, ctu_y: u16) -> CtuResult {
        let ctu = self.cfg.ctu_size() as u16;
        debug_assert!(ctu_x % ctu == 0 && ctu_y % ctu == 0);
        debug_assert!(ctu_x < self.cfg.pic_width && ctu_y < self.cfg.pic_height);
        debug_assert_eq!(self.pool.depths(), self.cfg.total_depth());

        self.stats = SearchStats::default();
        let mut nodes = Vec::new();
        let out = self.mode_coding_tree(&mut nodes, 0, ctu_x, ctu_y, PartSize::SizeNone);
        /* the CTU origin is inside the picture, so a node always exists */
        let root = out.node.expect("CTU origin inside the picture");
        debug!(
            "ctu ({},{}) committed: cost {:.1}, {} nodes, {} candidates tested",
            ctu_x,
            ctu_y,
            out.cost,
            nodes.len(),
            self.stats.tested.len()
        );
        CtuResult {
            tree: CuTree { nodes, root },
            cost: out.cost,
            stats: std::mem::take(&mut self.stats),
        }
    }

    /// The recursive quad-tree walk. At each depth: query the QP,
    /// evaluate the non-split candidates, then compare against the
    /// aggregated cost of the four sub-CUs and commit whichever is
    /// cheaper.
    fn mode_coding_tree(
        &mut self,
        nodes: &mut Vec<CuNode>,
        depth: u8,
        x: u16,
        y: u16,
        parent_part: PartSize,
    ) -> SearchOutcome {
        let log2_size = self.cfg.log2_ctu_size - depth;
        let size = 1u16 << log2_size;
        if x >= self.cfg.pic_width || y >= self.cfg.pic_height {
            /* quadrant entirely outside the picture: nothing to code */
            return SearchOutcome {
                cost: 0.0,
                aborted: false,
                node: None,
            };
        }
        let boundary = x + size > self.cfg.pic_width || y + size > self.cfg.pic_height;
        let can_split = log2_size > self.cfg.log2_min_cu_size;
        let d = depth as usize;

        /* target QP for this depth */
        let mut geom = CuGeom {
            depth,
            x,
            y,
            log2_size,
            qp: self.cfg.qp,
        };
        geom.qp = self.rate_ctrl.query_qp(&geom, depth).min(MAX_QUANT);
        let lambda = lambda_from_qp(geom.qp, self.cfg.dist_metric);

        self.pool.best_cu[d].init(depth, x, y, log2_size, geom.qp);

        let mut best_cost = MAX_COST;
        if !boundary {
            self.pic.read_original(x, y, &mut self.pool.org[d]);
            self.mode_analyze_cu(d, &geom, parent_part);
            if self.pool.best_cu[d].cost >= MAX_COST && !can_split {
                /* every candidate failed and this depth cannot split:
                 * force the safe default so the search still terminates
                 * with a valid tree */
                self.force_safe_mode(d, &geom);
            }
            if self.pool.best_cu[d].cost < MAX_COST {
                self.check_dqp(d);
                best_cost = self.pool.best_cu[d].cost;
                if can_split {
                    best_cost += lambda * self.split_flag_bits(depth, false) as f64;
                }
            }
        }

        let mut aborted = false;
        if can_split {
            let half = size >> 1;
            let mark = nodes.len();
            let commit_mark = self.stats.committed.len();
            let mut children: [Option<usize>; 4] = [None; 4];
            /* a boundary CU implies the split without signalling it */
            let mut split_cost = if boundary {
                0.0
            } else {
                lambda * self.split_flag_bits(depth, true) as f64
            };
            let mut split_valid = true;
            let child_parent_part = self.pool.best_cu[d].part_size;

            for i in 0..4 {
                let dx = (i as u16 & 1) * half;
                let dy = (i as u16 >> 1) * half;
                let r = self.mode_coding_tree(nodes, depth + 1, x + dx, y + dy, child_parent_part);
                aborted |= r.aborted;
                children[i] = r.node;
                split_cost += r.cost;
                if r.node.is_some() {
                    /* paste the child's committed reconstruction into
                     * this depth's assembly buffer */
                    self.pool.reco_temp[d].paste(
                        dx as usize,
                        dy as usize,
                        &self.pool.reco_best[d + 1],
                    );
                }
                if self.cfg.early_abort_enabled && i < 3 && split_cost > best_cost {
                    /* remaining quadrants cannot make the split cheaper */
                    split_valid = false;
                    aborted = true;
                    self.stats.num_aborts += 1;
                    break;
                }
            }

            if split_valid && (boundary || split_cost + self.cfg.split_bias < best_cost) {
                /* split wins: the assembled child samples become this
                 * depth's best reconstruction */
                std::mem::swap(&mut self.pool.reco_best[d], &mut self.pool.reco_temp[d]);
                self.stats.committed.push(CommitStat {
                    depth,
                    x,
                    y,
                    split: true,
                    cost: split_cost,
                });
                let idx = nodes.len();
                nodes.push(CuNode::Split {
                    depth,
                    x,
                    y,
                    log2_size,
                    children,
                });
                debug!(
                    "cu d{} ({},{}) {}x{}: split, cost {:.1}",
                    depth, x, y, size, size, split_cost
                );
                return SearchOutcome {
                    cost: split_cost,
                    aborted,
                    node: Some(idx),
                };
            }
            /* non-split wins: abandon the speculative child nodes and
             * their ledger entries */
            nodes.truncate(mark);
            self.stats.committed.truncate(commit_mark);
        }

        debug_assert!(best_cost < MAX_COST);
        let cu = self.pool.best_cu[d].clone();
        let reco = self.pool.reco_best[d].clone();
        debug!(
            "cu d{} ({},{}) {}x{}: {:?}/{:?}, cost {:.1}",
            depth, x, y, size, size, cu.pred_mode, cu.part_size, best_cost
        );
        self.stats.committed.push(CommitStat {
            depth,
            x,
            y,
            split: false,
            cost: best_cost,
        });
        let idx = nodes.len();
        nodes.push(CuNode::Leaf { cu, reco });
        SearchOutcome {
            cost: best_cost,
            aborted,
            node: Some(idx),
        }
    }

    /// Counting-only split-flag rate, under the same snapshot
    /// discipline as candidate bit estimation so an adaptive context
    /// never drifts from counting.
    fn split_flag_bits(&mut self, depth: u8, split: bool) -> u32 {
        let snap = self.entropy.snapshot();
        let bits = self.entropy.estimate_split_bits(depth, split);
        self.entropy.restore(&snap);
        bits
    }

    /*************************************************************************
     * tree finalizer / encoder driver
     *************************************************************************/

    /// Second, cost-free traversal of the already-decided tree: emit
    /// final syntax in encoding order, write winning reconstructions
    /// into the picture, and feed the ARL collector. No cost
    /// comparisons happen here; running it twice on the same result
    /// produces identical output.
    pub fn encode_ctu(&mut self, result: &CtuResult) -> Result<(), CuError> {
        self.encode_cu(&result.tree, result.tree.root())
    }

    fn encode_cu(&mut self, tree: &CuTree, idx: usize) -> Result<(), CuError> {
        match tree.node(idx) {
            CuNode::Split { children, .. } => {
                for c in children.iter().flatten() {
                    self.encode_cu(tree, *c)?;
                }
                Ok(())
            }
            CuNode::Leaf { cu, reco } => {
                self.entropy
                    .encode_final(cu, reco)
                    .map_err(CuError::Finalize)?;
                self.pic.write_reconstruction(cu.x, cu.y, reco);
                if self.cfg.arl_enabled {
                    self.arl
                        .collect_tu(&cu.coef.levels[Y_C], &cu.coef.arl_levels[Y_C]);
                }
                Ok(())
            }
        }
    }
}
