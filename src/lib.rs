//! Coding-unit decision engine of a block-based video encoder.
//!
//! For every leaf of the recursive quad-tree partition of a coding tree
//! unit, the engine decides whether to split further, which prediction
//! mode to use (intra, inter, merge, skip, PCM) and which partition
//! shape to apply, minimizing the rate-distortion cost. Predictions,
//! transforms and entropy symbols are supplied by collaborators behind
//! the traits in [`collab`].

#[macro_use]
extern crate lazy_static;

pub mod api;
pub mod collab;
pub mod def;
mod enc;

pub use api::{CollabError, CuConfig, CuError, SliceType};
pub use enc::arl::ArlStats;
pub use enc::buf::CuData;
pub use enc::{CandStat, CommitStat, CtuResult, CuNode, CuTree, HevceCu, SearchStats};
