//! Parallel top-k scanning over a store's row range.

mod parallel;

pub use parallel::{effective_worker_count, top_k_scored};
