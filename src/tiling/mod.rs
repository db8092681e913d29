//! Tiled, multi-worker compositing.
//!
//! The target area is split into tiles, each tile is composited by an
//! independent worker from the inputs that reach it, and the partial results
//! are pasted back together. Workers share nothing mutable: every task is a
//! serialized value and every partial result a file in the request's scratch
//! space.

pub mod combiner;
pub mod coordinator;
pub mod pool;
pub mod prestage;
pub mod scratch;
pub mod task;
pub mod tiler;

#[cfg(test)]
pub mod tests;

pub use combiner::TileCombiner;
pub use coordinator::{TiledCompositeStats, TiledCompositor, TilingOptions};
pub use pool::{TileBatch, TileWorkerPool, pool_size};
pub use prestage::{PrestageMode, QualityPrestage, split_batches};
pub use scratch::ScratchSpace;
pub use task::{PartialTileResult, TileTask};
pub use tiler::AreaTiler;
