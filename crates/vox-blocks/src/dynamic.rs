use std::fmt;

use super::types::{BlockSite, HookCtx};

/// Per-voxel state for block kinds with behavior beyond geometry.
///
/// An extension is created when its block is placed and dropped when the
/// block is broken or its chunk is destroyed. Every hook defaults to a no-op.
pub trait DynamicBlock: Send {
    fn on_place(&mut self, _site: &BlockSite, _ctx: &HookCtx) {}
    fn on_break(&mut self, _site: &BlockSite, _ctx: &HookCtx) {}
    fn on_interact(&mut self, _site: &BlockSite, _ctx: &HookCtx) {}
    fn update(&mut self, _site: &BlockSite, _ctx: &HookCtx) {}
}

/// How a kind's per-voxel extension is produced, captured at registration.
#[derive(Clone, Copy)]
pub enum BlockFactory {
    Static,
    Dynamic(fn() -> Box<dyn DynamicBlock>),
}

impl BlockFactory {
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, BlockFactory::Dynamic(_))
    }

    pub fn create(&self) -> Option<Box<dyn DynamicBlock>> {
        match self {
            BlockFactory::Static => None,
            BlockFactory::Dynamic(make) => Some(make()),
        }
    }
}

impl fmt::Debug for BlockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockFactory::Static => f.write_str("Static"),
            BlockFactory::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}
