//! Block kinds every world starts with. Registration order fixes their ids.

use super::dynamic::DynamicBlock;
use super::registry::{BlockDescriptor, BlockRegistry, RegistryError};
use super::types::{BlockId, BlockSite, GeometryKind, HookCtx, Side};

pub const STEEL: BlockId = 1;
pub const STEEL_SLAB: BlockId = 2;
pub const LIGHT_THING: BlockId = 3;
pub const RAMP: BlockId = 4;
pub const POLE: BlockId = 5;
pub const COMPUTER: BlockId = 6;

impl BlockRegistry {
    pub fn register_builtin(&mut self) -> Result<(), RegistryError> {
        let descs = [
            BlockDescriptor::new("steel", GeometryKind::Cube),
            BlockDescriptor::new("steelslab", GeometryKind::Slab),
            BlockDescriptor::new("lightthing", GeometryKind::Cube).textures([1; 6]),
            BlockDescriptor::new("ramp", GeometryKind::Slope).textures([0, 0, 0, 0, 4, 0]),
            BlockDescriptor::new("pole", GeometryKind::Cross)
                .textures([2; 6])
                .occludes(false),
            BlockDescriptor::new("computer", GeometryKind::Cube)
                .textures([0, 0, 0, 3, 0, 0])
                .dynamic(Computer::boxed),
        ];
        for desc in descs {
            self.register(desc)?;
        }
        Ok(())
    }
}

/// Interactive terminal block. Keeps simple counters and logs its lifecycle.
#[derive(Debug, Default)]
pub struct Computer {
    pub interactions: u32,
    pub ticks: u64,
}

impl Computer {
    fn boxed() -> Box<dyn DynamicBlock> {
        Box::new(Computer::default())
    }
}

fn side_tag(ctx: &HookCtx) -> &'static str {
    match ctx.side {
        Side::Server => "server",
        Side::Client => "client",
    }
}

impl DynamicBlock for Computer {
    fn on_place(&mut self, site: &BlockSite, ctx: &HookCtx) {
        log::info!(
            target: "blocks",
            "[{}] computer placed at chunk {:?} ({},{},{}) by {:?}",
            side_tag(ctx), site.chunk, site.x, site.y, site.z, ctx.player
        );
    }

    fn on_break(&mut self, site: &BlockSite, ctx: &HookCtx) {
        log::info!(
            target: "blocks",
            "[{}] computer broken at chunk {:?} ({},{},{}) after {} ticks",
            side_tag(ctx), site.chunk, site.x, site.y, site.z, self.ticks
        );
    }

    fn on_interact(&mut self, site: &BlockSite, ctx: &HookCtx) {
        self.interactions += 1;
        log::info!(
            target: "blocks",
            "[{}] computer at ({},{},{}) used by {:?} (#{})",
            side_tag(ctx), site.x, site.y, site.z, ctx.player, self.interactions
        );
    }

    fn update(&mut self, _site: &BlockSite, _ctx: &HookCtx) {
        self.ticks += 1;
    }
}
