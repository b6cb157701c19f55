//! Built-in passes of the default observer graph.

use crate::gpu::TextureTargetAsset;
use crate::graph::{tags, AssetPool, ExecutionContext, Task, TaskAssetTags, TaskAssets};
use crate::GraphError;

/// Clears the scene color target and counts the objects each pipeline
/// would draw.
#[derive(Debug, Default)]
pub struct ScenePass {
    clear_color: [f64; 4],
    last_draws: usize,
}

impl ScenePass {
    pub fn new(clear_color: [f64; 4]) -> Self {
        Self {
            clear_color,
            last_draws: 0,
        }
    }

    /// Objects visited by the last execution.
    pub fn last_draws(&self) -> usize {
        self.last_draws
    }
}

impl Task for ScenePass {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn tags(&self) -> TaskAssetTags {
        TaskAssetTags::new().creates(tags::SCENE_COLOR)
    }

    fn on_graph_init(&mut self, assets: &TaskAssets, pool: &AssetPool) -> Result<(), GraphError> {
        pool.expect_asset::<TextureTargetAsset>(assets.output, self.name())?;
        Ok(())
    }

    fn execute(&mut self, ctx: &ExecutionContext, assets: &TaskAssets, pool: &AssetPool) {
        self.last_draws = ctx.scene.map_or(0, |scene| scene.len());

        let (Some(gpu), Some(view)) = (
            ctx.gpu,
            pool.asset::<TextureTargetAsset>(assets.output)
                .and_then(TextureTargetAsset::view),
        ) else {
            return;
        };
        let [r, g, b, a] = self.clear_color;
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene pass"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        gpu.queue.submit(Some(encoder.finish()));
    }
}

/// Copies the scene color into the final output when their sizes match.
#[derive(Debug, Default)]
pub struct CompositePass {
    copies: u64,
}

impl CompositePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copies(&self) -> u64 {
        self.copies
    }
}

impl Task for CompositePass {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn tags(&self) -> TaskAssetTags {
        TaskAssetTags::new()
            .require(&[tags::SCENE_COLOR])
            .writes(tags::FINAL_OUTPUT)
    }

    fn on_graph_init(&mut self, assets: &TaskAssets, pool: &AssetPool) -> Result<(), GraphError> {
        pool.expect_asset::<TextureTargetAsset>(assets.required[0], self.name())?;
        pool.expect_asset::<TextureTargetAsset>(assets.output, self.name())?;
        Ok(())
    }

    fn execute(&mut self, ctx: &ExecutionContext, assets: &TaskAssets, pool: &AssetPool) {
        let (Some(source), Some(dest)) = (
            pool.asset::<TextureTargetAsset>(assets.required[0]),
            pool.asset::<TextureTargetAsset>(assets.output),
        ) else {
            return;
        };
        if source.size() != dest.size() {
            return;
        }
        self.copies += 1;
        let (Some(gpu), Some(src), Some(dst)) = (ctx.gpu, source.texture(), dest.texture()) else {
            return;
        };
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite pass"),
            });
        encoder.copy_texture_to_texture(src.as_image_copy(), dst.as_image_copy(), src.size());
        gpu.queue.submit(Some(encoder.finish()));
    }
}
