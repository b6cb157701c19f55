//! BLIB runtime
//!
//! Boots the engine with the render systems, fills a scene with a grid of
//! sprites and runs a fixed number of frames.
//!
//! ```text
//! blib [SETTINGS.json] [FRAMES]
//! ```

use anyhow::{Context, Result};
use blib_core::define_component;
use blib_core::ecs::{Entity, Query, Registry, ViewId};
use blib_core::engine::{
    Engine, EngineContext, FrameStage, StateMask, System, SystemDescriptor,
};
use blib_core::math::{DeterministicRng, Vec2};
use blib_core::time::StepTime;
use blib_render::components::{Rendered, Texture, Transform2D};
use blib_render::descriptors::{TEXTURE, TRANSFORM_2D};
use blib_render::scene::{PipelineId, SceneId, UpdateSpeed};
use blib_render::{systems, Renderer};
use blib_services::{init_logging, Settings};
use parking_lot::Mutex;

const DEFAULT_FRAMES: u64 = 600;
const FRAME_DT: f32 = 1.0 / 60.0;
const GRID: u32 = 16;
const SPACING: f32 = 40.0;

/// Spin and bob parameters for an animated sprite.
#[derive(Debug, Clone, Copy)]
struct Spinner {
    speed: f32,
    phase: f32,
    origin: Vec2,
}

define_component!(Spinner);

/// Rotates every sprite carrying a [`Spinner`] and bobs it around its
/// origin.
#[derive(Default)]
struct SpinSystem {
    view: Option<ViewId>,
    elapsed: f32,
}

impl SpinSystem {
    fn view(&mut self, registry: &mut Registry) -> Option<ViewId> {
        if self.view.is_none() {
            let query = Query::new().require::<Transform2D>().require::<Spinner>();
            match registry.get_or_create_view(&query) {
                Ok(view) => self.view = Some(view),
                Err(err) => tracing::error!(%err, "spinner view unavailable"),
            }
        }
        self.view
    }
}

impl System for SpinSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("demo-spin")
            .reads::<Spinner>()
            .writes::<Transform2D>()
    }

    fn update(&mut self, ctx: &mut EngineContext, _stage_mutex: &Mutex<()>, time: &StepTime) {
        self.elapsed += time.dt;
        let Some(view) = self.view(&mut ctx.registry) else {
            return;
        };
        let elapsed = self.elapsed;
        let dt = time.dt;
        let result = ctx.registry.for_each_in_view(view, |registry, entity| {
            let Some(spinner) = registry.get_component::<Spinner>(entity).copied() else {
                return;
            };
            if let Some(transform) = registry.get_component_mut::<Transform2D>(entity) {
                transform.rotate(spinner.speed * dt);
                let wave = (elapsed * 2.0 + spinner.phase).sin() * SPACING * 0.25;
                transform.set_position(spinner.origin + Vec2::new(0.0, wave));
            }
        });
        if let Err(err) = result {
            tracing::warn!(%err, "spin update skipped");
        }
    }
}

struct Args {
    settings: Option<String>,
    frames: u64,
}

fn parse_args() -> Result<Args> {
    let mut settings = None;
    let mut frames = DEFAULT_FRAMES;
    for arg in std::env::args().skip(1) {
        match arg.parse::<u64>() {
            Ok(n) => frames = n,
            Err(_) if settings.is_none() => settings = Some(arg),
            Err(_) => anyhow::bail!("unexpected argument `{arg}`"),
        }
    }
    Ok(Args { settings, frames })
}

/// Half the grid is animated and lives in the dynamic set, the rest is
/// static.
fn spawn_sprite_grid(
    engine: &mut Engine,
    scene: SceneId,
    pipeline: PipelineId,
    rng: &mut DeterministicRng,
) -> Result<Vec<Entity>> {
    let registry = engine.registry_mut();
    let mut sprites = Vec::with_capacity((GRID * GRID) as usize);
    for y in 0..GRID {
        for x in 0..GRID {
            let origin = Vec2::new(x as f32 * SPACING, y as f32 * SPACING);
            let animated = (x + y) % 2 == 0;
            let entity = spawn_sprite(registry, scene, pipeline, origin, animated, rng)?;
            sprites.push(entity);
        }
    }
    Ok(sprites)
}

fn spawn_sprite(
    registry: &mut Registry,
    scene: SceneId,
    pipeline: PipelineId,
    origin: Vec2,
    animated: bool,
    rng: &mut DeterministicRng,
) -> Result<Entity> {
    let entity = registry.create_entity();
    registry.emplace_component(entity, Transform2D::new(origin))?;
    registry.emplace_component(entity, Texture::new(rng.next_u32() % 8))?;
    let speed = if animated {
        registry.emplace_component(
            entity,
            Spinner {
                speed: rng.range_f32(-3.0, 3.0),
                phase: rng.range_f32(0.0, std::f32::consts::TAU),
                origin,
            },
        )?;
        UpdateSpeed::Dynamic
    } else {
        UpdateSpeed::Static
    };
    registry.emplace_component(
        entity,
        Rendered {
            scene,
            pipeline,
            speed,
        },
    )?;
    Ok(entity)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let settings = match &args.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading {path}"))?,
        None => Settings::default(),
    };
    init_logging(&settings)?;
    tracing::info!(version = blib_core::VERSION, frames = args.frames, "BLIB runtime");

    let mut engine = Engine::new(settings.engine)?;
    let mut renderer = Renderer::from_config(settings.render)?;
    let pipeline = renderer.register_pipeline("sprite", &[TRANSFORM_2D, TEXTURE]);
    let scene = renderer.create_scene();
    renderer.add_default_observer(scene)?;
    systems::install(&mut engine, renderer)?;
    engine.register_system(FrameStage::Animate, StateMask::ALL, SpinSystem::default())?;
    engine.init()?;

    let mut rng = DeterministicRng::new(0xB11B);
    let mut sprites = spawn_sprite_grid(&mut engine, scene, pipeline, &mut rng)?;
    tracing::info!(sprites = sprites.len(), %scene, "scene populated");

    for frame in 0..args.frames {
        // Churn a sprite now and then so slots get released and reused.
        if frame % 30 == 29 && !sprites.is_empty() {
            let victim = sprites.swap_remove(rng.next_u32() as usize % sprites.len());
            let registry = engine.registry_mut();
            registry.queue_destroy(victim);
            let origin = Vec2::new(
                rng.range_f32(0.0, GRID as f32 * SPACING),
                rng.range_f32(0.0, GRID as f32 * SPACING),
            );
            sprites.push(spawn_sprite(registry, scene, pipeline, origin, true, &mut rng)?);
        }
        let report = engine.run_frame(FRAME_DT)?;
        tracing::trace!(frame = report.frame, ticks = report.ticks, destroyed = report.destroyed);
    }

    let timer = engine.frame_timer();
    let (min_ms, max_ms) = timer.frame_time_range_ms();
    tracing::info!(
        frames = timer.frames(),
        fps = timer.fps(),
        avg_ms = timer.frame_time_ms(),
        min_ms,
        max_ms,
        "frame timing"
    );
    for (stage, average) in engine.profiler().iter() {
        tracing::info!(stage, avg_us = average.as_micros() as u64, "stage timing");
    }
    if let Some(renderer) = engine.resources().get::<Renderer>() {
        let sync = renderer.last_sync();
        tracing::info!(
            rendered = renderer.frames_rendered(),
            slots_copied = sync.slots_copied,
            bytes = sync.bytes_uploaded,
            "last descriptor sync"
        );
        for (name, value) in renderer.counters().iter() {
            tracing::info!(counter = name, value, "render counter");
        }
    }

    engine.shutdown();
    Ok(())
}
