use crate::graph::{ExecutionContext, GraphId, InitContext};
use crate::GraphError;
use blib_core::engine::AsAny;
use blib_core::math::UVec2;

/// Lifecycle of a pooled asset.
///
/// `Uninitialized -> Created -> (PreparedForInput <-> StartedOutput)`.
/// A graph rebuild moves owned assets to `Reset`; creating them again
/// returns to `Created` without reallocating.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssetState {
    Uninitialized,
    Created,
    PreparedForInput,
    StartedOutput,
    Reset,
}

/// A typed resource flowing between render graph tasks.
///
/// Only `create` and `on_resize` may allocate GPU resources. The per-frame
/// hooks record barriers or layout transitions at most.
pub trait Asset: AsAny + Send + Sync {
    fn create(&mut self, ctx: &InitContext) -> Result<(), GraphError>;

    fn prepare_for_input(&mut self, _ctx: &ExecutionContext) {}

    fn start_output(&mut self, _ctx: &ExecutionContext) {}

    fn end_output(&mut self, _ctx: &ExecutionContext) {}

    /// Observer size changed. `ctx.observer_size` holds the new size.
    fn on_resize(&mut self, _ctx: &InitContext) {}

    fn on_reset(&mut self) {}
}

/// Size policy of a render target.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TargetSize {
    ObserverSize,
    /// Observer size scaled by the factor, e.g. `0.5` for half resolution.
    ObserverRatio(f32),
    Fixed(UVec2),
}

impl TargetSize {
    pub fn resolve(&self, observer: UVec2) -> UVec2 {
        let size = match *self {
            TargetSize::ObserverSize => observer,
            TargetSize::ObserverRatio(ratio) => (observer.as_vec2() * ratio).round().as_uvec2(),
            TargetSize::Fixed(size) => size,
        };
        size.max(UVec2::ONE)
    }
}

/// An asset with its pool bookkeeping.
pub struct PooledAsset {
    tag: &'static str,
    state: AssetState,
    owners: Vec<GraphId>,
    external: bool,
    terminal: bool,
    asset: Box<dyn Asset>,
}

impl PooledAsset {
    pub(crate) fn new(tag: &'static str, asset: Box<dyn Asset>, external: bool, terminal: bool) -> Self {
        Self {
            tag,
            state: AssetState::Uninitialized,
            owners: Vec::new(),
            external,
            terminal,
            asset,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    pub fn owners(&self) -> &[GraphId] {
        &self.owners
    }

    pub fn is_owned_by(&self, graph: GraphId) -> bool {
        self.owners.contains(&graph)
    }

    /// External assets are put into the pool by the caller and never
    /// reclaimed by it.
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Terminal assets are final graph outputs.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_created(&self) -> bool {
        self.state != AssetState::Uninitialized
    }

    pub fn asset(&self) -> &dyn Asset {
        self.asset.as_ref()
    }

    pub fn downcast_ref<T: Asset>(&self) -> Option<&T> {
        AsAny::as_any(self.asset.as_ref()).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Asset>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self.asset.as_mut()).downcast_mut::<T>()
    }

    pub(crate) fn add_owner(&mut self, graph: GraphId) {
        if !self.owners.contains(&graph) {
            self.owners.push(graph);
        }
    }

    pub(crate) fn remove_owner(&mut self, graph: GraphId) {
        self.owners.retain(|owner| *owner != graph);
    }

    pub(crate) fn replace(&mut self, asset: Box<dyn Asset>) {
        self.asset = asset;
        self.state = AssetState::Uninitialized;
        self.external = true;
    }

    pub(crate) fn create(&mut self, ctx: &InitContext) -> Result<(), GraphError> {
        match self.state {
            AssetState::Uninitialized => {
                self.asset.create(ctx)?;
                self.state = AssetState::Created;
            }
            AssetState::Reset => self.state = AssetState::Created,
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn prepare_for_input(&mut self, ctx: &ExecutionContext) {
        match self.state {
            AssetState::PreparedForInput => {}
            AssetState::StartedOutput => {
                self.asset.end_output(ctx);
                self.asset.prepare_for_input(ctx);
                self.state = AssetState::PreparedForInput;
            }
            _ => {
                self.asset.prepare_for_input(ctx);
                self.state = AssetState::PreparedForInput;
            }
        }
    }

    pub(crate) fn start_output(&mut self, ctx: &ExecutionContext) {
        if self.state != AssetState::StartedOutput {
            self.asset.start_output(ctx);
            self.state = AssetState::StartedOutput;
        }
    }

    pub(crate) fn end_output(&mut self, ctx: &ExecutionContext) {
        if self.state == AssetState::StartedOutput {
            self.asset.end_output(ctx);
            self.state = AssetState::Created;
        }
    }

    pub(crate) fn reset(&mut self) {
        if self.is_created() {
            self.asset.on_reset();
            self.state = AssetState::Reset;
        }
    }

    pub(crate) fn resize(&mut self, ctx: &InitContext) {
        if self.is_created() {
            self.asset.on_resize(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        created: u32,
        ended: u32,
        resets: u32,
    }

    impl Asset for Probe {
        fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
            self.created += 1;
            Ok(())
        }

        fn end_output(&mut self, _ctx: &ExecutionContext) {
            self.ended += 1;
        }

        fn on_reset(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn state_machine_round_trip() {
        let init = InitContext::headless(UVec2::new(4, 4), 2);
        let exec = ExecutionContext::headless(UVec2::new(4, 4), 0);
        let mut pooled = PooledAsset::new("probe", Box::new(Probe::default()), false, false);
        assert_eq!(pooled.state(), AssetState::Uninitialized);

        pooled.create(&init).unwrap();
        pooled.start_output(&exec);
        assert_eq!(pooled.state(), AssetState::StartedOutput);
        pooled.prepare_for_input(&exec);
        assert_eq!(pooled.state(), AssetState::PreparedForInput);
        pooled.start_output(&exec);
        pooled.end_output(&exec);
        assert_eq!(pooled.state(), AssetState::Created);

        pooled.reset();
        assert_eq!(pooled.state(), AssetState::Reset);
        pooled.create(&init).unwrap();
        assert_eq!(pooled.state(), AssetState::Created);

        let probe = pooled.downcast_ref::<Probe>().unwrap();
        assert_eq!(probe.created, 1);
        assert_eq!(probe.ended, 2);
        assert_eq!(probe.resets, 1);
    }

    #[test]
    fn target_size_policies() {
        let observer = UVec2::new(1920, 1080);
        assert_eq!(TargetSize::ObserverSize.resolve(observer), observer);
        assert_eq!(
            TargetSize::ObserverRatio(0.5).resolve(observer),
            UVec2::new(960, 540)
        );
        let fixed = UVec2::new(256, 256);
        assert_eq!(TargetSize::Fixed(fixed).resolve(observer), fixed);
        assert_eq!(TargetSize::ObserverRatio(0.0).resolve(observer), UVec2::ONE);
    }
}
