use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Ordered buckets of systems run each frame.
///
/// Stages up to and including [`FrameStage::Animate`] run once per
/// simulation tick, the rest once per rendered frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrameStage {
    FrameStart,
    Update1,
    Update2,
    Physics,
    Animate,
    RenderObjectSync,
    RenderDescriptorRefresh,
    Render,
    FrameEnd,
}

impl FrameStage {
    pub const COUNT: usize = 9;

    pub const ALL: [FrameStage; Self::COUNT] = [
        FrameStage::FrameStart,
        FrameStage::Update1,
        FrameStage::Update2,
        FrameStage::Physics,
        FrameStage::Animate,
        FrameStage::RenderObjectSync,
        FrameStage::RenderDescriptorRefresh,
        FrameStage::Render,
        FrameStage::FrameEnd,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this stage runs once per simulation tick.
    pub fn is_per_tick(self) -> bool {
        self <= FrameStage::Animate
    }

    pub fn per_tick() -> impl Iterator<Item = FrameStage> {
        Self::ALL.into_iter().filter(|s| s.is_per_tick())
    }

    pub fn per_frame() -> impl Iterator<Item = FrameStage> {
        Self::ALL.into_iter().filter(|s| !s.is_per_tick())
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameStage::FrameStart => "FrameStart",
            FrameStage::Update1 => "Update1",
            FrameStage::Update2 => "Update2",
            FrameStage::Physics => "Physics",
            FrameStage::Animate => "Animate",
            FrameStage::RenderObjectSync => "RenderObjectSync",
            FrameStage::RenderDescriptorRefresh => "RenderDescriptorRefresh",
            FrameStage::Render => "Render",
            FrameStage::FrameEnd => "FrameEnd",
        }
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine states a system is active in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateMask(u8);

impl StateMask {
    pub const NONE: StateMask = StateMask(0);
    pub const RUNNING: StateMask = StateMask(1 << 0);
    pub const PAUSED: StateMask = StateMask(1 << 1);
    pub const EDITOR: StateMask = StateMask(1 << 2);
    pub const ALL: StateMask = StateMask(0b111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn intersects(self, other: StateMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: StateMask) -> StateMask {
        StateMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateMask {
    fn bitor_assign(&mut self, rhs: StateMask) {
        self.0 |= rhs.0;
    }
}
