//! BLIB engine core
//!
//! - Entity Component System with cached, incrementally maintained views
//! - Engine context, frame stages and the system scheduler
//! - Fixed-step simulation clock
//! - Math helpers

pub mod ecs;
pub mod engine;
pub mod math;
pub mod time;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
