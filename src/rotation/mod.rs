//! Preset rotation

pub mod queue;
pub mod scheduler;

pub use queue::PresetOverride;
pub use scheduler::PresetScheduler;
