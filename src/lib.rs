#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod cluster;
mod error;
mod output;
mod parameter;
mod provider;
mod scene;
mod sound;
mod time;
mod voice;
mod window;

// public, flat re-exports
pub use error::Error;

pub use cluster::{
    ClusterId, ClusterIdAllocator, GrainCluster, GrainClusterHandle, GrainClusterMessage,
    GrainDirectionMode, SpatialMode,
};
pub use parameter::FloatParameter;
pub use provider::{CloudPlacement, PositionProvider, SoundLandscape, SoundRect};
pub use scene::Scene;
pub use sound::SoundBuffer;
pub use time::ProcessTime;
pub use voice::GrainVoice;
pub use window::GrainWindowMode;

#[cfg(feature = "wav-output")]
pub use output::wav::WavFileOutput;

// public mods
pub mod utils;

// allocation checks in tests
#[cfg(all(test, debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: ::assert_no_alloc::AllocDisabler = ::assert_no_alloc::AllocDisabler;
