//! Output sinks which consume rendered scene audio.

#[cfg(feature = "wav-output")]
pub mod wav;
