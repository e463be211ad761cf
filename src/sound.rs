//! Immutable, pre-loaded sample buffers grains are excerpted from.

use assume::assume;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// A named, immutable, interleaved multi-channel sample buffer.
///
/// Decoding audio files is up to the application: sound buffers get created from already
/// decoded samples. Scenes share them as `Arc<SoundBuffer>` and hand them to clusters and
/// voices as borrowed slices while processing.
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    name: String,
    channel_count: usize,
    sample_rate: u32,
    buffer: Box<[f32]>,
}

impl SoundBuffer {
    /// Create a new sound buffer from interleaved samples.
    pub fn new<S: Into<String>>(
        name: S,
        channel_count: usize,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if channel_count == 0 {
            return Err(Error::SoundBufferError(format!(
                "'{name}' needs at least one channel"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::SoundBufferError(format!(
                "'{name}' has an invalid sample rate"
            )));
        }
        if samples.is_empty() {
            return Err(Error::SoundBufferError(format!("'{name}' is empty")));
        }
        if samples.len() % channel_count != 0 {
            return Err(Error::SoundBufferError(format!(
                "'{name}' sample count {} is not a multiple of its channel count {channel_count}",
                samples.len()
            )));
        }
        Ok(Self {
            name,
            channel_count,
            sample_rate,
            buffer: samples.into_boxed_slice(),
        })
    }

    /// The sound's name, used to match sounds when loading scenes.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames in the buffer.
    pub fn frame_count(&self) -> usize {
        self.buffer.len() / self.channel_count
    }

    /// Read a linearly interpolated sample at the given fractional frame position.
    ///
    /// `position` must be in range `0.0..frame_count`. The last frame doesn't interpolate.
    #[inline]
    pub fn sample_at(&self, position: f64, channel: usize) -> f32 {
        let frame_count = self.frame_count();
        debug_assert!(position >= 0.0 && position < frame_count as f64);
        debug_assert!(channel < self.channel_count);

        let index = (position as usize).min(frame_count - 1);
        let next_index = (index + 1).min(frame_count - 1);
        let fraction = (position - index as f64) as f32;

        let i0 = index * self.channel_count + channel;
        let i1 = next_index * self.channel_count + channel;

        assume!(unsafe: i0 < self.buffer.len(), "Position is asserted to be in range");
        let y0 = self.buffer[i0];
        assume!(unsafe: i1 < self.buffer.len(), "Position is asserted to be in range");
        let y1 = self.buffer[i1];
        y0 + (y1 - y0) * fraction
    }
}

// -------------------------------------------------------------------------------------------------
