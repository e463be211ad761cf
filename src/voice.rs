//! A single grain playback unit.

use std::sync::Arc;

use crate::{sound::SoundBuffer, utils::permit_alloc, window::GrainWindowMode};

// -------------------------------------------------------------------------------------------------

/// Read cursor of a grain into one sound buffer.
#[derive(Debug, Clone, Copy, Default)]
struct SoundCursor {
    /// Fractional frame position, or `None` when not playing from this sound.
    position: Option<f64>,
    /// Playback volume of this sound as given by the position provider.
    volume: f32,
}

// -------------------------------------------------------------------------------------------------

/// Plays one grain at a time: waits for a trigger, plays a windowed segment from one or more
/// sound buffers, then goes idle until it gets triggered again.
///
/// Parameter setters are staged and only applied when the next grain starts, so a grain
/// which is already sounding keeps a consistent envelope, pitch and channel gains.
#[derive(Debug, Clone)]
pub struct GrainVoice {
    sample_rate: u32,
    playing: bool,
    // staged parameters, applied with the next trigger
    duration_ms: f32,
    pitch: f32,
    direction: f64,
    window: GrainWindowMode,
    volume: f32,
    channel_multipliers: Vec<f32>,
    // current grain
    grain_window: GrainWindowMode,
    grain_volume: f32,
    grain_increment: f64,
    grain_channel_multipliers: Vec<f32>,
    window_phase: f64,
    window_increment: f64,
    frames_remaining: usize,
    cursors: Vec<SoundCursor>,
}

impl GrainVoice {
    /// Smallest pitch value a voice plays at.
    pub const MIN_PITCH: f32 = 0.0001;
    /// Smallest grain duration in milliseconds.
    pub const MIN_DURATION_MS: f32 = 1.0;

    /// Create a new, idle voice for the given output layout and sound count.
    pub fn new(
        sample_rate: u32,
        channel_count: usize,
        sound_count: usize,
        duration_ms: f32,
        pitch: f32,
    ) -> Self {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        debug_assert!(channel_count > 0, "Need at least one output channel");
        let unity_gains = vec![1.0; channel_count];
        Self {
            sample_rate,
            playing: false,
            duration_ms: duration_ms.max(Self::MIN_DURATION_MS),
            pitch: pitch.max(Self::MIN_PITCH),
            direction: 1.0,
            window: GrainWindowMode::Hann,
            volume: 1.0,
            channel_multipliers: unity_gains.clone(),
            grain_window: GrainWindowMode::Hann,
            grain_volume: 1.0,
            grain_increment: 0.0,
            grain_channel_multipliers: unity_gains,
            window_phase: 0.0,
            window_increment: 0.0,
            frames_remaining: 0,
            cursors: vec![SoundCursor::default(); sound_count],
        }
    }

    /// Is the voice currently playing a grain?
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration_ms(&self) -> f32 {
        self.duration_ms
    }
    /// Set duration of the next grains. Durations below 1 ms are clamped.
    pub fn set_duration_ms(&mut self, duration_ms: f32) {
        self.duration_ms = if duration_ms.is_nan() {
            Self::MIN_DURATION_MS
        } else {
            duration_ms.max(Self::MIN_DURATION_MS)
        };
    }

    /// Grain duration in output sample frames. Always > 0.
    pub fn duration_frames(&self) -> usize {
        let frames = (self.duration_ms as f64 * self.sample_rate as f64 / 1000.0).round();
        (frames as usize).max(1)
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
    /// Set playback rate of the next grains. Values are clamped to [`Self::MIN_PITCH`].
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = if pitch.is_nan() {
            Self::MIN_PITCH
        } else {
            pitch.max(Self::MIN_PITCH)
        };
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }
    /// Set playback direction of the next grains: forward for values >= 0, else backward.
    pub fn set_direction(&mut self, direction: f64) {
        self.direction = if direction < 0.0 { -1.0 } else { 1.0 };
    }

    pub fn window(&self) -> GrainWindowMode {
        self.window
    }
    /// Set the window of the next grains. Should be a concrete, already resolved shape.
    pub fn set_window(&mut self, window: GrainWindowMode) {
        debug_assert!(
            window != GrainWindowMode::Random,
            "Random windows should be resolved by the cluster"
        );
        self.window = window;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
    /// Set linear volume of the next grains.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    /// Set channel gains of the next grain. Missing channels get silenced.
    pub fn set_channel_multipliers(&mut self, multipliers: &[f32]) {
        for (index, gain) in self.channel_multipliers.iter_mut().enumerate() {
            *gain = multipliers.get(index).copied().unwrap_or(0.0);
        }
    }

    /// Resize per sound state after the sound set changed. Stops all grains.
    pub fn update_sound_count(&mut self, sound_count: usize) {
        self.cursors.clear();
        self.cursors.resize(sound_count, SoundCursor::default());
        self.stop();
    }

    /// Forget the removed sound's cursor. Grains continue playing from the other sounds.
    pub fn remove_sound(&mut self, index: usize) {
        if index < self.cursors.len() {
            self.cursors.remove(index);
        }
    }

    /// Try starting a new grain.
    ///
    /// `positions` holds one normalized start position per sound (`-1.0` or any other value
    /// outside of `0.0..1.0` for sounds which should not be played), `volumes` the matching
    /// per sound volumes.
    ///
    /// Returns true when the voice could not start and still awaits playback: either because
    /// it's still playing the previous grain or because no position is valid. The voice's
    /// state is left untouched in this case.
    pub fn play_me(
        &mut self,
        positions: &[f64],
        volumes: &[f64],
        sounds: &[Arc<SoundBuffer>],
    ) -> bool {
        if self.playing {
            return true;
        }
        let is_valid = |position: &f64| (0.0..1.0).contains(position);
        if !positions.iter().take(sounds.len()).any(is_valid) {
            return true;
        }

        if self.cursors.len() != sounds.len() {
            permit_alloc(|| self.cursors.resize(sounds.len(), SoundCursor::default()));
        }
        for (index, (cursor, sound)) in self.cursors.iter_mut().zip(sounds).enumerate() {
            let position = positions.get(index).copied().unwrap_or(-1.0);
            if is_valid(&position) {
                let frame_count = sound.frame_count() as f64;
                cursor.position = Some((position * frame_count).min(frame_count - 1.0));
                cursor.volume = volumes.get(index).copied().unwrap_or(0.0) as f32;
            } else {
                cursor.position = None;
                cursor.volume = 0.0;
            }
        }

        let duration_frames = self.duration_frames();
        self.grain_window = self.window;
        self.grain_volume = self.volume;
        self.grain_increment = self.direction * self.pitch as f64;
        self.grain_channel_multipliers
            .copy_from_slice(&self.channel_multipliers);
        self.window_phase = 0.0;
        self.window_increment = 1.0 / duration_frames as f64;
        self.frames_remaining = duration_frames;
        self.playing = true;
        false
    }

    /// Stop the current grain immediately.
    pub fn stop(&mut self) {
        self.playing = false;
        self.frames_remaining = 0;
    }

    /// Render `frame_count` frames of the current grain, adding into the interleaved `output`
    /// buffer, starting at frame `frame_offset`.
    pub fn next_buffer(
        &mut self,
        output: &mut [f32],
        channel_count: usize,
        frame_count: usize,
        frame_offset: usize,
        sounds: &[Arc<SoundBuffer>],
    ) {
        if !self.playing {
            return;
        }
        debug_assert_eq!(channel_count, self.grain_channel_multipliers.len());
        debug_assert!((frame_offset + frame_count) * channel_count <= output.len());

        let output_frames = output[frame_offset * channel_count..]
            .chunks_exact_mut(channel_count)
            .take(frame_count);
        for frame in output_frames {
            let envelope = self.grain_window.sample(self.window_phase) * self.grain_volume;

            for (cursor, sound) in self.cursors.iter_mut().zip(sounds) {
                let Some(position) = cursor.position else {
                    continue;
                };
                let gain = envelope * cursor.volume;
                let sound_channel_count = sound.channel_count();
                for (channel, (sample, multiplier)) in frame
                    .iter_mut()
                    .zip(&self.grain_channel_multipliers)
                    .enumerate()
                {
                    let value = sound.sample_at(position, channel % sound_channel_count);
                    *sample += value * gain * multiplier;
                }

                // advance, stopping at the sound's boundaries
                let rate_ratio = sound.sample_rate() as f64 / self.sample_rate as f64;
                let next_position = position + self.grain_increment * rate_ratio;
                cursor.position = if next_position >= 0.0 && next_position < sound.frame_count() as f64
                {
                    Some(next_position)
                } else {
                    None
                };
            }

            self.window_phase += self.window_increment;
            self.frames_remaining -= 1;
            if self.frames_remaining == 0 {
                self.playing = false;
                break;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
