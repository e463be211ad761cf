//! Grain clouds: a set of grain voices driven by a common trigger clock.

use std::{
    fmt::{self, Display},
    sync::{Arc, Weak},
};

use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use strum::EnumCount;

use crate::{
    parameter::FloatParameter,
    provider::PositionProvider,
    sound::SoundBuffer,
    time::ProcessTime,
    utils::{db_to_linear, permit_alloc},
    voice::GrainVoice,
    window::GrainWindowMode,
};

// -------------------------------------------------------------------------------------------------

mod handle;
mod spatializer;

pub use handle::GrainClusterHandle;
pub use spatializer::SpatialMode;

use spatializer::Spatializer;

// -------------------------------------------------------------------------------------------------

/// Unique identifier of a grain cluster within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(usize);

impl ClusterId {
    pub fn value(&self) -> usize {
        self.0
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out unique, increasing cluster ids, starting with 1.
#[derive(Debug, Clone, Default)]
pub struct ClusterIdAllocator {
    last_id: usize,
}

impl ClusterIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ClusterId {
        self.last_id += 1;
        ClusterId(self.last_id)
    }
}

// -------------------------------------------------------------------------------------------------

/// Playback direction policy of a cluster's grains.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::EnumCount,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum GrainDirectionMode {
    Forward = 0,
    Backward = 1,
    /// Picks forward or backward at random for every triggered grain.
    #[default]
    Random = 2,
}

impl GrainDirectionMode {
    /// Select a direction mode by index. Indices wrap, negative indices select `Random`.
    pub fn from_index(index: i32) -> Self {
        if index < 0 {
            return Self::Random;
        }
        let index = (index % Self::COUNT as i32) as u8;
        Self::from_repr(index).unwrap_or_default()
    }

    /// The mode's persisted index.
    pub fn index(&self) -> i32 {
        *self as i32
    }
}

// -------------------------------------------------------------------------------------------------

/// Control messages for a [`GrainCluster`], sent via [`GrainClusterHandle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrainClusterMessage {
    SetDuration(f32),
    SetOverlap(f32),
    SetPitch(f32),
    SetPitchLfoFrequency(f32),
    SetPitchLfoAmount(f32),
    SetDirection(GrainDirectionMode),
    SetWindow(GrainWindowMode),
    SetSpatialMode(SpatialMode, Option<usize>),
    SetVolumeDb(f32),
    SetActive(bool),
    ToggleActive,
    AddVoice,
    RemoveVoice,
}

// -------------------------------------------------------------------------------------------------

/// A grain cloud: owns a set of [`GrainVoice`]s and triggers them round-robin at a rate
/// derived from the grain duration, overlap and voice count.
///
/// Grain start positions are queried from a registered [`PositionProvider`] on each trigger.
/// Without a provider, or while the provider offers no valid positions, the cluster keeps
/// waiting for a playable position and stays silent.
///
/// The cluster only is accessed from the audio path. Use [`GrainClusterHandle`]s to change
/// parameters from other threads: messages get applied at the start of the next
/// [`process`](Self::process) call.
pub struct GrainCluster {
    id: ClusterId,
    sample_rate: u32,
    channel_count: usize,
    is_active: bool,
    voices: Vec<GrainVoice>,
    next_voice: usize,
    local_time: f64,
    bang_time: f64,
    awaiting_play: bool,
    pending_voice_adds: usize,
    pending_voice_removes: usize,
    duration_ms: f32,
    overlap: f32,
    pitch: f32,
    pitch_lfo_frequency: f32,
    pitch_lfo_amount: f32,
    direction: GrainDirectionMode,
    window: GrainWindowMode,
    spatializer: Spatializer,
    spatial_channel: Option<usize>,
    volume_db: f32,
    volume: f32,
    positions: Vec<f64>,
    volumes: Vec<f64>,
    provider: Option<Weak<dyn PositionProvider>>,
    rng: SmallRng,
    message_queue: Arc<ArrayQueue<GrainClusterMessage>>,
}

impl GrainCluster {
    pub const DURATION: FloatParameter =
        FloatParameter::new(FourCC(*b"DURA"), "Duration", 1.0..=f32::MAX, 500.0).with_unit("ms");
    pub const OVERLAP: FloatParameter =
        FloatParameter::new(FourCC(*b"OVLP"), "Overlap", 0.0..=1.0, 1.0);
    pub const PITCH: FloatParameter = FloatParameter::new(
        FourCC(*b"PTCH"),
        "Pitch",
        GrainVoice::MIN_PITCH..=f32::MAX,
        1.0,
    );
    pub const PITCH_LFO_FREQUENCY: FloatParameter = FloatParameter::new(
        FourCC(*b"LFOF"),
        "Pitch LFO Freq",
        0.0..=f32::MAX,
        0.01,
    )
    .with_unit("Hz");
    pub const PITCH_LFO_AMOUNT: FloatParameter =
        FloatParameter::new(FourCC(*b"LFOA"), "Pitch LFO Amount", 0.0..=f32::MAX, 0.0);
    pub const VOLUME: FloatParameter =
        FloatParameter::new(FourCC(*b"VOLU"), "Volume", -60.0..=6.0, 0.0).with_unit("dB");

    /// Default number of voices of new clusters.
    pub const DEFAULT_VOICE_COUNT: usize = 8;
    /// Upper limit for the number of voices of a cluster.
    pub const MAX_VOICE_COUNT: usize = 256;

    const MESSAGE_QUEUE_SIZE: usize = 128;
    const SUB_STEPS: usize = 2;

    /// Create a new cluster with `voice_count` voices and default parameters. The voice count
    /// is clamped to `1..=MAX_VOICE_COUNT`.
    pub fn new(
        id: ClusterId,
        sample_rate: u32,
        channel_count: usize,
        sound_count: usize,
        voice_count: usize,
    ) -> Self {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        debug_assert!(channel_count > 0, "Need at least one output channel");

        let duration_ms = Self::DURATION.default_value();
        let pitch = Self::PITCH.default_value();
        let volume_db = Self::VOLUME.default_value();
        let volume = db_to_linear(volume_db);

        let mut rng = SmallRng::from_os_rng();
        let window = GrainWindowMode::default();
        let voices = (0..voice_count.clamp(1, Self::MAX_VOICE_COUNT))
            .map(|_| {
                let mut voice =
                    GrainVoice::new(sample_rate, channel_count, sound_count, duration_ms, pitch);
                voice.set_window(window.resolve(&mut rng));
                voice.set_volume(volume);
                voice
            })
            .collect();

        let message_queue = Arc::new(ArrayQueue::new(Self::MESSAGE_QUEUE_SIZE));

        let mut cluster = Self {
            id,
            sample_rate,
            channel_count,
            is_active: true,
            voices,
            next_voice: 0,
            local_time: 0.0,
            bang_time: 0.0,
            awaiting_play: false,
            pending_voice_adds: 0,
            pending_voice_removes: 0,
            duration_ms,
            overlap: Self::OVERLAP.default_value(),
            pitch,
            pitch_lfo_frequency: Self::PITCH_LFO_FREQUENCY.default_value(),
            pitch_lfo_amount: Self::PITCH_LFO_AMOUNT.default_value(),
            direction: GrainDirectionMode::default(),
            window,
            spatializer: Spatializer::new(channel_count),
            spatial_channel: None,
            volume_db,
            volume,
            positions: vec![-1.0; sound_count],
            volumes: vec![0.0; sound_count],
            provider: None,
            rng,
            message_queue,
        };
        cluster.update_bang_time();
        cluster
    }

    /// The cluster's unique id.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Create a new handle to control this cluster from other threads.
    pub fn handle(&self) -> GrainClusterHandle {
        GrainClusterHandle::new(self.id, Arc::clone(&self.message_queue))
    }

    /// Set the provider which is queried for grain start positions. The cluster only keeps a
    /// weak reference to it: when the provider gets dropped, triggers no longer find valid
    /// positions and the cluster goes silent.
    pub fn register_provider(&mut self, provider: Weak<dyn PositionProvider>) {
        self.provider = Some(provider);
    }

    // ---------------------------------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.is_active
    }
    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }
    pub fn toggle_active(&mut self) {
        self.is_active = !self.is_active;
    }

    pub fn duration_ms(&self) -> f32 {
        self.duration_ms
    }
    /// Set duration of all grains. Durations below 1 ms are clamped.
    pub fn set_duration_ms(&mut self, duration_ms: f32) {
        self.duration_ms = Self::DURATION.clamp_value(duration_ms);
        for voice in &mut self.voices {
            voice.set_duration_ms(self.duration_ms);
        }
        self.update_bang_time();
    }

    /// Normalized overlap in range 0..=1.
    pub fn overlap(&self) -> f32 {
        self.overlap
    }
    /// Set normalized overlap: 0 plays one grain at a time, 1 lets all voices overlap.
    pub fn set_overlap(&mut self, overlap: f32) {
        self.overlap = Self::OVERLAP.clamp_value(overlap);
        self.update_bang_time();
    }

    /// Number of overlapping grains: `voice_count ^ overlap`.
    pub fn effective_overlap(&self) -> f64 {
        (self.voices.len() as f64).powf(self.overlap as f64)
    }

    /// Interval between two grain triggers in sample frames.
    pub fn bang_time(&self) -> f64 {
        self.bang_time
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
    /// Set playback rate of all grains. Values below 0.0001 are clamped.
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = Self::PITCH.clamp_value(pitch);
        for voice in &mut self.voices {
            voice.set_pitch(self.pitch);
        }
    }

    pub fn pitch_lfo_frequency(&self) -> f32 {
        self.pitch_lfo_frequency
    }
    /// Set pitch LFO rate in Hz. Negative frequencies are mirrored.
    pub fn set_pitch_lfo_frequency(&mut self, frequency: f32) {
        self.pitch_lfo_frequency = Self::PITCH_LFO_FREQUENCY.clamp_value(frequency.abs());
    }

    pub fn pitch_lfo_amount(&self) -> f32 {
        self.pitch_lfo_amount
    }
    /// Set pitch LFO depth. Negative amounts are clamped to 0, which disables the LFO.
    pub fn set_pitch_lfo_amount(&mut self, amount: f32) {
        self.pitch_lfo_amount = Self::PITCH_LFO_AMOUNT.clamp_value(amount);
    }

    pub fn direction(&self) -> GrainDirectionMode {
        self.direction
    }
    pub fn set_direction(&mut self, direction: GrainDirectionMode) {
        self.direction = direction;
    }

    pub fn window(&self) -> GrainWindowMode {
        self.window
    }
    /// Set window of all grains. [`GrainWindowMode::Random`] assigns a random shape to
    /// each voice.
    pub fn set_window(&mut self, window: GrainWindowMode) {
        self.window = window;
        for voice in &mut self.voices {
            voice.set_window(window.resolve(&mut self.rng));
        }
    }

    pub fn spatial_mode(&self) -> SpatialMode {
        self.spatializer.mode()
    }
    /// Fixed output channel, if any. Stored and persisted only.
    pub fn spatial_channel(&self) -> Option<usize> {
        self.spatial_channel
    }
    /// Set spatial mode. A `None` channel keeps the current fixed channel.
    pub fn set_spatial_mode(&mut self, mode: SpatialMode, channel: Option<usize>) {
        self.spatializer.set_mode(mode);
        if channel.is_some() {
            self.spatial_channel = channel;
        }
    }

    pub fn volume_db(&self) -> f32 {
        self.volume_db
    }
    /// Set cluster volume in dB. The value is clamped to -60..=6 dB.
    pub fn set_volume_db(&mut self, volume_db: f32) {
        self.volume_db = Self::VOLUME.clamp_value(volume_db);
        self.volume = db_to_linear(self.volume_db);
        for voice in &mut self.voices {
            voice.set_volume(self.volume);
        }
    }

    /// Number of voices. Pending voice adds or removes are not included.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Request a new voice. Voices get added at the start of the next process call, one per
    /// call. Requests beyond [`Self::MAX_VOICE_COUNT`] voices are ignored.
    pub fn add_voice(&mut self) {
        self.pending_voice_adds += 1;
    }

    /// Request removal of the most recently added voice. Voices get removed at the start of
    /// the next process call, one per call. The last voice never gets removed.
    pub fn remove_voice(&mut self) {
        self.pending_voice_removes += 1;
    }

    // ---------------------------------------------------------------------------------------------

    /// Resize per sound state after the scene's sound set changed. Stops running grains.
    pub fn update_sound_count(&mut self, sound_count: usize) {
        self.positions.clear();
        self.positions.resize(sound_count, -1.0);
        self.volumes.clear();
        self.volumes.resize(sound_count, 0.0);
        for voice in &mut self.voices {
            voice.update_sound_count(sound_count);
        }
    }

    /// Forget per sound state of a removed sound.
    pub fn remove_sound(&mut self, index: usize) {
        if index < self.positions.len() {
            self.positions.remove(index);
            self.volumes.remove(index);
        }
        for voice in &mut self.voices {
            voice.remove_sound(index);
        }
    }

    // ---------------------------------------------------------------------------------------------

    /// Render the next block of grains, adding into the interleaved `output` buffer.
    ///
    /// `sounds` must be the scene's current sound set, in the same order the position
    /// provider uses. `time` is the scene time of the block's first frame.
    pub fn process(&mut self, output: &mut [f32], sounds: &[Arc<SoundBuffer>], time: &ProcessTime) {
        self.process_messages();
        self.apply_pending_voice_change();

        if !self.is_active {
            return;
        }

        let channel_count = self.channel_count;
        let frame_count = output.len() / channel_count;
        if frame_count == 0 {
            return;
        }
        let step = (frame_count / Self::SUB_STEPS).max(1);

        let mut frame_offset = 0;
        while frame_offset < frame_count {
            let step_frames = step.min(frame_count - frame_offset);

            if self.local_time > self.bang_time || self.awaiting_play {
                self.trigger_next_voice(sounds, time.seconds_at(frame_offset));
            }
            self.local_time += step_frames as f64;

            for voice in &mut self.voices {
                voice.next_buffer(output, channel_count, step_frames, frame_offset, sounds);
            }
            frame_offset += step_frames;
        }
    }

    fn process_messages(&mut self) {
        while let Some(message) = self.message_queue.pop() {
            match message {
                GrainClusterMessage::SetDuration(duration) => self.set_duration_ms(duration),
                GrainClusterMessage::SetOverlap(overlap) => self.set_overlap(overlap),
                GrainClusterMessage::SetPitch(pitch) => self.set_pitch(pitch),
                GrainClusterMessage::SetPitchLfoFrequency(frequency) => {
                    self.set_pitch_lfo_frequency(frequency)
                }
                GrainClusterMessage::SetPitchLfoAmount(amount) => {
                    self.set_pitch_lfo_amount(amount)
                }
                GrainClusterMessage::SetDirection(direction) => self.set_direction(direction),
                GrainClusterMessage::SetWindow(window) => self.set_window(window),
                GrainClusterMessage::SetSpatialMode(mode, channel) => {
                    self.set_spatial_mode(mode, channel)
                }
                GrainClusterMessage::SetVolumeDb(volume_db) => self.set_volume_db(volume_db),
                GrainClusterMessage::SetActive(active) => self.set_active(active),
                GrainClusterMessage::ToggleActive => self.toggle_active(),
                GrainClusterMessage::AddVoice => self.add_voice(),
                GrainClusterMessage::RemoveVoice => self.remove_voice(),
            }
        }
    }

    fn apply_pending_voice_change(&mut self) {
        if self.pending_voice_adds > 0 {
            self.pending_voice_adds -= 1;
            if self.voices.len() >= Self::MAX_VOICE_COUNT {
                permit_alloc(|| {
                    log::warn!(
                        "Grain cluster {} already has {} voices. Ignoring voice add...",
                        self.id,
                        self.voices.len()
                    );
                });
                return;
            }
            let mut voice = permit_alloc(|| {
                GrainVoice::new(
                    self.sample_rate,
                    self.channel_count,
                    self.positions.len(),
                    self.duration_ms,
                    self.pitch,
                )
            });
            voice.set_window(self.window.resolve(&mut self.rng));
            voice.set_volume(self.volume);
            permit_alloc(|| {
                self.voices.push(voice);
                log::debug!(
                    "Added voice to grain cluster {}: {} voices",
                    self.id,
                    self.voices.len()
                );
            });
            self.update_bang_time();
        } else if self.pending_voice_removes > 0 {
            self.pending_voice_removes -= 1;
            if self.voices.len() > 1 {
                if self.next_voice >= self.voices.len() - 1 {
                    self.next_voice = 0;
                }
                permit_alloc(|| {
                    drop(self.voices.pop());
                    log::debug!(
                        "Removed voice from grain cluster {}: {} voices",
                        self.id,
                        self.voices.len()
                    );
                });
                self.update_bang_time();
            }
        }
    }

    fn trigger_next_voice(&mut self, sounds: &[Arc<SoundBuffer>], time_in_seconds: f64) {
        let sound_count = sounds.len().min(self.positions.len());
        let sounds = &sounds[..sound_count];
        let positions = &mut self.positions[..sound_count];
        let volumes = &mut self.volumes[..sound_count];

        // query new positions on fresh triggers, or when retries got nothing playable
        let has_valid_position = positions.iter().any(|p| (0.0..1.0).contains(p));
        if !self.awaiting_play || !has_valid_position {
            if !self.awaiting_play {
                self.local_time = 0.0;
            }
            positions.fill(-1.0);
            volumes.fill(0.0);
            if let Some(provider) = self.provider.as_ref().and_then(Weak::upgrade) {
                provider.trigger_positions(
                    self.next_voice,
                    self.duration_ms,
                    positions,
                    volumes,
                    &mut self.rng,
                );
            }
        }

        let pitch = if self.pitch_lfo_amount > 0.0 && self.pitch_lfo_frequency > 0.0 {
            let phase = std::f64::consts::TAU * self.pitch_lfo_frequency as f64 * time_in_seconds;
            (self.pitch + self.pitch_lfo_amount * phase.sin() as f32).abs()
        } else {
            self.pitch
        };
        let direction = match self.direction {
            GrainDirectionMode::Forward => 1.0,
            GrainDirectionMode::Backward => -1.0,
            GrainDirectionMode::Random => {
                if self.rng.random_bool(0.5) {
                    1.0
                } else {
                    -1.0
                }
            }
        };
        let multipliers = self.spatializer.next_multipliers();

        let voice_index = self.next_voice;
        let voice = &mut self.voices[voice_index];
        voice.set_pitch(pitch);
        voice.set_direction(direction);
        voice.set_channel_multipliers(multipliers);

        self.awaiting_play = voice.play_me(positions, volumes, sounds);
        if !self.awaiting_play {
            self.next_voice = (voice_index + 1) % self.voices.len();
        }
    }

    fn update_bang_time(&mut self) {
        self.bang_time = self.duration_ms as f64 * self.sample_rate as f64 * 0.001
            / self.effective_overlap();
    }
}

impl Display for GrainCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spatial_channel = self
            .spatial_channel
            .map_or_else(|| "none".to_string(), |channel| channel.to_string());
        writeln!(
            f,
            "- {} : {}",
            Self::DURATION.name(),
            Self::DURATION.value_to_string(self.duration_ms, true)
        )?;
        writeln!(
            f,
            "- {} : {}",
            Self::OVERLAP.name(),
            Self::OVERLAP.value_to_string(self.overlap, true)
        )?;
        writeln!(
            f,
            "- {} : {}",
            Self::PITCH.name(),
            Self::PITCH.value_to_string(self.pitch, true)
        )?;
        writeln!(
            f,
            "- {} : {}",
            Self::PITCH_LFO_FREQUENCY.name(),
            Self::PITCH_LFO_FREQUENCY.value_to_string(self.pitch_lfo_frequency, true)
        )?;
        writeln!(
            f,
            "- {} : {}",
            Self::PITCH_LFO_AMOUNT.name(),
            Self::PITCH_LFO_AMOUNT.value_to_string(self.pitch_lfo_amount, true)
        )?;
        writeln!(f, "- Direction : {}", self.direction)?;
        writeln!(f, "- Window : {}", self.window)?;
        writeln!(f, "- Spatial Mode : {}", self.spatial_mode())?;
        writeln!(f, "- Spatial Channel : {}", spatial_channel)?;
        writeln!(
            f,
            "- {} : {}",
            Self::VOLUME.name(),
            Self::VOLUME.value_to_string(self.volume_db, true)
        )?;
        writeln!(f, "- Voices : {}", self.voices.len())?;
        writeln!(f, "- Active : {}", self.is_active)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::provider::{CloudPlacement, SoundLandscape, SoundRect};

    const SAMPLE_RATE: u32 = 1000;

    /// Provider which hands out a fixed position for the first sound, or nothing.
    struct FixedPosition(Option<f64>);

    impl PositionProvider for FixedPosition {
        fn trigger_positions(
            &self,
            _voice_index: usize,
            _duration_ms: f32,
            positions: &mut [f64],
            volumes: &mut [f64],
            _rng: &mut SmallRng,
        ) {
            if let (Some(position), Some(first)) = (self.0, positions.first_mut()) {
                *first = position;
                volumes[0] = 1.0;
            }
        }
    }

    fn new_cluster(voice_count: usize) -> GrainCluster {
        let mut allocator = ClusterIdAllocator::new();
        GrainCluster::new(allocator.next_id(), SAMPLE_RATE, 2, 1, voice_count)
    }

    fn test_sounds() -> Vec<Arc<SoundBuffer>> {
        vec![Arc::new(
            SoundBuffer::new("sound", 1, SAMPLE_RATE, vec![0.5; 4000]).unwrap(),
        )]
    }

    #[test]
    fn id_allocation() {
        let mut allocator = ClusterIdAllocator::new();
        let first = allocator.next_id();
        let second = allocator.next_id();
        assert_eq!(first.value(), 1);
        assert_ne!(first, second);
        assert_eq!(second.to_string(), "2");
    }

    #[test]
    fn mode_indices() {
        assert_eq!(GrainDirectionMode::from_index(0), GrainDirectionMode::Forward);
        assert_eq!(GrainDirectionMode::from_index(4), GrainDirectionMode::Backward);
        assert_eq!(GrainDirectionMode::from_index(-2), GrainDirectionMode::Random);
        assert_eq!(GrainDirectionMode::Random.index(), 2);
    }

    #[test]
    fn defaults() {
        let cluster = new_cluster(GrainCluster::DEFAULT_VOICE_COUNT);
        assert!(cluster.is_active());
        assert_eq!(cluster.duration_ms(), 500.0);
        assert_eq!(cluster.pitch(), 1.0);
        assert_eq!(cluster.overlap(), 1.0);
        assert_eq!(cluster.pitch_lfo_frequency(), 0.01);
        assert_eq!(cluster.pitch_lfo_amount(), 0.0);
        assert_eq!(cluster.direction(), GrainDirectionMode::Random);
        assert_eq!(cluster.window(), GrainWindowMode::Hann);
        assert_eq!(cluster.spatial_mode(), SpatialMode::Unity);
        assert_eq!(cluster.spatial_channel(), None);
        assert_eq!(cluster.volume_db(), 0.0);
        assert_eq!(cluster.voice_count(), 8);
        // 500 ms at 1 kHz spread over 8 overlapping voices
        assert!((cluster.bang_time() - 500.0 / 8.0).abs() < 1e-9);
        // never less than one voice
        assert_eq!(new_cluster(0).voice_count(), 1);
    }

    #[test]
    fn effective_overlap() {
        let mut cluster = new_cluster(8);
        cluster.set_overlap(0.0);
        assert_eq!(cluster.effective_overlap(), 1.0);
        cluster.set_overlap(1.0);
        assert_eq!(cluster.effective_overlap(), 8.0);
        let mut last = 0.0;
        for step in 0..=10 {
            cluster.set_overlap(step as f32 / 10.0);
            assert!(cluster.effective_overlap() >= last);
            last = cluster.effective_overlap();
        }
        cluster.set_overlap(2.0);
        assert_eq!(cluster.overlap(), 1.0);
        cluster.set_overlap(-1.0);
        assert_eq!(cluster.overlap(), 0.0);
    }

    #[test]
    fn parameter_clamping() {
        let mut cluster = new_cluster(4);
        cluster.set_pitch(0.0);
        assert!(cluster.pitch() > 0.0);
        cluster.set_pitch(-1.0);
        assert!(cluster.pitch() > 0.0);
        cluster.set_duration_ms(0.0);
        assert_eq!(cluster.duration_ms(), 1.0);
        assert!(cluster.bang_time() > 0.0);
        cluster.set_pitch_lfo_frequency(-2.0);
        assert_eq!(cluster.pitch_lfo_frequency(), 2.0);
        cluster.set_pitch_lfo_amount(-2.0);
        assert_eq!(cluster.pitch_lfo_amount(), 0.0);
        for volume_db in [-60.0, -12.5, 0.0, 6.0] {
            cluster.set_volume_db(volume_db);
            assert_eq!(cluster.volume_db(), volume_db);
        }
        cluster.set_volume_db(10.0);
        assert_eq!(cluster.volume_db(), 6.0);
        cluster.set_volume_db(-100.0);
        assert_eq!(cluster.volume_db(), -60.0);
    }

    #[test]
    fn spatial_channel() {
        let mut cluster = new_cluster(4);
        cluster.set_spatial_mode(SpatialMode::Around, Some(3));
        assert_eq!(cluster.spatial_mode(), SpatialMode::Around);
        assert_eq!(cluster.spatial_channel(), Some(3));
        cluster.set_spatial_mode(SpatialMode::Stereo, None);
        assert_eq!(cluster.spatial_channel(), Some(3));
    }

    #[test]
    fn add_remove_voices() {
        let sounds = test_sounds();
        let mut output = vec![0.0; 2 * 64];
        let mut cluster = new_cluster(4);
        cluster.set_overlap(0.5);
        let bang_time = cluster.bang_time();

        cluster.add_voice();
        assert_eq!(cluster.voice_count(), 4);
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 5);
        assert_ne!(cluster.bang_time(), bang_time);

        cluster.remove_voice();
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 4);
        assert_eq!(cluster.bang_time(), bang_time);

        // one voice change per block, adds first
        cluster.add_voice();
        cluster.add_voice();
        cluster.remove_voice();
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 5);
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 6);
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 5);

        // never removes the last voice
        let mut cluster = new_cluster(1);
        cluster.remove_voice();
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), 1);
    }

    #[test]
    fn awaits_valid_positions() {
        let sounds = test_sounds();
        let mut output = vec![0.0; 2 * 64];
        let mut cluster = new_cluster(4);
        cluster.set_duration_ms(10.0);

        let nothing: Arc<dyn PositionProvider> = Arc::new(FixedPosition(None));
        cluster.register_provider(Arc::downgrade(&nothing));
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(cluster.awaiting_play);
        assert_eq!(cluster.next_voice, 0);
        assert!(output.iter().all(|s| *s == 0.0));

        let valid: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.25)));
        cluster.register_provider(Arc::downgrade(&valid));
        let mut output = vec![0.0; 2 * 4];
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(!cluster.awaiting_play);
        assert_eq!(cluster.next_voice, 1);
    }

    #[test]
    fn dropped_provider_silences() {
        let sounds = test_sounds();
        let mut cluster = new_cluster(4);
        {
            let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.25)));
            cluster.register_provider(Arc::downgrade(&provider));
        }
        let mut output = vec![0.0; 2 * 256];
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn produces_additive_output() {
        let sounds = test_sounds();
        let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.0)));
        let mut cluster = new_cluster(4);
        cluster.set_duration_ms(20.0);
        cluster.set_direction(GrainDirectionMode::Forward);
        cluster.register_provider(Arc::downgrade(&provider));

        let mut output = vec![1.0; 2 * 64];
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(output.iter().all(|s| *s >= 1.0));
        assert!(output.iter().any(|s| *s > 1.0));

        // inactive clusters stay silent
        cluster.set_active(false);
        let mut output = vec![0.0; 2 * 64];
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(output.iter().all(|s| *s == 0.0));
        cluster.toggle_active();
        assert!(cluster.is_active());
    }

    #[test]
    fn trigger_interval() {
        let sounds = test_sounds();
        let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.0)));
        let mut cluster = new_cluster(2);
        cluster.set_duration_ms(40.0);
        cluster.set_overlap(0.0);
        cluster.register_provider(Arc::downgrade(&provider));
        assert!((cluster.bang_time() - 40.0).abs() < 1e-9);

        // blocks of 10 frames, sub steps of 5 frames: triggers after passing 40 frames
        let mut output = vec![0.0; 2 * 10];
        let mut triggers = Vec::new();
        for block in 0..20 {
            let before = cluster.next_voice;
            cluster.process(&mut output, &sounds, &ProcessTime::new(block * 10, SAMPLE_RATE));
            if cluster.next_voice != before {
                triggers.push(block);
            }
        }
        assert_eq!(triggers, vec![4, 9, 13, 18]);
    }

    #[test]
    fn plays_from_cloud_placements() {
        let sounds = test_sounds();
        let landscape = Arc::new(SoundLandscape::new(vec![SoundRect::new(
            true, 100.0, 100.0, 0.0, 0.0,
        )]));
        let placement = Arc::new(CloudPlacement::new(50.0, 50.0, landscape));
        let provider: Arc<dyn PositionProvider> = placement;
        let mut cluster = new_cluster(4);
        cluster.set_duration_ms(10.0);
        cluster.register_provider(Arc::downgrade(&provider));

        let mut output = vec![0.0; 2 * 256];
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert!(output.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn voice_count_limit() {
        let sounds = test_sounds();
        let mut output = vec![0.0; 2 * 4];
        let mut cluster = new_cluster(usize::MAX);
        assert_eq!(cluster.voice_count(), GrainCluster::MAX_VOICE_COUNT);
        cluster.add_voice();
        cluster.process(&mut output, &sounds, &ProcessTime::default());
        assert_eq!(cluster.voice_count(), GrainCluster::MAX_VOICE_COUNT);
    }

    #[test]
    fn pitch_lfo() {
        let sounds = test_sounds();
        let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.0)));
        let mut cluster = new_cluster(4);
        cluster.register_provider(Arc::downgrade(&provider));
        cluster.set_pitch(1.0);
        cluster.set_pitch_lfo_frequency(1.0);
        cluster.set_pitch_lfo_amount(0.5);

        // quarter period: 1 + 0.5 * sin(pi / 2)
        cluster.trigger_next_voice(&sounds, 0.25);
        assert!((cluster.voices[0].pitch() - 1.5).abs() < 1e-5);
        // other voices keep the plain pitch
        assert!(cluster.voices[1..].iter().all(|voice| voice.pitch() == 1.0));

        // negative pitches get mirrored: |1 - 1.5|
        cluster.set_pitch_lfo_amount(1.5);
        cluster.trigger_next_voice(&sounds, 0.75);
        assert!((cluster.voices[1].pitch() - 0.5).abs() < 1e-5);
        assert!((cluster.voices[0].pitch() - 1.5).abs() < 1e-5);

        // disabled with a zero amount or frequency
        cluster.set_pitch_lfo_amount(0.0);
        cluster.trigger_next_voice(&sounds, 0.25);
        assert_eq!(cluster.voices[2].pitch(), 1.0);
        cluster.set_pitch_lfo_amount(0.5);
        cluster.set_pitch_lfo_frequency(0.0);
        cluster.trigger_next_voice(&sounds, 0.25);
        assert_eq!(cluster.voices[3].pitch(), 1.0);
        assert_eq!(cluster.next_voice, 0);
    }

    #[test]
    fn direction_modes() {
        let sounds = test_sounds();
        let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.5)));
        let mut cluster = new_cluster(4);
        cluster.register_provider(Arc::downgrade(&provider));

        cluster.set_direction(GrainDirectionMode::Backward);
        cluster.trigger_next_voice(&sounds, 0.0);
        assert_eq!(cluster.voices[0].direction(), -1.0);
        cluster.set_direction(GrainDirectionMode::Forward);
        cluster.trigger_next_voice(&sounds, 0.0);
        assert_eq!(cluster.voices[1].direction(), 1.0);

        // random directions get picked per trigger
        cluster.set_direction(GrainDirectionMode::Random);
        let mut directions = Vec::new();
        for _ in 0..64 {
            let voice_index = cluster.next_voice;
            cluster.voices[voice_index].stop();
            cluster.trigger_next_voice(&sounds, 0.0);
            directions.push(cluster.voices[voice_index].direction());
        }
        assert!(directions.contains(&1.0));
        assert!(directions.contains(&-1.0));
    }

    #[test]
    fn stereo_grains_alternate_channels() {
        let sounds = test_sounds();
        let provider: Arc<dyn PositionProvider> = Arc::new(FixedPosition(Some(0.0)));
        let mut cluster = new_cluster(4);
        cluster.set_duration_ms(10.0);
        cluster.set_direction(GrainDirectionMode::Forward);
        cluster.set_spatial_mode(SpatialMode::Stereo, None);
        cluster.register_provider(Arc::downgrade(&provider));

        let channel_sums = |output: &[f32]| {
            let left: f32 = output.iter().step_by(2).sum();
            let right: f32 = output.iter().skip(1).step_by(2).sum();
            (left, right)
        };
        for (voice_index, left_active) in [(0, true), (1, false), (2, true), (3, false)] {
            cluster.trigger_next_voice(&sounds, 0.0);
            let mut output = vec![0.0; 2 * 10];
            cluster.voices[voice_index].next_buffer(&mut output, 2, 10, 0, &sounds);
            let (left, right) = channel_sums(&output);
            if left_active {
                assert!(left > 0.0 && right == 0.0, "{left} {right}");
            } else {
                assert!(right > 0.0 && left == 0.0, "{left} {right}");
            }
        }
    }

    #[test]
    fn description() {
        let cluster = new_cluster(3);
        let description = cluster.to_string();
        assert!(description.contains("- Duration : 500.00 ms"));
        assert!(description.contains("- Volume : 0.00 dB"));
        assert!(description.contains("- Spatial Channel : none"));
        assert!(description.contains("- Voices : 3"));
    }
}
