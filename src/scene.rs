//! The scene: sounds, their placements and the grain clouds playing from them.

use std::sync::{Arc, Weak};

use crate::{
    cluster::{ClusterId, ClusterIdAllocator, GrainCluster, GrainClusterHandle},
    error::Error,
    provider::{CloudPlacement, SoundLandscape, SoundRect},
    sound::SoundBuffer,
    time::ProcessTime,
};

// -------------------------------------------------------------------------------------------------

pub(crate) mod persistence;

// -------------------------------------------------------------------------------------------------

/// A grain cloud within a scene: the cluster and the placement it queries positions from.
pub(crate) struct SceneCloud {
    cluster: GrainCluster,
    placement: Arc<CloudPlacement>,
}

impl SceneCloud {
    fn new(cluster: GrainCluster, placement: Arc<CloudPlacement>) -> Self {
        let mut cloud = Self { cluster, placement };
        cloud.register_placement();
        cloud
    }

    fn register_placement(&mut self) {
        let provider: Weak<CloudPlacement> = Arc::downgrade(&self.placement);
        self.cluster.register_provider(provider);
    }
}

// -------------------------------------------------------------------------------------------------

/// Owns all sound buffers with their landscape placements and all grain clouds, and mixes
/// the clouds into an output buffer.
///
/// The scene's sample rate and channel layout are fixed on creation. All clouds render with
/// this layout; sounds may use any sample rate and channel layout.
pub struct Scene {
    sample_rate: u32,
    channel_count: usize,
    audio_path: String,
    sounds: Vec<Arc<SoundBuffer>>,
    landscape: Arc<SoundLandscape>,
    clouds: Vec<SceneCloud>,
    cluster_ids: ClusterIdAllocator,
    playback_pos: u64,
}

impl Scene {
    /// Create a new, empty scene with the given output layout.
    pub fn new(sample_rate: u32, channel_count: usize) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Scene sample rate must be > 0".to_string(),
            ));
        }
        if channel_count == 0 {
            return Err(Error::ParameterError(
                "Scene needs at least one output channel".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channel_count,
            audio_path: String::new(),
            sounds: Vec::new(),
            landscape: Arc::new(SoundLandscape::default()),
            clouds: Vec::new(),
            cluster_ids: ClusterIdAllocator::new(),
            playback_pos: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Root path of the scene's audio files. Stored and persisted only.
    pub fn audio_path(&self) -> &str {
        &self.audio_path
    }
    pub fn set_audio_path<S: Into<String>>(&mut self, path: S) {
        self.audio_path = path.into();
    }

    /// Number of frames rendered since the scene got created.
    pub fn playback_position(&self) -> u64 {
        self.playback_pos
    }

    // ---------------------------------------------------------------------------------------------

    /// All sounds in scene order.
    pub fn sounds(&self) -> &[Arc<SoundBuffer>] {
        &self.sounds
    }

    /// Index of the first sound with the given name.
    pub fn sound_index(&self, name: &str) -> Option<usize> {
        self.sounds.iter().position(|sound| sound.name() == name)
    }

    /// Sound placements, in sound order.
    pub fn sound_landscape(&self) -> &Arc<SoundLandscape> {
        &self.landscape
    }

    /// Placement of the sound at the given index. Can be modified while the scene plays.
    pub fn sound_rect(&self, index: usize) -> Option<&SoundRect> {
        self.landscape.rect(index)
    }

    /// Add a sound with the given placement and return its index.
    ///
    /// Changing the sound set stops all running grains and replaces all cloud placements,
    /// so previously fetched [`CloudPlacement`]s no longer affect the scene.
    pub fn add_sound(&mut self, sound: Arc<SoundBuffer>, rect: SoundRect) -> usize {
        log::debug!("Adding sound '{}' to scene", sound.name());
        let mut rects = self.landscape.rects().to_vec();
        rects.push(rect);
        self.sounds.push(sound);
        self.replace_landscape(rects);
        for cloud in &mut self.clouds {
            cloud.cluster.update_sound_count(self.sounds.len());
        }
        self.sounds.len() - 1
    }

    /// Remove the sound at the given index. Returns the removed sound, if any.
    ///
    /// Replaces all cloud placements, see [`Self::add_sound`].
    pub fn remove_sound(&mut self, index: usize) -> Option<Arc<SoundBuffer>> {
        if index >= self.sounds.len() {
            return None;
        }
        let sound = self.sounds.remove(index);
        log::debug!("Removed sound '{}' from scene", sound.name());
        let mut rects = self.landscape.rects().to_vec();
        rects.remove(index);
        self.replace_landscape(rects);
        for cloud in &mut self.clouds {
            cloud.cluster.remove_sound(index);
        }
        Some(sound)
    }

    fn replace_landscape(&mut self, rects: Vec<SoundRect>) {
        self.landscape = Arc::new(SoundLandscape::new(rects));
        for cloud in &mut self.clouds {
            cloud.placement = Arc::new(cloud.placement.with_landscape(Arc::clone(&self.landscape)));
            cloud.register_placement();
        }
    }

    // ---------------------------------------------------------------------------------------------

    /// Number of clouds in the scene.
    pub fn cloud_count(&self) -> usize {
        self.clouds.len()
    }

    /// Ids of all clouds, in creation order.
    pub fn cloud_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.clouds.iter().map(|cloud| cloud.cluster.id())
    }

    /// Create a new cloud with default parameters at the given landscape position.
    pub fn add_cloud(&mut self, x: f32, y: f32) -> ClusterId {
        self.add_cloud_with_voices(x, y, GrainCluster::DEFAULT_VOICE_COUNT)
    }

    /// Create a new cloud with the given voice count at the given landscape position.
    pub fn add_cloud_with_voices(&mut self, x: f32, y: f32, voice_count: usize) -> ClusterId {
        let id = self.cluster_ids.next_id();
        let cluster = GrainCluster::new(
            id,
            self.sample_rate,
            self.channel_count,
            self.sounds.len(),
            voice_count,
        );
        let placement = Arc::new(CloudPlacement::new(x, y, Arc::clone(&self.landscape)));
        self.clouds.push(SceneCloud::new(cluster, placement));
        log::debug!("Added grain cloud {id} at ({x}, {y})");
        id
    }

    /// Remove the cloud with the given id.
    pub fn remove_cloud(&mut self, id: ClusterId) -> Result<(), Error> {
        let index = self.cloud_index(id)?;
        self.clouds.remove(index);
        log::debug!("Removed grain cloud {id}");
        Ok(())
    }

    /// Remove all clouds.
    pub fn clear_clouds(&mut self) {
        self.clouds.clear();
    }

    pub fn cloud(&self, id: ClusterId) -> Option<&GrainCluster> {
        self.clouds
            .iter()
            .find(|cloud| cloud.cluster.id() == id)
            .map(|cloud| &cloud.cluster)
    }

    pub fn cloud_mut(&mut self, id: ClusterId) -> Option<&mut GrainCluster> {
        self.clouds
            .iter_mut()
            .find(|cloud| cloud.cluster.id() == id)
            .map(|cloud| &mut cloud.cluster)
    }

    /// Position and extents of a cloud. Can be modified while the scene plays.
    pub fn cloud_placement(&self, id: ClusterId) -> Option<&Arc<CloudPlacement>> {
        self.clouds
            .iter()
            .find(|cloud| cloud.cluster.id() == id)
            .map(|cloud| &cloud.placement)
    }

    /// Create a new handle to control a cloud's cluster from other threads.
    pub fn cloud_handle(&self, id: ClusterId) -> Result<GrainClusterHandle, Error> {
        let index = self.cloud_index(id)?;
        Ok(self.clouds[index].cluster.handle())
    }

    fn cloud_index(&self, id: ClusterId) -> Result<usize, Error> {
        self.clouds
            .iter()
            .position(|cloud| cloud.cluster.id() == id)
            .ok_or(Error::ClusterNotFoundError(id))
    }

    // ---------------------------------------------------------------------------------------------

    /// Render all clouds, adding into the given interleaved `output` buffer.
    ///
    /// The output buffer's length must be a multiple of the scene's channel count. The buffer
    /// is not cleared: clouds get mixed into the existing content.
    pub fn process(&mut self, output: &mut [f32]) {
        debug_assert!(
            output.len() % self.channel_count == 0,
            "Output buffer length must be a multiple of the channel count"
        );
        let time = ProcessTime::new(self.playback_pos, self.sample_rate);
        for cloud in &mut self.clouds {
            cloud.cluster.process(output, &self.sounds, &time);
        }
        self.playback_pos += (output.len() / self.channel_count) as u64;
    }
}

// -------------------------------------------------------------------------------------------------
