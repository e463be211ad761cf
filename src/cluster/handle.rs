use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::{
    cluster::{ClusterId, GrainClusterMessage, GrainDirectionMode, SpatialMode},
    error::Error,
    window::GrainWindowMode,
};

// -------------------------------------------------------------------------------------------------

/// A handle to control a [`GrainCluster`](super::GrainCluster) from any thread.
///
/// Changes are queued and applied by the cluster at the start of its next process call.
#[derive(Debug, Clone)]
pub struct GrainClusterHandle {
    cluster_id: ClusterId,
    message_queue: Arc<ArrayQueue<GrainClusterMessage>>,
}

impl GrainClusterHandle {
    pub(crate) fn new(
        cluster_id: ClusterId,
        message_queue: Arc<ArrayQueue<GrainClusterMessage>>,
    ) -> Self {
        Self {
            cluster_id,
            message_queue,
        }
    }

    /// Get the id of the controlled cluster.
    pub fn id(&self) -> ClusterId {
        self.cluster_id
    }

    pub fn set_duration_ms(&self, duration_ms: f32) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetDuration(duration_ms), "set_duration_ms")
    }

    pub fn set_overlap(&self, overlap: f32) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetOverlap(overlap), "set_overlap")
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetPitch(pitch), "set_pitch")
    }

    pub fn set_pitch_lfo_frequency(&self, frequency: f32) -> Result<(), Error> {
        self.send(
            GrainClusterMessage::SetPitchLfoFrequency(frequency),
            "set_pitch_lfo_frequency",
        )
    }

    pub fn set_pitch_lfo_amount(&self, amount: f32) -> Result<(), Error> {
        self.send(
            GrainClusterMessage::SetPitchLfoAmount(amount),
            "set_pitch_lfo_amount",
        )
    }

    pub fn set_direction(&self, direction: GrainDirectionMode) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetDirection(direction), "set_direction")
    }

    pub fn set_window(&self, window: GrainWindowMode) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetWindow(window), "set_window")
    }

    pub fn set_spatial_mode(&self, mode: SpatialMode, channel: Option<usize>) -> Result<(), Error> {
        self.send(
            GrainClusterMessage::SetSpatialMode(mode, channel),
            "set_spatial_mode",
        )
    }

    pub fn set_volume_db(&self, volume_db: f32) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetVolumeDb(volume_db), "set_volume_db")
    }

    pub fn set_active(&self, active: bool) -> Result<(), Error> {
        self.send(GrainClusterMessage::SetActive(active), "set_active")
    }

    pub fn toggle_active(&self) -> Result<(), Error> {
        self.send(GrainClusterMessage::ToggleActive, "toggle_active")
    }

    /// Request a new voice. Voices get added one per processed block.
    pub fn add_voice(&self) -> Result<(), Error> {
        self.send(GrainClusterMessage::AddVoice, "add_voice")
    }

    /// Request removal of the most recently added voice.
    pub fn remove_voice(&self) -> Result<(), Error> {
        self.send(GrainClusterMessage::RemoveVoice, "remove_voice")
    }

    fn send(&self, message: GrainClusterMessage, event_name: &str) -> Result<(), Error> {
        if self.message_queue.push(message).is_err() {
            return Err(self.message_queue_error(event_name));
        }
        Ok(())
    }

    fn message_queue_error(&self, event_name: &str) -> Error {
        log::warn!(
            "Grain cluster {} message queue is full. Failed to send a {event_name} event.",
            self.cluster_id
        );
        Error::SendError("Grain cluster queue is full".to_string())
    }
}

// -------------------------------------------------------------------------------------------------
