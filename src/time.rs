//! Scene clock passed down to clusters while processing.

// -------------------------------------------------------------------------------------------------

/// Timing info of the block which is currently processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessTime {
    /// Position of the block's first frame, in sample frames since the scene started playing.
    pub pos_in_frames: u64,
    /// The scene's output sample rate.
    pub sample_rate: u32,
}

impl ProcessTime {
    pub fn new(pos_in_frames: u64, sample_rate: u32) -> Self {
        Self {
            pos_in_frames,
            sample_rate,
        }
    }

    /// Time of the given frame offset within the block in seconds.
    pub fn seconds_at(&self, frame_offset: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.pos_in_frames + frame_offset as u64) as f64 / self.sample_rate as f64
    }
}

// -------------------------------------------------------------------------------------------------
