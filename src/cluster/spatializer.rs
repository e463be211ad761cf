//! Per grain channel gain distribution.

use strum::EnumCount;

// -------------------------------------------------------------------------------------------------

/// Policy for distributing triggered grains across the output channels.
///
/// Assumes an interleaved channel layout with left channels on even and right channels on
/// odd indices.
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
pub enum SpatialMode {
    /// All channels play every grain.
    #[default]
    Unity = 0,
    /// Grains alternate between the even (left) and odd (right) channels.
    Stereo = 1,
    /// Grains rotate through the channels, bouncing back at the edges.
    Around = 2,
}

impl SpatialMode {
    /// Select a spatial mode by index, Indices wrap, negative indices select `Around`.
    pub fn from_index(index: i32) -> Self {
        if index < 0 {
            return Self::Around;
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

/// Computes the channel gain vector for the next triggered grain.
///
/// Stereo and around rotation counters are independent and persist across mode changes.
#[derive(Debug, Clone)]
pub(crate) struct Spatializer {
    mode: SpatialMode,
    multipliers: Vec<f32>,
    stereo_right: bool,
    around_channel: isize,
    around_side: isize,
}

impl Spatializer {
    /// Gain of an active channel. Slightly below unity to leave some headroom.
    pub const ACTIVE_GAIN: f32 = 0.999;

    const AROUND_STRIDE: isize = 2;
    const AROUND_BOUNCE_OFFSET: isize = 3;

    pub fn new(channel_count: usize) -> Self {
        debug_assert!(channel_count > 0, "Need at least one output channel");
        Self {
            mode: SpatialMode::Unity,
            multipliers: vec![Self::ACTIVE_GAIN; channel_count],
            stereo_right: false,
            around_channel: 1,
            around_side: 1,
        }
    }

    pub fn mode(&self) -> SpatialMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SpatialMode) {
        self.mode = mode;
    }

    /// Compute gains for the next grain and return them.
    pub fn next_multipliers(&mut self) -> &[f32] {
        match self.mode {
            SpatialMode::Unity => {
                self.multipliers.fill(Self::ACTIVE_GAIN);
            }
            SpatialMode::Stereo => {
                let active_parity = if self.stereo_right { 1 } else { 0 };
                for (channel, gain) in self.multipliers.iter_mut().enumerate() {
                    *gain = if channel % 2 == active_parity {
                        Self::ACTIVE_GAIN
                    } else {
                        0.0
                    };
                }
                self.stereo_right = !self.stereo_right;
            }
            SpatialMode::Around => {
                let channel_count = self.multipliers.len() as isize;
                self.multipliers.fill(0.0);
                self.around_channel = self.around_channel.clamp(0, channel_count - 1);
                self.multipliers[self.around_channel as usize] = Self::ACTIVE_GAIN;

                self.around_channel += self.around_side * Self::AROUND_STRIDE;
                if self.around_channel >= channel_count || self.around_channel < 0 {
                    self.around_side = -self.around_side;
                    self.around_channel += self.around_side * Self::AROUND_BOUNCE_OFFSET;
                    self.around_channel = self.around_channel.clamp(0, channel_count - 1);
                }
            }
        }
        &self.multipliers
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn active_channels(multipliers: &[f32]) -> Vec<usize> {
        multipliers
            .iter()
            .enumerate()
            .filter(|(_, gain)| **gain > 0.0)
            .map(|(channel, _)| channel)
            .collect()
    }

    #[test]
    fn mode_index_wrapping() {
        assert_eq!(SpatialMode::from_index(0), SpatialMode::Unity);
        assert_eq!(SpatialMode::from_index(2), SpatialMode::Around);
        assert_eq!(SpatialMode::from_index(4), SpatialMode::Stereo);
        assert_eq!(SpatialMode::from_index(-1), SpatialMode::Around);
        assert_eq!(SpatialMode::from_index(-2), SpatialMode::Around);
        assert_eq!(SpatialMode::from_index(-4), SpatialMode::Around);
        assert_eq!(SpatialMode::Stereo.index(), 1);
    }

    #[test]
    fn unity() {
        let mut spatializer = Spatializer::new(4);
        assert_eq!(spatializer.next_multipliers(), &[Spatializer::ACTIVE_GAIN; 4]);
        assert_eq!(spatializer.next_multipliers(), &[Spatializer::ACTIVE_GAIN; 4]);
    }

    #[test]
    fn stereo_alternation() {
        let mut spatializer = Spatializer::new(4);
        spatializer.set_mode(SpatialMode::Stereo);
        assert_eq!(active_channels(spatializer.next_multipliers()), vec![0, 2]);
        assert_eq!(active_channels(spatializer.next_multipliers()), vec![1, 3]);
        assert_eq!(active_channels(spatializer.next_multipliers()), vec![0, 2]);
        // counters persist across mode changes
        spatializer.set_mode(SpatialMode::Unity);
        spatializer.next_multipliers();
        spatializer.set_mode(SpatialMode::Stereo);
        assert_eq!(active_channels(spatializer.next_multipliers()), vec![1, 3]);
    }

    #[test]
    fn around_rotation() {
        let mut spatializer = Spatializer::new(8);
        spatializer.set_mode(SpatialMode::Around);
        let sequence = (0..12)
            .map(|_| {
                let active = active_channels(spatializer.next_multipliers());
                assert_eq!(active.len(), 1);
                active[0]
            })
            .collect::<Vec<_>>();
        assert_eq!(sequence, vec![1, 3, 5, 7, 6, 4, 2, 0, 1, 3, 5, 7]);
    }

    #[test]
    fn around_rotation_stays_in_range() {
        for channel_count in 1..=9 {
            let mut spatializer = Spatializer::new(channel_count);
            spatializer.set_mode(SpatialMode::Around);
            for _ in 0..64 {
                let active = active_channels(spatializer.next_multipliers());
                assert_eq!(active.len(), 1);
                assert!(active[0] < channel_count);
            }
        }
    }
}
