//! Grain start position queries.
//!
//! Clusters never pick grain positions themselves: they ask a [`PositionProvider`] for
//! candidate start positions in every loaded sound each time a voice gets triggered.
//! [`CloudPlacement`] is the default, geometric provider: grain clouds and sounds are placed
//! on a 2D landscape and grains play from the sounds they land in.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{rngs::SmallRng, Rng};

use crate::utils::AtomicF32;

// -------------------------------------------------------------------------------------------------

/// Provides grain start positions for a triggered voice.
///
/// Called from the audio thread, so implementations must not block. `positions` and `volumes`
/// contain one entry per loaded sound buffer and arrive preset to `-1.0` (no valid position)
/// and `0.0`. Implementations set a start position in range `0.0..1.0` (relative to the
/// sound's length) and a playback volume for every sound the grain should play from.
///
/// `rng` is the calling cluster's random generator. Use it for any randomization instead of
/// thread local generators, which allocate on first use in a new thread.
pub trait PositionProvider: Send + Sync {
    fn trigger_positions(
        &self,
        voice_index: usize,
        duration_ms: f32,
        positions: &mut [f64],
        volumes: &mut [f64],
        rng: &mut SmallRng,
    );
}

// -------------------------------------------------------------------------------------------------

/// Placement of a sound buffer on the landscape.
///
/// A horizontally oriented rect maps the sound's timeline to its x axis, a vertical one to
/// its y axis. All fields can be updated from any thread while audio is running.
#[derive(Debug)]
pub struct SoundRect {
    horizontal: AtomicBool,
    height: AtomicF32,
    width: AtomicF32,
    x: AtomicF32,
    y: AtomicF32,
}

impl Default for SoundRect {
    fn default() -> Self {
        Self::new(true, 1.0, 1.0, 0.0, 0.0)
    }
}

impl Clone for SoundRect {
    fn clone(&self) -> Self {
        Self::new(
            self.is_horizontal(),
            self.height(),
            self.width(),
            self.x(),
            self.y(),
        )
    }
}

impl SoundRect {
    pub fn new(horizontal: bool, height: f32, width: f32, x: f32, y: f32) -> Self {
        Self {
            horizontal: AtomicBool::new(horizontal),
            height: AtomicF32::new(height),
            width: AtomicF32::new(width),
            x: AtomicF32::new(x),
            y: AtomicF32::new(y),
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.horizontal.load(Ordering::Relaxed)
    }
    pub fn set_horizontal(&self, horizontal: bool) {
        self.horizontal.store(horizontal, Ordering::Relaxed);
    }

    pub fn height(&self) -> f32 {
        self.height.load()
    }
    pub fn width(&self) -> f32 {
        self.width.load()
    }
    pub fn set_size(&self, width: f32, height: f32) {
        self.width.store(width);
        self.height.store(height);
    }

    pub fn x(&self) -> f32 {
        self.x.load()
    }
    pub fn y(&self) -> f32 {
        self.y.load()
    }
    pub fn set_position(&self, x: f32, y: f32) {
        self.x.store(x);
        self.y.store(y);
    }

    /// Normalized start position of a grain at the given point, or `None` when outside.
    pub fn normalized_position(&self, x: f32, y: f32) -> Option<f64> {
        let (left, bottom) = (self.x(), self.y());
        let (width, height) = (self.width(), self.height());
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        if x < left || x > left + width || y < bottom || y > bottom + height {
            return None;
        }
        let position = if self.is_horizontal() {
            (x - left) / width
        } else {
            (y - bottom) / height
        };
        Some((position as f64).clamp(0.0, Self::MAX_POSITION))
    }

    // Largest position below 1.0 which still is a valid start position
    const MAX_POSITION: f64 = 1.0 - f64::EPSILON;
}

// -------------------------------------------------------------------------------------------------

/// Sound rects of all loaded sounds, in sound set order.
#[derive(Debug, Default)]
pub struct SoundLandscape {
    rects: Vec<SoundRect>,
}

impl SoundLandscape {
    pub fn new(rects: Vec<SoundRect>) -> Self {
        Self { rects }
    }

    pub fn rects(&self) -> &[SoundRect] {
        &self.rects
    }

    pub fn rect(&self, index: usize) -> Option<&SoundRect> {
        self.rects.get(index)
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

// -------------------------------------------------------------------------------------------------

/// Location of a grain cloud on a [`SoundLandscape`].
///
/// Each trigger places the grain at the cloud's center, randomly displaced within the cloud's
/// x and y extents, and plays it from every sound rect containing the grain.
#[derive(Debug)]
pub struct CloudPlacement {
    x: AtomicF32,
    y: AtomicF32,
    x_extent: AtomicF32,
    y_extent: AtomicF32,
    landscape: Arc<SoundLandscape>,
}

impl CloudPlacement {
    /// Default random displacement extents.
    pub const DEFAULT_EXTENT: f32 = 3.0;

    pub fn new(x: f32, y: f32, landscape: Arc<SoundLandscape>) -> Self {
        Self {
            x: AtomicF32::new(x),
            y: AtomicF32::new(y),
            x_extent: AtomicF32::new(Self::DEFAULT_EXTENT),
            y_extent: AtomicF32::new(Self::DEFAULT_EXTENT),
            landscape,
        }
    }

    /// Create a copy of this placement which places grains on a different landscape.
    pub fn with_landscape(&self, landscape: Arc<SoundLandscape>) -> Self {
        let placement = Self::new(self.x(), self.y(), landscape);
        placement.set_extents(self.x_extent(), self.y_extent());
        placement
    }

    pub fn landscape(&self) -> &Arc<SoundLandscape> {
        &self.landscape
    }

    pub fn x(&self) -> f32 {
        self.x.load()
    }
    pub fn y(&self) -> f32 {
        self.y.load()
    }
    pub fn set_position(&self, x: f32, y: f32) {
        self.x.store(x);
        self.y.store(y);
    }

    pub fn x_extent(&self) -> f32 {
        self.x_extent.load()
    }
    pub fn y_extent(&self) -> f32 {
        self.y_extent.load()
    }
    /// Set random displacement extents. Negative extents are treated as 0.
    pub fn set_extents(&self, x_extent: f32, y_extent: f32) {
        self.x_extent.store(x_extent.max(0.0));
        self.y_extent.store(y_extent.max(0.0));
    }

    /// Fill positions and volumes for a grain placed at the given point.
    pub fn positions_at(&self, x: f32, y: f32, positions: &mut [f64], volumes: &mut [f64]) {
        for ((rect, position), volume) in self
            .landscape
            .rects()
            .iter()
            .zip(positions.iter_mut())
            .zip(volumes.iter_mut())
        {
            if let Some(normalized) = rect.normalized_position(x, y) {
                *position = normalized;
                *volume = 1.0;
            }
        }
    }
}

impl PositionProvider for CloudPlacement {
    fn trigger_positions(
        &self,
        _voice_index: usize,
        _duration_ms: f32,
        positions: &mut [f64],
        volumes: &mut [f64],
        rng: &mut SmallRng,
    ) {
        let x = self.x() + self.x_extent() * (rng.random::<f32>() - 0.5);
        let y = self.y() + self.y_extent() * (rng.random::<f32>() - 0.5);
        self.positions_at(x, y, positions, volumes);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn rect_positions() {
        let rect = SoundRect::new(true, 10.0, 100.0, 50.0, 20.0);
        assert_eq!(rect.normalized_position(40.0, 25.0), None);
        assert_eq!(rect.normalized_position(75.0, 35.0), None);
        assert_eq!(rect.normalized_position(100.0, 25.0), Some(0.5));
        assert_eq!(rect.normalized_position(50.0, 25.0), Some(0.0));
        let end = rect.normalized_position(150.0, 25.0).unwrap();
        assert!(end < 1.0 && end > 0.999);

        rect.set_horizontal(false);
        assert_eq!(rect.normalized_position(100.0, 22.5), Some(0.25));

        rect.set_size(0.0, 10.0);
        assert_eq!(rect.normalized_position(50.0, 25.0), None);
    }

    #[test]
    fn placement_positions() {
        let landscape = Arc::new(SoundLandscape::new(vec![
            SoundRect::new(true, 10.0, 100.0, 0.0, 0.0),
            SoundRect::new(true, 10.0, 100.0, 0.0, 100.0),
            SoundRect::new(false, 100.0, 10.0, 20.0, 0.0),
        ]));
        let placement = CloudPlacement::new(25.0, 5.0, landscape.clone());
        placement.set_extents(0.0, 0.0);

        let mut rng = SmallRng::seed_from_u64(1);
        let mut positions = [-1.0; 3];
        let mut volumes = [0.0; 3];
        placement.trigger_positions(0, 100.0, &mut positions, &mut volumes, &mut rng);
        assert_eq!(positions[0], 0.25);
        assert_eq!(positions[1], -1.0);
        assert!((positions[2] - 0.05).abs() < 1e-6);
        assert_eq!(volumes, [1.0, 0.0, 1.0]);

        let copy = placement.with_landscape(Arc::new(SoundLandscape::default()));
        assert_eq!((copy.x(), copy.y()), (25.0, 5.0));
        assert_eq!((copy.x_extent(), copy.y_extent()), (0.0, 0.0));
        let mut positions = [-1.0; 3];
        let mut volumes = [0.0; 3];
        copy.trigger_positions(0, 100.0, &mut positions, &mut volumes, &mut rng);
        assert_eq!(positions, [-1.0; 3]);
    }

    #[test]
    fn random_extents_stay_in_cloud() {
        let landscape = Arc::new(SoundLandscape::new(vec![SoundRect::new(
            true, 100.0, 100.0, 0.0, 0.0,
        )]));
        let placement = CloudPlacement::new(50.0, 50.0, landscape);
        placement.set_extents(20.0, 20.0);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..100 {
            let mut positions = [-1.0];
            let mut volumes = [0.0];
            placement.trigger_positions(0, 100.0, &mut positions, &mut volumes, &mut rng);
            assert!((0.4..=0.6).contains(&positions[0]), "{}", positions[0]);
        }
    }
}
