//! Precomputed amplitude envelopes which fade grains in and out.

use std::sync::LazyLock;

use rand::Rng;
use strum::EnumCount;

// -------------------------------------------------------------------------------------------------

/// Grain window (envelope) shape selection.
///
/// Discriminants are the persisted window type indices. [`GrainWindowMode::Random`] is a
/// selection sentinel only: it gets resolved to one of the concrete shapes via
/// [`GrainWindowMode::resolve`] when assigned to a voice.
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
pub enum GrainWindowMode {
    /// Raised cosine.
    #[default]
    Hann = 0,
    /// Linear rise to the peak at 0.5, linear fall.
    Triangle = 1,
    /// Exponential rise with a short release: a reversed [`Self::ExponentialDecay`].
    ReverseExponentialDecay = 2,
    /// Short attack followed by an exponential decay.
    ExponentialDecay = 3,
    /// Squared, Hann tapered sinc with a few side lobes.
    Sinc = 4,
    /// Picks one of the shapes above at random.
    Random = 5,
}

impl GrainWindowMode {
    /// Number of concrete (non random) window shapes.
    pub const SHAPE_COUNT: usize = Self::COUNT - 1;

    /// Select a window mode by index, Indices wrap, negative indices select `Random`.
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

    /// Resolve the random sentinel to a concrete shape. Concrete shapes are returned as is.
    pub fn resolve<R: Rng>(self, rng: &mut R) -> Self {
        if self == Self::Random {
            let index = rng.random_range(0..Self::SHAPE_COUNT) as u8;
            Self::from_repr(index).unwrap_or_default()
        } else {
            self
        }
    }

    /// Evaluate the window at the given normalized phase (0.0..=1.0). Returns a gain in range
    /// 0.0..=1.0. The random sentinel evaluates as a Hann window.
    #[inline]
    pub fn sample(&self, phase: f64) -> f32 {
        GRAIN_WINDOW_LUT.sample(*self, phase)
    }
}

// -------------------------------------------------------------------------------------------------

/// Precomputed grain window lookup tables. `N` must be a pow2 value.
pub(crate) struct GrainWindow<const N: usize> {
    luts: [[f32; N]; GrainWindowMode::SHAPE_COUNT],
}

impl<const N: usize> GrainWindow<N> {
    const _VERIFY_N: () = assert!(
        N.is_power_of_two(),
        "Grain window size must be a pow2 value"
    );

    // Decay constant: reaches ~-60dB at the end of the grain
    const DECAY_RATE: f32 = 6.9;
    // Attack (or release) portion of the exponential decay shapes
    const DECAY_ATTACK: f32 = 0.05;
    // Number of sinc side lobes on each side of the main lobe
    const SINC_LOBES: f32 = 3.0;

    /// Precompute all window LUTs.
    pub fn new() -> Self {
        use std::f32::consts::PI;

        let mut luts = [[0.0; N]; GrainWindowMode::SHAPE_COUNT];

        let exp_decay = |phase: f32| {
            let attack = if phase < Self::DECAY_ATTACK {
                0.5 * (1.0 - (PI * phase / Self::DECAY_ATTACK).cos())
            } else {
                1.0
            };
            attack * (-Self::DECAY_RATE * phase).exp()
        };

        #[allow(clippy::needless_range_loop)]
        for i in 0..N {
            // [0.0, 1.0], including the end point so grains end silent
            let phase = i as f32 / (N - 1) as f32;

            let hann = 0.5 * (1.0 - (2.0 * PI * phase).cos());
            luts[GrainWindowMode::Hann as usize][i] = hann;

            luts[GrainWindowMode::Triangle as usize][i] = if phase < 0.5 {
                2.0 * phase
            } else {
                2.0 * (1.0 - phase)
            };

            luts[GrainWindowMode::ExponentialDecay as usize][i] = exp_decay(phase);
            luts[GrainWindowMode::ReverseExponentialDecay as usize][i] = exp_decay(1.0 - phase);

            let x = (phase - 0.5) * 2.0 * Self::SINC_LOBES * PI;
            let sinc = if x.abs() < 1e-6 { 1.0 } else { x.sin() / x };
            luts[GrainWindowMode::Sinc as usize][i] = sinc * sinc * hann;
        }

        Self { luts }
    }

    /// Evaluate a window at normalized phase [0.0, 1.0] with linear interpolation.
    #[inline]
    pub fn sample(&self, mode: GrainWindowMode, phase: f64) -> f32 {
        let lut = match mode {
            GrainWindowMode::Random => &self.luts[GrainWindowMode::Hann as usize],
            _ => &self.luts[mode as usize],
        };

        let index_float = phase.clamp(0.0, 1.0) * (N - 1) as f64;
        let index = index_float as usize;
        if index >= N - 1 {
            return lut[N - 1];
        }
        let fraction = index_float.fract() as f32;
        lut[index] * (1.0 - fraction) + lut[index + 1] * fraction
    }
}

/// Static, shared lookup table for all window modes.
static GRAIN_WINDOW_LUT: LazyLock<GrainWindow<2048>> = LazyLock::new(GrainWindow::new);

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn index_wrapping() {
        assert_eq!(GrainWindowMode::from_index(0), GrainWindowMode::Hann);
        assert_eq!(GrainWindowMode::from_index(4), GrainWindowMode::Sinc);
        assert_eq!(GrainWindowMode::from_index(5), GrainWindowMode::Random);
        assert_eq!(GrainWindowMode::from_index(6), GrainWindowMode::Hann);
        assert_eq!(GrainWindowMode::from_index(-1), GrainWindowMode::Random);
        assert_eq!(GrainWindowMode::from_index(-2), GrainWindowMode::Random);
        assert_eq!(GrainWindowMode::from_index(-7), GrainWindowMode::Random);
        for mode in [
            GrainWindowMode::Hann,
            GrainWindowMode::Triangle,
            GrainWindowMode::ReverseExponentialDecay,
            GrainWindowMode::ExponentialDecay,
            GrainWindowMode::Sinc,
            GrainWindowMode::Random,
        ] {
            assert_eq!(GrainWindowMode::from_index(mode.index()), mode);
        }
    }

    #[test]
    fn random_resolves_to_concrete_shapes() {
        let mut rng = SmallRng::seed_from_u64(0x2fa3);
        for _ in 0..100 {
            let mode = GrainWindowMode::Random.resolve(&mut rng);
            assert_ne!(mode, GrainWindowMode::Random);
        }
        assert_eq!(
            GrainWindowMode::Triangle.resolve(&mut rng),
            GrainWindowMode::Triangle
        );
    }

    #[test]
    fn shapes_stay_in_unit_range() {
        for index in 0..GrainWindowMode::SHAPE_COUNT as i32 {
            let mode = GrainWindowMode::from_index(index);
            for step in 0..=1000 {
                let gain = mode.sample(step as f64 / 1000.0);
                assert!((0.0..=1.0).contains(&gain), "{mode} out of range: {gain}");
            }
        }
    }

    #[test]
    fn hann_shape() {
        let hann = GrainWindowMode::Hann;
        assert!(hann.sample(0.0).abs() < 1e-6);
        assert!(hann.sample(1.0).abs() < 1e-6);
        assert!((hann.sample(0.5) - 1.0).abs() < 1e-3);
        assert!((hann.sample(0.25) - 0.5).abs() < 1e-2);
        // symmetric
        assert!((hann.sample(0.1) - hann.sample(0.9)).abs() < 1e-3);
    }

    #[test]
    fn decay_shapes_mirror_each_other() {
        let decay = GrainWindowMode::ExponentialDecay;
        let reverse = GrainWindowMode::ReverseExponentialDecay;
        assert!(decay.sample(0.1) > decay.sample(0.5));
        assert!(reverse.sample(0.9) > reverse.sample(0.5));
        assert!((decay.sample(0.3) - reverse.sample(0.7)).abs() < 1e-2);
        assert!(decay.sample(1.0) < 0.002);
    }
}
