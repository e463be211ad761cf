//! An example showcasing how to set up a scene with sounds and grain clouds, and how to
//! render it into a wav file.
//!
//!   cargo run --release --example render-scene -- [OPTIONS] SOUND_FILES...
//!
//! When a scene file is given, sound and cloud placements are loaded from the scene file.
//! Otherwise a default cloud gets placed on top of each sound.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use arg::{parse_args, Args};

use nimbus::{
    Error, GrainDirectionMode, GrainWindowMode, Scene, SoundBuffer, SoundRect, SpatialMode,
    WavFileOutput,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const SAMPLE_RATE: u32 = 44100;
const CHANNEL_COUNT: usize = 2;

const SOUND_RECT_WIDTH: f32 = 400.0;
const SOUND_RECT_HEIGHT: f32 = 100.0;

// -------------------------------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "o", long = "output")]
    /// Write the rendered scene into the given wav file. By default \"render.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "s", long = "scene")]
    /// Load sound and cloud placements from the given scene file.
    scene_path: Option<PathBuf>,
    #[arg(short = "d", long = "duration")]
    /// Rendered duration in seconds. By default 10 seconds.
    duration: Option<u64>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
    /// Wav files to play grains from.
    sound_paths: Vec<PathBuf>,
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse arguments
    let args = parse_args::<Arguments>();

    // Init logger
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");

    // Create a scene and place all sounds below each other on the landscape
    let mut scene = Scene::new(SAMPLE_RATE, CHANNEL_COUNT)?;
    for (index, path) in args.sound_paths.iter().enumerate() {
        let sound = load_sound(path)?;
        log::info!(
            "Loaded sound '{}' with {} frames",
            sound.name(),
            sound.frame_count()
        );
        let y = index as f32 * SOUND_RECT_HEIGHT * 1.2;
        scene.add_sound(
            Arc::new(sound),
            SoundRect::new(true, SOUND_RECT_HEIGHT, SOUND_RECT_WIDTH, 0.0, y),
        );
    }
    if let Some(path) = args.sound_paths.first().and_then(|path| path.parent()) {
        scene.set_audio_path(path.to_string_lossy());
    }

    if let Some(scene_path) = &args.scene_path {
        // Apply placements and clouds from the scene file
        scene.load_from_file(scene_path)?;
    } else {
        // Place a cloud on top of each sound with some varying parameters
        let sound_rects = scene.sound_landscape().rects().to_vec();
        for (index, rect) in sound_rects.iter().enumerate() {
            let x = rect.x() + rect.width() * 0.3;
            let y = rect.y() + rect.height() * 0.5;
            let id = scene.add_cloud(x, y);

            if let Some(cloud) = scene.cloud_mut(id) {
                cloud.set_duration_ms(80.0 + 60.0 * index as f32);
                cloud.set_overlap(0.6);
                cloud.set_pitch(if index % 2 == 0 { 1.0 } else { 0.5 });
                cloud.set_pitch_lfo_frequency(0.2);
                cloud.set_pitch_lfo_amount(0.02);
                cloud.set_direction(GrainDirectionMode::Random);
                cloud.set_window(GrainWindowMode::Random);
                cloud.set_spatial_mode(SpatialMode::Stereo, None);
                cloud.set_volume_db(-6.0);
            }
            if let Some(placement) = scene.cloud_placement(id) {
                placement.set_extents(rect.width() * 0.2, rect.height() * 0.5);
            }
        }
    }

    for id in scene.cloud_ids().collect::<Vec<_>>() {
        if let Some(cloud) = scene.cloud(id) {
            log::info!("Grain cloud {id}:\n{cloud}");
        }
    }

    // Render the scene
    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from("render.wav"));
    let duration = Duration::from_secs(args.duration.unwrap_or(10));

    let mut output = WavFileOutput::create_for_scene(&output_path, &scene)?;
    output.render(&mut scene, duration)?;
    output.finalize()?;

    log::info!(
        "Rendered {} seconds into '{}'",
        duration.as_secs(),
        output_path.display()
    );
    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// Decode a wav file into a sound buffer.
fn load_sound(path: &Path) -> Result<SoundBuffer, Error> {
    let mut reader =
        hound::WavReader::open(path).map_err(|err| Error::SoundBufferError(err.to_string()))?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
        }
    }
    .map_err(|err| Error::SoundBufferError(err.to_string()))?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    SoundBuffer::new(name, spec.channels as usize, spec.sample_rate, samples)
}
