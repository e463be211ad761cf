//! Line based scene file format.
//!
//! ```text
//! #nimbus-scene 1       optional version marker
//! <audio path>
//! <sound count>
//!   name, orientation (1 = horizontal), height, width, x, y
//!   ---
//! <cloud count>
//!   duration, overlap, pitch, pitch LFO frequency, pitch LFO amount, direction,
//!   window type, spatial mode, spatial channel (-1 = none), volume dB, voice count,
//!   active (1 / 0), x, y, x extent, y extent
//!   ---
//! ```
//!
//! Every value is written on its own line. Sounds are matched by name when loading.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Lines, Write},
    path::Path,
    str::FromStr,
    sync::Arc,
};

use crate::{
    cluster::{GrainCluster, GrainDirectionMode, SpatialMode},
    error::Error,
    parameter::FloatParameter,
    provider::{CloudPlacement, SoundRect},
    window::GrainWindowMode,
};

use super::{Scene, SceneCloud};

// -------------------------------------------------------------------------------------------------

const VERSION_MARKER: &str = "#nimbus-scene";
const VERSION: u32 = 1;
const RECORD_SEPARATOR: &str = "---";

// -------------------------------------------------------------------------------------------------

impl Scene {
    /// Load sound placements and clouds from the given scene file.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let file = File::open(path)?;
        self.load(BufReader::new(file))
    }

    /// Load sound placements and clouds from a reader.
    ///
    /// Sound placements are applied to already loaded sounds with matching names. Unknown
    /// sounds get skipped. All existing clouds are replaced with the loaded ones. Values
    /// which fail to parse fall back to their defaults, but missing or malformed record
    /// counts abort loading.
    pub fn load<R: BufRead>(&mut self, reader: R) -> Result<(), Error> {
        let mut reader = SceneReader::new(reader);

        let mut first_line = reader.next_line()?.unwrap_or_default();
        if let Some(version) = first_line.strip_prefix(VERSION_MARKER) {
            match version.trim().parse::<u32>() {
                Ok(version) if version > VERSION => {
                    log::warn!("Scene file version {version} is newer than {VERSION}");
                }
                Ok(_) => (),
                Err(_) => log::warn!("Invalid scene file version: '{}'", version.trim()),
            }
            first_line = reader.next_line()?.unwrap_or_default();
        }
        self.audio_path = first_line;

        // sounds
        let sound_count = reader.record_count("sound")?;
        let mut matched_sounds = 0;
        for _ in 0..sound_count {
            let Some(name) = reader.next_line()? else {
                break;
            };
            match self.sound_index(&name) {
                Some(index) => {
                    let defaults = SoundRect::default();
                    let horizontal = reader.parse_flag("orientation", defaults.is_horizontal())?;
                    let height = reader.parse_field("height", defaults.height())?;
                    let width = reader.parse_field("width", defaults.width())?;
                    let x = reader.parse_field("x", defaults.x())?;
                    let y = reader.parse_field("y", defaults.y())?;
                    if let Some(rect) = self.landscape.rect(index) {
                        rect.set_horizontal(horizontal);
                        rect.set_size(width, height);
                        rect.set_position(x, y);
                    }
                    matched_sounds += 1;
                }
                None => {
                    log::warn!("Sound '{name}' is not loaded. Skipping its placement...");
                }
            }
            reader.skip_record()?;
        }

        // clouds
        let cloud_count = reader.record_count("cloud")?;
        self.clouds.clear();
        for _ in 0..cloud_count {
            if reader.is_at_end() {
                log::warn!("Scene file ends before all clouds were read");
                break;
            }
            let cloud = self.read_cloud(&mut reader)?;
            self.clouds.push(cloud);
            reader.skip_record()?;
        }

        log::info!(
            "Loaded scene with {matched_sounds} of {sound_count} sounds and {} clouds",
            self.clouds.len()
        );
        Ok(())
    }

    fn read_cloud<R: BufRead>(&mut self, reader: &mut SceneReader<R>) -> Result<SceneCloud, Error> {
        let duration = reader.parse_parameter(&GrainCluster::DURATION)?;
        let overlap = reader.parse_parameter(&GrainCluster::OVERLAP)?;
        let pitch = reader.parse_parameter(&GrainCluster::PITCH)?;
        let lfo_frequency = reader.parse_parameter(&GrainCluster::PITCH_LFO_FREQUENCY)?;
        let lfo_amount = reader.parse_parameter(&GrainCluster::PITCH_LFO_AMOUNT)?;
        let direction =
            reader.parse_field("direction", GrainDirectionMode::default().index())?;
        let window = reader.parse_field("window type", GrainWindowMode::default().index())?;
        let spatial_mode = reader.parse_field("spatial mode", SpatialMode::default().index())?;
        let spatial_channel = reader.parse_field("spatial channel", -1_i64)?;
        let volume_db = reader.parse_parameter(&GrainCluster::VOLUME)?;
        let mut voice_count =
            reader.parse_field("voice count", GrainCluster::DEFAULT_VOICE_COUNT)?;
        if voice_count > GrainCluster::MAX_VOICE_COUNT {
            log::warn!(
                "Voice count {voice_count} at line {} exceeds the maximum of {} voices",
                reader.line_number,
                GrainCluster::MAX_VOICE_COUNT
            );
            voice_count = GrainCluster::MAX_VOICE_COUNT;
        }
        let active = reader.parse_flag("active", true)?;
        let x = reader.parse_field("x", 0.0_f32)?;
        let y = reader.parse_field("y", 0.0_f32)?;
        let x_extent = reader.parse_field("x extent", CloudPlacement::DEFAULT_EXTENT)?;
        let y_extent = reader.parse_field("y extent", CloudPlacement::DEFAULT_EXTENT)?;

        let mut cluster = GrainCluster::new(
            self.cluster_ids.next_id(),
            self.sample_rate,
            self.channel_count,
            self.sounds.len(),
            voice_count,
        );
        cluster.set_duration_ms(duration);
        cluster.set_overlap(overlap);
        cluster.set_pitch(pitch);
        cluster.set_pitch_lfo_frequency(lfo_frequency);
        cluster.set_pitch_lfo_amount(lfo_amount);
        cluster.set_direction(GrainDirectionMode::from_index(direction));
        cluster.set_window(GrainWindowMode::from_index(window));
        cluster.set_spatial_mode(
            SpatialMode::from_index(spatial_mode),
            usize::try_from(spatial_channel).ok(),
        );
        cluster.set_volume_db(volume_db);
        cluster.set_active(active);

        let placement = CloudPlacement::new(x, y, Arc::clone(&self.landscape));
        placement.set_extents(x_extent, y_extent);

        Ok(SceneCloud::new(cluster, Arc::new(placement)))
    }

    /// Save sound placements and clouds to the given scene file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Save sound placements and clouds to a writer.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writeln!(writer, "{VERSION_MARKER} {VERSION}")?;
        writeln!(writer, "{}", self.audio_path)?;

        writeln!(writer, "{}", self.sounds.len())?;
        for (sound, rect) in self.sounds.iter().zip(self.landscape.rects()) {
            writeln!(writer, "{}", sound.name())?;
            writeln!(writer, "{}", rect.is_horizontal() as u8)?;
            writeln!(writer, "{}", rect.height())?;
            writeln!(writer, "{}", rect.width())?;
            writeln!(writer, "{}", rect.x())?;
            writeln!(writer, "{}", rect.y())?;
            writeln!(writer, "{RECORD_SEPARATOR}")?;
        }

        writeln!(writer, "{}", self.clouds.len())?;
        for SceneCloud { cluster, placement } in &self.clouds {
            let spatial_channel = cluster
                .spatial_channel()
                .map_or(-1, |channel| channel as i64);
            writeln!(writer, "{}", cluster.duration_ms())?;
            writeln!(writer, "{}", cluster.overlap())?;
            writeln!(writer, "{}", cluster.pitch())?;
            writeln!(writer, "{}", cluster.pitch_lfo_frequency())?;
            writeln!(writer, "{}", cluster.pitch_lfo_amount())?;
            writeln!(writer, "{}", cluster.direction().index())?;
            writeln!(writer, "{}", cluster.window().index())?;
            writeln!(writer, "{}", cluster.spatial_mode().index())?;
            writeln!(writer, "{}", spatial_channel)?;
            writeln!(writer, "{}", cluster.volume_db())?;
            writeln!(writer, "{}", cluster.voice_count())?;
            writeln!(writer, "{}", cluster.is_active() as u8)?;
            writeln!(writer, "{}", placement.x())?;
            writeln!(writer, "{}", placement.y())?;
            writeln!(writer, "{}", placement.x_extent())?;
            writeln!(writer, "{}", placement.y_extent())?;
            writeln!(writer, "{RECORD_SEPARATOR}")?;
        }

        log::info!(
            "Saved scene with {} sounds and {} clouds",
            self.sounds.len(),
            self.clouds.len()
        );
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Line reader which keeps track of line numbers for error reports.
struct SceneReader<R: BufRead> {
    lines: std::iter::Peekable<Lines<R>>,
    line_number: usize,
}

impl<R: BufRead> SceneReader<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines().peekable(),
            line_number: 0,
        }
    }

    fn is_at_end(&mut self) -> bool {
        self.lines.peek().is_none()
    }

    /// Read the next line without its line ending. `None` at the end of the file.
    fn next_line(&mut self) -> Result<Option<String>, Error> {
        match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                Ok(Some(line?.trim_end_matches('\r').to_string()))
            }
            None => Ok(None),
        }
    }

    /// Read a mandatory record count.
    fn record_count(&mut self, record_name: &str) -> Result<usize, Error> {
        let line = self.next_line()?;
        let line_number = self.line_number;
        match line {
            Some(line) => line.trim().parse().map_err(|_| Error::SceneFormatError {
                line: line_number,
                message: format!("invalid {record_name} count '{line}'"),
            }),
            None => Err(Error::SceneFormatError {
                line: line_number + 1,
                message: format!("missing {record_name} count"),
            }),
        }
    }

    /// Read a value, falling back to the given default when it's missing or malformed.
    fn parse_field<T: FromStr>(&mut self, field_name: &str, default: T) -> Result<T, Error> {
        match self.next_line()? {
            Some(line) => match line.trim().parse() {
                Ok(value) => Ok(value),
                Err(_) => {
                    log::warn!(
                        "Invalid {field_name} value '{line}' at line {}. Using default value...",
                        self.line_number
                    );
                    Ok(default)
                }
            },
            None => {
                log::warn!("Missing {field_name} value. Using default value...");
                Ok(default)
            }
        }
    }

    /// Read a cluster parameter value, clamping it into the parameter's range.
    fn parse_parameter(&mut self, parameter: &FloatParameter) -> Result<f32, Error> {
        let value = self.parse_field(parameter.name(), parameter.default_value())?;
        if !parameter.range().contains(&value) {
            log::warn!(
                "{} ('{}') value {value} at line {} is out of range. Clamping...",
                parameter.name(),
                parameter.id(),
                self.line_number
            );
            return Ok(parameter.clamp_value(value));
        }
        Ok(value)
    }

    /// Read a `1` / `0` flag, falling back to the given default when missing or malformed.
    fn parse_flag(&mut self, field_name: &str, default: bool) -> Result<bool, Error> {
        let value = self.parse_field(field_name, default as i32)?;
        Ok(value != 0)
    }

    /// Skip all lines up to and including the next record separator.
    fn skip_record(&mut self) -> Result<(), Error> {
        while let Some(line) = self.next_line()? {
            if line.trim() == RECORD_SEPARATOR {
                return Ok(());
            }
            log::warn!(
                "Skipping unexpected line '{line}' at line {}",
                self.line_number
            );
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
