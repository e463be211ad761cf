use std::{fs::File, io::BufWriter, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{error::Error, scene::Scene, utils::assert_no_alloc};

// -------------------------------------------------------------------------------------------------

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Renders a [`Scene`] offline into a wav file instead of playing it back.
///
/// Scenes are rendered in fixed size blocks, just like a real time audio device would do.
/// Wav file contents are always saved as 32bit floats.
pub struct WavFileOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    written_frames: u64,
}

impl WavFileOutput {
    /// Create a new wav file output with the given sample rate and channel layout.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: Wav file's sample rate. Must match the rendered scene's rate.
    /// * `channel_count`: Wav file's channel layout. Must match the rendered scene's layout.
    pub fn create<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
    ) -> Result<Self, Error> {
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(file_path, spec)
            .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;

        Ok(Self {
            writer: Some(writer),
            channel_count,
            sample_rate,
            buffer: vec![0.0; BUFFER_SIZE_FRAMES * channel_count],
            written_frames: 0,
        })
    }

    /// Create a new wav file output which matches the given scene's output layout.
    pub fn create_for_scene<P: AsRef<Path>>(file_path: P, scene: &Scene) -> Result<Self, Error> {
        Self::create(file_path, scene.sample_rate(), scene.channel_count())
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames written so far.
    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }

    /// Render the given scene for the given duration and append it to the file.
    pub fn render(&mut self, scene: &mut Scene, duration: Duration) -> Result<(), Error> {
        if scene.sample_rate() != self.sample_rate || scene.channel_count() != self.channel_count
        {
            return Err(Error::ParameterError(format!(
                "Scene layout ({} Hz, {} channels) does not match the wav file layout ({} Hz, {} channels)",
                scene.sample_rate(),
                scene.channel_count(),
                self.sample_rate,
                self.channel_count
            )));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::OutputDeviceError(
                "Wav file output is already finalized".into(),
            ));
        };

        let total_frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as u64;
        let mut remaining_frames = total_frames;
        while remaining_frames > 0 {
            let block_frames = (remaining_frames as usize).min(BUFFER_SIZE_FRAMES);
            let block = &mut self.buffer[..block_frames * self.channel_count];
            block.fill(0.0);
            assert_no_alloc(|| scene.process(block));

            for sample in block.iter() {
                writer
                    .write_sample(*sample)
                    .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
            }
            remaining_frames -= block_frames as u64;
            self.written_frames += block_frames as u64;
        }
        Ok(())
    }

    /// Finish writing and update the wav file's header.
    pub fn finalize(mut self) -> Result<(), Error> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
        }
        Ok(())
    }
}

impl Drop for WavFileOutput {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                log::error!("Failed to finalize wav file: {err}");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    use crate::{provider::SoundRect, sound::SoundBuffer};

    #[test]
    fn render_scene() {
        let mut scene = Scene::new(8000, 2).unwrap();
        let samples = (0..8000).map(|i| (i as f32 * 0.05).sin()).collect();
        let sound = SoundBuffer::new("sine", 1, 8000, samples).unwrap();
        scene.add_sound(Arc::new(sound), SoundRect::new(true, 10.0, 100.0, 0.0, 0.0));
        let id = scene.add_cloud(50.0, 5.0);
        scene.cloud_mut(id).unwrap().set_duration_ms(50.0);

        let path = std::env::temp_dir().join(format!("nimbus-render-{}.wav", std::process::id()));
        let mut output = WavFileOutput::create_for_scene(&path, &scene).unwrap();
        output.render(&mut scene, Duration::from_millis(500)).unwrap();
        assert_eq!(output.written_frames(), 4000);
        output.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.len(), 8000);
        let samples = reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(samples.iter().any(|s| *s != 0.0));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn layout_mismatch() {
        let mut scene = Scene::new(8000, 1).unwrap();
        let path = std::env::temp_dir().join(format!("nimbus-mismatch-{}.wav", std::process::id()));
        let mut output = WavFileOutput::create(&path, 8000, 2).unwrap();
        assert!(output.render(&mut scene, Duration::from_millis(10)).is_err());
        output.finalize().unwrap();
        std::fs::remove_file(&path).unwrap();
    }
}
