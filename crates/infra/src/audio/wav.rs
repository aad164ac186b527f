//! WAV file I/O
//!
//! Files are read whole into a planar [`AudioBuffer`]. Integer PCM is
//! scaled to [-1, 1); output is always written as 32-bit float.

use cadenza_core::domain::AudioBuffer;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Unsupported WAV format: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, WavError>;

/// Decoded WAV contents
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub buffer: AudioBuffer,
}

impl WavAudio {
    pub fn num_channels(&self) -> usize {
        self.buffer.num_channels()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.num_samples() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file into a planar buffer
pub fn read_wav(path: impl AsRef<Path>) -> Result<WavAudio> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(WavError::Unsupported("zero channels".to_string()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(WavError::Unsupported(format!(
                    "{}-bit integer PCM",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let buffer = AudioBuffer::from_interleaved(&samples, channels);
    info!(
        "Read {}: {} Hz, {} channels, {} frames",
        path.display(),
        spec.sample_rate,
        channels,
        buffer.num_samples()
    );
    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        buffer,
    })
}

/// Write `buffer` as a 32-bit float WAV file
pub fn write_wav(path: impl AsRef<Path>, buffer: &AudioBuffer, sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let channels = buffer.num_channels();
    if channels == 0 || channels > u16::MAX as usize {
        return Err(WavError::Unsupported(format!("{} channels", channels)));
    }

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in 0..buffer.num_samples() {
        for ch in 0..channels {
            writer.write_sample(buffer.channel(ch)[frame])?;
        }
    }
    writer.finalize()?;

    debug!("Wrote {} frames to {}", buffer.num_samples(), path.display());
    Ok(())
}
