//! Live playback of a rendered session through CPAL
//!
//! The output callback owns the [`SessionProcessor`] and the source audio.
//! Each callback pulls frames from the source in blocks no larger than the
//! prepared block size, processes them and interleaves the result into the
//! device buffer. Progress is published through atomics.

use crate::audio::wav::WavAudio;
use cadenza_core::domain::audio::Result;
use cadenza_core::domain::{AudioBuffer, AudioError, Meters, SessionProcessor, Transport};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};

/// Everything the output callback owns
pub struct PlaybackState {
    processor: SessionProcessor,
    source: AudioBuffer,
    block: AudioBuffer,
    block_size: usize,
    sample_rate: f64,
    position: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl PlaybackState {
    /// `processor` must be prepared for `block_size` frames and the
    /// source's channel count
    pub fn new(
        processor: SessionProcessor,
        source: AudioBuffer,
        sample_rate: f64,
        block_size: usize,
    ) -> Self {
        let block_size = block_size.max(1);
        Self {
            processor,
            block: AudioBuffer::new(source.num_channels(), block_size),
            source,
            block_size,
            sample_rate,
            position: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn position(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.position)
    }

    pub fn finished(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    /// Fill one interleaved device buffer; silence once the source ends
    pub fn fill(&mut self, data: &mut [f32]) {
        let channels = self.source.num_channels().max(1);
        let frames = data.len() / channels;
        let total = self.source.num_samples();

        let mut written = 0;
        while written < frames {
            let pos = self.position.load(Ordering::Relaxed);
            if pos >= total {
                data[written * channels..].fill(0.0);
                self.finished.store(true, Ordering::Release);
                return;
            }

            let len = self.block_size.min(frames - written).min(total - pos);
            if self.block.set_num_samples(len).is_err() {
                data[written * channels..].fill(0.0);
                return;
            }
            for ch in 0..self.source.num_channels() {
                self.block
                    .channel_mut(ch)
                    .copy_from_slice(&self.source.channel(ch)[pos..pos + len]);
            }

            let transport = Transport {
                is_playing: true,
                position_seconds: pos as f64 / self.sample_rate,
                bpm: self.processor.bpm(),
            };
            if let Err(e) = self.processor.process_block(&mut self.block, transport) {
                trace!("Playback block passed through: {}", e);
            }

            let out = &mut data[written * channels..(written + len) * channels];
            self.block.write_interleaved(out);
            self.position.store(pos + len, Ordering::Relaxed);
            written += len;
        }
        data[written * channels..].fill(0.0);
    }
}

/// A running output stream
pub struct PlaybackStream {
    _stream: Stream,
    position: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
    meters: Arc<Meters>,
    total_frames: usize,
    sample_rate: u32,
}

impl PlaybackStream {
    /// Open an output stream and start playing `source` through `processor`
    ///
    /// Uses the named output device, or the host default when `device_name`
    /// is `None`. The device is opened at the source's rate and channel
    /// count.
    pub fn start(
        processor: SessionProcessor,
        source: WavAudio,
        block_size: usize,
        device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => {
                #[allow(deprecated)]
                let found = host
                    .output_devices()
                    .map_err(|e| AudioError::OsError(e.to_string()))?
                    .find(|d| d.name().ok().as_deref() == Some(name));
                found.ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?
            }
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?,
        };

        let channels = u16::try_from(source.num_channels()).map_err(|_| {
            AudioError::InvalidConfiguration(format!("{} channels", source.num_channels()))
        })?;
        let cpal_config = CpalStreamConfig {
            channels,
            sample_rate: source.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            "Creating output stream: {} Hz, {} channels",
            source.sample_rate, channels
        );

        let meters = processor.meters();
        let total_frames = source.buffer.num_samples();
        let sample_rate = source.sample_rate;
        let mut state =
            PlaybackState::new(processor, source.buffer, sample_rate as f64, block_size);
        let position = state.position();
        let finished = state.finished();

        let stream = device
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| state.fill(data),
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            position,
            finished,
            meters,
            total_frames,
            sample_rate,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn position_seconds(&self) -> f64 {
        self.position.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }

    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::domain::{EffectMode, ProcessSpec};

    fn bypassed_processor(block: usize) -> SessionProcessor {
        let spec = ProcessSpec::new(48000.0, block, 2);
        let (mut processor, _controller) = SessionProcessor::new(spec);
        processor.prepare(&spec).unwrap();
        processor.set_enhancer_enabled(false);
        for track in 0..processor.chains().num_tracks() {
            processor.chains_mut().set_mode(track, EffectMode::Off);
        }
        processor
    }

    #[test]
    fn test_fill_interleaves_and_finishes() {
        let source = AudioBuffer::from_channels(vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]]);
        let mut state = PlaybackState::new(bypassed_processor(2), source, 48000.0, 2);
        let position = state.position();
        let finished = state.finished();

        let mut data = [1.0f32; 8];
        state.fill(&mut data);
        assert_eq!(data, [0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.0, 0.0]);
        assert_eq!(position.load(Ordering::Relaxed), 3);
        assert!(!finished.load(Ordering::Acquire));

        state.fill(&mut data);
        assert_eq!(data, [0.0; 8]);
        assert!(finished.load(Ordering::Acquire));
    }

    #[test]
    fn test_fill_splits_large_callbacks() {
        let frames = 10;
        let left: Vec<f32> = (0..frames).map(|i| i as f32 * 0.01).collect();
        let source = AudioBuffer::from_channels(vec![left.clone(), left.clone()]);
        let mut state = PlaybackState::new(bypassed_processor(4), source, 48000.0, 4);

        let mut data = vec![0.0f32; frames * 2];
        state.fill(&mut data);
        for (i, &sample) in left.iter().enumerate() {
            assert_eq!(data[i * 2], sample);
            assert_eq!(data[i * 2 + 1], sample);
        }
    }
}
