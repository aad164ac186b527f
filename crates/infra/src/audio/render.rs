//! Offline rendering through a session processor

use cadenza_core::domain::dsp::Result;
use cadenza_core::domain::{AudioBuffer, SessionProcessor, Transport};
use tracing::debug;

/// Block size used by the `render` command
pub const RENDER_BLOCK_SIZE: usize = 512;

/// Run `input` through `processor` in blocks of `block_size` frames
///
/// The processor must already be prepared for at least `block_size`
/// frames and the input's channel count. The transport advances with the
/// rendered position at the processor's current tempo.
pub fn render_offline(
    processor: &mut SessionProcessor,
    input: &AudioBuffer,
    sample_rate: f64,
    block_size: usize,
) -> Result<AudioBuffer> {
    let block_size = block_size.max(1);
    let channels = input.num_channels();
    let total = input.num_samples();
    let mut output = AudioBuffer::new(channels, total);
    output.set_num_samples(total)?;
    let mut block = AudioBuffer::new(channels, block_size);

    let mut start = 0;
    let mut blocks = 0;
    while start < total {
        let len = block_size.min(total - start);
        block.set_num_samples(len)?;
        for ch in 0..channels {
            block
                .channel_mut(ch)
                .copy_from_slice(&input.channel(ch)[start..start + len]);
        }

        let transport = Transport {
            is_playing: true,
            position_seconds: start as f64 / sample_rate,
            bpm: processor.bpm(),
        };
        processor.process_block(&mut block, transport)?;

        for ch in 0..channels {
            output.channel_mut(ch)[start..start + len].copy_from_slice(block.channel(ch));
        }
        start += len;
        blocks += 1;
    }

    debug!("Rendered {} frames in {} blocks", total, blocks);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::domain::{EffectMode, ProcessSpec};

    fn ramp(frames: usize) -> AudioBuffer {
        let samples: Vec<f32> = (0..frames).map(|i| (i as f32 / frames as f32) - 0.5).collect();
        AudioBuffer::from_channels(vec![samples.clone(), samples])
    }

    #[test]
    fn test_bypassed_session_is_identity() {
        let spec = ProcessSpec::new(48000.0, 256, 2);
        let (mut processor, _controller) = SessionProcessor::new(spec);
        processor.prepare(&spec).unwrap();
        processor.set_enhancer_enabled(false);
        for track in 0..processor.chains().num_tracks() {
            processor.chains_mut().set_mode(track, EffectMode::Off);
        }

        // 1000 frames leaves a partial final block
        let input = ramp(1000);
        let output = render_offline(&mut processor, &input, 48000.0, 256).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_mastered_render_keeps_length() {
        let spec = ProcessSpec::new(48000.0, 512, 2);
        let (mut processor, _controller) = SessionProcessor::new(spec);
        processor.prepare(&spec).unwrap();

        let input = ramp(4800);
        let output = render_offline(&mut processor, &input, 48000.0, 512).unwrap();
        assert_eq!(output.num_samples(), input.num_samples());
        assert!(output.peak() <= 1.0);
    }

    #[test]
    fn test_unprepared_session_fails() {
        let spec = ProcessSpec::new(48000.0, 512, 2);
        let (mut processor, _controller) = SessionProcessor::new(spec);
        assert!(render_offline(&mut processor, &ramp(64), 48000.0, 64).is_err());
    }
}
