//! Test signal generators shared by the integration suites

use cadenza_core::domain::{AudioBuffer, ProcessSpec};

pub const SAMPLE_RATE: f64 = 48000.0;
pub const BLOCK: usize = 512;

pub fn spec() -> ProcessSpec {
    ProcessSpec::new(SAMPLE_RATE, BLOCK, 2)
}

pub fn sine(frames: usize, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32;
            amplitude * phase.sin()
        })
        .collect()
}

pub fn stereo_sine(frames: usize, freq: f32, amplitude: f32) -> AudioBuffer {
    let signal = sine(frames, freq, amplitude);
    AudioBuffer::from_channels(vec![signal.clone(), signal])
}

pub fn silence(frames: usize) -> AudioBuffer {
    AudioBuffer::new(2, frames)
}
