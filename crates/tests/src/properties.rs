//! Property tests over arbitrary stereo blocks

use crate::signals::{spec, BLOCK};
use cadenza_core::domain::dsp::{Band, DelayLine, Effect, MultibandCompressor, StereoImager};
use cadenza_core::domain::AudioBuffer;
use proptest::prelude::*;

fn stereo_block() -> impl Strategy<Value = AudioBuffer> {
    (1..=BLOCK).prop_flat_map(|len| {
        (
            prop::collection::vec(-1.0f32..1.0, len),
            prop::collection::vec(-1.0f32..1.0, len),
        )
            .prop_map(|(left, right)| AudioBuffer::from_channels(vec![left, right]))
    })
}

proptest! {
    #[test]
    fn test_band_split_sums_to_input(input in stereo_block()) {
        let mut multiband = MultibandCompressor::default();
        multiband.prepare(&spec());
        multiband.split_bands(&input).unwrap();

        let low = multiband.band(Band::Low);
        let mid = multiband.band(Band::Mid);
        let high = multiband.band(Band::High);
        for ch in 0..2 {
            for i in 0..input.num_samples() {
                let sum = low.channel(ch)[i] + mid.channel(ch)[i] + high.channel(ch)[i];
                prop_assert!((sum - input.channel(ch)[i]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_unity_width_is_identity(input in stereo_block()) {
        let mut imager = StereoImager::default();
        imager.prepare(&spec());
        imager.set_width(1.0);

        let mut output = input.clone();
        imager.process(&mut output).unwrap();
        prop_assert_eq!(output, input);
    }

    #[test]
    fn test_pre_delay_moves_impulse(delay in 1usize..2000) {
        let mut line = DelayLine::new();
        line.prepare(1, 2000);
        line.set_delay(delay);

        let mut signal = vec![0.0f32; delay + 8];
        signal[0] = 1.0;
        line.process_channel(0, &mut signal);

        prop_assert!(signal[..delay].iter().all(|&s| s == 0.0));
        prop_assert_eq!(signal[delay], 1.0);
        prop_assert!(signal[delay + 1..].iter().all(|&s| s == 0.0));
    }
}
