//! 5.1 channel layout and fold-down for smaller outputs

/// Channels in the processed bus
pub const SURROUND_CHANNELS: usize = 6;

pub const FRONT_LEFT: usize = 0;
pub const FRONT_RIGHT: usize = 1;
pub const CENTER: usize = 2;
pub const LFE: usize = 3;
pub const SURROUND_LEFT: usize = 4;
pub const SURROUND_RIGHT: usize = 5;

/// -3 dB mix coefficient for centre and surround fold-down
const FOLD_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Map interleaved 5.1 frames onto a device with `out_channels` channels.
///
/// Six or more channels copy straight through (extra channels are silenced).
/// Fewer fold down to stereo with centre and surrounds at -3 dB and LFE
/// dropped; mono averages that stereo pair.
pub fn fold_down(input: &[f32], output: &mut [f32], out_channels: usize) {
    if out_channels == 0 {
        return;
    }
    for (src, dst) in input
        .chunks_exact(SURROUND_CHANNELS)
        .zip(output.chunks_exact_mut(out_channels))
    {
        if out_channels >= SURROUND_CHANNELS {
            dst[..SURROUND_CHANNELS].copy_from_slice(src);
            dst[SURROUND_CHANNELS..].fill(0.0);
            continue;
        }

        let left = src[FRONT_LEFT] + FOLD_GAIN * (src[CENTER] + src[SURROUND_LEFT]);
        let right = src[FRONT_RIGHT] + FOLD_GAIN * (src[CENTER] + src[SURROUND_RIGHT]);
        if out_channels == 1 {
            dst[0] = (left + right) * 0.5;
        } else {
            dst[0] = left;
            dst[1] = right;
            dst[2..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_for_six_channels() {
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut output = [0.0; 8];
        fold_down(&input, &mut output, 8);
        assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_stereo_fold_down() {
        let input = [1.0, 0.0, 1.0, 10.0, 1.0, 0.0];
        let mut output = [0.0; 2];
        fold_down(&input, &mut output, 2);
        assert!((output[0] - (1.0 + 2.0 * FOLD_GAIN)).abs() < 1e-6);
        assert!((output[1] - FOLD_GAIN).abs() < 1e-6);
    }

    #[test]
    fn test_mono_fold_down() {
        let input = [1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let mut output = [0.0; 1];
        fold_down(&input, &mut output, 1);
        assert_eq!(output[0], 1.0);
    }
}
