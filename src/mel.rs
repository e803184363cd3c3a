//! PCM → log-Mel spectrogram (C2).
//!
//! Standard speech-recognition framing: pre-emphasis, a 25 ms Hann window
//! hopped every 10 ms, a zero-padded 512-point DFT, and an 80-bin Mel
//! filterbank. The contract is magnitude accuracy, not algorithmic family —
//! this crate uses `rustfft` rather than the naive O(N^2) DFT the original
//! prototype used, since any correct FFT is permitted.

use once_cell::sync::Lazy;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub const MEL_BINS: usize = 80;
pub const MAX_FRAMES: usize = 50;
pub const SAMPLE_RATE: usize = 16_000;
pub const FRAME_LEN: usize = 400; // 25 ms
pub const FRAME_HOP: usize = 160; // 10 ms
pub const FFT_SIZE: usize = 512;

const PRE_EMPHASIS_COEFF: f32 = 0.97;
const LOG_FLOOR: f32 = 1e-9;

/// Precomputed Hann window and Mel filterbank, built lazily and cheaply
/// (allocation happens once; the caller of [`compute_mel_frames`] owns no
/// state across calls so the engine can hold it behind a plain function).
struct MelContext {
    window: Vec<f32>,
    filterbank: Vec<(usize, usize)>, // per mel bin: (start_bin, end_bin) block-average range
    fft: Arc<dyn Fft<f32>>,
}

fn build_context() -> MelContext {
    let mut window = vec![0.0f32; FRAME_LEN];
    for (i, w) in window.iter_mut().enumerate() {
        *w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (FRAME_LEN as f32 - 1.0)).cos());
    }

    let spec_bins = FFT_SIZE / 2 + 1;
    let mut filterbank = Vec::with_capacity(MEL_BINS);
    for m in 0..MEL_BINS {
        let start = m * spec_bins / MEL_BINS;
        let end = ((m + 1) * spec_bins / MEL_BINS).max(start + 1).min(spec_bins);
        filterbank.push((start, end));
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    MelContext {
        window,
        filterbank,
        fft,
    }
}

static MEL_CONTEXT: Lazy<MelContext> = Lazy::new(build_context);

/// Converts PCM frames into a row-major `[frames_written, MEL_BINS]` log-Mel
/// tensor. Returns the number of hop-aligned frames written, which is
/// `<= max_out_frames` and `<= MAX_FRAMES`. Returns 0 on null/empty/too-short
/// input rather than erroring — recoverable per the engine's error model.
pub fn compute_mel_frames(audio: &[i16], out: &mut [f32], max_out_frames: usize) -> usize {
    if audio.is_empty() || max_out_frames == 0 || out.is_empty() {
        return 0;
    }
    let max_frames = max_out_frames.min(MAX_FRAMES);
    if out.len() < max_frames * MEL_BINS {
        return 0;
    }

    let ctx = &*MEL_CONTEXT;

    let mut frame_buf = vec![Complex32::new(0.0, 0.0); FFT_SIZE];
    let mut magnitude = vec![0.0f32; FFT_SIZE / 2 + 1];

    let mut pos = 0usize;
    let mut frames_written = 0usize;

    while frames_written < max_frames && pos + FRAME_LEN <= audio.len() {
        // Pre-emphasis + windowing.
        let mut prev = if pos == 0 { 0.0 } else { audio[pos - 1] as f32 };
        for i in 0..FRAME_LEN {
            let curr = audio[pos + i] as f32;
            let emphasised = curr - PRE_EMPHASIS_COEFF * prev;
            prev = curr;
            frame_buf[i] = Complex32::new(emphasised * ctx.window[i], 0.0);
        }
        for slot in frame_buf.iter_mut().skip(FRAME_LEN) {
            *slot = Complex32::new(0.0, 0.0);
        }

        ctx.fft.process(&mut frame_buf);
        for (k, m) in magnitude.iter_mut().enumerate() {
            *m = frame_buf[k].norm();
        }

        for (m, &(start, end)) in ctx.filterbank.iter().enumerate() {
            let mut energy = 0.0f32;
            let mut count = 0usize;
            for k in start..end {
                energy += magnitude[k];
                count += 1;
            }
            if count > 0 {
                energy /= count as f32;
            }
            let row = frames_written * MEL_BINS + m;
            out[row] = energy.max(LOG_FLOOR).ln();
        }

        pos += FRAME_HOP;
        frames_written += 1;
    }

    frames_written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_zero_frames() {
        let mut out = vec![0.0f32; MAX_FRAMES * MEL_BINS];
        assert_eq!(compute_mel_frames(&[], &mut out, MAX_FRAMES), 0);
    }

    #[test]
    fn input_shorter_than_frame_len_produces_zero_frames() {
        let audio = vec![0i16; FRAME_LEN - 1];
        let mut out = vec![0.0f32; MAX_FRAMES * MEL_BINS];
        assert_eq!(compute_mel_frames(&audio, &mut out, MAX_FRAMES), 0);
    }

    #[test]
    fn exact_one_frame_worth_of_audio_yields_one_frame() {
        let audio = vec![100i16; FRAME_LEN];
        let mut out = vec![0.0f32; MAX_FRAMES * MEL_BINS];
        assert_eq!(compute_mel_frames(&audio, &mut out, MAX_FRAMES), 1);
    }

    #[test]
    fn partial_trailing_frame_is_discarded_not_zero_padded() {
        let audio = vec![50i16; FRAME_LEN + FRAME_HOP + 10]; // one full hop short of a 2nd frame
        let mut out = vec![0.0f32; MAX_FRAMES * MEL_BINS];
        assert_eq!(compute_mel_frames(&audio, &mut out, MAX_FRAMES), 1);
    }

    #[test]
    fn output_is_bounded_below_by_log_of_epsilon() {
        let audio = vec![0i16; FRAME_LEN * 2];
        let mut out = vec![0.0f32; MAX_FRAMES * MEL_BINS];
        let n = compute_mel_frames(&audio, &mut out, MAX_FRAMES);
        assert!(n >= 1);
        for &v in &out[..n * MEL_BINS] {
            assert!(v >= LOG_FLOOR.ln() - 1e-3);
        }
    }

    #[test]
    fn louder_input_never_produces_lower_energy_than_silence() {
        let silence = vec![0i16; FRAME_LEN];
        let loud = vec![20000i16; FRAME_LEN];

        let mut out_silence = vec![0.0f32; MEL_BINS];
        let mut out_loud = vec![0.0f32; MEL_BINS];
        compute_mel_frames(&silence, &mut out_silence, 1);
        compute_mel_frames(&loud, &mut out_loud, 1);

        let sum_silence: f32 = out_silence.iter().sum();
        let sum_loud: f32 = out_loud.iter().sum();
        assert!(sum_loud >= sum_silence);
    }

    #[test]
    fn caps_at_max_out_frames() {
        let audio = vec![10i16; FRAME_LEN + FRAME_HOP * 20];
        let mut out = vec![0.0f32; 3 * MEL_BINS];
        let n = compute_mel_frames(&audio, &mut out, 3);
        assert_eq!(n, 3);
    }
}
