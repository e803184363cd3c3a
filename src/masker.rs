//! Noise masker (C5) — replaces speech with envelope-modulated white noise,
//! plus the legacy beep / cross-fade fallbacks the original prototype used
//! before the envelope-follower masker was added.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SAMPLE_RATE: f32 = 16_000.0;
pub const BEEP_FREQ_HZ: f32 = 440.0;
const BEEP_AMPLITUDE: f32 = 0.4;
const MIN_TIME_CONSTANT_MS: f32 = 1.0;
const I16_SCALE: f32 = 32767.0;

/// Stateful envelope-follower-modulated white noise injector.
pub struct NoiseMasker {
    current_envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    make_up_gain: f32,
    rng: StdRng,
}

impl NoiseMasker {
    /// Builds a masker with the default 10 ms attack / 50 ms release (spec
    /// defaults), seeded from a non-deterministic source.
    pub fn new() -> Self {
        let mut masker = Self {
            current_envelope: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            make_up_gain: 1.0,
            rng: StdRng::from_entropy(),
        };
        masker.set_envelope_params(10.0, 50.0);
        masker
    }

    /// Reconfigures the envelope follower's attack/release times, clamped to
    /// at least 1 ms.
    pub fn set_envelope_params(&mut self, attack_ms: f32, release_ms: f32) {
        let attack_ms = attack_ms.max(MIN_TIME_CONSTANT_MS);
        let release_ms = release_ms.max(MIN_TIME_CONSTANT_MS);
        self.attack_coeff = time_constant_coeff(attack_ms);
        self.release_coeff = time_constant_coeff(release_ms);
    }

    pub fn set_make_up_gain(&mut self, gain: f32) {
        self.make_up_gain = gain;
    }

    pub fn attack_coeff(&self) -> f32 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }

    pub fn envelope(&self) -> f32 {
        self.current_envelope
    }

    /// Rewrites `buffer` in place: tracks the amplitude envelope of the
    /// existing signal and replaces it with white noise scaled to follow
    /// that envelope, producing a perceptually continuous "shush" rather
    /// than a hard discontinuity.
    pub fn process(&mut self, buffer: &mut [i16]) {
        for sample in buffer.iter_mut() {
            let x = *sample as f32 / I16_SCALE;
            let abs = x.abs();

            let coeff = if abs > self.current_envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.current_envelope += coeff * (abs - self.current_envelope);

            let noise: f32 = self.rng.gen_range(-1.0..=1.0);
            let y = (noise * self.current_envelope * self.make_up_gain).clamp(-1.0, 1.0);
            *sample = (y * I16_SCALE).round() as i16;
        }
    }
}

impl Default for NoiseMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// First-order IIR smoothing coefficient: `a = 1 - exp(-1000 / (time_ms * fs))`.
fn time_constant_coeff(time_ms: f32) -> f32 {
    1.0 - (-1000.0 / (time_ms * SAMPLE_RATE)).exp()
}

/// Generates one sample of a `BEEP_FREQ_HZ` sine at `frame_index`, with an
/// optional phase offset in radians.
pub fn generate_sine_sample(frame_index: usize, phase_rad: f32) -> f32 {
    let t = frame_index as f32 / SAMPLE_RATE;
    BEEP_AMPLITUDE * (2.0 * std::f32::consts::PI * BEEP_FREQ_HZ * t + phase_rad).sin()
}

/// Overwrites `buffer` with a `BEEP_FREQ_HZ` sine tone. Used when a hard
/// tone is desired, or the envelope masker is unavailable.
pub fn apply_beep(buffer: &mut [i16]) {
    for (i, sample) in buffer.iter_mut().enumerate() {
        let s = generate_sine_sample(i, 0.0);
        *sample = (s * I16_SCALE).clamp(-32768.0, 32767.0) as i16;
    }
}

/// Linear cross-fade from the existing signal to the beep over the first
/// `cross_fade_frames` samples, then beep-only. Degrades to pure beep if
/// `cross_fade_frames` is 0 or exceeds `buffer.len()`.
pub fn apply_cross_fade(buffer: &mut [i16], cross_fade_frames: usize) {
    if cross_fade_frames == 0 || buffer.len() < cross_fade_frames {
        apply_beep(buffer);
        return;
    }
    for (i, sample) in buffer.iter_mut().enumerate() {
        let alpha = if i < cross_fade_frames {
            i as f32 / cross_fade_frames as f32
        } else {
            1.0
        };
        let original = (*sample as f32 / I16_SCALE) * (1.0 - alpha);
        let beep = generate_sine_sample(i, 0.0) * alpha;
        let mixed = original + beep;
        *sample = (mixed * I16_SCALE).clamp(-32768.0, 32767.0) as i16;
    }
}

/// Combines a cross-fade over the leading `cross_fade_frames` region with a
/// beep tail, enabling "time-machine" overwrites of already-emitted ring
/// buffer audio.
pub fn process_with_ring_buffer(buffer: &mut [i16], cross_fade_frames: usize) {
    let frames = buffer.len();
    if cross_fade_frames > 0 && cross_fade_frames <= frames {
        apply_cross_fade(&mut buffer[..cross_fade_frames], cross_fade_frames);
        if frames > cross_fade_frames {
            apply_beep(&mut buffer[cross_fade_frames..]);
        }
    } else if frames > 0 {
        apply_beep(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_preserves_buffer_length_and_never_clips() {
        let mut masker = NoiseMasker::new();
        let mut buffer: Vec<i16> = (0..1600)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                ((2.0 * std::f32::consts::PI * 200.0 * t).sin() * 32000.0) as i16
            })
            .collect();
        let len_before = buffer.len();
        masker.process(&mut buffer);
        assert_eq!(buffer.len(), len_before);
        for &s in &buffer {
            assert!((s as i32).unsigned_abs() <= 32767);
        }
    }

    #[test]
    fn envelope_params_are_clamped_to_at_least_one_ms() {
        let mut masker = NoiseMasker::new();
        masker.set_envelope_params(0.0, -5.0);
        // a 1ms coefficient at 16kHz is large but strictly < 1.
        assert!(masker.attack_coeff() > 0.0 && masker.attack_coeff() <= 1.0);
        assert!(masker.release_coeff() > 0.0 && masker.release_coeff() <= 1.0);
    }

    #[test]
    fn envelope_rises_during_attack_on_full_scale_input() {
        let mut masker = NoiseMasker::new();
        let ten_ms_frames = (SAMPLE_RATE * 0.010) as usize;
        let mut buffer: Vec<i16> = (0..ten_ms_frames)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                ((2.0 * std::f32::consts::PI * 200.0 * t).sin() * 32767.0) as i16
            })
            .collect();
        masker.process(&mut buffer);
        // Envelope should have risen meaningfully toward the input peak (1.0).
        assert!(masker.envelope() > 0.3);
    }

    #[test]
    fn envelope_decays_toward_zero_once_input_is_silenced() {
        let mut masker = NoiseMasker::new();
        let mut loud: Vec<i16> = vec![32000; 1600];
        masker.process(&mut loud);
        let envelope_after_loud = masker.envelope();
        assert!(envelope_after_loud > 0.5);

        let mut silence: Vec<i16> = vec![0; 1600];
        masker.process(&mut silence);
        assert!(masker.envelope() < envelope_after_loud);
    }

    #[test]
    fn apply_beep_produces_bounded_tone() {
        let mut buffer = vec![12345i16; 400];
        apply_beep(&mut buffer);
        for &s in &buffer {
            assert!((s as i32).unsigned_abs() <= 32767);
        }
    }

    #[test]
    fn cross_fade_degrades_to_beep_when_frames_exceed_buffer() {
        let mut with_xfade = vec![100i16; 40];
        let mut beep_only = with_xfade.clone();
        apply_cross_fade(&mut with_xfade, 1000);
        apply_beep(&mut beep_only);
        assert_eq!(with_xfade, beep_only);
    }

    #[test]
    fn cross_fade_zero_frames_degrades_to_beep() {
        let mut with_xfade = vec![100i16; 40];
        let mut beep_only = with_xfade.clone();
        apply_cross_fade(&mut with_xfade, 0);
        apply_beep(&mut beep_only);
        assert_eq!(with_xfade, beep_only);
    }

    #[test]
    fn process_with_ring_buffer_crossfades_then_beeps_tail() {
        let mut buffer = vec![500i16; 200];
        process_with_ring_buffer(&mut buffer, 80);

        let mut expected_head = vec![500i16; 80];
        apply_cross_fade(&mut expected_head, 80);
        assert_eq!(&buffer[..80], expected_head.as_slice());

        let mut expected_tail = vec![500i16; 120];
        apply_beep(&mut expected_tail);
        assert_eq!(&buffer[80..], expected_tail.as_slice());
    }
}
