//! Voice-activity gate
//!
//! In VAD mode the engine defers inference until the rolling PCM tail ends in
//! silence. Silence is an amplitude-ratio test: the mean absolute amplitude
//! of the most recent second must drop to a fraction of the whole rolling
//! window's, after a first-order high-pass removes low-frequency rumble.

use whisper_adapter_core::audio::{samples_from_ms, SAMPLE_RATE_HZ};

/// Rolling window the silence test evaluates, in milliseconds.
pub const VAD_WINDOW_MS: u32 = 2000;

/// Recent span compared against the whole window, in milliseconds.
pub const VAD_LAST_MS: u32 = 1000;

/// First-order high-pass filter, in place.
pub fn high_pass_filter(data: &mut [f32], cutoff_hz: f32, sample_rate_hz: f32) {
    if data.is_empty() {
        return;
    }

    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate_hz;
    let alpha = dt / (rc + dt);

    let mut y = data[0];
    for i in 1..data.len() {
        y = alpha * (y + data[i] - data[i - 1]);
        data[i] = y;
    }
}

/// Whether the last `last_ms` of `pcm` is silence relative to the whole
/// buffer. The high-pass is skipped when `freq_threshold <= 0`.
pub fn detect_trailing_silence(
    pcm: &[f32],
    last_ms: u32,
    vad_threshold: f32,
    freq_threshold: f32,
) -> bool {
    let n_samples = pcm.len();
    let n_last = samples_from_ms(last_ms);

    if n_samples == 0 || n_last == 0 || n_last >= n_samples {
        return false;
    }

    // The test mutates a copy; callers keep the raw samples.
    let mut data = pcm.to_vec();
    if freq_threshold > 0.0 {
        high_pass_filter(&mut data, freq_threshold, SAMPLE_RATE_HZ as f32);
    }

    let mut energy_all = 0.0f32;
    let mut energy_last = 0.0f32;
    for (i, sample) in data.iter().enumerate() {
        energy_all += sample.abs();
        if i >= n_samples - n_last {
            energy_last += sample.abs();
        }
    }

    energy_all /= n_samples as f32;
    energy_last /= n_last as f32;

    energy_last <= vad_threshold * energy_all
}

/// Rolling PCM tail with a silence-driven firing rule.
#[derive(Debug)]
pub struct VadGate {
    tail: Vec<f32>,
    window_samples: usize,
    len_samples: usize,
    vad_threshold: f32,
    freq_threshold: f32,
}

impl VadGate {
    pub fn new(length_ms: u32, vad_threshold: f32, freq_threshold: f32) -> Self {
        Self {
            tail: Vec::new(),
            window_samples: samples_from_ms(VAD_WINDOW_MS),
            len_samples: samples_from_ms(length_ms).max(1),
            vad_threshold,
            freq_threshold,
        }
    }

    /// Append samples, trimming the tail to `length + 2s`.
    pub fn push(&mut self, samples: &[f32]) {
        self.tail.extend_from_slice(samples);
        let max_keep = self.len_samples + self.window_samples;
        if self.tail.len() > max_keep {
            let drop = self.tail.len() - max_keep;
            self.tail.drain(..drop);
        }
    }

    /// Whether trailing silence has been detected over the rolling window.
    ///
    /// Never fires while the tail is shorter than the evaluation window.
    pub fn should_fire(&self) -> bool {
        if self.window_samples == 0 || self.tail.len() < self.window_samples {
            return false;
        }
        let chunk = &self.tail[self.tail.len() - self.window_samples..];
        detect_trailing_silence(chunk, VAD_LAST_MS, self.vad_threshold, self.freq_threshold)
    }

    /// Hand the tail (capped to the window length) over as one inference
    /// window and clear the rolling state.
    pub fn take_window(&mut self) -> Vec<f32> {
        let take = self.len_samples.min(self.tail.len());
        let window = self.tail[self.tail.len() - take..].to_vec();
        self.tail.clear();
        window
    }

    pub fn has_pending(&self) -> bool {
        !self.tail.is_empty()
    }

    pub fn reset(&mut self) {
        self.tail.clear();
    }

    #[cfg(test)]
    pub(crate) fn tail_len(&self) -> usize {
        self.tail.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(ms: u32, amplitude: f32) -> Vec<f32> {
        (0..samples_from_ms(ms))
            .map(|i| amplitude * (i as f32 * 0.3).sin())
            .collect()
    }

    #[test]
    fn silence_tail_is_detected() {
        let mut pcm = tone(1500, 0.5);
        pcm.extend(std::iter::repeat(0.0f32).take(samples_from_ms(1100)));
        assert!(detect_trailing_silence(&pcm, VAD_LAST_MS, 0.6, 100.0));
    }

    #[test]
    fn loud_tail_is_not_silence() {
        let pcm = tone(2600, 0.5);
        assert!(!detect_trailing_silence(&pcm, VAD_LAST_MS, 0.6, 100.0));
    }

    #[test]
    fn short_buffer_never_fires() {
        let pcm = tone(500, 0.0);
        assert!(!detect_trailing_silence(&pcm, VAD_LAST_MS, 0.6, 100.0));
    }

    #[test]
    fn high_pass_is_skipped_for_non_positive_cutoff() {
        let mut pcm = tone(1500, 0.5);
        pcm.extend(std::iter::repeat(0.0f32).take(samples_from_ms(1100)));
        assert!(detect_trailing_silence(&pcm, VAD_LAST_MS, 0.6, 0.0));
    }

    #[test]
    fn detection_leaves_input_untouched() {
        let mut pcm = tone(1500, 0.5);
        pcm.extend(std::iter::repeat(0.0f32).take(samples_from_ms(1100)));
        let before = pcm.clone();
        let _ = detect_trailing_silence(&pcm, VAD_LAST_MS, 0.6, 100.0);
        assert_eq!(pcm, before);
    }

    #[test]
    fn gate_fires_after_silence_and_clears() {
        let mut gate = VadGate::new(10_000, 0.6, 100.0);
        gate.push(&tone(1500, 0.5));
        assert!(!gate.should_fire());

        gate.push(&vec![0.0f32; samples_from_ms(1100)]);
        assert!(gate.should_fire());

        let window = gate.take_window();
        assert!(!window.is_empty());
        assert!(!gate.has_pending());
        assert!(!gate.should_fire());
    }

    #[test]
    fn gate_tail_is_bounded() {
        let mut gate = VadGate::new(1000, 0.6, 100.0);
        for _ in 0..10 {
            gate.push(&tone(1000, 0.5));
        }
        assert!(gate.tail_len() <= samples_from_ms(1000) + samples_from_ms(VAD_WINDOW_MS));
    }

    #[test]
    fn gate_window_is_capped_to_length() {
        let mut gate = VadGate::new(1000, 0.6, 100.0);
        gate.push(&tone(2500, 0.5));
        let window = gate.take_window();
        assert_eq!(window.len(), samples_from_ms(1000));
    }
}
