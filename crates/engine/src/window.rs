//! Sliding-window accumulator
//!
//! Buffers incoming PCM until a hop's worth of new audio is available, then
//! splices the tail of the previous window in front of it. Every
//! `iterations_per_reset` inferences the retained context is compressed down
//! to the configured overlap to stop unbounded growth.

use whisper_adapter_core::audio::samples_from_ms;

use crate::error::EngineError;

/// Window buffer for hop-driven inference.
#[derive(Debug)]
pub struct WindowBuffer {
    audio_new: Vec<f32>,
    audio_old: Vec<f32>,

    step_samples: usize,
    len_samples: usize,
    keep_samples: usize,

    iteration: u32,
    iterations_per_reset: u32,
}

impl WindowBuffer {
    pub fn new(step_ms: u32, length_ms: u32, keep_ms: u32) -> Self {
        let step_samples = samples_from_ms(step_ms).max(1);
        let len_samples = samples_from_ms(length_ms).max(step_samples);
        let keep_samples = samples_from_ms(keep_ms).min(step_samples);

        let iterations_per_reset = if step_ms > 0 {
            ((length_ms / step_ms).saturating_sub(1)).max(1)
        } else {
            1
        };

        Self {
            audio_new: Vec::new(),
            audio_old: Vec::new(),
            step_samples,
            len_samples,
            keep_samples,
            iteration: 0,
            iterations_per_reset,
        }
    }

    /// Append new samples.
    ///
    /// `audio_new` alone is capped at the window length; overflow is an error
    /// with the buffer left intact so the caller may drain and retry.
    pub fn push(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        if self.audio_new.len() + samples.len() > self.len_samples {
            return Err(EngineError::AudioBufferOverflow {
                max_samples: self.len_samples,
            });
        }
        self.audio_new.extend_from_slice(samples);
        Ok(())
    }

    /// Whether a hop's worth of new audio has accumulated.
    pub fn ready(&self) -> bool {
        self.audio_new.len() >= self.step_samples
    }

    pub fn has_pending(&self) -> bool {
        !self.audio_new.is_empty()
    }

    /// Splice old overlap and new samples into the next inference window.
    ///
    /// The window replaces `audio_old` entirely and `audio_new` is drained.
    /// Windows longer than the target length are trimmed from the head.
    pub fn take_window(&mut self) -> Vec<f32> {
        let n_new = self.audio_new.len();
        let take = self
            .audio_old
            .len()
            .min((self.keep_samples + self.len_samples).saturating_sub(n_new));

        let mut window = Vec::with_capacity(take + n_new);
        window.extend_from_slice(&self.audio_old[self.audio_old.len() - take..]);
        window.append(&mut self.audio_new);

        if window.len() > self.len_samples {
            let drop = window.len() - self.len_samples;
            window.drain(..drop);
        }

        self.audio_old = window.clone();
        window
    }

    /// Record a completed inference.
    ///
    /// Returns true on an iteration reset: `audio_old` has been compressed to
    /// the overlap tail and the caller should refresh its prompt context.
    pub fn note_inference(&mut self) -> bool {
        self.iteration = self.iteration.wrapping_add(1);
        if self.iteration % self.iterations_per_reset != 0 {
            return false;
        }

        let keep = self.keep_samples.min(self.audio_old.len());
        self.audio_old = self.audio_old[self.audio_old.len() - keep..].to_vec();
        true
    }

    pub fn reset(&mut self) {
        self.audio_new.clear();
        self.audio_old.clear();
        self.iteration = 0;
    }

    pub fn new_len(&self) -> usize {
        self.audio_new.len()
    }

    pub fn old_len(&self) -> usize {
        self.audio_old.len()
    }
}
