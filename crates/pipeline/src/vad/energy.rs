use std::time::{Duration, Instant};

use crate::config::VadSettings;

/// Root-mean-square energy of little-endian i16 PCM, normalized to [0, 1].
///
/// A trailing odd byte is ignored. Empty input has zero energy.
pub fn rms_energy(chunk: &[u8]) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for pair in chunk.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64 / 32768.0;
        sum += sample * sample;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}

/// Energy-threshold voice activity detector with a silence hangover.
///
/// Quiet chunks inside an utterance do not end it; only a silence longer
/// than `silence` since the last loud chunk does.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyVad {
    rms_threshold: f64,
    silence: Duration,
    min_speech: Duration,
    speaking: bool,
    last_speech_at: Instant,
}

impl EnergyVad {
    pub fn new(settings: &VadSettings) -> Self {
        Self {
            rms_threshold: settings.rms_threshold,
            silence: Duration::from_millis(settings.silence_ms),
            min_speech: Duration::from_millis(settings.min_speech_ms),
            speaking: false,
            last_speech_at: Instant::now(),
        }
    }

    /// Classifies a chunk and returns whether speech is ongoing.
    ///
    /// The sample rate does not affect energy; it is accepted for parity with
    /// detectors that need it.
    pub fn classify(&mut self, chunk: &[u8], _sample_rate: u32) -> bool {
        self.classify_at(chunk, Instant::now())
    }

    pub fn classify_at(&mut self, chunk: &[u8], now: Instant) -> bool {
        if rms_energy(chunk) > self.rms_threshold {
            self.speaking = true;
            self.last_speech_at = now;
            return true;
        }
        if self.speaking && now.saturating_duration_since(self.last_speech_at) > self.silence {
            self.speaking = false;
        }
        self.speaking
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.speaking = false;
        self.last_speech_at = now;
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Time of the last chunk above the threshold, or of the last reset.
    pub fn last_speech_at(&self) -> Instant {
        self.last_speech_at
    }

    pub fn rms_threshold(&self) -> f64 {
        self.rms_threshold
    }

    pub fn set_rms_threshold(&mut self, threshold: f64) {
        self.rms_threshold = threshold;
    }

    pub fn silence_duration(&self) -> Duration {
        self.silence
    }

    pub fn set_silence_duration(&mut self, silence: Duration) {
        self.silence = silence;
    }

    pub fn min_speech_duration(&self) -> Duration {
        self.min_speech
    }

    pub fn set_min_speech_duration(&mut self, min_speech: Duration) {
        self.min_speech = min_speech;
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(&VadSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VadTransition;

    fn tone(amplitude: i16, samples: usize) -> Vec<u8> {
        (0..samples)
            .flat_map(|i| {
                let s = if i % 2 == 0 { amplitude } else { -amplitude };
                s.to_le_bytes()
            })
            .collect()
    }

    fn loud() -> Vec<u8> {
        tone(16_000, 320)
    }

    fn quiet() -> Vec<u8> {
        tone(200, 320)
    }

    #[test]
    fn rms_of_constant_signal() {
        let rms = rms_energy(&tone(16_384, 100));
        assert!((rms - 0.5).abs() < 1e-9);
        assert_eq!(rms_energy(&[]), 0.0);
        // Odd trailing byte is dropped.
        assert_eq!(rms_energy(&[0x7F]), 0.0);
    }

    #[test]
    fn defaults() {
        let vad = EnergyVad::default();
        assert_eq!(vad.rms_threshold(), 0.08);
        assert_eq!(vad.silence_duration(), Duration::from_millis(1000));
        assert_eq!(vad.min_speech_duration(), Duration::from_millis(300));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn quiet_chunk_inside_utterance_keeps_speaking() {
        let mut vad = EnergyVad::default();
        let t0 = Instant::now();
        assert!(vad.classify_at(&loud(), t0));
        assert!(vad.classify_at(&quiet(), t0 + Duration::from_millis(200)));
        assert!(vad.classify_at(&quiet(), t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn speech_ends_on_first_call_past_silence_window() {
        let mut vad = EnergyVad::default();
        let t0 = Instant::now();
        vad.classify_at(&loud(), t0);
        assert!(vad.classify_at(&quiet(), t0 + Duration::from_millis(999)));
        assert!(!vad.classify_at(&quiet(), t0 + Duration::from_millis(1001)));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn silence_before_speech_is_not_speech() {
        let mut vad = EnergyVad::default();
        let t0 = Instant::now();
        assert!(!vad.classify_at(&quiet(), t0));
        assert!(!vad.classify_at(&quiet(), t0 + Duration::from_secs(5)));
    }

    #[test]
    fn threshold_is_strict() {
        let mut vad = EnergyVad::default();
        vad.set_rms_threshold(0.5);
        assert!(!vad.classify_at(&tone(16_384, 100), Instant::now()));
        vad.set_rms_threshold(0.49);
        assert!(vad.classify_at(&tone(16_384, 100), Instant::now()));
    }

    #[test]
    fn reset_is_idempotent() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(50);

        let mut vad = EnergyVad::default();
        assert!(vad.classify_at(&loud(), t0));
        vad.reset_at(t1);
        let once = vad.clone();
        vad.reset_at(t1);
        assert_eq!(vad, once);

        let mut fresh = EnergyVad::default();
        fresh.reset_at(t1);
        assert_eq!(vad, fresh);
        assert!(!vad.is_speaking());
        assert_eq!(vad.last_speech_at(), t1);

        // Quiet stays silent; the next loud chunk starts a new utterance.
        let t2 = t1 + Duration::from_millis(5);
        assert!(!vad.classify_at(&quiet(), t2));
        let was = vad.is_speaking();
        let is = vad.classify_at(&loud(), t2);
        assert_eq!(VadTransition::from_states(was, is), VadTransition::SpeechStart);
        assert_eq!(vad.last_speech_at(), t2);
    }

    #[test]
    fn live_reconfiguration() {
        let mut vad = EnergyVad::default();
        vad.set_silence_duration(Duration::from_millis(10));
        let t0 = Instant::now();
        vad.classify_at(&loud(), t0);
        assert!(!vad.classify_at(&quiet(), t0 + Duration::from_millis(11)));
    }
}
