/// 16-bit little-endian PCM where every sample has the given amplitude.
///
/// A square wave at amplitude `a` has RMS `a / 32768`.
pub fn pcm_chunk(amplitude: i16, samples: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples * 2);
    for i in 0..samples {
        let value = if i % 2 == 0 { amplitude } else { amplitude.saturating_neg() };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// 20 ms of 16 kHz speech-level audio (RMS ~0.3).
pub fn loud() -> Vec<u8> {
    pcm_chunk(10_000, 320)
}

/// 20 ms of 16 kHz silence.
pub fn silent() -> Vec<u8> {
    pcm_chunk(0, 320)
}
