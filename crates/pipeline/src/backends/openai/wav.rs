use std::io::Cursor;

use crate::error::BackendError;

/// Formats sent to recognizers as raw 16-bit little-endian mono PCM.
pub fn is_raw_pcm(format: &str) -> bool {
    matches!(
        format.to_ascii_lowercase().as_str(),
        "pcm" | "pcm16" | "pcm_s16le" | "s16le" | "raw" | ""
    )
}

/// Wraps raw PCM in a WAV container so upload APIs can decode it.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, BackendError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

/// Upload file name and MIME type for an audio format tag.
pub fn upload_name(format: &str) -> (String, &'static str) {
    let ext = format.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" | "mpeg" | "mpga" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/webm",
    };
    let ext = if mime == "audio/webm" && ext != "webm" {
        "webm".to_string()
    } else {
        ext
    };
    (format!("audio.{ext}"), mime)
}

fn wav_error(err: hound::Error) -> BackendError {
    BackendError::Other(format!("failed to encode WAV: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_pcm_in_wav() {
        let pcm: Vec<u8> = [100i16, -100, 2000, -2000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .chain([0x01]) // odd trailing byte
            .collect();
        let wav = pcm_to_wav(&pcm, 16_000).unwrap();
        assert_eq!(&wav[..4], b"RIFF");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 2000, -2000]);
    }

    #[test]
    fn raw_formats() {
        assert!(is_raw_pcm("pcm"));
        assert!(is_raw_pcm("PCM16"));
        assert!(!is_raw_pcm("webm"));
    }

    #[test]
    fn upload_names() {
        assert_eq!(upload_name("wav"), ("audio.wav".to_string(), "audio/wav"));
        assert_eq!(upload_name("webm"), ("audio.webm".to_string(), "audio/webm"));
        assert_eq!(upload_name("weird"), ("audio.webm".to_string(), "audio/webm"));
    }
}
