use crate::hasher::AudioMetadata;

const DEFAULT_BIT_DEPTH: u32 = 16;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Offset guaranteeing any lossless file outranks any lossy file.
const LOSSLESS_OFFSET: f64 = 10_000.0;

/// Deterministic quality score from probed metadata.
///
/// Lossless: `10000 + bit_depth * 100 + sample_rate_hz / 1000`.
/// Lossy: `bitrate / 1000` (kbps).
pub fn quality_score(meta: &AudioMetadata) -> f64 {
    if meta.lossless {
        let bit_depth = meta.bit_depth.unwrap_or(DEFAULT_BIT_DEPTH);
        let sample_rate = meta.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        LOSSLESS_OFFSET + bit_depth as f64 * 100.0 + sample_rate as f64 / 1000.0
    } else {
        meta.bitrate.unwrap_or(0) as f64 / 1000.0
    }
}

/// Human-readable quality string, e.g. `FLAC 44.1kHz 16bit` or
/// `MP3 CBR 320kbps`.
pub fn format_audio_info(meta: &AudioMetadata) -> String {
    let codec = if meta.codec.is_empty() {
        "UNKNOWN".to_string()
    } else {
        meta.codec.to_uppercase()
    };

    if meta.lossless {
        let bit_depth = meta.bit_depth.unwrap_or(DEFAULT_BIT_DEPTH);
        let sample_rate = meta.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        format!("{} {} {}bit", codec, format_khz(sample_rate), bit_depth)
    } else {
        let kbps = meta.bitrate.unwrap_or(0) / 1000;
        format!("{} CBR {}kbps", codec, kbps)
    }
}

fn format_khz(sample_rate_hz: u32) -> String {
    let khz = sample_rate_hz as f64 / 1000.0;
    if khz.fract().abs() < 1e-9 {
        format!("{}kHz", khz as u64)
    } else {
        format!("{:.1}kHz", khz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossless(sample_rate: u32, bit_depth: u32) -> AudioMetadata {
        AudioMetadata {
            codec: "flac".to_string(),
            sample_rate: Some(sample_rate),
            bit_depth: Some(bit_depth),
            lossless: true,
            ..AudioMetadata::default()
        }
    }

    fn lossy(bitrate: u64) -> AudioMetadata {
        AudioMetadata {
            codec: "mp3".to_string(),
            sample_rate: Some(44_100),
            bitrate: Some(bitrate),
            ..AudioMetadata::default()
        }
    }

    #[test]
    fn test_flac_cd_quality() {
        let score = quality_score(&lossless(44_100, 16));
        assert!((score - 11_644.1).abs() < 1e-6);
        assert_eq!(format_audio_info(&lossless(44_100, 16)), "FLAC 44.1kHz 16bit");
    }

    #[test]
    fn test_hires_outranks_cd() {
        assert!(quality_score(&lossless(96_000, 24)) > quality_score(&lossless(44_100, 16)));
    }

    #[test]
    fn test_lossy_scores_in_kbps() {
        assert_eq!(quality_score(&lossy(320_000)), 320.0);
        assert_eq!(quality_score(&lossy(64_000)), 64.0);
        assert_eq!(format_audio_info(&lossy(320_000)), "MP3 CBR 320kbps");
    }

    #[test]
    fn test_any_lossless_beats_any_lossy() {
        // Even an absurd lossy bitrate loses to minimal lossless.
        let floor = AudioMetadata {
            codec: "flac".to_string(),
            lossless: true,
            ..AudioMetadata::default()
        };
        assert!(quality_score(&floor) > quality_score(&lossy(9_999_000)));
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let meta = AudioMetadata {
            codec: "flac".to_string(),
            lossless: true,
            ..AudioMetadata::default()
        };
        // bit depth 16, sample rate 44100 assumed
        assert!((quality_score(&meta) - 11_644.1).abs() < 1e-6);

        let silent = AudioMetadata {
            codec: "mp3".to_string(),
            ..AudioMetadata::default()
        };
        assert_eq!(quality_score(&silent), 0.0);
    }

    #[test]
    fn test_format_khz_integral() {
        assert_eq!(format_khz(48_000), "48kHz");
        assert_eq!(format_khz(44_100), "44.1kHz");
    }
}
