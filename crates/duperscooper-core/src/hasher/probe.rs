use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use super::fpcalc::FingerprintError;
use crate::error::Error;

/// Tag keys accepted as the album identifier, matched case-insensitively.
const ALBUM_ID_TAGS: &[&str] = &["MUSICBRAINZ_ALBUMID", "MUSICBRAINZ ALBUM ID"];

/// Codecs that are lossless regardless of reported bitrate.
const LOSSLESS_CODECS: &[&str] = &["flac", "alac", "ape", "wavpack", "tta"];

/// Audio metadata extracted by the external probe. Absent fields stay
/// `None`; consumers must not conflate absence with zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub bitrate: Option<u64>,
    pub channels: Option<u32>,
    pub lossless: bool,
    pub album_id: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub disc_number: Option<u32>,
    pub disc_subtitle: Option<String>,
    pub total_discs: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    bits_per_raw_sample: Option<String>,
    #[serde(default)]
    bits_per_sample: Option<u32>,
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

/// Verify that `ffprobe` is invocable.
pub fn ensure_available() -> Result<(), Error> {
    match Command::new("ffprobe").arg("-version").output() {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ToolMissing {
            tool: "ffprobe",
            hint: "install ffmpeg",
        }),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Probe an audio file with ffprobe and parse codec, rate, depth, bitrate,
/// channels and tags. Per-file failures are non-fatal for callers.
pub fn probe(path: &Path) -> Result<AudioMetadata, FingerprintError> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => FingerprintError::ToolMissing,
            _ => FingerprintError::ToolError(e.to_string()),
        })?;

    if !output.status.success() {
        return Err(FingerprintError::UnsupportedFormat);
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| FingerprintError::ToolError(format!("unparseable probe output: {e}")))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or(FingerprintError::UnsupportedFormat)?;

    let codec = stream.codec_name.clone().unwrap_or_default();
    let lossless = is_lossless_codec(&codec);

    let mut meta = AudioMetadata {
        sample_rate: stream.sample_rate.as_deref().and_then(|s| s.parse().ok()),
        channels: stream.channels,
        bit_depth: stream
            .bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.parse().ok())
            .or(stream.bits_per_sample)
            .filter(|&b| b > 0),
        bitrate: stream
            .bit_rate
            .as_deref()
            .and_then(|s| s.parse().ok())
            .or_else(|| {
                parsed
                    .format
                    .as_ref()
                    .and_then(|f| f.bit_rate.as_deref())
                    .and_then(|s| s.parse().ok())
            }),
        lossless,
        codec,
        ..AudioMetadata::default()
    };

    if let Some(tags) = parsed.format.and_then(|f| f.tags) {
        apply_tags(&mut meta, &tags);
    }

    Ok(meta)
}

fn is_lossless_codec(codec: &str) -> bool {
    LOSSLESS_CODECS.contains(&codec) || codec.starts_with("pcm")
}

fn apply_tags(meta: &mut AudioMetadata, tags: &HashMap<String, String>) {
    for (key, value) in tags {
        let key_upper = key.to_uppercase();
        match key_upper.as_str() {
            "ALBUM" | "ALBUM_TITLE" => meta.album = non_empty(value),
            "ARTIST" | "ALBUM_ARTIST" | "ALBUMARTIST" => meta.artist = non_empty(value),
            "DISCSUBTITLE" => meta.disc_subtitle = non_empty(value),
            // DISC may be "1/2" or just "1"
            "DISC" => {
                meta.disc_number = value
                    .split('/')
                    .next()
                    .and_then(|v| v.trim().parse().ok());
            }
            "TOTALDISCS" => meta.total_discs = value.trim().parse().ok(),
            _ => {
                if ALBUM_ID_TAGS.contains(&key_upper.as_str()) {
                    meta.album_id = non_empty(value);
                }
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_tags_case_insensitive() {
        let mut meta = AudioMetadata::default();
        let mut tags = HashMap::new();
        tags.insert("album".to_string(), "Kind of Blue".to_string());
        tags.insert("Artist".to_string(), "Miles Davis".to_string());
        tags.insert("MusicBrainz_AlbumId".to_string(), "abc-123".to_string());
        tags.insert("disc".to_string(), "1/2".to_string());
        tags.insert("TOTALDISCS".to_string(), "2".to_string());

        apply_tags(&mut meta, &tags);
        assert_eq!(meta.album.as_deref(), Some("Kind of Blue"));
        assert_eq!(meta.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(meta.album_id.as_deref(), Some("abc-123"));
        assert_eq!(meta.disc_number, Some(1));
        assert_eq!(meta.total_discs, Some(2));
    }

    #[test]
    fn test_empty_tags_are_absent() {
        let mut meta = AudioMetadata::default();
        let mut tags = HashMap::new();
        tags.insert("ALBUM".to_string(), "   ".to_string());
        apply_tags(&mut meta, &tags);
        assert_eq!(meta.album, None);
    }

    #[test]
    fn test_lossless_codecs() {
        assert!(is_lossless_codec("flac"));
        assert!(is_lossless_codec("pcm_s16le"));
        assert!(!is_lossless_codec("mp3"));
    }
}
