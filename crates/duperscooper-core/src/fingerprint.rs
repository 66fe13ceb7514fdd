use serde::{Deserialize, Serialize};

/// A raw Chromaprint fingerprint: an ordered sequence of unsigned 32-bit
/// integers. Two fingerprints are comparable over their common prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<u32>);

impl Fingerprint {
    pub fn new(values: Vec<u32>) -> Self {
        Fingerprint(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a comma-separated integer list, as emitted by `fpcalc -raw`
    /// after the `FINGERPRINT=` key.
    pub fn parse(text: &str) -> Option<Fingerprint> {
        let values: Vec<u32> = text
            .split(',')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .ok()?;
        if values.is_empty() {
            return None;
        }
        Some(Fingerprint(values))
    }

    /// Encode for cache storage: length-prefixed comma-separated list,
    /// e.g. `"3:17,42,9"`.
    pub fn to_cache_string(&self) -> String {
        let body: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        format!("{}:{}", self.0.len(), body.join(","))
    }

    /// Decode the cache representation. Rejects entries whose declared
    /// length disagrees with the value list.
    pub fn from_cache_string(text: &str) -> Option<Fingerprint> {
        let (len_part, body) = text.split_once(':')?;
        let declared: usize = len_part.trim().parse().ok()?;
        let fp = Fingerprint::parse(body)?;
        if fp.len() != declared {
            return None;
        }
        Some(fp)
    }
}

/// Hamming similarity between two fingerprints as a percentage over the
/// common prefix (`min` of the two lengths). Returns `None` when the common
/// prefix is empty, in which case the pair is not comparable.
pub fn similarity(a: &Fingerprint, b: &Fingerprint) -> Option<f64> {
    let common = a.len().min(b.len());
    if common == 0 {
        return None;
    }

    let mut differing_bits: u64 = 0;
    for i in 0..common {
        differing_bits += (a.0[i] ^ b.0[i]).count_ones() as u64;
    }
    let total_bits = common as u64 * 32;

    Some(100.0 * (1.0 - differing_bits as f64 / total_bits as f64))
}
