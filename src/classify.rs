//! Heuristic verdicts on decrypted samples.
//!
//! A wrong key turns AES-CBC output into uniform noise, while a right key
//! usually exposes a known file signature or low-entropy structure. The
//! checks here look for either. They are a heuristic, not a proof: a lucky
//! wrong key can pass and an unusual payload can fail.

use std::fmt;

/// Verdict on a decrypted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Recognizable structure: the key is very likely right.
    ValidStructure,
    /// Looks like noise.
    InvalidKey,
    /// Partial structure. Reserved; the default heuristics never produce it.
    CorruptOutput,
}

impl Classification {
    pub fn describe(self) -> &'static str {
        match self {
            Self::ValidStructure => "decrypted data has a recognizable structure",
            Self::InvalidKey => "decrypted data has no recognizable structure (likely a wrong key)",
            Self::CorruptOutput => "decrypted data shows traces of structure but is damaged",
        }
    }

    pub fn is_valid(self) -> bool {
        self == Self::ValidStructure
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Leading bytes of common payload formats.
pub const KNOWN_SIGNATURES: &[(&[u8], &str)] = &[
    (b"Rar!", "RAR"),
    (b"PK\x03\x04", "ZIP"),
    (b"%PDF", "PDF"),
    (b"\x89PNG", "PNG"),
    (b"\xFF\xD8\xFF", "JPEG"),
    (b"7z\xBC\xAF\x27\x1C", "7Z"),
    (b"\x1F\x8B", "GZIP"),
];

/// Share of zero bytes above which a sample counts as structured.
pub const DEFAULT_ZERO_RATIO: f64 = 0.3;

/// Samples shorter than this never pass on zero ratio alone.
const MIN_ZERO_SAMPLE: usize = 3;

/// Signature and zero-ratio checks over a decrypted sample.
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    signatures: Vec<(&'static [u8], &'static str)>,
    zero_ratio: f64,
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self {
            signatures: KNOWN_SIGNATURES.to_vec(),
            zero_ratio: DEFAULT_ZERO_RATIO,
        }
    }
}

impl ResultClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the zero-ratio threshold.
    pub fn with_zero_ratio(mut self, ratio: f64) -> Self {
        self.zero_ratio = ratio;
        self
    }

    /// Add a signature to the table.
    pub fn with_signature(mut self, magic: &'static [u8], name: &'static str) -> Self {
        self.signatures.push((magic, name));
        self
    }

    /// Name of the signature `data` starts with, if any.
    pub fn detect_signature(&self, data: &[u8]) -> Option<&'static str> {
        self.signatures
            .iter()
            .find(|(magic, _)| data.starts_with(magic))
            .map(|&(_, name)| name)
    }

    pub fn classify(&self, data: &[u8]) -> Classification {
        if data.is_empty() {
            return Classification::InvalidKey;
        }
        if self.detect_signature(data).is_some() || self.mostly_zero(data) {
            return Classification::ValidStructure;
        }
        Classification::InvalidKey
    }

    fn mostly_zero(&self, data: &[u8]) -> bool {
        if data.len() < MIN_ZERO_SAMPLE {
            return false;
        }
        let zeros = data.iter().filter(|&&b| b == 0).count();
        zeros as f64 / data.len() as f64 > self.zero_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_invalid() {
        assert_eq!(ResultClassifier::new().classify(&[]), Classification::InvalidKey);
    }

    #[test]
    fn test_signatures() {
        let classifier = ResultClassifier::new();
        let cases: [(&[u8], &str); 7] = [
            (b"Rar!\x1a\x07\x01\x00", "RAR"),
            (b"PK\x03\x04rest", "ZIP"),
            (b"%PDF-1.7", "PDF"),
            (b"\x89PNG\r\n\x1a\n", "PNG"),
            (b"\xFF\xD8\xFF\xE0", "JPEG"),
            (b"7z\xBC\xAF\x27\x1C\x00\x04", "7Z"),
            (b"\x1F\x8B\x08\x00", "GZIP"),
        ];
        for (data, name) in cases {
            assert_eq!(classifier.detect_signature(data), Some(name));
            assert_eq!(classifier.classify(data), Classification::ValidStructure);
        }
    }

    #[test]
    fn test_zero_ratio() {
        let classifier = ResultClassifier::new();
        // 4 of 10 bytes are zero
        let structured = [1, 0, 2, 0, 3, 0, 4, 0, 5, 6];
        assert_eq!(classifier.classify(&structured), Classification::ValidStructure);
        // 3 of 10 is not above the threshold
        let noisy = [1, 0, 2, 0, 3, 0, 4, 7, 5, 6];
        assert_eq!(classifier.classify(&noisy), Classification::InvalidKey);
    }

    #[test]
    fn test_short_samples_skip_zero_heuristic() {
        let classifier = ResultClassifier::new();
        assert_eq!(classifier.classify(&[0, 0]), Classification::InvalidKey);
        assert_eq!(classifier.classify(&[0, 0, 0]), Classification::ValidStructure);
    }

    #[test]
    fn test_noise_is_invalid() {
        let noise: Vec<u8> = (1..=64u8).map(|b| b.wrapping_mul(37) | 1).collect();
        assert_eq!(ResultClassifier::new().classify(&noise), Classification::InvalidKey);
    }

    #[test]
    fn test_custom_signature_and_threshold() {
        let classifier = ResultClassifier::new()
            .with_signature(b"OggS", "OGG")
            .with_zero_ratio(0.9);
        assert_eq!(classifier.classify(b"OggS\x00\x02"), Classification::ValidStructure);
        assert_eq!(classifier.classify(&[1, 0, 0, 0, 2]), Classification::InvalidKey);
    }

    #[test]
    fn test_descriptions() {
        assert!(Classification::ValidStructure.is_valid());
        assert!(!Classification::CorruptOutput.is_valid());
        assert_ne!(
            Classification::InvalidKey.describe(),
            Classification::CorruptOutput.describe()
        );
    }
}
