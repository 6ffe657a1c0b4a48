use serde::{Deserialize, Serialize};

/// One captured key press.
///
/// `key` is the produced character for printable keys, or a stable symbolic
/// name (`space`, `enter`, `backspace`, ...) for everything else. `timestamp`
/// is seconds since the capture started, from a monotonic clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "KeystrokeRepr", into = "KeystrokeRepr")]
pub struct KeystrokeEvent {
    pub key: String,
    pub timestamp: f64,
}

#[derive(Serialize, Deserialize)]
struct KeystrokeRepr(String, f64);

impl From<KeystrokeRepr> for KeystrokeEvent {
    fn from(KeystrokeRepr(key, timestamp): KeystrokeRepr) -> Self {
        Self { key, timestamp }
    }
}

impl From<KeystrokeEvent> for KeystrokeRepr {
    fn from(e: KeystrokeEvent) -> Self {
        KeystrokeRepr(e.key, e.timestamp)
    }
}

/// Typing position used as the only input of the delay model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    pub word_index: usize,
    pub word_length: usize,
    pub char_index: usize,
}

impl FeatureVector {
    pub fn new(word_index: usize, word_length: usize, char_index: usize) -> Self {
        Self {
            word_index,
            word_length,
            char_index,
        }
    }

    /// Regression row with a leading bias term.
    pub(crate) fn design_row(&self) -> [f64; 4] {
        [
            1.0,
            self.word_index as f64,
            self.word_length as f64,
            self.char_index as f64,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub delay: f64,
}

impl TrainingSample {
    /// Returns `None` for negative or non-finite delays.
    pub fn new(features: FeatureVector, delay: f64) -> Option<Self> {
        (delay.is_finite() && delay >= 0.0).then_some(Self { features, delay })
    }
}

/// A transient typo, kept after it has been corrected.
///
/// Serialized as a `[position, original, injected]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ErrorRecordRepr", into = "ErrorRecordRepr")]
pub struct ErrorRecord {
    pub position: usize,
    pub original: char,
    pub injected: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorRecordRepr(usize, char, String);

impl From<ErrorRecordRepr> for ErrorRecord {
    fn from(ErrorRecordRepr(position, original, injected): ErrorRecordRepr) -> Self {
        Self {
            position,
            original,
            injected,
        }
    }
}

impl From<ErrorRecord> for ErrorRecordRepr {
    fn from(r: ErrorRecord) -> Self {
        ErrorRecordRepr(r.position, r.original, r.injected)
    }
}
