use std::sync::{Arc, PoisonError, RwLock};

use rand::{Rng, RngCore};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ErrorRecord, FeatureVector, KeystrokeEvent, TrainingSample};
use crate::profile::DelayProfile;

/// Gaps longer than this are hesitation, not typing rhythm.
pub const MAX_TRAINING_DELAY_SECS: f64 = 2.0;

const RIDGE: f64 = 1e-6;
const PIVOT_EPSILON: f64 = 1e-12;

/// `(word_index, word_length, char_index) -> delay` pairs every model starts from.
const SEED_DATASET: [((usize, usize, usize), f64); 3] =
    [((0, 1, 1), 0.2), ((1, 1, 2), 0.15), ((2, 1, 3), 0.1)];

const WORD_BOUNDARY_KEYS: [&str; 3] = ["space", "enter", "tab"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("model has not been trained on observed delays")]
    Untrained,
    #[error("least-squares system is singular")]
    Singular,
    #[error("prediction is not finite ({0})")]
    NonFinite(f64),
    #[error("model lock poisoned")]
    Poisoned,
}

/// Something that maps a typing position to an inter-character delay.
///
/// `predict` never fails: implementations fall back to a uniform draw from the
/// profile's range and clamp everything else into it.
pub trait DelayPredictor {
    fn predict(&self, features: FeatureVector, profile: &DelayProfile, rng: &mut dyn RngCore)
        -> f64;

    fn train(&self, samples: &[TrainingSample]);
}

/// Clamp `predicted` into the profile's delay range.
pub fn clamp_delay(predicted: f64, profile: &DelayProfile) -> f64 {
    let (min, max) = profile.delay_range;
    min.max(predicted.min(max))
}

/// Uniform draw from the profile's delay range.
pub fn uniform_delay(profile: &DelayProfile, rng: &mut dyn RngCore) -> f64 {
    let (min, max) = profile.delay_range;
    if min.is_finite() && max.is_finite() && min < max {
        rng.gen_range(min..=max)
    } else if min.is_finite() {
        min.max(0.0)
    } else {
        0.0
    }
}

/// Online least-squares regressor over `[1, word_index, word_length, char_index]`.
///
/// Keeps the normal-equation sums so each `fit` is an incremental update.
#[derive(Debug, Clone)]
pub struct LinearDelayModel {
    xtx: [[f64; 4]; 4],
    xty: [f64; 4],
    observed: usize,
    weights: Option<[f64; 4]>,
}

impl LinearDelayModel {
    pub fn empty() -> Self {
        Self {
            xtx: [[0.0; 4]; 4],
            xty: [0.0; 4],
            observed: 0,
            weights: None,
        }
    }

    /// Model primed with the built-in seed dataset.
    ///
    /// Seed rows shape the fit but do not count as observations, so
    /// predictions keep falling back to uniform draws until real data arrives.
    pub fn seeded() -> Self {
        let mut model = Self::empty();
        for ((w, len, i), delay) in SEED_DATASET {
            model.accumulate(FeatureVector::new(w, len, i), delay);
        }
        model.weights = model.solve().ok();
        model
    }

    /// Number of non-seed samples this model has been trained on.
    pub fn observed(&self) -> usize {
        self.observed
    }

    fn accumulate(&mut self, features: FeatureVector, delay: f64) {
        let row = features.design_row();
        for (r, xr) in row.iter().enumerate() {
            for (c, xc) in row.iter().enumerate() {
                self.xtx[r][c] += xr * xc;
            }
            self.xty[r] += xr * delay;
        }
    }

    pub fn fit(&mut self, samples: &[TrainingSample]) -> Result<(), PredictError> {
        if samples.is_empty() {
            return Ok(());
        }
        for s in samples {
            self.accumulate(s.features, s.delay);
        }
        self.observed += samples.len();
        let weights = self.solve()?;
        self.weights = Some(weights);
        Ok(())
    }

    pub fn raw_predict(&self, features: FeatureVector) -> Result<f64, PredictError> {
        if self.observed == 0 {
            return Err(PredictError::Untrained);
        }
        let weights = self.weights.ok_or(PredictError::Singular)?;
        let predicted: f64 = features
            .design_row()
            .iter()
            .zip(weights.iter())
            .map(|(x, w)| x * w)
            .sum();
        if !predicted.is_finite() {
            return Err(PredictError::NonFinite(predicted));
        }
        Ok(predicted)
    }

    // Gaussian elimination with partial pivoting on (XᵀX + λI) w = Xᵀy.
    fn solve(&self) -> Result<[f64; 4], PredictError> {
        let mut a = self.xtx;
        let mut b = self.xty;
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += RIDGE;
        }

        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < PIVOT_EPSILON {
                return Err(PredictError::Singular);
            }
            a.swap(col, pivot);
            b.swap(col, pivot);

            for row in (col + 1)..4 {
                let factor = a[row][col] / a[col][col];
                for k in col..4 {
                    a[row][k] -= factor * a[col][k];
                }
                b[row] -= factor * b[col];
            }
        }

        let mut w = [0.0; 4];
        for row in (0..4).rev() {
            let tail: f64 = ((row + 1)..4).map(|k| a[row][k] * w[k]).sum();
            w[row] = (b[row] - tail) / a[row][row];
        }

        if w.iter().all(|v| v.is_finite()) {
            Ok(w)
        } else {
            Err(PredictError::Singular)
        }
    }
}

impl Default for LinearDelayModel {
    fn default() -> Self {
        Self::seeded()
    }
}

/// Delay model shared between training and prediction call sites.
///
/// Training takes the write lock, so a `train` finishes before any later
/// `predict` observes it and readers wait while it runs.
#[derive(Debug, Clone, Default)]
pub struct SharedDelayModel {
    inner: Arc<RwLock<LinearDelayModel>>,
}

impl SharedDelayModel {
    pub fn new(model: LinearDelayModel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn observed(&self) -> usize {
        self.inner
            .read()
            .map(|m| m.observed())
            .unwrap_or_else(|poisoned| poisoned.into_inner().observed())
    }
}

impl DelayPredictor for SharedDelayModel {
    fn predict(
        &self,
        features: FeatureVector,
        profile: &DelayProfile,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let raw = match self.inner.read() {
            Ok(model) => model.raw_predict(features),
            Err(_) => Err(PredictError::Poisoned),
        };

        match raw {
            Ok(predicted) => {
                let delay = clamp_delay(predicted, profile);
                debug!(
                    predicted,
                    delay,
                    word_index = features.word_index,
                    word_length = features.word_length,
                    char_index = features.char_index,
                    "predicted delay"
                );
                delay
            }
            Err(PredictError::Untrained) => uniform_delay(profile, rng),
            Err(err) => {
                warn!(%err, "delay prediction failed, using uniform fallback");
                uniform_delay(profile, rng)
            }
        }
    }

    fn train(&self, samples: &[TrainingSample]) {
        if samples.is_empty() {
            debug!("no training samples, keeping current delay model");
            return;
        }

        let mut model = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = model.clone();
        match model.fit(samples) {
            Ok(()) => info!(
                samples = samples.len(),
                total = model.observed(),
                "delay model trained"
            ),
            Err(err) => {
                warn!(%err, "delay model training failed, keeping previous parameters");
                *model = before;
            }
        }
    }
}

/// Derive training samples from a recorded keystroke sequence.
///
/// Printable keys between `space`/`enter`/`tab` form a word. Each character's
/// delay is the gap since the previous key event of any kind.
pub fn samples_from_keystrokes(events: &[KeystrokeEvent]) -> Vec<TrainingSample> {
    let mut samples = Vec::new();
    let mut word: Vec<f64> = Vec::new();
    let mut word_index = 0usize;
    let mut prev_ts: Option<f64> = None;

    let mut flush = |word: &mut Vec<f64>, word_index: &mut usize| {
        if word.is_empty() {
            return;
        }
        let len = word.len();
        for (i, delay) in word.drain(..).enumerate() {
            if delay.is_nan() || delay > MAX_TRAINING_DELAY_SECS {
                continue;
            }
            if let Some(s) = TrainingSample::new(FeatureVector::new(*word_index, len, i), delay) {
                samples.push(s);
            }
        }
        *word_index += 1;
    };

    for event in events {
        let gap = prev_ts.map_or(f64::NAN, |prev| event.timestamp - prev);
        prev_ts = Some(event.timestamp);

        if WORD_BOUNDARY_KEYS.contains(&event.key.as_str()) {
            flush(&mut word, &mut word_index);
        } else if event.key.chars().count() == 1 {
            word.push(gap);
        }
    }
    flush(&mut word, &mut word_index);

    samples
}

/// Synthesize training samples from a session's error history.
///
/// Each record contributes its ordinal and buffer position as features, with
/// a target delay drawn from the active profile's range.
pub fn samples_from_error_history(
    history: &[ErrorRecord],
    profile: &DelayProfile,
    rng: &mut dyn RngCore,
) -> Vec<TrainingSample> {
    history
        .iter()
        .enumerate()
        .filter_map(|(ordinal, rec)| {
            let features = FeatureVector::new(ordinal, 1, rec.position);
            TrainingSample::new(features, uniform_delay(profile, rng))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn sample(w: usize, len: usize, i: usize, delay: f64) -> TrainingSample {
        TrainingSample::new(FeatureVector::new(w, len, i), delay).unwrap()
    }

    fn trained_on(delay: f64) -> SharedDelayModel {
        let model = SharedDelayModel::new(LinearDelayModel::empty());
        let samples: Vec<TrainingSample> = (0..20)
            .map(|i| sample(i % 5, 3 + i % 3, i % 4, delay))
            .collect();
        model.train(&samples);
        model
    }

    #[test]
    fn seeded_model_is_untrained() {
        let model = LinearDelayModel::seeded();
        assert_eq!(
            model.raw_predict(FeatureVector::new(0, 1, 0)),
            Err(PredictError::Untrained)
        );
    }

    #[test]
    fn fit_recovers_a_linear_relation() {
        let mut model = LinearDelayModel::empty();
        let mut samples = Vec::new();
        for w in 0..4 {
            for len in 1..5 {
                for i in 0..len {
                    let delay = 0.1 + 0.01 * w as f64 + 0.005 * len as f64 - 0.002 * i as f64;
                    samples.push(sample(w, len, i, delay));
                }
            }
        }
        model.fit(&samples).unwrap();
        let got = model.raw_predict(FeatureVector::new(2, 3, 1)).unwrap();
        let want = 0.1 + 0.02 + 0.015 - 0.002;
        assert!((got - want).abs() < 1e-4, "got {got}, want {want}");
    }

    #[test]
    fn empty_fit_is_noop() {
        let mut model = LinearDelayModel::seeded();
        model.fit(&[]).unwrap();
        assert_eq!(model.observed(), 0);
    }

    #[test]
    fn slow_predictions_clamp_to_profile_max() {
        let model = trained_on(1.5);
        let profile = DelayProfile::new("test", 0.05, 0.2, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for features in [FeatureVector::new(0, 3, 0), FeatureVector::new(4, 5, 3)] {
            assert_eq!(model.predict(features, &profile, &mut rng), 0.2);
        }
    }

    #[test]
    fn fast_predictions_clamp_to_profile_min() {
        let model = trained_on(0.001);
        let profile = DelayProfile::new("test", 0.05, 0.2, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for features in [FeatureVector::new(0, 3, 0), FeatureVector::new(4, 5, 3)] {
            assert_eq!(model.predict(features, &profile, &mut rng), 0.05);
        }
    }

    #[test]
    fn error_history_counts_one_character_per_record() {
        let history = vec![
            ErrorRecord {
                position: 2,
                original: 'é',
                injected: "ée".to_string(),
            },
            ErrorRecord {
                position: 5,
                original: 'a',
                injected: String::new(),
            },
        ];
        let profile = DelayProfile::new("test", 0.05, 0.2, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let samples = samples_from_error_history(&history, &profile, &mut rng);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].features, FeatureVector::new(0, 1, 2));
        assert_eq!(samples[1].features, FeatureVector::new(1, 1, 5));
        assert!(samples.iter().all(|s| (0.05..=0.2).contains(&s.delay)));
    }

    #[test]
    fn keystrokes_split_into_words() {
        let ev = |key: &str, t: f64| KeystrokeEvent {
            key: key.to_string(),
            timestamp: t,
        };
        let events = vec![
            ev("h", 0.0),
            ev("i", 0.1),
            ev("space", 0.2),
            ev("y", 0.35),
            ev("o", 0.5),
            ev("u", 9.0),
        ];
        let samples = samples_from_keystrokes(&events);
        // First key has no predecessor and the 8.5s gap is hesitation.
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].features, FeatureVector::new(0, 2, 1));
        assert!((samples[0].delay - 0.1).abs() < 1e-9);
        assert_eq!(samples[1].features, FeatureVector::new(1, 3, 0));
        assert_eq!(samples[2].features, FeatureVector::new(1, 3, 1));
    }
}
