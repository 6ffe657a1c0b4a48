use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use typist::model::{ErrorRecord, FeatureVector, TrainingSample};
use typist::playback::BufferInjector;
use typist::predictor::{DelayPredictor, LinearDelayModel, SharedDelayModel};
use typist::profile::DelayProfile;
use typist::sim::{ManualPacer, Simulator, THINKING_PAUSE_SECS};
use typist::stats::SessionStats;
use typist::typo::CORRECTION_DELAY_SECS;

fn profile(min: f64, max: f64, typo: f64) -> DelayProfile {
    DelayProfile::new("test", min, max, typo).unwrap()
}

fn simulator(
    injector: BufferInjector,
    pacer: ManualPacer,
    seed: u64,
) -> Simulator<BufferInjector, ManualPacer, SharedDelayModel> {
    Simulator::new(
        injector,
        pacer,
        SharedDelayModel::default(),
        StdRng::seed_from_u64(seed),
    )
}

fn words_joined(text: &str) -> String {
    text.split_whitespace()
        .map(|w| format!("{w} "))
        .collect::<String>()
}

#[test]
fn types_hi_without_typos() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 1);
    let session = sim.simulate("hi", &profile(0.05, 0.2, 0.0)).unwrap();

    assert_eq!(session.typed_text(), "hi ");
    assert_eq!(sim.injector().text(), "hi ");
    assert_eq!(session.typo_count(), 0);
    assert!(session.error_history().is_empty());
    assert!(!session.was_cancelled());
}

#[test]
fn certain_typo_is_recorded_and_corrected() {
    for seed in 0..20 {
        let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), seed);
        let session = sim.simulate("a", &profile(0.05, 0.2, 1.0)).unwrap();

        assert_eq!(session.typed_text(), "a ", "seed {seed}");
        assert_eq!(sim.injector().text(), "a ", "seed {seed}");
        assert_eq!(session.typo_count(), 1);
        assert_eq!(session.error_history().len(), 1);

        let record = &session.error_history()[0];
        assert_eq!(record.position, 0);
        assert_eq!(record.original, 'a');
        assert!(
            ["s", "", "aa"].contains(&record.injected.as_str()),
            "unexpected injected text {:?}",
            record.injected
        );
    }
}

#[test]
fn typos_always_converge_to_the_source_text() {
    let text = "The quick brown fox, jumps over\tthe lazy dog!\nÉtude 42 naïve café";
    for seed in 0..10 {
        let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), seed);
        let session = sim.simulate(text, &profile(0.0, 0.01, 0.4)).unwrap();

        assert_eq!(session.typed_text(), words_joined(text), "seed {seed}");
        assert_eq!(sim.injector().text(), session.typed_text());

        let letters = text.chars().filter(|c| !c.is_whitespace()).count();
        assert_eq!(session.letters_typed(), letters);
        assert_eq!(session.words_typed(), text.split_whitespace().count());
        assert!(session.typo_count() <= letters);
        assert_eq!(session.typo_count(), session.error_history().len());
        assert_eq!(session.correction_delays().len(), session.typo_count());
    }
}

#[test]
fn correction_delays_stay_in_bounds() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 7);
    let session = sim.simulate("hello world", &profile(0.0, 0.0, 1.0)).unwrap();

    let (lo, hi) = CORRECTION_DELAY_SECS;
    assert_eq!(session.correction_delays().len(), 10);
    for d in session.correction_delays() {
        let secs = d.as_secs_f64();
        assert!(secs >= lo - 1e-9 && secs <= hi + 1e-9, "{secs}");
    }
}

#[test]
fn every_pause_is_a_keystroke_delay_or_a_thinking_pause() {
    let p = profile(0.05, 0.2, 0.0);
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 3);
    sim.simulate("pauses are bounded by the profile", &p).unwrap();

    let (think_lo, think_hi) = THINKING_PAUSE_SECS;
    for pause in sim.pacer().pauses() {
        let s = pause.as_secs_f64();
        let keystroke = s >= p.min_delay() - 1e-9 && s <= p.max_delay() + 1e-9;
        let thinking = s >= think_lo - 1e-9 && s <= think_hi + 1e-9;
        assert!(keystroke || thinking, "pause {s} out of every range");
    }
}

#[test]
fn same_seed_same_run() {
    let p = profile(0.05, 0.2, 0.2);
    let text = "determinism matters for debugging";

    let mut a = simulator(BufferInjector::new(), ManualPacer::new(), 99);
    let mut b = simulator(BufferInjector::new(), ManualPacer::new(), 99);
    let sa = a.simulate(text, &p).unwrap();
    let sb = b.simulate(text, &p).unwrap();

    assert_eq!(a.pacer().pauses(), b.pacer().pauses());
    assert_eq!(sa.error_history(), sb.error_history());
    assert_eq!(sa.elapsed(), sb.elapsed());
}

#[test]
fn elapsed_is_the_sum_of_pauses() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 5);
    let session = sim.simulate("abc def", &profile(0.1, 0.1, 0.0)).unwrap();

    let total: Duration = sim.pacer().pauses().iter().sum();
    assert_eq!(session.elapsed(), total);
}

#[test]
fn failed_characters_are_skipped() {
    let mut sim = simulator(BufferInjector::failing_on(&['x']), ManualPacer::new(), 2);
    let session = sim.simulate("axb yz", &profile(0.0, 0.0, 0.0)).unwrap();

    assert_eq!(session.typed_text(), "ab yz ");
    assert_eq!(sim.injector().text(), "ab yz ");
    assert_eq!(session.letters_typed(), 4);
    assert_eq!(session.words_typed(), 2);
    assert!(!session.was_cancelled());
}

#[test]
fn invalid_profile_fails_before_typing() {
    let bad = DelayProfile {
        name: "bad".to_string(),
        delay_range: (0.3, 0.1),
        typo_probability: 0.0,
    };
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 0);
    assert!(sim.simulate("never typed", &bad).is_err());
    assert_eq!(sim.injector().text(), "");
    assert!(sim.pacer().pauses().is_empty());
}

#[test]
fn empty_text_yields_empty_session() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 0);
    let session = sim.simulate(" \n\t ", &profile(0.05, 0.2, 0.5)).unwrap();

    assert_eq!(session.typed_text(), "");
    assert_eq!(session.typo_count(), 0);
    assert_eq!(session.elapsed(), Duration::ZERO);
}

#[test]
fn cancellation_returns_partial_session() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new().cancel_after(2), 11);
    let session = sim.simulate("hello world", &profile(0.05, 0.2, 0.0)).unwrap();

    assert!(session.was_cancelled());
    let typed = session.typed_text();
    assert!(typed.chars().count() <= 2, "typed {typed:?}");
    assert!("hello".starts_with(&typed), "typed {typed:?}");
    assert_eq!(sim.injector().text(), typed);

    let stats = SessionStats::from_session(&session);
    assert!(stats.cancelled);
    assert!(stats.to_string().contains("cancelled"));
}

#[test]
fn cancellation_during_correction_still_corrects() {
    // Pause 0 precedes 'a'; pause 1 is the correction delay and is cancelled.
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new().cancel_after(1), 4);
    let session = sim.simulate("abc", &profile(0.0, 0.0, 1.0)).unwrap();

    assert!(session.was_cancelled());
    assert_eq!(session.typed_text(), "a");
    assert_eq!(sim.injector().text(), "a");
    assert_eq!(session.letters_typed(), 1);
    assert_eq!(session.words_typed(), 1);
    assert_eq!(session.typo_count(), 1);
    assert!(session.correction_delays().is_empty());
}

#[test]
fn cancelled_partial_word_is_counted() {
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new().cancel_after(2), 6);
    let session = sim.simulate("hello world", &profile(0.0, 0.0, 0.0)).unwrap();

    assert!(session.was_cancelled());
    assert!(session.letters_typed() >= 1);
    assert_eq!(session.words_typed(), 1);

    let stats = SessionStats::from_session(&session);
    assert_eq!(stats.words_typed, 1);
}

#[test]
fn trained_model_paces_the_run() {
    let model = SharedDelayModel::new(LinearDelayModel::empty());
    let samples: Vec<TrainingSample> = (0..30)
        .filter_map(|i| TrainingSample::new(FeatureVector::new(i % 5, 3 + i % 3, i % 4), 0.12))
        .collect();
    model.train(&samples);

    let p = profile(0.05, 0.2, 0.0);
    let mut sim = Simulator::new(
        BufferInjector::new(),
        ManualPacer::new(),
        model.clone(),
        StdRng::seed_from_u64(8),
    );
    sim.simulate("abcd efgh", &p).unwrap();

    let (think_lo, _) = THINKING_PAUSE_SECS;
    let keystroke_pauses: Vec<f64> = sim
        .pacer()
        .pauses()
        .iter()
        .map(Duration::as_secs_f64)
        .filter(|s| *s < think_lo)
        .collect();
    assert_eq!(keystroke_pauses.len(), 8);
    for s in keystroke_pauses {
        assert!((s - 0.12).abs() < 1e-3, "expected ~0.12s, got {s}");
    }
}

#[test]
fn error_history_feeds_back_into_training() {
    let p = profile(0.05, 0.2, 1.0);
    let mut sim = simulator(BufferInjector::new(), ManualPacer::new(), 21);
    let session = sim.simulate("retrain me", &p).unwrap();

    let history: Vec<ErrorRecord> = session.error_history().to_vec();
    assert_eq!(history.len(), 9);

    let model = SharedDelayModel::default();
    let mut rng = StdRng::seed_from_u64(0);
    model.train(&typist::predictor::samples_from_error_history(
        &history, &p, &mut rng,
    ));
    assert_eq!(model.observed(), 9);
}
