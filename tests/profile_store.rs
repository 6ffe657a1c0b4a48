use pretty_assertions::assert_eq;

use typist::model::ErrorRecord;
use typist::profile::{default_profiles, DelayProfile, ProfileStore};

fn record(position: usize) -> ErrorRecord {
    ErrorRecord {
        position,
        original: 'e',
        injected: "r".to_string(),
    }
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::with_path(dir.path().join("typing_profiles.json"));

    let (profiles, history) = store.load().unwrap();
    assert_eq!(profiles, default_profiles());
    assert!(history.is_empty());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::with_path(dir.path().join("cfg").join("typing_profiles.json"));

    let mut profiles = default_profiles();
    profiles.insert(
        "hunt_and_peck".to_string(),
        DelayProfile::new("hunt_and_peck", 0.3, 0.9, 0.2).unwrap(),
    );
    let history = vec![
        ErrorRecord {
            position: 0,
            original: 'a',
            injected: "s".to_string(),
        },
        ErrorRecord {
            position: 4,
            original: 'é',
            injected: String::new(),
        },
        ErrorRecord {
            position: 9,
            original: 't',
            injected: "tt".to_string(),
        },
    ];

    store.save(&profiles, &history).unwrap();
    let (loaded_profiles, loaded_history) = store.load().unwrap();

    assert_eq!(loaded_profiles, profiles);
    assert_eq!(loaded_history, history);
}

#[test]
fn file_layout_matches_the_documented_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typing_profiles.json");
    let store = ProfileStore::with_path(&path);
    store.save(&default_profiles(), &[record(3)]).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        value["typing_profiles"]["slow"],
        serde_json::json!({"delay_range": [0.15, 0.4], "typo_probability": 0.15})
    );
    assert_eq!(value["error_history"], serde_json::json!([[3, "e", "r"]]));
}

#[test]
fn long_history_round_trips_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::with_path(dir.path().join("typing_profiles.json"));

    let history: Vec<ErrorRecord> = (0..6001).map(record).collect();
    store.save(&default_profiles(), &history).unwrap();

    let (_, loaded) = store.load().unwrap();
    assert_eq!(loaded.len(), history.len());
    assert_eq!(loaded, history);
}

#[test]
fn malformed_profile_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typing_profiles.json");
    std::fs::write(
        &path,
        r#"{"typing_profiles": {"odd": {"delay_range": [0.5, 0.1], "typo_probability": 0.1}}}"#,
    )
    .unwrap();

    let err = ProfileStore::with_path(&path).load().unwrap_err();
    assert!(format!("{err:#}").contains("invalid profile"), "{err:#}");
}

#[test]
fn probability_out_of_range_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typing_profiles.json");
    std::fs::write(
        &path,
        r#"{"typing_profiles": {"odd": {"delay_range": [0.1, 0.2], "typo_probability": 1.5}}}"#,
    )
    .unwrap();

    assert!(ProfileStore::with_path(&path).load().is_err());
}

#[test]
fn unparseable_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typing_profiles.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(ProfileStore::with_path(&path).load().is_err());
}

#[test]
fn invalid_profile_is_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typing_profiles.json");
    let mut profiles = default_profiles();
    profiles.insert(
        "bad".to_string(),
        DelayProfile {
            name: "bad".to_string(),
            delay_range: (f64::NAN, 0.1),
            typo_probability: 0.0,
        },
    );

    assert!(ProfileStore::with_path(&path).save(&profiles, &[]).is_err());
    assert!(!path.exists());
}
