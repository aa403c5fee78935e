//! Configuration documents through parse, save and reparse.

use serde_json::json;
use tempfile::TempDir;
use triage_rules::{parse, parse_with, CarryOver, Config, ConfigError, ParseOptions};

fn document() -> serde_json::Value {
    json!({
        "finalize-image-writer": true,
        "rule-sets": [
            {
                "set-name": "Encryption",
                "rules": [
                    { "name": "Containers", "extensions": ["tc", "hc"], "shouldSave": true },
                    { "name": "Keys", "file-names": ["id_rsa"], "extensions": [] },
                    { "name": "SAM", "file-names": [], "extensions": [], "full-paths": ["/Windows/System32/config/SAM"] }
                ]
            },
            {
                "set-name": "Recent",
                "rules": [
                    { "name": "Fresh", "date-range": { "min": 19000 }, "size-range": { "max": 1048576 } },
                    { "name": "Old", "shouldAlert": false, "date-range": { "min-days": 365 } }
                ]
            }
        ]
    })
}

#[test]
fn parse_save_reparse_is_stable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("rules.json");

    let config = parse(&document()).unwrap();
    config.save(&path).unwrap();
    let reparsed = Config::load(&path).unwrap();
    assert_eq!(reparsed, config);

    let reset = parse_with(
        &serde_json::from_str(&config.to_json_pretty().unwrap()).unwrap(),
        ParseOptions {
            carry_over: CarryOver::Reset,
        },
    )
    .unwrap();
    assert_eq!(reset, config);
}

#[test]
fn legacy_values_survive_the_round_trip() {
    let config = parse(&document()).unwrap();
    let recent = config.find_rule_set("Recent").unwrap();

    // "Old" never sets min or max, so it keeps what "Fresh" declared.
    let old = recent.find("Old").unwrap();
    assert_eq!(old.date_range.min, Some(19000));
    assert_eq!(old.date_range.min_days, Some(365));
    assert_eq!(old.size_range.max, Some(1048576));
    assert!(!old.should_alert);

    let keys = config.find_rule_set("Encryption").unwrap().find("Keys").unwrap();
    assert!(keys.should_save);
    assert!(keys.extensions.is_empty());
}

#[test]
fn mutual_exclusivity_is_checked_before_the_set_is_built() {
    let text = r#"{ "rule-sets": [ { "set-name": "S", "rules": [
        { "name": "ok", "extensions": ["txt"] },
        { "name": "bad", "full-paths": ["/x/y.txt"], "extensions": ["txt"] }
    ] } ] }"#;
    let err = Config::from_json_str(text).unwrap_err();
    assert!(matches!(err, ConfigError::FullPathsConflict { .. }));
}

#[test]
fn malformed_json_is_a_config_error() {
    let err = Config::from_json_str("{ \"rule-sets\": [").unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
}
