//! Browser-side checks of the JSON boundary. Run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use serde_json::Value;
use value_cards::ValueCardsSession;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn json(raw: &str) -> Value {
    serde_json::from_str(raw).expect("boundary should emit valid JSON")
}

#[wasm_bindgen_test]
fn begin_deals_the_whole_catalog() {
    let mut session = ValueCardsSession::new(Some(r#"{"seed":1}"#.into())).expect("session");
    let resolution = json(&session.begin().expect("begin"));
    assert_eq!(resolution["state"]["phase"], "triage");
    assert_eq!(resolution["state"]["deck"].as_array().map(Vec::len), Some(55));
    assert_eq!(resolution["events"][0]["type"], "SessionStarted");
}

#[wasm_bindgen_test]
fn rejected_operations_surface_tagged_errors() {
    let mut session = ValueCardsSession::new(None).expect("session");
    assert!(session.place_at("family", 0, 0).is_err());
    assert!(session.classify("family", "sideways").is_err());
    assert_eq!(json(&session.state_json().expect("state"))["phase"], "intro");
}

#[wasm_bindgen_test]
fn old_records_reset_the_session() {
    let mut session = ValueCardsSession::new(Some(r#"{"seed":2}"#.into())).expect("session");
    session.begin().expect("begin");
    let outcome = json(
        &session
            .import_record(r#"{"schema_version":2,"phase":"triage"}"#)
            .expect("import"),
    );
    assert_eq!(outcome["type"], "Reset");
    assert_eq!(json(&session.state_json().expect("state"))["phase"], "intro");

    let record = session.export_record().expect("export");
    let outcome = json(&session.import_record(&record).expect("import"));
    assert_eq!(outcome["type"], "Restored");
}
