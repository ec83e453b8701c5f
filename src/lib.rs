pub mod catalog;
pub mod config;
pub mod persist;
pub mod session;

use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use catalog::{Card, CardColor, CardId, Catalog, CatalogError, Deployment};
pub use config::SessionConfig;
pub use persist::{LoadOutcome, PersistError, PersistedRecord, SessionStore, SCHEMA_VERSION};
pub use session::{
    Bucket, IntegrityError, Location, Phase, Precondition, PyramidSlot, RankedValue, Resolution,
    ResultsSummary, Session, SessionAction, SessionError, SessionEvent, SessionRules,
    SessionState,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error<E: Serialize + Display>(error: E) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&error.to_string()));
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_deployment(deployment: Option<String>) -> Deployment {
    deployment
        .as_deref()
        .and_then(|value| Deployment::from_str(value).ok())
        .unwrap_or_default()
}

fn parse_ids(ids_json: &str) -> Result<Vec<CardId>, JsValue> {
    serde_json::from_str(ids_json).map_err(serde_to_js_error)
}

#[cfg(target_arch = "wasm32")]
fn browser_store() -> Result<persist::LocalStorageStore, PersistError> {
    persist::LocalStorageStore::new()
}

#[cfg(not(target_arch = "wasm32"))]
fn browser_store() -> Result<persist::MemoryStore, PersistError> {
    Err(PersistError::Storage {
        message: "browser storage exists only in the wasm build".into(),
    })
}

/// 浏览器端持有的唯一会话句柄。所有视图都通过它调用会话操作。
#[wasm_bindgen]
pub struct ValueCardsSession {
    session: Session,
    config: SessionConfig,
}

impl ValueCardsSession {
    fn run(&mut self, action: SessionAction) -> Result<String, JsValue> {
        let resolution = self.session.resolve(&action).map_err(to_js_error)?;
        serde_json::to_string(&resolution).map_err(serde_to_js_error)
    }
}

#[wasm_bindgen]
impl ValueCardsSession {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<ValueCardsSession, JsValue> {
        let config = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => SessionConfig::default(),
        };
        let session = Session::new(&config);
        Ok(ValueCardsSession { session, config })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.session.state()).map_err(serde_to_js_error)
    }

    pub fn catalog_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.session.catalog().cards()).map_err(serde_to_js_error)
    }

    pub fn begin(&mut self) -> Result<String, JsValue> {
        self.run(SessionAction::Begin)
    }

    pub fn classify(&mut self, card_id: &str, bucket: &str) -> Result<String, JsValue> {
        let bucket = Bucket::from_str(bucket)
            .map_err(|_| JsValue::from_str(&format!("unknown bucket `{bucket}`")))?;
        self.run(SessionAction::Classify {
            card_id: card_id.to_string(),
            bucket,
        })
    }

    pub fn unclassify(&mut self, card_id: &str) -> Result<String, JsValue> {
        self.run(SessionAction::Unclassify {
            card_id: card_id.to_string(),
        })
    }

    pub fn advance_to_ranking(&mut self) -> Result<String, JsValue> {
        self.run(SessionAction::AdvanceToRanking)
    }

    pub fn narrow_selection_json(&mut self, ids_json: &str) -> Result<String, JsValue> {
        let remove = parse_ids(ids_json)?;
        self.run(SessionAction::NarrowSelection { remove })
    }

    pub fn narrow_to_json(&mut self, ids_json: &str) -> Result<String, JsValue> {
        let keep = parse_ids(ids_json)?;
        self.run(SessionAction::NarrowTo { keep })
    }

    pub fn place_at(&mut self, card_id: &str, tier: u8, position: u8) -> Result<String, JsValue> {
        self.run(SessionAction::PlaceAt {
            card_id: card_id.to_string(),
            tier,
            position,
        })
    }

    pub fn remove_from(&mut self, tier: u8, position: u8) -> Result<String, JsValue> {
        self.run(SessionAction::RemoveFrom { tier, position })
    }

    pub fn reorder_json(&mut self, ids_json: &str) -> Result<String, JsValue> {
        let order = parse_ids(ids_json)?;
        self.run(SessionAction::Reorder { order })
    }

    pub fn reset(&mut self) -> Result<String, JsValue> {
        self.run(SessionAction::Reset)
    }

    pub fn apply_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: SessionAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.run(action)
    }

    pub fn can_advance_to_ranking(&self) -> bool {
        self.session.can_advance_to_ranking()
    }

    pub fn narrowing_excess(&self) -> usize {
        self.session.narrowing_excess()
    }

    pub fn filled_count(&self) -> usize {
        self.session.filled_count()
    }

    pub fn summary_json(&self) -> Result<String, JsValue> {
        let summary = self.session.summary().map_err(to_js_error)?;
        serde_json::to_string(&summary).map_err(serde_to_js_error)
    }

    /// The versioned record the host may keep wherever it likes.
    pub fn export_record(&self) -> Result<String, JsValue> {
        persist::encode(self.session.state()).map_err(to_js_error)
    }

    /// Restores a record produced by `export_record`; incompatible records
    /// reset the session instead of failing. Returns the load outcome as JSON.
    pub fn import_record(&mut self, raw: &str) -> Result<String, JsValue> {
        let outcome = match persist::decode(self.session.catalog(), raw) {
            Ok(state) => {
                self.session.restore(state).map_err(to_js_error)?;
                LoadOutcome::Restored
            }
            Err(reason) => {
                web_sys::console::warn_1(&JsValue::from_str(&reason.to_string()));
                self.session.reset();
                LoadOutcome::Reset { reason }
            }
        };
        serde_json::to_string(&outcome).map_err(serde_to_js_error)
    }

    pub fn save(&self) -> Result<(), JsValue> {
        let mut store = browser_store().map_err(to_js_error)?;
        persist::save(&mut store, &self.config.storage_key, self.session.state())
            .map_err(to_js_error)
    }

    pub fn load(&mut self) -> Result<String, JsValue> {
        let mut store = browser_store().map_err(to_js_error)?;
        let loaded = persist::load(&mut store, &self.config.storage_key, self.session.catalog());
        self.session.restore(loaded.state).map_err(to_js_error)?;
        serde_json::to_string(&loaded.outcome).map_err(serde_to_js_error)
    }

    pub fn clear_saved(&self) -> Result<(), JsValue> {
        let mut store = browser_store().map_err(to_js_error)?;
        store.remove(&self.config.storage_key).map_err(to_js_error)
    }
}

/// 返回指定部署的完整卡牌目录。
#[wasm_bindgen(js_name = "catalogCards")]
pub fn catalog_cards(deployment: Option<String>) -> Result<JsValue, JsValue> {
    let catalog = parse_deployment(deployment).catalog();
    to_value(&catalog.cards()).map_err(JsValue::from)
}

/// 对传入的会话状态执行一次操作，返回新状态与事件。
#[wasm_bindgen(js_name = "applyAction")]
pub fn apply_action(
    state: JsValue,
    action: JsValue,
    deployment: Option<String>,
) -> Result<JsValue, JsValue> {
    let mut state: SessionState = from_value(state).map_err(JsValue::from)?;
    let action: SessionAction = from_value(action).map_err(JsValue::from)?;
    let config = SessionConfig::from_deployment(parse_deployment(deployment));
    let catalog = config.catalog();
    let rules = SessionRules::new(&catalog);
    rules.ensure_integrity(&state).map_err(to_js_error)?;

    let mut rng = config.make_rng();
    match rules.apply(&mut state, &mut rng, &action) {
        Ok(events) => to_value(&Resolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue, deployment: Option<String>) -> Result<(), JsValue> {
    let state: SessionState = from_value(state).map_err(JsValue::from)?;
    let catalog = parse_deployment(deployment).catalog();
    SessionRules::new(&catalog)
        .ensure_integrity(&state)
        .map_err(to_js_error)
}

#[wasm_bindgen(js_name = "resultsSummary")]
pub fn results_summary(state: JsValue) -> Result<JsValue, JsValue> {
    let state: SessionState = from_value(state).map_err(JsValue::from)?;
    let summary = ResultsSummary::from_state(&state).map_err(to_js_error)?;
    to_value(&summary).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
