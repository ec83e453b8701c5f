//! 会话核心逻辑模块（状态机、划分不变量、金字塔排名）。

pub mod controller;
pub mod partition;
pub mod pyramid;
pub mod rules;
pub mod state;
pub mod summary;

pub use controller::Session;
pub use partition::IntegrityError;
pub use pyramid::{Pyramid, PyramidSlot, SLOT_COUNT, TIER_SIZES};
pub use rules::{Precondition, Resolution, SessionAction, SessionError, SessionRules};
pub use state::{Bucket, Location, Phase, SessionEvent, SessionState};
pub use summary::{RankedValue, ResultsSummary};
