//! 交接文档：模型、持久化与生命周期

pub mod lifecycle;
pub mod model;
pub mod store;

pub use lifecycle::HandoffLifecycle;
pub use model::{
    margin_percent, ChatEntry, DayPlan, FlightChoice, HandoffDocument, HandoffDraft, HotelChoice, QuoteStatus,
};
pub use store::HandoffStore;
