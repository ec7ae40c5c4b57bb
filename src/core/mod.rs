//! 核心层：错误分类与时钟

pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Capability, CacheError, FetchError, HandoffError, ProviderError, TripError};
