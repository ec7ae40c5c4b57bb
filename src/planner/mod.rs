//! 规划：LLM 生成研究摘要与候选方案，再用实时报价补全选中方案

pub mod enrich;
pub mod itinerary;

pub use enrich::{CityEnrichment, Enrichment, TripEnricher};
pub use itinerary::{parse_options, ItineraryPlanner};
