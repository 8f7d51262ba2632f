//! Row models and DTOs, one module per entity.

pub mod ai;
pub mod ai_cache;
pub mod api_key;
pub mod detection;
pub mod digest;
pub mod normalized_event;
pub mod raw_event;
pub mod tenant;
