pub mod catalog;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod events;
pub mod recommendation;

pub use catalog::{Catalog, CatalogStats, PriceRange, ProductFilter};
pub use context::{infer_context, infer_location, infer_weather};
pub use domain::chat::{ChatMessage, ChatRole, ShoppingContext};
pub use domain::product::{Category, Product, ProductId};
pub use errors::{CatalogError, ParseError};
pub use events::{EventLevel, EventSink, InMemoryEventSink, RecommendationEvent, TracingEventSink};
pub use recommendation::prompt::build_system_prompt;
pub use recommendation::recovery::{Recovered, RecoveryPipeline, RecoveryStrategy, RecoveryTier};
pub use recommendation::stock::{DropReason, DroppedRecommendation, StockFilter, StockFilterOutcome};
pub use recommendation::{RecommendationResult, MAX_RECOMMENDATIONS};
