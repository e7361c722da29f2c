pub mod filter;
pub mod recent;
pub mod recommend;
pub mod scoring;

pub use filter::{FilterMode, Filters};
pub use recent::RecentRecommendations;
pub use recommend::Recommender;
