// One module per pipeline stage, in execution order

pub mod fetch;
pub mod validate;
pub mod geocode;
pub mod weather;
pub mod categorize;
pub mod merge;
pub mod filter;
pub mod publish;

pub use fetch::FetchStage;
pub use validate::ValidateStage;
pub use geocode::GeocodeStage;
pub use weather::WeatherStage;
pub use categorize::CategorizeStage;
pub use merge::MergeStage;
pub use filter::FilterStage;
pub use publish::PublishStage;
