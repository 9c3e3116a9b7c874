// Concrete collaborators behind the ports in `app::ports`

pub mod blogto;
pub mod categorizer;
pub mod fs_publisher;
pub mod geocoding;
pub mod github;
pub mod http_client;
pub mod in_memory;
pub mod weather;

pub use blogto::BlogToClient;
pub use categorizer::ClaudeCategorizer;
pub use fs_publisher::FsPublisher;
pub use geocoding::GoogleGeocoder;
pub use github::GitHubPublisher;
pub use in_memory::InMemoryPublisher;
pub use weather::VisualCrossingClient;
