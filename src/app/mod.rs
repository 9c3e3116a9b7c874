pub mod ports;

pub use ports::{
    CategorizationItem, CategorizerPort, EventSourcePort, GeocoderPort, PublisherPort,
    VersionToken, WeatherPort, WriteOutcome,
};
