/// Endpoint and vocabulary constants shared across the aggregator.

// External service endpoints
pub const BLOGTO_API_BASE: &str = "https://www.blogto.com/api/v2/events/";
pub const GOOGLE_GEOCODE_API_BASE: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const WEATHER_API_BASE: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const GITHUB_API_BASE: &str = "https://api.github.com";

pub const USER_AGENT: &str = "DateSpot-Aggregator";

// Environment variables holding credentials
pub const GOOGLE_MAPS_API_KEY: &str = "GOOGLE_MAPS_API_KEY";
pub const WEATHER_API_KEY: &str = "WEATHER_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

pub const DEFAULT_CONFIG_PATH: &str = "datespot.toml";
pub const DEFAULT_GEOCODE_REGION: &str = "Toronto Canada";
pub const DEFAULT_WEATHER_LOCATION: &str = "Toronto,ON,Canada";
pub const DEFAULT_PUBLISH_REPO: &str = "gregmckenzie88/DateSpot-Schema";
pub const DEFAULT_PUBLISH_PATH: &str = "api/schema.js";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Longest description excerpt sent to the categorizer.
pub const CATEGORIZATION_TEXT_LIMIT: usize = 250;

/// Categories the language model is asked to choose from.
pub const EVENT_CATEGORIES: &[&str] = &[
    "Comedy Scene",
    "Trivia & Quiz Nights",
    "Live Music Performances",
    "Theatre Productions",
    "Dance Classes & Socials",
    "Museum Exhibitions",
    "Camps & Kids Programs",
    "Farmers Markets & Food Markets",
    "Movie Screenings",
    "Fitness",
    "Walking & Bus Tours",
    "Interactive Dining Experiences",
    "Escape Rooms & Immersive Games",
    "Cultural Festivals",
    "Craft Workshops",
    "Sports Leagues & Activities",
    "Drag & Cabaret Shows",
    "Language & Cultural Exchange",
    "Professional Networking",
    "Seniors Programs",
    "Art Gallery Openings",
    "Patio & Rooftop Events",
    "Board Game Nights",
];

/// Categories suppressed from the published schema unless configured otherwise.
pub const DEFAULT_EXCLUDED_CATEGORIES: &[&str] = &["Camps & Kids Programs", "Seniors Programs"];
