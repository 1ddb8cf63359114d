// Concrete comment engines

pub mod api;
pub mod chrome;
pub mod dom;
pub mod extract;
pub mod youtube_api;

pub use api::ApiEngine;
pub use chrome::{ChromeLauncher, ChromeSession};
pub use dom::DomEngine;
pub use youtube_api::{PageRequest, YouTubeDataClient};
