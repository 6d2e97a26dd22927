//! Browser automation of the external audio/video generation service.

pub mod driver;
pub mod error;
pub mod markers;
pub mod retry;
pub mod webdriver;

pub use driver::{FetchedArtifact, SessionDriver};
pub use error::AutomationError;
pub use markers::{GenerationMarkers, Selector, UiMarkers};
pub use retry::{OperationCost, RetryConfig, RetryPolicy, RetrySupervisor};
pub use webdriver::WebDriverSession;
