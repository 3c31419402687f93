pub mod client;
pub mod gateway;
pub mod messages;
pub mod mock;

use crate::common::env::AURIGA_MOCK_PBS;

pub use client::{PbsConnector, SchedulerClient, SchedulerConnector};
pub use gateway::{Gateway, SubmitSpec};
pub use mock::MockConnector;

/// Returns true when mock mode is enabled via the environment.
pub fn is_mock_mode() -> bool {
    std::env::var(AURIGA_MOCK_PBS)
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
