//! Common test utilities, fixtures, and mocks shared by the integration tests.
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use std::sync::Arc;

use rusty_tts::config::VoiceTimings;
use rusty_tts::voice::{ConnectionManager, VoiceGateway};

/// Common test setup and utilities
pub mod test_utils {
    use std::sync::Once;
    use tracing::Level;

    static INIT: Once = Once::new();

    /// Initialize tracing once per test binary
    pub fn init() {
        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_max_level(Level::DEBUG)
                .with_test_writer()
                .init();
        });
    }
}

/// A connection manager over `gateway` using the default timings.
pub fn manager(gateway: Arc<impl VoiceGateway + 'static>) -> ConnectionManager {
    ConnectionManager::new(gateway, &VoiceTimings::default())
}
