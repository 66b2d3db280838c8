//! Hub configuration

use std::time::Duration;

use tidings_transport::DEFAULT_SOCKET_BUFFER;

/// Tidings hub configuration
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Address advertised to peers for client connections
    pub client_address: String,
    /// Address advertised to peers for server connections
    pub server_address: String,
    /// Period of heartbeats to peers
    pub heartbeat_interval: Duration,
    /// Period of the rumor sender retry
    pub rumor_interval: Duration,
    /// Period of rumor_state queries to peers
    pub rumor_state_interval: Duration,
    /// Buffered messages that trigger a rumor
    pub rumor_threshold: usize,
    /// Frames queued per connection before sends fail
    pub socket_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            client_address: "ws://127.0.0.1:9000/client".to_string(),
            server_address: "ws://127.0.0.1:9001/server".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            rumor_interval: Duration::from_secs(5),
            rumor_state_interval: Duration::from_secs(10),
            rumor_threshold: 1,
            socket_buffer: DEFAULT_SOCKET_BUFFER,
        }
    }
}

impl HubConfig {
    pub fn with_addresses(
        mut self,
        client_address: impl Into<String>,
        server_address: impl Into<String>,
    ) -> Self {
        self.client_address = client_address.into();
        self.server_address = server_address.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_rumor_interval(mut self, interval: Duration) -> Self {
        self.rumor_interval = interval;
        self
    }

    pub fn with_rumor_state_interval(mut self, interval: Duration) -> Self {
        self.rumor_state_interval = interval;
        self
    }

    /// Thresholds below 1 are raised to 1
    pub fn with_rumor_threshold(mut self, threshold: usize) -> Self {
        self.rumor_threshold = threshold.max(1);
        self
    }

    pub fn with_socket_buffer(mut self, frames: usize) -> Self {
        self.socket_buffer = frames;
        self
    }
}
