//! Hub configuration.

use std::time::Duration;

/// Buffer sizes and wait bounds for one hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command channel into the control loop.
    pub command_buffer: usize,
    /// Frames a connection may have queued before it counts as slow.
    pub outbound_buffer: usize,
    /// How long a unicast may wait for room in a full buffer.
    pub send_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            outbound_buffer: 256,
            send_timeout: Duration::from_millis(500),
        }
    }
}

impl HubConfig {
    /// Raise zero capacities to 1; tokio channels reject zero.
    pub fn validated(mut self) -> Self {
        self.command_buffer = self.command_buffer.max(1);
        self.outbound_buffer = self.outbound_buffer.max(1);
        self
    }
}
