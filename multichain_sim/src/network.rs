//! Simulated network: per-message connection delay and delivery accounting.

use crate::context::SimContext;
use std::ops::RangeInclusive;

/// Default connection delay range, in logical time units.
pub const DEFAULT_CONNECTION_DELAY: RangeInclusive<u64> = 100..=500;

/// Latency model and traffic counters for routed messages.
///
/// Every inter-node message draws a fresh delay, uniform over the
/// connection delay range. There is no loss and no reordering beyond what
/// the random delays produce.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    /// Connection delay range (inclusive)
    connection_delay: RangeInclusive<u64>,

    /// Messages handed to the network
    messages_sent: u64,

    /// Messages delivered to their target
    messages_delivered: u64,
}

impl SimNetwork {
    /// Creates a network with the given connection delay range.
    pub fn new(connection_delay: RangeInclusive<u64>) -> Self {
        Self {
            connection_delay,
            messages_sent: 0,
            messages_delivered: 0,
        }
    }

    /// Accepts a message and returns its delivery delay.
    pub fn route(&mut self, context: &mut SimContext) -> u64 {
        self.messages_sent += 1;
        context.uniform(&self.connection_delay)
    }

    /// Records that a routed message reached its target.
    pub fn record_delivery(&mut self) {
        self.messages_delivered += 1;
    }

    /// Returns the total number of messages sent.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Returns the total number of messages delivered.
    pub fn messages_delivered(&self) -> u64 {
        self.messages_delivered
    }

    /// Messages sent but not delivered (still queued or abandoned at the horizon).
    pub fn in_flight(&self) -> u64 {
        self.messages_sent.saturating_sub(self.messages_delivered)
    }
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_draws_delay_in_range() {
        let mut context = SimContext::new(42);
        let mut network = SimNetwork::default();

        for _ in 0..100 {
            let delay = network.route(&mut context);
            assert!(DEFAULT_CONNECTION_DELAY.contains(&delay));
        }
        assert_eq!(network.messages_sent(), 100);
        assert_eq!(network.in_flight(), 100);
    }

    #[test]
    fn test_delivery_accounting() {
        let mut context = SimContext::new(1);
        let mut network = SimNetwork::new(5..=5);

        assert_eq!(network.route(&mut context), 5);
        network.record_delivery();
        assert_eq!(network.messages_delivered(), 1);
        assert_eq!(network.in_flight(), 0);
    }

    #[test]
    fn test_in_flight_never_underflows() {
        let mut network = SimNetwork::default();
        network.record_delivery();
        assert_eq!(network.messages_sent(), 0);
        assert_eq!(network.in_flight(), 0);
    }
}
