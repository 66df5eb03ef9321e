//! The closed set of events the scheduler dispatches.

use multichain_core::Message;
use multichain_env::Identity;
use serde::{Deserialize, Serialize};

/// A scheduled action.
///
/// Node events carry the identity of the node whose handler runs.
/// Message receipts come only from routing, and measurement events only
/// from the run loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `take_walk_step` on `node`
    WalkStep { node: Identity },

    /// `update_ranking` on `node`
    RankingUpdate { node: Identity },

    /// Delivery of `message` from `sender` to `target`
    MessageReceipt {
        sender: Identity,
        target: Identity,
        message: Message,
    },

    /// Measurement pass reflecting every event up to `time`
    Checkpoint { time: u64 },

    /// Terminal measurement pass
    Final,
}

impl Event {
    /// Short label for logs and traces.
    pub fn label(&self) -> &'static str {
        match self {
            Event::WalkStep { .. } => "walk_step",
            Event::RankingUpdate { .. } => "ranking_update",
            Event::MessageReceipt { message, .. } => match message {
                Message::ExchangeRequest(_) => "request_receipt",
                Message::ExchangeReply(_) => "reply_receipt",
            },
            Event::Checkpoint { .. } => "checkpoint",
            Event::Final => "final",
        }
    }

    /// Node whose handler this event runs, if any.
    pub fn node(&self) -> Option<Identity> {
        match self {
            Event::WalkStep { node } | Event::RankingUpdate { node } => Some(*node),
            Event::MessageReceipt { target, .. } => Some(*target),
            Event::Checkpoint { .. } | Event::Final => None,
        }
    }
}

/// One dispatched event, as recorded when tracing is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub time: u64,
    pub seq: u64,
    pub label: String,
    pub node: Option<Identity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use multichain_core::Exchange;

    #[test]
    fn test_labels_and_targets() {
        let a = Identity::from_seed(1);
        let b = Identity::from_seed(2);
        let receipt = Event::MessageReceipt {
            sender: a,
            target: b,
            message: Message::ExchangeReply(Exchange {
                identities: vec![a],
                blocks: Vec::new(),
            }),
        };

        assert_eq!(receipt.label(), "reply_receipt");
        let request = Event::MessageReceipt {
            sender: b,
            target: a,
            message: Message::ExchangeRequest(Exchange {
                identities: Vec::new(),
                blocks: Vec::new(),
            }),
        };
        assert_eq!(request.label(), "request_receipt");
        assert_eq!(receipt.node(), Some(b));
        assert_eq!(Event::WalkStep { node: a }.node(), Some(a));
        assert_eq!(Event::Checkpoint { time: 5 }.node(), None);
    }
}
