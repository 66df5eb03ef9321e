//! Multichain Core - Random-Walk Reputation Protocol
//!
//! Each participant holds only the blocks it produced or received, and
//! estimates the reputation of its peers from the walks it performs over
//! that partial view:
//! 1. **Walk**: hop between known identities, exchanging blocks and identities
//! 2. **Teleport**: restart at the origin with a fixed probability per step
//! 3. **Rank**: score peers by how often the walk visited them

pub mod node;
pub mod ranking;
pub mod walk;

// Re-export key types for convenience
pub use node::{Exchange, Intent, Message, Node};
pub use ranking::{ordering_agreement, ranking_deviation, visit_ranking};
pub use walk::{choose_hop, WalkConfig, WalkConfigError, WalkState};
