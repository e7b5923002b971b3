pub mod hub;

pub use hub::{HubStats, JoinRejection, Membership, Outbound, RelayHub};
