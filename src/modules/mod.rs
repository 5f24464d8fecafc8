//! Configurators
//!
//! Each configurator turns one section of the merged config into a sequence
//! of control-plane verbs and reports what it changed.

pub mod network;
pub mod users;

pub use network::{GATEWAY_METRIC, NetworkSummary};
pub use users::{AccountAction, UserSummary};
