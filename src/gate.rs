//! Per-channel reply gating: throttle counters and the decision keeper.

pub mod keeper;
pub mod throttle;

pub use keeper::{DecideContext, Gatekeeper};
pub use throttle::{ChannelState, ChannelThrottle};
