//! Inbound message handling: routing, burst coalescing, and reply dispatch.

pub mod debounce;
pub mod dispatch;
pub mod inbound;
pub mod relay;

pub use debounce::{BurstHandler, ChannelDebouncer};
pub use dispatch::{DispatchOutcome, ResponseDispatcher};
pub use inbound::{ConversationActivity, InboundRouter};
pub use relay::{PrivilegedRelay, RelayCommand};
