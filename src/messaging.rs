//! Chat platform seam and the Discord adapter.

pub mod discord;
pub mod traits;

pub use discord::{DiscordHandler, DiscordPlatform};
pub use traits::{ChatPlatform, split_message};
