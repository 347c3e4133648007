//! Inbound message routing and the response-trigger policy.

use crate::agent::debounce::ChannelDebouncer;
use crate::agent::relay::PrivilegedRelay;
use crate::config::TriggerMode;
use crate::{BotDeps, ChannelId, InboundMessage};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Last time the bot replied in each channel.
#[derive(Debug, Clone, Default)]
pub struct ConversationActivity {
    last_reply: Arc<Mutex<HashMap<ChannelId, Instant>>>,
}

impl ConversationActivity {
    pub fn record_reply(&self, channel_id: ChannelId) {
        self.last_reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id, Instant::now());
    }

    /// Whether the bot replied in the channel within `window`. Replies
    /// older than `window` are forgotten.
    pub fn is_active(&self, channel_id: ChannelId, window: Duration) -> bool {
        let mut last_reply = self.last_reply.lock().unwrap_or_else(PoisonError::into_inner);
        last_reply.retain(|_, at| at.elapsed() <= window);
        last_reply.contains_key(&channel_id)
    }

    #[cfg(test)]
    fn tracked_channels(&self) -> usize {
        self.last_reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Authored by the bot itself.
    OwnMessage,
    EmptyContent,
    /// Consumed by an operator command.
    Command,
    /// The trigger policy did not fire.
    NotAddressed,
    /// The channel's quiet-period timer was (re)started.
    Debounced,
}

/// Entry point for every inbound platform message.
pub struct InboundRouter {
    deps: BotDeps,
    relay: PrivilegedRelay,
    debouncer: ChannelDebouncer,
    activity: ConversationActivity,
}

impl std::fmt::Debug for InboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRouter")
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl InboundRouter {
    pub fn new(deps: BotDeps, debouncer: ChannelDebouncer, activity: ConversationActivity) -> Self {
        Self {
            relay: PrivilegedRelay::new(deps.clone()),
            deps,
            debouncer,
            activity,
        }
    }

    pub async fn handle(&self, inbound: InboundMessage) -> RouteDecision {
        let message = &inbound.message;

        if self.deps.platform.bot_user_id() == Some(message.author_id) {
            return RouteDecision::OwnMessage;
        }

        tracing::debug!(
            channel_id = message.channel_id,
            author = %message.author_display_name,
            content_len = message.content.len(),
            "inbound message"
        );

        if self.relay.handle(message).await {
            return RouteDecision::Command;
        }

        if message.content.trim().is_empty() {
            return RouteDecision::EmptyContent;
        }

        if !self.should_trigger(&inbound) {
            return RouteDecision::NotAddressed;
        }

        self.debouncer.on_message(message.channel_id);
        RouteDecision::Debounced
    }

    fn should_trigger(&self, inbound: &InboundMessage) -> bool {
        let trigger = &self.deps.settings.trigger;
        match trigger.mode {
            TriggerMode::Always => true,
            TriggerMode::Addressed => {
                let bot_name = trigger.bot_name.to_lowercase();
                inbound.mentions_bot
                    || inbound.replies_to_bot
                    || inbound.is_dm()
                    || (!bot_name.is_empty()
                        && inbound.message.content.to_lowercase().contains(&bot_name))
                    || self
                        .activity
                        .is_active(inbound.message.channel_id, trigger.active_window)
            }
        }
    }

    /// Stop accepting bursts: abort every pending timer.
    pub fn shutdown(&self) {
        self.debouncer.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::debounce::BurstHandler;
    use crate::config::{BotConfig, TriggerConfig};
    use crate::testing::{BOT_ID, FakeLlm, FakePlatform, FakeVoice, deps, message};

    use async_trait::async_trait;

    #[derive(Default)]
    struct CountingHandler {
        bursts: Mutex<Vec<ChannelId>>,
    }

    #[async_trait]
    impl BurstHandler for CountingHandler {
        async fn handle_burst(&self, channel_id: ChannelId) -> crate::Result<()> {
            self.bursts.lock().expect("bursts lock").push(channel_id);
            Ok(())
        }
    }

    async fn router(mode: TriggerMode) -> (InboundRouter, ConversationActivity, Arc<FakePlatform>) {
        let platform = Arc::new(FakePlatform::gotham());
        let settings = BotConfig {
            privileged_users: vec![7],
            trigger: TriggerConfig {
                mode,
                ..Default::default()
            },
            ..Default::default()
        };
        let deps = deps(
            platform.clone(),
            Arc::new(FakeLlm::replying("unused")),
            Arc::new(FakeVoice::default()),
            settings,
        )
        .await;
        let debouncer = ChannelDebouncer::new(
            Arc::new(CountingHandler::default()),
            Duration::from_secs(2),
        );
        let activity = ConversationActivity::default();
        (
            InboundRouter::new(deps, debouncer, activity.clone()),
            activity,
            platform,
        )
    }

    fn inbound(author_id: u64, content: &str, guild_id: Option<u64>) -> InboundMessage {
        InboundMessage {
            message: message(1, author_id, "Alice", content, 10, guild_id),
            mentions_bot: false,
            replies_to_bot: false,
        }
    }

    #[tokio::test]
    async fn own_and_empty_messages_are_ignored() {
        let (router, _, _) = router(TriggerMode::Always).await;

        assert_eq!(
            router.handle(inbound(BOT_ID, "hello", Some(1))).await,
            RouteDecision::OwnMessage
        );
        assert_eq!(
            router.handle(inbound(5, "   ", Some(1))).await,
            RouteDecision::EmptyContent
        );
        assert!(!router.debouncer.is_pending(10));
    }

    #[tokio::test]
    async fn always_mode_debounces_every_message() {
        let (router, _, _) = router(TriggerMode::Always).await;

        assert_eq!(
            router.handle(inbound(5, "nice weather", Some(1))).await,
            RouteDecision::Debounced
        );
        assert!(router.debouncer.is_pending(10));
    }

    #[tokio::test]
    async fn commands_short_circuit_the_debouncer() {
        let (router, _, platform) = router(TriggerMode::Always).await;

        assert_eq!(
            router.handle(inbound(7, "!tx 20 hi", Some(1))).await,
            RouteDecision::Command
        );
        assert!(!router.debouncer.is_pending(10));
        assert_eq!(platform.sent_to(20), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn addressed_mode_requires_address() {
        let (router, _, _) = router(TriggerMode::Addressed).await;

        assert_eq!(
            router.handle(inbound(5, "nice weather", Some(1))).await,
            RouteDecision::NotAddressed
        );
        assert_eq!(
            router.handle(inbound(5, "hey BOB, thoughts?", Some(1))).await,
            RouteDecision::Debounced
        );

        let mut mention = inbound(5, "<@900> yo", Some(1));
        mention.mentions_bot = true;
        assert_eq!(router.handle(mention).await, RouteDecision::Debounced);

        let mut reply = inbound(5, "sure", Some(1));
        reply.replies_to_bot = true;
        assert_eq!(router.handle(reply).await, RouteDecision::Debounced);
    }

    #[tokio::test]
    async fn addressed_mode_answers_direct_messages() {
        let (router, _, _) = router(TriggerMode::Addressed).await;
        assert_eq!(
            router.handle(inbound(5, "psst", None)).await,
            RouteDecision::Debounced
        );
    }

    #[tokio::test]
    async fn active_conversation_window_expires() {
        let (router, activity, _) = router(TriggerMode::Addressed).await;
        tokio::time::pause();

        activity.record_reply(10);
        assert_eq!(
            router.handle(inbound(5, "and another thing", Some(1))).await,
            RouteDecision::Debounced
        );

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(
            router.handle(inbound(5, "hello?", Some(1))).await,
            RouteDecision::NotAddressed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_replies_are_forgotten() {
        let activity = ConversationActivity::default();
        let window = Duration::from_secs(120);
        activity.record_reply(10);
        activity.record_reply(11);
        assert!(activity.is_active(11, window));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(!activity.is_active(10, window));
        assert_eq!(activity.tracked_channels(), 0);
    }
}
