// Enforcement coordinator - runs a message through lookup, bypass,
// classification and evaluation, then applies the verdict.
//
// This service handles:
// - Config lookup (timeout-bounded, fails open)
// - Bypass checks for admins and bypass roles
// - Deleting offending messages, silently or with a redirect notice
//
// It only talks to the outside world through `ConfigStore`,
// `BypassRoleStore` and `MessageSink`, so tests drive it with fakes.

use super::bypass::BypassResolver;
use super::classifier::ContentClassifier;
use super::content_types::ContentTypes;
use super::policy::PolicyEvaluator;
use super::restriction_models::{
    Action, AuthorRoles, IncomingMessage, RestrictionConfig, Verdict, ViolationKind,
};
use super::restriction_store::{BypassRoleStore, ConfigStore};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementSettings {
    /// Upper bound for config and bypass-role reads
    pub lookup_timeout: Duration,
    /// Upper bound for each sink call (role fetch, delete, notice)
    pub action_timeout: Duration,
    /// How long a redirect notice stays visible
    pub notice_ttl: Duration,
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(2),
            action_timeout: Duration::from_secs(5),
            notice_ttl: Duration::from_secs(15),
        }
    }
}

// ============================================================================
// SINK (PORT)
// ============================================================================

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Missing permissions: {0}")]
    Forbidden(String),

    #[error("Message or channel not found")]
    NotFound,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gateway error: {0}")]
    Gateway(String),
}

/// Outbound side of the chat gateway.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), SinkError>;

    /// Post `text` in `channel_id` and remove it again after `ttl`.
    async fn send_notice(&self, channel_id: u64, text: &str, ttl: Duration)
        -> Result<(), SinkError>;

    async fn get_author_roles(&self, message: &IncomingMessage) -> Result<AuthorRoles, SinkError>;
}

/// Which sink call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStage {
    Delete,
    Notice,
}

impl std::fmt::Display for SinkStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkStage::Delete => write!(f, "delete message"),
            SinkStage::Notice => write!(f, "send notice"),
        }
    }
}

/// Only sink failures escape `handle`. Lookup problems fail open instead.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Failed to {stage} while applying `{action}`: {source}")]
    Sink {
        action: Action,
        stage: SinkStage,
        #[source]
        source: SinkError,
    },
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for everything the pipeline decides or swallows.
#[derive(Debug, Default)]
pub struct EnforcementMetrics {
    checked: AtomicU64,
    exempt: AtomicU64,
    permitted: AtomicU64,
    violations: AtomicU64,
    silent_deletions: AtomicU64,
    redirects: AtomicU64,
    lookup_failures: AtomicU64,
    lookup_timeouts: AtomicU64,
    bypass_failures: AtomicU64,
    malformed_configs: AtomicU64,
    sink_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub checked: u64,
    pub exempt: u64,
    pub permitted: u64,
    pub violations: u64,
    pub silent_deletions: u64,
    pub redirects: u64,
    pub lookup_failures: u64,
    pub lookup_timeouts: u64,
    pub bypass_failures: u64,
    pub malformed_configs: u64,
    pub sink_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EnforcementMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            checked: read(&self.checked),
            exempt: read(&self.exempt),
            permitted: read(&self.permitted),
            violations: read(&self.violations),
            silent_deletions: read(&self.silent_deletions),
            redirects: read(&self.redirects),
            lookup_failures: read(&self.lookup_failures),
            lookup_timeouts: read(&self.lookup_timeouts),
            bypass_failures: read(&self.bypass_failures),
            malformed_configs: read(&self.malformed_configs),
            sink_failures: read(&self.sink_failures),
        }
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Outcome of the author bypass check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthorCheck {
    Exempt,
    NotExempt,
    /// Role fetch or bypass lookup failed, so the message is let through.
    Unchecked,
}

pub struct EnforcementCoordinator<C: ConfigStore, B: BypassRoleStore, K: MessageSink> {
    config_store: C,
    bypass: BypassResolver<B>,
    sink: K,
    classifier: ContentClassifier,
    evaluator: PolicyEvaluator,
    settings: EnforcementSettings,
    metrics: EnforcementMetrics,
}

impl<C: ConfigStore, B: BypassRoleStore, K: MessageSink> EnforcementCoordinator<C, B, K> {
    pub fn new(
        config_store: C,
        bypass_store: B,
        sink: K,
        settings: EnforcementSettings,
    ) -> Self {
        Self {
            config_store,
            bypass: BypassResolver::new(bypass_store),
            sink,
            classifier: ContentClassifier::new(),
            evaluator: PolicyEvaluator::new(),
            settings,
            metrics: EnforcementMetrics::default(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Decide and apply the action for one new message.
    ///
    /// Infrastructure trouble before the verdict (store down, slow role
    /// fetch, corrupt config) permits the message. Sink failures after a
    /// violation are returned so operators see permission problems.
    pub async fn handle(&self, message: &IncomingMessage) -> Result<Action, EnforcementError> {
        bump(&self.metrics.checked);

        let Some(config) = self.load_config(message.channel_id).await else {
            return Ok(Action::None);
        };

        match self.check_author(message).await {
            AuthorCheck::Exempt => {
                bump(&self.metrics.exempt);
                return Ok(Action::None);
            }
            // Already counted under `bypass_failures`.
            AuthorCheck::Unchecked => return Ok(Action::None),
            AuthorCheck::NotExempt => {}
        }

        let classified = self.classifier.classify(message);
        match self.evaluator.evaluate(classified.content, &config) {
            Verdict::Permit => {
                bump(&self.metrics.permitted);
                Ok(Action::None)
            }
            Verdict::Violation { kind, offending } => {
                bump(&self.metrics.violations);
                tracing::debug!(
                    guild_id = message.guild_id,
                    channel_id = message.channel_id,
                    message_id = message.message_id,
                    content = %classified.content,
                    offending = %offending,
                    ?kind,
                    "Message violates channel restriction"
                );
                self.enforce(message, &config, kind, offending).await
            }
        }
    }

    /// `None` means "not restricted", whatever the reason.
    async fn load_config(&self, channel_id: u64) -> Option<RestrictionConfig> {
        let lookup = timeout(
            self.settings.lookup_timeout,
            self.config_store.get_restriction(channel_id),
        )
        .await;

        let record = match lookup {
            Ok(Ok(record)) => record?,
            Ok(Err(e)) => {
                bump(&self.metrics.lookup_failures);
                tracing::warn!(channel_id, error = %e, "Restriction lookup failed, permitting message");
                return None;
            }
            Err(_) => {
                bump(&self.metrics.lookup_timeouts);
                tracing::warn!(
                    channel_id,
                    timeout_ms = self.settings.lookup_timeout.as_millis() as u64,
                    "Restriction lookup timed out, permitting message"
                );
                return None;
            }
        };

        match RestrictionConfig::try_from(record) {
            Ok(config) => Some(config),
            Err(e) => {
                bump(&self.metrics.malformed_configs);
                tracing::warn!(
                    channel_id,
                    error = %e,
                    "Ignoring malformed restriction, clear it with /restrict remove"
                );
                None
            }
        }
    }

    /// Anything but `NotExempt` skips enforcement.
    async fn check_author(&self, message: &IncomingMessage) -> AuthorCheck {
        let roles = match timeout(
            self.settings.action_timeout,
            self.sink.get_author_roles(message),
        )
        .await
        {
            Ok(Ok(roles)) => roles,
            Ok(Err(e)) => {
                bump(&self.metrics.bypass_failures);
                tracing::warn!(
                    guild_id = message.guild_id,
                    author_id = message.author_id,
                    error = %e,
                    "Could not fetch author roles, permitting message"
                );
                return AuthorCheck::Unchecked;
            }
            Err(_) => {
                bump(&self.metrics.bypass_failures);
                tracing::warn!(
                    guild_id = message.guild_id,
                    author_id = message.author_id,
                    "Author role fetch timed out, permitting message"
                );
                return AuthorCheck::Unchecked;
            }
        };

        match timeout(
            self.settings.lookup_timeout,
            self.bypass.is_exempt(message.guild_id, &roles),
        )
        .await
        {
            Ok(Ok(true)) => AuthorCheck::Exempt,
            Ok(Ok(false)) => AuthorCheck::NotExempt,
            Ok(Err(e)) => {
                bump(&self.metrics.bypass_failures);
                tracing::warn!(guild_id = message.guild_id, error = %e, "Bypass role lookup failed, permitting message");
                AuthorCheck::Unchecked
            }
            Err(_) => {
                bump(&self.metrics.bypass_failures);
                tracing::warn!(guild_id = message.guild_id, "Bypass role lookup timed out, permitting message");
                AuthorCheck::Unchecked
            }
        }
    }

    async fn enforce(
        &self,
        message: &IncomingMessage,
        config: &RestrictionConfig,
        kind: ViolationKind,
        offending: ContentTypes,
    ) -> Result<Action, EnforcementError> {
        let action = match config.redirect_channel_id() {
            Some(redirect_channel_id) => Action::DeleteAndRedirect {
                redirect_channel_id,
            },
            None => Action::DeleteSilent,
        };

        let deleted = self
            .bounded(
                self.sink
                    .delete_message(message.channel_id, message.message_id),
            )
            .await;
        match deleted {
            Ok(()) => {}
            // Someone else already removed it.
            Err(SinkError::NotFound) => {
                tracing::debug!(message_id = message.message_id, "Message already deleted");
            }
            Err(source) => return Err(self.sink_failure(message, action, SinkStage::Delete, source)),
        }

        let Action::DeleteAndRedirect {
            redirect_channel_id,
        } = action
        else {
            bump(&self.metrics.silent_deletions);
            tracing::info!(
                guild_id = message.guild_id,
                channel_id = message.channel_id,
                author_id = message.author_id,
                offending = %offending,
                "Deleted restricted message"
            );
            return Ok(action);
        };

        let notice = guidance_notice(message.author_id, config, kind, offending, redirect_channel_id);
        self.bounded(
            self.sink
                .send_notice(message.channel_id, &notice, self.settings.notice_ttl),
        )
        .await
        .map_err(|source| self.sink_failure(message, action, SinkStage::Notice, source))?;

        bump(&self.metrics.redirects);
        tracing::info!(
            guild_id = message.guild_id,
            channel_id = message.channel_id,
            author_id = message.author_id,
            redirect_channel_id,
            offending = %offending,
            "Deleted restricted message and posted redirect notice"
        );
        Ok(action)
    }

    async fn bounded<F>(&self, call: F) -> Result<(), SinkError>
    where
        F: Future<Output = Result<(), SinkError>>,
    {
        match timeout(self.settings.action_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.settings.action_timeout)),
        }
    }

    fn sink_failure(
        &self,
        message: &IncomingMessage,
        action: Action,
        stage: SinkStage,
        source: SinkError,
    ) -> EnforcementError {
        bump(&self.metrics.sink_failures);
        tracing::warn!(
            guild_id = message.guild_id,
            channel_id = message.channel_id,
            message_id = message.message_id,
            %stage,
            error = %source,
            "Restriction enforcement failed"
        );
        EnforcementError::Sink {
            action,
            stage,
            source,
        }
    }
}

/// Text of the short-lived notice shown when a redirect channel is set.
pub fn guidance_notice(
    author_id: u64,
    config: &RestrictionConfig,
    kind: ViolationKind,
    offending: ContentTypes,
    redirect_channel_id: u64,
) -> String {
    match kind {
        ViolationKind::Blocked => format!(
            "🚫 <@{}>, this channel doesn't allow **{}**. Please use <#{}> instead.",
            author_id, offending, redirect_channel_id
        ),
        ViolationKind::NotAllowed => format!(
            "🚫 <@{}>, this channel only allows **{}**. Please use <#{}> for other content.",
            author_id,
            config.allowed(),
            redirect_channel_id
        ),
    }
}

// ============================================================================
// TESTS
// ============================================================================
