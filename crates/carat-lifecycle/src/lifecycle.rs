//! Session State Machine.
//!
//! Drives a game session through its lifecycle by mutating the platform
//! resources bound to it:
//!
//! ```text
//!            OpenKibitz / CloseKibitz
//!              ┌───────────────┐
//!              ▼               │
//!   Running ◄──► KibitzOpen ───┴──► Ended ──► Archived
//!      ▲          EndGame            │  ArchiveGame
//!      └─────────────────────────────┘  (slot recycled for the next game)
//! ```
//!
//! Every transition is a fixed sequence of platform calls. Calls run in
//! order, each bounded by the configured I/O timeout. A failing call aborts
//! the rest of the transition and the error lists the steps that had
//! already been applied; the one exception is role revocation during
//! EndGame, which is best-effort per member. An ArchiveGame that fails
//! before the original channel leaves its slot deletes the replacement again.
//!
//! Transitions on the same session never overlap: each holds the session's
//! lock end to end. The archive is guarded by one global lock held from the
//! eviction decision through the insertion.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use carat_platform::{
    CategoryId, Channel, ChannelEdit, ChannelId, ChatPlatform, Member, PlatformError, RoleId,
    UserId,
};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::archive::{retired_name, ArchiveEntry, ArchiveStore};
use crate::authorizer::Authorizer;
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::locator::ResourceLocator;
use crate::session::{SessionNumber, SessionRecord, SessionState, SessionTable};
use crate::voting::VotingSessions;

/// Run a platform call under a timeout. Elapsing counts as a failed call.
pub(crate) async fn timed<T, F>(limit: Duration, call: F) -> carat_platform::Result<T>
where
    F: Future<Output = carat_platform::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::Timeout(limit)),
    }
}

/// The privileged lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    OpenKibitz,
    CloseKibitz,
    EndGame,
    ArchiveGame,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenKibitz => write!(f, "OpenKibitz"),
            Self::CloseKibitz => write!(f, "CloseKibitz"),
            Self::EndGame => write!(f, "EndGame"),
            Self::ArchiveGame => write!(f, "ArchiveGame"),
        }
    }
}

/// Individual steps of the composite transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    PostNotice,
    CollectMembers,
    RevokeRoles,
    DiscardVotes,
    OpenKibitzChannel,
    CloseKibitzChannel,
    CaptureSlot,
    CloneChannel,
    DiscardClone,
    EvictOldest,
    RetireChannel,
    RestoreSlot,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PostNotice => "post-notice",
            Self::CollectMembers => "collect-members",
            Self::RevokeRoles => "revoke-roles",
            Self::DiscardVotes => "discard-votes",
            Self::OpenKibitzChannel => "open-kibitz-channel",
            Self::CloseKibitzChannel => "close-kibitz-channel",
            Self::CaptureSlot => "capture-slot",
            Self::CloneChannel => "clone-channel",
            Self::DiscardClone => "discard-clone",
            Self::EvictOldest => "evict-oldest",
            Self::RetireChannel => "retire-channel",
            Self::RestoreSlot => "restore-slot",
        };
        f.write_str(name)
    }
}

/// One inbound lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Member who issued the command
    pub actor: UserId,

    /// Game the command targets
    pub session: SessionNumber,

    /// Channel the command was issued in; notices go here when set
    pub reply_channel: Option<ChannelId>,
}

impl Invocation {
    pub fn new(actor: UserId, session: SessionNumber) -> Self {
        Self {
            actor,
            session,
            reply_channel: None,
        }
    }

    /// Post notices in `channel` instead of the game channel.
    #[must_use]
    pub fn replying_in(mut self, channel: ChannelId) -> Self {
        self.reply_channel = Some(channel);
        self
    }
}

/// A role that could not be taken from a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationFailure {
    pub user: UserId,
    pub role: RoleId,
    pub error: String,
}

/// Aggregate result of the EndGame role fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevocationSummary {
    /// Distinct members holding either role
    pub members: usize,
    /// Members stripped of both roles
    pub revoked: usize,
    /// Automated accounts left untouched
    pub skipped_automated: usize,
    pub failures: Vec<RevocationFailure>,
}

/// What a completed transition did.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub operation: Operation,
    pub session: SessionNumber,
    /// State the transition left the game in
    pub state: SessionState,
    /// Generation of the session's channel slot after the transition
    pub generation: u64,
    pub applied: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation: Option<RevocationSummary>,
    pub votes_discarded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evicted: Vec<ArchiveEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<ArchiveEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_channel: Option<ChannelId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Bookkeeping for one running transition.
struct Transition {
    report: TransitionReport,
    io_timeout: Duration,
}

impl Transition {
    fn new(operation: Operation, session: SessionNumber, io_timeout: Duration) -> Self {
        Self {
            report: TransitionReport {
                operation,
                session,
                state: SessionState::Running,
                generation: 0,
                applied: Vec::new(),
                revocation: None,
                votes_discarded: false,
                evicted: Vec::new(),
                archived: None,
                replacement_channel: None,
                warnings: Vec::new(),
            },
            io_timeout,
        }
    }

    fn fail(&self, step: Step, source: PlatformError) -> LifecycleError {
        LifecycleError::Platform {
            operation: self.report.operation,
            session: self.report.session.clone(),
            step,
            applied: self.report.applied.clone(),
            source,
        }
    }

    /// Run a call belonging to `step` without marking the step applied.
    async fn call<T, F>(&self, step: Step, call: F) -> Result<T>
    where
        F: Future<Output = carat_platform::Result<T>>,
    {
        timed(self.io_timeout, call)
            .await
            .map_err(|e| self.fail(step, e))
    }

    fn done(&mut self, step: Step) {
        self.report.applied.push(step);
    }

    /// Record a best-effort failure that does not abort the transition.
    fn warn(&mut self, warning: String) {
        warn!(
            "{} for game {}: {}",
            self.report.operation, self.report.session, warning
        );
        self.report.warnings.push(warning);
    }

    /// Run the single call making up `step` and mark it applied.
    async fn step<T, F>(&mut self, step: Step, call: F) -> Result<T>
    where
        F: Future<Output = carat_platform::Result<T>>,
    {
        let value = self.call(step, call).await?;
        self.done(step);
        Ok(value)
    }
}

/// State after `operation` completes from `current`.
pub fn next_record(operation: Operation, current: SessionRecord) -> SessionRecord {
    let state = match (operation, current.state) {
        (Operation::OpenKibitz | Operation::CloseKibitz, SessionState::Ended) => SessionState::Ended,
        (Operation::OpenKibitz, _) => SessionState::KibitzOpen,
        (Operation::CloseKibitz, _) => SessionState::Running,
        (Operation::EndGame, _) => SessionState::Ended,
        (Operation::ArchiveGame, _) => {
            return SessionRecord {
                state: SessionState::Running,
                generation: current.generation + 1,
            }
        }
    };
    SessionRecord { state, ..current }
}

/// Whether `operation` may start from `state`.
pub fn transition_allowed(operation: Operation, state: SessionState) -> bool {
    match operation {
        Operation::OpenKibitz | Operation::CloseKibitz | Operation::EndGame => {
            state != SessionState::Archived
        }
        Operation::ArchiveGame => state == SessionState::Ended,
    }
}

/// The lifecycle manager.
pub struct Lifecycle {
    platform: Arc<dyn ChatPlatform>,
    locator: Arc<ResourceLocator>,
    authorizer: Authorizer,
    voting: Option<Arc<dyn VotingSessions>>,
    archive: Mutex<Option<ArchiveStore>>,
    sessions: SessionTable,
    config: LifecycleConfig,
}

impl Lifecycle {
    /// Create a lifecycle manager over `platform`.
    pub fn new(platform: Arc<dyn ChatPlatform>, config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        let locator = Arc::new(ResourceLocator::new(Arc::clone(&platform), &config));
        let authorizer = Authorizer::new(
            Arc::clone(&platform),
            Arc::clone(&locator),
            config.io_timeout,
        );
        Ok(Self {
            platform,
            locator,
            authorizer,
            voting: None,
            archive: Mutex::new(None),
            sessions: SessionTable::new(),
            config,
        })
    }

    /// Attach the voting subsystem notified on EndGame.
    #[must_use]
    pub fn with_voting(mut self, voting: Arc<dyn VotingSessions>) -> Self {
        self.voting = Some(voting);
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Build the resource index and load the archive from the platform.
    pub async fn hydrate(&self) -> Result<()> {
        self.locator.refresh().await?;
        match self.locator.known_archive_category().await {
            Some(category) => {
                let listing = timed(self.config.io_timeout, self.platform.category_channels(category))
                    .await
                    .map_err(LifecycleError::Catalog)?;
                let store = ArchiveStore::from_listing(
                    self.config.archive_capacity,
                    &listing,
                    self.locator.naming(),
                );
                info!(
                    "Archive loaded: {} of {} slots used",
                    store.len(),
                    store.capacity()
                );
                *self.archive.lock().await = Some(store);
            }
            None => warn!(
                "Archive category {:?} not found; ArchiveGame will fail until it exists",
                self.config.archive_category
            ),
        }
        Ok(())
    }

    /// Make the kibitz channel visible to everyone.
    pub async fn open_kibitz(&self, invocation: &Invocation) -> Result<TransitionReport> {
        self.execute(Operation::OpenKibitz, invocation).await
    }

    /// Hide the kibitz channel from the public.
    pub async fn close_kibitz(&self, invocation: &Invocation) -> Result<TransitionReport> {
        self.execute(Operation::CloseKibitz, invocation).await
    }

    /// Strip game roles, drop vote state and open kibitz.
    pub async fn end_game(&self, invocation: &Invocation) -> Result<TransitionReport> {
        self.execute(Operation::EndGame, invocation).await
    }

    /// Retire the game channel and recycle its slot for the next game.
    pub async fn archive_game(&self, invocation: &Invocation) -> Result<TransitionReport> {
        self.execute(Operation::ArchiveGame, invocation).await
    }

    /// Run `operation`, then audit and notify regardless of outcome.
    pub async fn execute(
        &self,
        operation: Operation,
        invocation: &Invocation,
    ) -> Result<TransitionReport> {
        let result = self.run(operation, invocation).await;

        let actor = invocation.actor;
        let session = &invocation.session;
        match &result {
            Ok(report) => info!(
                target: "carat::audit",
                %actor, %operation, %session, state = %report.state,
                "{} completed", operation
            ),
            Err(e) if e.is_denied() => warn!(
                target: "carat::audit",
                %actor, %operation, %session,
                "{} denied", operation
            ),
            Err(e) => error!(
                target: "carat::audit",
                %actor, %operation, %session, error = %e,
                "{} failed", operation
            ),
        }

        if let Err(e) = &result {
            self.notify_actor(operation, invocation, e).await;
        }
        self.mirror_audit(operation, invocation).await;
        result
    }

    /// Cached or derived lifecycle state of a session.
    pub async fn session_state(&self, session: &SessionNumber) -> Result<SessionRecord> {
        self.current_record(session).await
    }

    /// Every session seen so far with its cached record.
    pub async fn session_records(&self) -> Vec<(SessionNumber, SessionRecord)> {
        self.sessions.records().await
    }

    /// Archive contents, oldest first. Empty until the archive is loaded.
    pub async fn archive_entries(&self) -> Vec<ArchiveEntry> {
        self.archive
            .lock()
            .await
            .as_ref()
            .map(|store| store.entries().cloned().collect())
            .unwrap_or_default()
    }

    async fn run(&self, operation: Operation, invocation: &Invocation) -> Result<TransitionReport> {
        let session = &invocation.session;
        if !self.authorizer.authorize(invocation.actor, session).await {
            return Err(LifecycleError::AuthorizationDenied {
                actor: invocation.actor,
                session: session.clone(),
            });
        }

        let _guard = self.sessions.lock(session).await;
        let record = self.current_record(session).await?;
        if self.config.enforce_ordering && !transition_allowed(operation, record.state) {
            return Err(LifecycleError::InvalidTransition {
                operation,
                session: session.clone(),
                state: record.state,
            });
        }

        let mut tx = Transition::new(operation, session.clone(), self.config.io_timeout);
        let outcome = match operation {
            Operation::OpenKibitz => self.run_open_kibitz(&mut tx, invocation).await,
            Operation::CloseKibitz => self.run_close_kibitz(&mut tx, invocation).await,
            Operation::EndGame => self.run_end_game(&mut tx, invocation).await,
            Operation::ArchiveGame => self.run_archive_game(&mut tx, invocation).await,
        };
        if let Err(e) = outcome {
            if matches!(e, LifecycleError::Platform { .. }) {
                // Names or ids may have moved under us; re-read on next use.
                self.locator.invalidate().await;
            }
            return Err(e);
        }

        let next = next_record(operation, record);
        self.sessions.set(session, next).await;

        let mut report = tx.report;
        report.state = match operation {
            Operation::ArchiveGame => SessionState::Archived,
            _ => next.state,
        };
        report.generation = next.generation;
        Ok(report)
    }

    async fn current_record(&self, session: &SessionNumber) -> Result<SessionRecord> {
        if let Some(record) = self.sessions.record(session).await {
            return Ok(record);
        }
        let record = SessionRecord::new(self.derive_state(session).await?);
        debug!("Game {} first seen in state {}", session, record.state);
        self.sessions.set(session, record).await;
        Ok(record)
    }

    /// Reconstruct a state from the resources alone: public kibitz with no
    /// human players left means the game ended, public kibitz otherwise
    /// means it was opened early.
    async fn derive_state(&self, session: &SessionNumber) -> Result<SessionState> {
        let kibitz = self.locator.kibitz_channel(session).await?;
        let public = timed(
            self.config.io_timeout,
            self.platform.view_permission(kibitz, self.platform.default_role()),
        )
        .await
        .map_err(LifecycleError::Catalog)?;
        if public != Some(true) {
            return Ok(SessionState::Running);
        }

        let player_role = self.locator.player_role(session).await?;
        let holders = timed(self.config.io_timeout, self.platform.role_members(player_role))
            .await
            .map_err(LifecycleError::Catalog)?;
        if holders.iter().any(|m| !m.bot) {
            Ok(SessionState::KibitzOpen)
        } else {
            Ok(SessionState::Ended)
        }
    }

    async fn notice_channel(&self, invocation: &Invocation) -> Result<ChannelId> {
        match invocation.reply_channel {
            Some(channel) => Ok(channel),
            None => self.locator.game_channel(&invocation.session).await,
        }
    }

    fn kibitz_notice(&self, player_role: RoleId, remove_role_hint: bool) -> String {
        let hint = if remove_role_hint {
            " - remove your game role to access it"
        } else {
            ""
        };
        format!(
            "{} Kibitz is now being opened{}. Remember to give your ST(s) any feedback you may have!\nFeedback form: {}",
            player_role.mention(),
            hint,
            self.config.feedback_form_url
        )
    }

    async fn run_open_kibitz(&self, tx: &mut Transition, invocation: &Invocation) -> Result<()> {
        let session = &invocation.session;
        let kibitz = self.locator.kibitz_channel(session).await?;
        let player_role = self.locator.player_role(session).await?;
        let notice_channel = self.notice_channel(invocation).await?;
        let everyone = self.platform.default_role();

        tx.step(
            Step::OpenKibitzChannel,
            self.platform.set_view_permission(kibitz, everyone, true),
        )
        .await?;
        let notice = self.kibitz_notice(player_role, true);
        tx.step(Step::PostNotice, self.platform.send_message(notice_channel, &notice))
            .await?;
        Ok(())
    }

    async fn run_close_kibitz(&self, tx: &mut Transition, invocation: &Invocation) -> Result<()> {
        let kibitz = self.locator.kibitz_channel(&invocation.session).await?;
        let everyone = self.platform.default_role();

        tx.step(
            Step::CloseKibitzChannel,
            self.platform.set_view_permission(kibitz, everyone, false),
        )
        .await?;
        Ok(())
    }

    async fn run_end_game(&self, tx: &mut Transition, invocation: &Invocation) -> Result<()> {
        let session = &invocation.session;
        let kibitz = self.locator.kibitz_channel(session).await?;
        let player_role = self.locator.player_role(session).await?;
        let spectator_role = self.locator.spectator_role(session).await?;
        let notice_channel = self.notice_channel(invocation).await?;
        let everyone = self.platform.default_role();

        let notice = self.kibitz_notice(player_role, false);
        tx.step(Step::PostNotice, self.platform.send_message(notice_channel, &notice))
            .await?;

        let players = tx
            .call(Step::CollectMembers, self.platform.role_members(player_role))
            .await?;
        let spectators = tx
            .call(Step::CollectMembers, self.platform.role_members(spectator_role))
            .await?;
        tx.done(Step::CollectMembers);

        let mut members: BTreeMap<UserId, Member> = BTreeMap::new();
        for member in players.into_iter().chain(spectators) {
            members.entry(member.id).or_insert(member);
        }

        let summary = self
            .revoke_roles(members.into_values().collect(), spectator_role, player_role)
            .await;
        if summary.failures.is_empty() {
            info!(
                "EndGame for game {}: stripped roles from {} member(s), skipped {} bot(s)",
                session, summary.revoked, summary.skipped_automated
            );
        } else {
            warn!(
                "EndGame for game {}: stripped roles from {} of {} member(s), {} revocation(s) failed",
                session,
                summary.revoked,
                summary.members - summary.skipped_automated,
                summary.failures.len()
            );
            for failure in &summary.failures {
                debug!(
                    "  could not remove role {} from {}: {}",
                    failure.role, failure.user, failure.error
                );
            }
        }
        tx.report.revocation = Some(summary);
        tx.done(Step::RevokeRoles);

        self.discard_votes(tx, session).await;

        tx.step(
            Step::OpenKibitzChannel,
            self.platform.set_view_permission(kibitz, everyone, true),
        )
        .await?;
        Ok(())
    }

    /// Hand the ended game to the voting subsystem. Every call is bounded by
    /// the I/O timeout and failures become report warnings.
    async fn discard_votes(&self, tx: &mut Transition, session: &SessionNumber) {
        let Some(voting) = &self.voting else {
            return;
        };
        let limit = self.config.io_timeout;

        match tokio::time::timeout(limit, voting.has_session(session)).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(_) => {
                tx.warn(format!("voting subsystem did not answer within {:?}", limit));
                return;
            }
        }
        match tokio::time::timeout(limit, voting.discard_session(session)).await {
            Ok(discarded) => tx.report.votes_discarded = discarded,
            Err(_) => tx.warn(format!("discarding votes timed out after {:?}", limit)),
        }
        match tokio::time::timeout(limit, voting.persist()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tx.warn(e.to_string()),
            Err(_) => tx.warn(format!("persisting votes timed out after {:?}", limit)),
        }
        tx.done(Step::DiscardVotes);
    }

    /// Take both roles from every human member. Failures are collected, not
    /// propagated; one member failing does not stop the others.
    async fn revoke_roles(
        &self,
        members: Vec<Member>,
        spectator_role: RoleId,
        player_role: RoleId,
    ) -> RevocationSummary {
        let mut summary = RevocationSummary {
            members: members.len(),
            ..Default::default()
        };
        let (automated, humans): (Vec<Member>, Vec<Member>) =
            members.into_iter().partition(|m| m.bot);
        summary.skipped_automated = automated.len();

        let outcomes = join_all(
            humans
                .iter()
                .map(|m| self.revoke_member(m.id, spectator_role, player_role)),
        )
        .await;

        for failures in outcomes {
            if failures.is_empty() {
                summary.revoked += 1;
            } else {
                summary.failures.extend(failures);
            }
        }
        summary
    }

    async fn revoke_member(
        &self,
        user: UserId,
        spectator_role: RoleId,
        player_role: RoleId,
    ) -> Vec<RevocationFailure> {
        let mut failures = Vec::new();
        for role in [spectator_role, player_role] {
            if let Err(e) = timed(self.config.io_timeout, self.platform.remove_role(user, role)).await {
                failures.push(RevocationFailure {
                    user,
                    role,
                    error: e.to_string(),
                });
            }
        }
        failures
    }

    async fn run_archive_game(&self, tx: &mut Transition, invocation: &Invocation) -> Result<()> {
        let session = &invocation.session;
        let game = self.locator.game_channel(session).await?;
        let kibitz = self.locator.kibitz_channel(session).await?;
        let archive_category = self.locator.archive_category(session).await?;
        let everyone = self.platform.default_role();

        let original = tx.step(Step::CaptureSlot, self.platform.channel(game)).await?;
        let replacement = tx
            .step(Step::CloneChannel, self.platform.clone_channel(game, "New Game"))
            .await?;
        tx.report.replacement_channel = Some(replacement.id);

        let retired = self
            .retire_original(tx, session, game, &original, archive_category)
            .await;
        if let Err(mut e) = retired {
            // Until the original leaves the slot the clone is a second
            // channel answering to the same game number.
            if !tx.report.applied.contains(&Step::RetireChannel) {
                self.discard_clone(tx, session, replacement.id, &mut e).await;
            }
            return Err(e);
        }

        let name = self.locator.naming().game_channel_name(session);
        tx.step(
            Step::RestoreSlot,
            self.platform.edit_channel(
                replacement.id,
                ChannelEdit::new()
                    .position(original.position)
                    .name(name)
                    .topic(""),
            ),
        )
        .await?;
        self.locator.rebind_game_channel(session, replacement.id).await;

        tx.step(
            Step::CloseKibitzChannel,
            self.platform.set_view_permission(kibitz, everyone, false),
        )
        .await?;
        Ok(())
    }

    /// Make room in the archive and move the original channel into it, all
    /// under the archive lock.
    async fn retire_original(
        &self,
        tx: &mut Transition,
        session: &SessionNumber,
        game: ChannelId,
        original: &Channel,
        archive_category: CategoryId,
    ) -> Result<()> {
        let mut archive = self.archive.lock().await;
        let store = match archive.take() {
            Some(store) => store,
            None => {
                let listing = tx
                    .call(
                        Step::EvictOldest,
                        self.platform.category_channels(archive_category),
                    )
                    .await?;
                ArchiveStore::from_listing(
                    self.config.archive_capacity,
                    &listing,
                    self.locator.naming(),
                )
            }
        };
        let store = archive.insert(store);

        // Make room before inserting so the category never overflows.
        while store.is_full() {
            let Some(oldest) = store.oldest().cloned() else {
                break;
            };
            match timed(self.config.io_timeout, self.platform.delete_channel(oldest.channel)).await {
                Ok(()) => {}
                Err(PlatformError::NotFound { .. }) => {
                    debug!("Archived channel {} already gone", oldest.channel);
                }
                Err(e) => return Err(tx.fail(Step::EvictOldest, e)),
            }
            store.pop_oldest();
            info!("Evicted archived channel {:?} ({})", oldest.name, oldest.channel);
            tx.report.evicted.push(oldest);
        }
        if !tx.report.evicted.is_empty() {
            tx.done(Step::EvictOldest);
        }

        let retired_at = Utc::now();
        let archived_name = retired_name(&original.name, retired_at);
        tx.step(
            Step::RetireChannel,
            self.platform.edit_channel(
                game,
                ChannelEdit::new()
                    .category(archive_category)
                    .name(archived_name.clone())
                    .topic(""),
            ),
        )
        .await?;

        let entry = ArchiveEntry::new(game, archived_name, Some(session.clone()), Some(retired_at));
        if store.insert(entry)?.is_some() {
            return Err(LifecycleError::CapacityInvariantViolation {
                len: store.len() + 1,
                capacity: store.capacity(),
            });
        }
        tx.report.archived = store.entries().last().cloned();
        Ok(())
    }

    /// Best-effort removal of the replacement channel after a failed archive.
    async fn discard_clone(
        &self,
        tx: &mut Transition,
        session: &SessionNumber,
        replacement: ChannelId,
        error: &mut LifecycleError,
    ) {
        match timed(self.config.io_timeout, self.platform.delete_channel(replacement)).await {
            Ok(()) => {
                info!("Removed replacement channel {} for game {}", replacement, session);
                tx.report.replacement_channel = None;
                if let LifecycleError::Platform { applied, .. } = error {
                    applied.push(Step::DiscardClone);
                }
            }
            Err(e) => {
                error!(
                    "Could not remove replacement channel {} for game {}: {}",
                    replacement, session, e
                );
            }
        }
    }

    async fn notify_actor(&self, operation: Operation, invocation: &Invocation, e: &LifecycleError) {
        let session = &invocation.session;
        let message = match e {
            LifecycleError::AuthorizationDenied { .. } => {
                format!("You are not the current ST for game {}", session)
            }
            LifecycleError::ResourceNotFound { .. } | LifecycleError::ResourceAmbiguous { .. } => {
                format!("Could not run {} for game {}: {}", operation, session, e)
            }
            LifecycleError::InvalidTransition { state, .. } => format!(
                "{} cannot be used on game {} while it is {}",
                operation, session, state
            ),
            _ => format!("{} for game {} did not complete: {}", operation, session, e),
        };

        if let Err(dm_error) = timed(
            self.config.io_timeout,
            self.platform.direct_message(invocation.actor, &message),
        )
        .await
        {
            warn!("Could not notify {}: {}", invocation.actor, dm_error);
        }
    }

    async fn mirror_audit(&self, operation: Operation, invocation: &Invocation) {
        let Some(channel) = self.locator.audit_channel().await else {
            return;
        };
        let line = format!(
            "{} has run the {} Command on Game {}",
            invocation.actor.mention(),
            operation,
            invocation.session
        );
        if let Err(e) = timed(self.config.io_timeout, self.platform.send_message(channel, &line)).await {
            warn!("Could not write audit line: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn record(state: SessionState) -> SessionRecord {
        SessionRecord::new(state)
    }

    #[test]
    fn kibitz_toggle_states() {
        use SessionState::*;
        assert_eq!(next_record(Operation::OpenKibitz, record(Running)).state, KibitzOpen);
        assert_eq!(next_record(Operation::OpenKibitz, record(KibitzOpen)).state, KibitzOpen);
        assert_eq!(next_record(Operation::CloseKibitz, record(KibitzOpen)).state, Running);
        assert_eq!(next_record(Operation::CloseKibitz, record(Running)).state, Running);
        // Toggling kibitz after the game ended does not resurrect it.
        assert_eq!(next_record(Operation::OpenKibitz, record(Ended)).state, Ended);
        assert_eq!(next_record(Operation::CloseKibitz, record(Ended)).state, Ended);
    }

    #[test]
    fn end_and_archive_states() {
        use SessionState::*;
        assert_eq!(next_record(Operation::EndGame, record(Running)).state, Ended);
        assert_eq!(next_record(Operation::EndGame, record(KibitzOpen)).state, Ended);

        let recycled = next_record(Operation::ArchiveGame, record(Ended));
        assert_eq!(recycled.state, Running);
        assert_eq!(recycled.generation, 1);
        assert_eq!(next_record(Operation::ArchiveGame, recycled).generation, 2);
    }

    #[test]
    fn archive_requires_ended() {
        use SessionState::*;
        assert!(transition_allowed(Operation::ArchiveGame, Ended));
        assert!(!transition_allowed(Operation::ArchiveGame, Running));
        assert!(!transition_allowed(Operation::ArchiveGame, KibitzOpen));
        assert!(!transition_allowed(Operation::ArchiveGame, Archived));
        for op in [Operation::OpenKibitz, Operation::CloseKibitz, Operation::EndGame] {
            assert!(transition_allowed(op, Running));
            assert!(transition_allowed(op, Ended));
            assert!(!transition_allowed(op, Archived));
        }
    }

    #[tokio::test]
    async fn timed_maps_elapsed_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, PlatformError>(())
        };
        match timed(Duration::from_millis(10), slow).await {
            Err(PlatformError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(10)),
            other => panic!("expected timeout, got {:?}", other),
        }
        let value = assert_ok!(timed(Duration::from_secs(1), async { Ok::<_, PlatformError>(5) }).await);
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn transition_lists_applied_steps_on_failure() {
        let n = SessionNumber::parse("3").unwrap();
        let mut tx = Transition::new(Operation::ArchiveGame, n, Duration::from_secs(1));
        assert_ok!(tx.step(Step::CaptureSlot, async { Ok::<_, PlatformError>(()) }).await);
        let err = assert_err!(
            tx.step(Step::CloneChannel, async {
                Err::<(), _>(PlatformError::Forbidden("no".into()))
            })
            .await
        );

        assert_eq!(err.applied_steps(), &[Step::CaptureSlot]);
        assert_eq!(tx.report.applied, vec![Step::CaptureSlot]);
    }

    #[test]
    fn names_render_like_commands() {
        assert_eq!(Operation::ArchiveGame.to_string(), "ArchiveGame");
        assert_eq!(Step::OpenKibitzChannel.to_string(), "open-kibitz-channel");
        let json = serde_json::to_string(&Operation::EndGame).unwrap();
        assert_eq!(json, "\"end_game\"");
    }

    #[test]
    fn warnings_do_not_mark_steps_applied() {
        let n = SessionNumber::parse("9").unwrap();
        let mut tx = Transition::new(Operation::EndGame, n, Duration::from_secs(1));
        tx.warn("persisting votes timed out".into());
        assert!(tx.report.applied.is_empty());
        assert_eq!(tx.report.warnings, vec!["persisting votes timed out".to_string()]);
        assert_eq!(Step::DiscardClone.to_string(), "discard-clone");
    }
}
