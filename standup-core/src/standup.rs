//! Reply aggregation for one stand-up round.
//!
//! A [`Standup`] owns the authoritative reply state of every invited
//! participant. Participant actors report into it concurrently, so the reply
//! map sits behind a mutex; the round runner waits on a single-fire
//! completion signal outside that lock and posts the summary once the round
//! closes.
//!
//! A round closes when either every invited participant reached a terminal
//! state or its clock runs out, whichever happens first. Reports arriving
//! after closure are discarded.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::StandupConfig;
use crate::error::StandupError;
use crate::participant::ParticipantHandle;
use crate::platform::ChatPlatform;
use crate::registry::RegistryHandle;
use crate::types::{Channel, StandupId, UserId};

/// Answers by question index. `None` marks a question not answered yet.
pub type Answers = Vec<Option<String>>;

/// What a participant contributed to a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyState {
    /// Accepted the invite, nothing answered yet.
    Pending,
    /// Answered some or all questions.
    Answered(Answers),
    Skipped,
    /// The round closed before they finished. Keeps whatever they did answer.
    TimedOutAbsent { partial: Option<Answers> },
    Errored,
}

impl ReplyState {
    /// Terminal states close out a participant's part in the round.
    pub fn is_terminal(&self) -> bool {
        match self {
            ReplyState::Pending => false,
            ReplyState::Answered(answers) => answers.iter().all(Option::is_some),
            ReplyState::Skipped | ReplyState::TimedOutAbsent { .. } | ReplyState::Errored => true,
        }
    }

    fn timed_out(self) -> Self {
        match self {
            ReplyState::Answered(answers) if answers.iter().any(Option::is_some) => {
                ReplyState::TimedOutAbsent {
                    partial: Some(answers),
                }
            }
            ReplyState::Pending | ReplyState::Answered(_) => {
                ReplyState::TimedOutAbsent { partial: None }
            }
            terminal => terminal,
        }
    }
}

/// One invited participant's result, in invitation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub user: UserId,
    pub display_name: String,
    /// `None` only if the participant never reported at all, which a closed
    /// round should not contain.
    pub state: Option<ReplyState>,
}

/// What a finished round hands back to whoever ran it.
#[derive(Debug, Clone)]
pub struct StandupReport {
    pub standup: StandupId,
    pub channel: Channel,
    pub outcomes: Vec<Outcome>,
    pub summary: String,
    /// Whether the summary reached the channel.
    pub delivered: bool,
}

/// Everything a round needs from the rest of the process.
#[derive(Clone)]
pub struct RoundContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub registry: RegistryHandle,
    /// The bot's own account, never invited.
    pub bot_user: Option<UserId>,
    /// Receives every report once its summary has been posted.
    pub tracker: Option<mpsc::Sender<StandupReport>>,
}

struct Entry {
    display_name: String,
    state: ReplyState,
    participant: Option<ParticipantHandle>,
}

struct Inner {
    /// Fixed by [`Standup::start_for`]; completion is never evaluated before.
    invited: Option<Vec<UserId>>,
    replies: HashMap<UserId, Entry>,
    closed: bool,
    done: Option<oneshot::Sender<()>>,
}

/// One round: a channel, its questions and the replies collected so far.
pub struct Standup {
    id: StandupId,
    channel: Channel,
    questions: Vec<String>,
    duration: Duration,
    /// Mirrors `Inner::closed` for lock-free reads by participant actors.
    closed: AtomicBool,
    inner: Mutex<Inner>,
    done_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl fmt::Debug for Standup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Standup")
            .field("id", &self.id)
            .field("channel", &self.channel.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Standup {
    pub fn new(channel: Channel, config: &StandupConfig) -> Result<Arc<Self>, StandupError> {
        if config.questions.is_empty() {
            return Err(StandupError::NoQuestions);
        }
        let (done_tx, done_rx) = oneshot::channel();
        Ok(Arc::new(Self {
            id: StandupId::next(),
            channel,
            questions: config.questions.clone(),
            duration: config.duration,
            closed: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                invited: None,
                replies: HashMap::new(),
                closed: false,
                done: Some(done_tx),
            }),
            done_rx: Mutex::new(Some(done_rx)),
        }))
    }

    pub fn id(&self) -> StandupId {
        self.id
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn question(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    pub fn is_last_question(&self, index: usize) -> bool {
        index + 1 >= self.questions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fix the invited set. Participants that already reported keep their
    /// state; completion is evaluated immediately, so an empty or already
    /// finished set closes the round on the spot.
    pub fn start_for(&self, participants: Vec<UserId>) {
        let mut inner = self.inner.lock();
        if inner.invited.is_some() {
            tracing::warn!(standup = %self.id, "invited set is already fixed; ignoring");
            return;
        }
        tracing::info!(
            standup = %self.id,
            channel = %self.channel.name,
            invited = participants.len(),
            "stand-up started"
        );
        inner.invited = Some(participants);
        self.check_finished(&mut inner);
    }

    /// The participant accepted the invite but has not answered yet.
    pub fn report_acknowledged(&self, participant: &ParticipantHandle) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        let entry = inner
            .replies
            .entry(participant.user().clone())
            .or_insert_with(|| Entry {
                display_name: participant.display_name().to_string(),
                state: ReplyState::Pending,
                participant: None,
            });
        entry.participant = Some(participant.clone());
        // no completion check: nothing terminal changed
    }

    /// Store an answer. A later answer to the same question replaces the
    /// earlier one.
    pub fn report_answer(&self, participant: &ParticipantHandle, index: usize, text: &str) {
        let mut inner = self.inner.lock();
        if inner.closed {
            tracing::debug!(standup = %self.id, user = %participant.user(), "round closed; answer discarded");
            return;
        }
        if index >= self.questions.len() {
            tracing::warn!(standup = %self.id, user = %participant.user(), index, "answer for unknown question");
            return;
        }
        tracing::debug!(standup = %self.id, user = %participant.user(), index, "answer recorded");

        let question_count = self.questions.len();
        let entry = Self::entry_for(&mut inner, participant);
        if entry.state == ReplyState::Pending {
            entry.state = ReplyState::Answered(vec![None; question_count]);
        }
        match &mut entry.state {
            ReplyState::Answered(answers) => {
                if let Some(slot) = answers.get_mut(index) {
                    *slot = Some(text.to_string());
                }
            }
            _ => {
                tracing::debug!(standup = %self.id, user = %participant.user(), "participant already closed out; answer discarded");
                return;
            }
        }
        self.check_finished(&mut inner);
    }

    pub fn report_skip(&self, participant: &ParticipantHandle) {
        self.report_terminal(participant, ReplyState::Skipped);
    }

    pub fn report_error(&self, participant: &ParticipantHandle) {
        self.report_terminal(participant, ReplyState::Errored);
    }

    fn report_terminal(&self, participant: &ParticipantHandle, state: ReplyState) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        tracing::debug!(standup = %self.id, user = %participant.user(), ?state, "participant closed out");
        Self::entry_for(&mut inner, participant).state = state;
        self.check_finished(&mut inner);
    }

    fn entry_for<'a>(inner: &'a mut Inner, participant: &ParticipantHandle) -> &'a mut Entry {
        inner
            .replies
            .entry(participant.user().clone())
            .or_insert_with(|| Entry {
                display_name: participant.display_name().to_string(),
                state: ReplyState::Pending,
                participant: Some(participant.clone()),
            })
    }

    fn is_finished(inner: &Inner) -> bool {
        let Some(invited) = &inner.invited else {
            return false;
        };
        invited.iter().all(|user| {
            inner
                .replies
                .get(user)
                .is_some_and(|entry| entry.state.is_terminal())
        })
    }

    fn check_finished(&self, inner: &mut Inner) {
        if !inner.closed && Self::is_finished(inner) {
            self.close(inner);
        }
    }

    fn close(&self, inner: &mut Inner) {
        tracing::info!(standup = %self.id, channel = %self.channel.name, "stand-up closed");
        inner.closed = true;
        self.closed.store(true, Ordering::Release);
        if let Some(done) = inner.done.take() {
            let _ = done.send(());
        }
    }

    /// The round's clock ran out: every invited participant without a
    /// terminal state becomes absent, every participant that acknowledged is
    /// told, and the round closes. A no-op on a round that already closed.
    pub fn time_up(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.closed {
            tracing::debug!(standup = %self.id, "clock ran out after closing");
            return;
        }
        tracing::info!(standup = %self.id, channel = %self.channel.name, "stand-up timed out");

        let invited = inner.invited.clone().unwrap_or_default();
        for user in invited {
            let entry = inner.replies.entry(user.clone()).or_insert_with(|| Entry {
                display_name: user.to_string(),
                state: ReplyState::Pending,
                participant: None,
            });
            let state = std::mem::replace(&mut entry.state, ReplyState::Pending);
            entry.state = state.timed_out();
        }
        for entry in inner.replies.values() {
            if let Some(participant) = &entry.participant {
                participant.time_up(self.clone());
            }
        }
        self.close(&mut inner);
    }

    /// Start the round's clock. The timer is not cancelled on early closure;
    /// firing after that is a no-op.
    pub fn spawn_timeout(self: &Arc<Self>) -> JoinHandle<()> {
        let standup = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(standup.duration).await;
            standup.time_up();
        })
    }

    /// Wait until the round closes. Only one caller may wait.
    pub async fn wait_closed(&self) -> Result<(), StandupError> {
        let rx = self
            .done_rx
            .lock()
            .take()
            .ok_or(StandupError::AlreadyAwaited(self.id))?;
        rx.await.map_err(|_| StandupError::Abandoned(self.id))
    }

    /// A participant's current state, if they have reported anything.
    pub fn reply_state(&self, user: &UserId) -> Option<ReplyState> {
        self.inner
            .lock()
            .replies
            .get(user)
            .map(|entry| entry.state.clone())
    }

    /// Outcomes of the invited participants, in invitation order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        let inner = self.inner.lock();
        Self::outcomes_locked(&inner)
    }

    fn outcomes_locked(inner: &Inner) -> Vec<Outcome> {
        inner
            .invited
            .iter()
            .flatten()
            .map(|user| match inner.replies.get(user) {
                Some(entry) => Outcome {
                    user: user.clone(),
                    display_name: entry.display_name.clone(),
                    state: Some(entry.state.clone()),
                },
                None => Outcome {
                    user: user.clone(),
                    display_name: user.to_string(),
                    state: None,
                },
            })
            .collect()
    }

    pub fn render_summary(&self) -> String {
        let inner = self.inner.lock();
        render_summary(&self.channel, &self.questions, &Self::outcomes_locked(&inner))
    }

    /// Run the round end to end: invite every human member of the channel,
    /// start the clock, wait for closure, then post the summary.
    pub async fn run(self: Arc<Self>, ctx: RoundContext) -> Result<StandupReport, StandupError> {
        let members = ctx
            .platform
            .channel_members(&self.channel.id)
            .await
            .map_err(|source| StandupError::Members {
                channel: self.channel.id.clone(),
                source,
            })?;

        let mut invited = Vec::with_capacity(members.len());
        let mut seen = HashSet::new();
        for user in members {
            if ctx.bot_user.as_ref() == Some(&user) || !seen.insert(user.clone()) {
                continue;
            }
            if ctx.registry.route_start(self.clone(), user.clone()).await? {
                invited.push(user);
            }
        }

        self.start_for(invited);
        self.spawn_timeout();
        self.wait_closed().await?;

        tracing::debug!(standup = %self.id, "sending summary");
        let summary = self.render_summary();
        let delivered = match ctx.platform.send_message(&self.channel.id, &summary).await {
            Ok(()) => {
                tracing::info!(standup = %self.id, channel = %self.channel.name, "summary sent");
                true
            }
            Err(e) => {
                tracing::warn!(standup = %self.id, error = %e, "error posting summary");
                false
            }
        };

        let report = StandupReport {
            standup: self.id,
            channel: self.channel.clone(),
            outcomes: self.outcomes(),
            summary,
            delivered,
        };
        if let Some(tracker) = &ctx.tracker
            && tracker.send(report.clone()).await.is_err()
        {
            tracing::debug!(standup = %self.id, "completion tracker went away");
        }
        Ok(report)
    }
}

fn render_summary(channel: &Channel, questions: &[String], outcomes: &[Outcome]) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "*Stand-up for #{} done!*\nQuestions were:", channel.name);
    for q in questions {
        let _ = writeln!(msg, "• {q}");
    }
    msg.push('\n');

    for outcome in outcomes {
        let name = format!("@{}", outcome.display_name);
        match &outcome.state {
            Some(ReplyState::Answered(answers))
            | Some(ReplyState::TimedOutAbsent {
                partial: Some(answers),
            }) => {
                let _ = writeln!(msg, "{name} answered:");
                write_answers(&mut msg, answers);
            }
            Some(ReplyState::TimedOutAbsent { partial: None }) => {
                let _ = writeln!(msg, "{name} never replied to me :disappointed:");
            }
            Some(ReplyState::Skipped) => {
                let _ = writeln!(msg, "{name} skipped this stand-up.");
            }
            Some(ReplyState::Errored) => {
                let _ = writeln!(msg, "There was an error when trying to chat with {name}");
            }
            Some(ReplyState::Pending) | None => {
                let _ = writeln!(
                    msg,
                    "I don't know what {name} did. It is a mystery to me. :no_mouth:"
                );
            }
        }
    }
    msg
}

fn write_answers(msg: &mut String, answers: &Answers) {
    for answer in answers {
        match answer {
            Some(text) => {
                let _ = writeln!(msg, "• {text}");
            }
            None => {
                msg.push_str("but didn't respond to the rest.\n");
                break;
            }
        }
    }
}
