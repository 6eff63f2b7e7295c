//! Participant actors.
//!
//! Every human the bot interviews gets one actor for the life of the
//! process. The actor owns all of that person's conversational state (the
//! active round, the question index, queued rounds, reminder timers) and
//! processes its inbox strictly one event at a time, so none of it needs a
//! lock. Other components talk to it only through a [`ParticipantHandle`].
//!
//! Outgoing direct messages go through a per-participant outbox task. It
//! delivers them in order without blocking the inbox and feeds failures back
//! as [`ParticipantEvent::SendFailed`], tagged with the round they belonged
//! to.
//!
//! ```text
//!            start (idle)                 last answer / skip / time-up / send failure
//!   Idle ─────────────────▶ Asking(s, i) ─────────────────────────────────────────▶ Idle
//!    ▲                         │  ▲                                                  │
//!    │                         └──┘ answer i < last                                   │
//!    └──────────── queue empty ◀── pop next queued round (FIFO) ◀────────────────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::config::{self, StandupConfig};
use crate::error::PlatformError;
use crate::event::ParticipantEvent;
use crate::platform::ChatPlatform;
use crate::standup::Standup;
use crate::types::{ChannelId, StandupId, UserId, UserProfile};

/// A handle to a running participant actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    profile: Arc<UserProfile>,
    dm_channel: ChannelId,
    tx: mpsc::UnboundedSender<ParticipantEvent>,
}

impl ParticipantHandle {
    pub fn user(&self) -> &UserId {
        &self.profile.id
    }

    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }

    pub fn dm_channel(&self) -> &ChannelId {
        &self.dm_channel
    }

    /// Deliver a direct-message reply from this participant.
    pub fn deliver_reply(&self, text: String) {
        self.send(ParticipantEvent::Reply(text));
    }

    /// Ask this participant to take part in `standup`, now or once their
    /// current round ends.
    pub fn start_standup(&self, standup: Arc<Standup>) {
        self.send(ParticipantEvent::StartStandup(standup));
    }

    pub(crate) fn time_up(&self, standup: Arc<Standup>) {
        self.send(ParticipantEvent::TimedOut(standup));
    }

    fn send(&self, event: ParticipantEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!(user = %self.profile.id, "participant actor is gone; event dropped");
        }
    }

    /// A handle with no actor behind it, for exercising rounds directly.
    #[cfg(test)]
    pub(crate) fn detached(user: UserId, display_name: &str) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            dm_channel: ChannelId::new(format!("D{user}")),
            profile: Arc::new(UserProfile {
                id: user,
                display_name: display_name.to_string(),
                is_bot: false,
            }),
            tx,
        }
    }
}

/// Start an actor and its outbox for `profile`.
pub fn spawn(
    profile: UserProfile,
    dm_channel: ChannelId,
    platform: Arc<dyn ChatPlatform>,
    config: Arc<StandupConfig>,
) -> ParticipantHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let handle = ParticipantHandle {
        profile: Arc::new(profile),
        dm_channel: dm_channel.clone(),
        tx: tx.clone(),
    };

    tokio::spawn(run_outbox(platform, dm_channel, out_rx, tx));
    tokio::spawn(Participant::new(handle.clone(), config, out_tx).run(rx));
    handle
}

/// One direct message waiting for delivery.
#[derive(Debug)]
struct Outgoing {
    text: String,
    standup: Option<StandupId>,
}

async fn run_outbox(
    platform: Arc<dyn ChatPlatform>,
    dm_channel: ChannelId,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    inbox: mpsc::UnboundedSender<ParticipantEvent>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(error) = platform.send_message(&dm_channel, &msg.text).await {
            tracing::warn!(channel = %dm_channel, error = %error, "direct message failed");
            let failed = ParticipantEvent::SendFailed {
                standup: msg.standup,
                error,
            };
            if inbox.send(failed).is_err() {
                break;
            }
        }
    }
}

struct Active {
    standup: Arc<Standup>,
    question: usize,
    /// Set on the first reply; reminders stop from then on.
    replied: bool,
}

struct Participant {
    me: ParticipantHandle,
    config: Arc<StandupConfig>,
    outbox: mpsc::UnboundedSender<Outgoing>,
    current: Option<Active>,
    queue: VecDeque<Arc<Standup>>,
    /// Rounds this participant is done with while they may still be open:
    /// ended while active, or ended while still queued. Closed rounds are
    /// pruned whenever the active round ends.
    finished: HashMap<StandupId, Arc<Standup>>,
    nags: Nags,
}

impl Participant {
    fn new(
        me: ParticipantHandle,
        config: Arc<StandupConfig>,
        outbox: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        let nags = Nags::new(config.prompts.nags.clone());
        Self {
            me,
            config,
            outbox,
            current: None,
            queue: VecDeque::new(),
            finished: HashMap::new(),
            nags,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ParticipantEvent>) {
        tracing::debug!(user = %self.me.user(), "participant actor started");
        while let Some(event) = inbox.recv().await {
            self.handle(event);
        }
        self.nags.cancel();
        tracing::debug!(user = %self.me.user(), "participant actor stopped");
    }

    fn handle(&mut self, event: ParticipantEvent) {
        match event {
            ParticipantEvent::Reply(text) => self.on_reply(&text),
            ParticipantEvent::StartStandup(standup) => self.on_start_request(standup),
            ParticipantEvent::TimedOut(standup) => self.on_timed_out(&standup),
            ParticipantEvent::Nag {
                standup,
                generation,
            } => self.on_nag(standup, generation),
            ParticipantEvent::SendFailed { standup, error } => self.on_send_failed(standup, &error),
        }
    }

    fn current_id(&self) -> Option<StandupId> {
        self.current.as_ref().map(|a| a.standup.id())
    }

    fn on_start_request(&mut self, standup: Arc<Standup>) {
        let id = standup.id();
        let seen = self.current_id() == Some(id)
            || self.queue.iter().any(|s| s.id() == id)
            || self.finished.contains_key(&id);
        if seen {
            tracing::debug!(user = %self.me.user(), standup = %id, "duplicate invite ignored");
            return;
        }
        standup.report_acknowledged(&self.me);
        if self.current.is_some() {
            tracing::debug!(user = %self.me.user(), standup = %standup.id(), "queued behind current stand-up");
            self.queue.push_back(standup);
            return;
        }
        self.begin(standup);
    }

    /// Enter `Asking` at question 0. Returns false if the round had already
    /// closed.
    fn begin(&mut self, standup: Arc<Standup>) -> bool {
        if standup.is_closed() {
            self.already_finished(&standup);
            return false;
        }
        let id = standup.id();
        let start = config::render(
            &self.config.prompts.start,
            &standup.channel().name,
            &self.config.skip_keyword,
        );
        self.say(start, Some(id));
        self.current = Some(Active {
            standup,
            question: 0,
            replied: false,
        });
        self.ask_current_question();
        self.nags.arm(id, &self.config.nag_delays, &self.me.tx);
        true
    }

    fn ask_current_question(&self) {
        let Some(active) = &self.current else {
            return;
        };
        if let Some(question) = active.standup.question(active.question) {
            self.say(question.to_string(), Some(active.standup.id()));
        }
    }

    fn on_reply(&mut self, text: &str) {
        let Some(active) = self.current.as_mut() else {
            tracing::debug!(user = %self.me.user(), "no active stand-up; reply dropped");
            return;
        };
        if !active.replied {
            active.replied = true;
            self.nags.cancel();
        }
        let standup = active.standup.clone();
        let index = active.question;

        if self.config.is_skip(text) {
            standup.report_skip(&self.me);
            self.say(self.config.prompts.confirm_skip.clone(), Some(standup.id()));
            self.end_standup(standup.id());
            return;
        }

        standup.report_answer(&self.me, index, text);
        if standup.is_last_question(index) {
            self.say(self.config.prompts.end.clone(), Some(standup.id()));
            self.end_standup(standup.id());
        } else {
            active.question += 1;
            self.ask_current_question();
        }
    }

    fn on_timed_out(&mut self, standup: &Standup) {
        if self.current_id() == Some(standup.id()) {
            self.say(self.config.prompts.time_up.clone(), Some(standup.id()));
        }
        self.end_standup(standup.id());
    }

    fn on_nag(&mut self, standup: StandupId, generation: u64) {
        if generation != self.nags.generation {
            return;
        }
        let due = self
            .current
            .as_ref()
            .is_some_and(|a| a.standup.id() == standup && !a.replied);
        if !due {
            return;
        }
        if let Some(phrase) = self.nags.next_phrase() {
            self.say(phrase, Some(standup));
        }
    }

    fn on_send_failed(&mut self, standup: Option<StandupId>, error: &PlatformError) {
        let Some(active) = &self.current else {
            tracing::debug!(user = %self.me.user(), error = %error, "send failed with no active stand-up");
            return;
        };
        if standup != Some(active.standup.id()) {
            tracing::debug!(user = %self.me.user(), error = %error, "send failure for a stand-up no longer active");
            return;
        }
        tracing::warn!(user = %self.me.user(), standup = %active.standup.id(), error = %error, "marking participant errored");
        let standup = active.standup.clone();
        standup.report_error(&self.me);
        self.end_standup(standup.id());
    }

    /// This participant is done with `id`: clear it and move on to the next
    /// queued round, if any.
    fn end_standup(&mut self, id: StandupId) {
        if self.current_id() != Some(id) {
            if let Some(queued) = self.queue.iter().find(|s| s.id() == id) {
                self.finished.insert(id, queued.clone());
            }
            return;
        }
        tracing::debug!(user = %self.me.user(), standup = %id, "stand-up ended for participant");
        if let Some(active) = self.current.take() {
            self.finished.insert(id, active.standup);
        }
        self.nags.cancel();
        self.finished.retain(|_, s| !s.is_closed());

        while let Some(next) = self.queue.pop_front() {
            if self.finished.contains_key(&next.id()) || next.is_closed() {
                self.already_finished(&next);
                continue;
            }
            self.say(self.config.prompts.next_standup.clone(), Some(next.id()));
            if self.begin(next) {
                break;
            }
        }
    }

    fn already_finished(&self, standup: &Standup) {
        let text = config::render(
            &self.config.prompts.already_finished,
            &standup.channel().name,
            &self.config.skip_keyword,
        );
        self.say(text, None);
    }

    fn say(&self, text: String, standup: Option<StandupId>) {
        if self.outbox.send(Outgoing { text, standup }).is_err() {
            tracing::warn!(user = %self.me.user(), "outbox closed; message dropped");
        }
    }
}

/// Reminder timers plus a shuffled phrase rotation.
struct Nags {
    phrases: Vec<String>,
    next: usize,
    /// Bumped on every cancel so timers that already fired are ignored.
    generation: u64,
    timers: Vec<AbortHandle>,
}

impl Nags {
    fn new(mut phrases: Vec<String>) -> Self {
        phrases.shuffle(&mut rand::thread_rng());
        Self {
            phrases,
            next: 0,
            generation: 0,
            timers: Vec::new(),
        }
    }

    fn arm(
        &mut self,
        standup: StandupId,
        delays: &[Duration],
        inbox: &mpsc::UnboundedSender<ParticipantEvent>,
    ) {
        self.cancel();
        let generation = self.generation;
        for &delay in delays {
            let inbox = inbox.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = inbox.send(ParticipantEvent::Nag {
                    standup,
                    generation,
                });
            });
            self.timers.push(timer.abort_handle());
        }
    }

    fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    fn next_phrase(&mut self) -> Option<String> {
        let phrase = self.phrases.get(self.next)?.clone();
        self.next = (self.next + 1) % self.phrases.len();
        Some(phrase)
    }
}
