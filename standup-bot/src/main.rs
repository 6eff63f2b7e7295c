//! standup-bot: runs a stand-up round in every channel the bot belongs to.
//!
//! The console platform stands in for a chat workspace. Bot messages go to
//! stdout, logs to stderr, and participants answer by typing
//! `<user>: <text>` on stdin.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use standup_bot::console::ConsolePlatform;
use standup_bot::settings::{self, Roster};
use standup_core::standup::Outcome;
use standup_core::{ChatPlatform, Registry, ReplyState, RoundContext, Standup, StandupReport, router};

#[derive(Parser)]
#[command(name = "standup-bot", about = "Run stand-up rounds over direct messages")]
struct Args {
    /// Workspace roster: users, channels and the bot account
    #[arg(long, env = "STANDUP_ROSTER", default_value = "demo/roster.toml")]
    roster: PathBuf,

    /// Round settings (questions, duration, reminders, wording)
    #[arg(long, env = "STANDUP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the round duration
    #[arg(long, env = "STANDUP_DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Only run the round for this channel (name or id)
    #[arg(long)]
    channel: Option<String>,
}

fn init_logging() -> Result<()> {
    let json_logs = std::env::var("STANDUP_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("standup_bot=info".parse()?)
        .add_directive("standup_core=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Outcome counts per summary category.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    answered: usize,
    skipped: usize,
    absent: usize,
    errored: usize,
    /// Rendered by the summary as "a mystery".
    unknown: usize,
}

impl Tally {
    fn of(outcomes: &[Outcome]) -> Self {
        let mut tally = Self::default();
        for outcome in outcomes {
            match outcome.state {
                Some(ReplyState::Answered(_)) => tally.answered += 1,
                Some(ReplyState::Skipped) => tally.skipped += 1,
                Some(ReplyState::TimedOutAbsent { .. }) => tally.absent += 1,
                Some(ReplyState::Errored) => tally.errored += 1,
                Some(ReplyState::Pending) | None => tally.unknown += 1,
            }
        }
        tally
    }
}

fn log_report(report: &StandupReport) {
    let tally = Tally::of(&report.outcomes);
    tracing::info!(
        standup = %report.standup,
        channel = %report.channel.name,
        answered = tally.answered,
        skipped = tally.skipped,
        absent = tally.absent,
        errored = tally.errored,
        unknown = tally.unknown,
        delivered = report.delivered,
        "stand-up finished"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();

    let mut config = settings::load_config(args.config.as_deref())?;
    if let Some(secs) = args.duration_secs {
        config.duration = Duration::from_secs(secs);
    }
    let roster = Roster::load(&args.roster)?;
    let bot_user = roster.bot.id.clone();

    let mut channels = roster.standup_channels();
    if let Some(wanted) = &args.channel {
        let wanted = wanted.trim_start_matches('#');
        channels.retain(|c| c.name == wanted || c.id.as_str() == wanted);
        anyhow::ensure!(!channels.is_empty(), "bot is not in a stand-up channel named {wanted}");
    }
    if channels.is_empty() {
        tracing::warn!("bot is not a member of any stand-up channel; nothing to do");
        return Ok(());
    }

    let console = Arc::new(ConsolePlatform::new(roster));
    let platform: Arc<dyn ChatPlatform> = console.clone();
    let registry = Registry::spawn(platform.clone(), Arc::new(config.clone()));
    tokio::spawn(router::run_inbound(
        console.spawn_stdin(),
        bot_user.clone(),
        registry.clone(),
    ));

    let (tracker, mut reports) = mpsc::channel(channels.len());
    let ctx = RoundContext {
        platform,
        registry,
        bot_user: Some(bot_user),
        tracker: Some(tracker),
    };

    tracing::info!(
        rounds = channels.len(),
        duration_secs = config.duration.as_secs(),
        "starting stand-ups; reply on stdin as `<user>: <text>`"
    );
    let mut rounds = JoinSet::new();
    for channel in channels {
        let standup = Standup::new(channel, &config)?;
        rounds.spawn(standup.run(ctx.clone()));
    }
    drop(ctx);

    let tracking = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            log_report(&report);
        }
    });

    while let Some(joined) = rounds.join_next().await {
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "stand-up failed"),
            Err(e) => tracing::error!(error = %e, "stand-up task panicked"),
        }
    }
    let _ = tracking.await;
    tracing::info!("all stand-ups finished");
    Ok(())
}
