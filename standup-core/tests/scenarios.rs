//! End-to-end rounds against the in-memory platform.
//!
//! Covers:
//! - answered + skipped participants closing a round early
//! - a send failure closing a round without waiting for the clock
//! - a second invite queued behind an unfinished round
//! - a silent participant timed out, nagged, and a late reply dropped
//! - reminders armed again for a round started from the queue

mod common;

use std::sync::Arc;
use std::time::Duration;

use standup_core::config::DEFAULT_NAGS;
use standup_core::{ReplyState, Standup, UserId};

use common::{MockPlatform, channel, config, context, dm, reply};

async fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn answered_and_skipped_participants_close_the_round() {
    let platform = Arc::new(
        MockPlatform::new()
            .user("U1", "alice")
            .user("U2", "bob")
            .channel("C1", &["U1", "U2"]),
    );
    let config = config();
    let ctx = context(&platform, &config);
    let standup = Standup::new(channel("C1", "eng"), &config).unwrap();
    let round = tokio::spawn(standup.clone().run(ctx.clone()));

    let u1 = platform.wait_for(&dm("U1"), 2).await;
    assert!(u1[0].contains("#eng"));
    assert_eq!(u1[1], "Q1?");
    platform.wait_for(&dm("U2"), 2).await;

    reply(&ctx, "U1", "wrote the parser").await;
    platform.wait_for(&dm("U1"), 3).await;
    reply(&ctx, "U2", " SKIP").await;
    reply(&ctx, "U1", "fix the lexer").await;

    let report = round.await.unwrap().unwrap();
    let states: Vec<_> = report.outcomes.iter().map(|o| o.state.clone()).collect();
    assert_eq!(
        states,
        vec![
            Some(ReplyState::Answered(vec![
                Some("wrote the parser".to_string()),
                Some("fix the lexer".to_string()),
            ])),
            Some(ReplyState::Skipped),
        ]
    );
    assert!(report.delivered);

    let summaries = platform.messages_to(&channel("C1", "eng").id);
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].contains("@alice answered:\n• wrote the parser\n• fix the lexer\n"));
    assert!(summaries[0].contains("@bob skipped this stand-up."));

    // the clock still fires later but must not post again or nag anyone
    tokio::time::sleep(config.duration * 2).await;
    assert_eq!(platform.messages_to(&channel("C1", "eng").id).len(), 1);
    assert_eq!(platform.messages_to(&dm("U2")).last().unwrap(), "Okay!");
    assert_eq!(
        platform.messages_to(&dm("U1")).last().unwrap(),
        "Thanks! All done."
    );
}

#[tokio::test(start_paused = true)]
async fn send_failure_closes_round_without_waiting_for_timeout() {
    let platform = Arc::new(MockPlatform::new().user("U1", "alice").channel("C1", &["U1"]));
    platform.fail_sends_to(dm("U1"));
    let config = config();
    let ctx = context(&platform, &config);
    let standup = Standup::new(channel("C1", "eng"), &config).unwrap();

    let started = tokio::time::Instant::now();
    let report = standup.clone().run(ctx).await.unwrap();

    assert!(started.elapsed() < config.duration);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].state, Some(ReplyState::Errored));
    assert!(report.summary.contains("error when trying to chat with @alice"));
}

#[tokio::test(start_paused = true)]
async fn second_invite_is_queued_until_first_round_ends() {
    let platform = Arc::new(
        MockPlatform::new()
            .user("U1", "alice")
            .channel("C1", &["U1"])
            .channel("C2", &["U1"]),
    );
    let config = config();
    let ctx = context(&platform, &config);
    let alpha = Standup::new(channel("C1", "alpha"), &config).unwrap();
    let beta = Standup::new(channel("C2", "beta"), &config).unwrap();
    let u1 = UserId::from("U1");

    let first = tokio::spawn(alpha.clone().run(ctx.clone()));
    platform.wait_for(&dm("U1"), 2).await;

    let second = tokio::spawn(beta.clone().run(ctx.clone()));
    wait_until(|| beta.reply_state(&u1).is_some()).await;
    assert_eq!(beta.reply_state(&u1), Some(ReplyState::Pending));
    assert_eq!(platform.messages_to(&dm("U1")).len(), 2);

    reply(&ctx, "U1", "a1").await;
    platform.wait_for(&dm("U1"), 3).await;
    reply(&ctx, "U1", "a2").await;

    let messages = platform.wait_for(&dm("U1"), 7).await;
    assert_eq!(messages[3], "Thanks! All done.");
    assert_eq!(messages[4], "But wait, you have another stand-up to attend…");
    assert!(messages[5].contains("#beta"));
    assert_eq!(messages[6], "Q1?");

    let alpha_report = first.await.unwrap().unwrap();
    assert_eq!(
        alpha_report.outcomes[0].state,
        Some(ReplyState::Answered(vec![Some("a1".into()), Some("a2".into())]))
    );
    assert!(!beta.is_closed());

    reply(&ctx, "U1", "b1").await;
    platform.wait_for(&dm("U1"), 8).await;
    reply(&ctx, "U1", "b2").await;

    let beta_report = second.await.unwrap().unwrap();
    assert_eq!(
        beta_report.outcomes[0].state,
        Some(ReplyState::Answered(vec![Some("b1".into()), Some("b2".into())]))
    );
}

#[tokio::test(start_paused = true)]
async fn silent_participant_times_out_and_late_reply_is_dropped() {
    let platform = Arc::new(MockPlatform::new().user("U1", "alice").channel("C1", &["U1"]));
    let config = config();
    let ctx = context(&platform, &config);
    let standup = Standup::new(channel("C1", "eng"), &config).unwrap();

    let started = tokio::time::Instant::now();
    let report = standup.clone().run(ctx.clone()).await.unwrap();
    assert!(started.elapsed() >= config.duration);
    assert_eq!(
        report.outcomes[0].state,
        Some(ReplyState::TimedOutAbsent { partial: None })
    );
    assert!(report.summary.contains("@alice never replied to me"));

    let messages = platform.wait_for(&dm("U1"), 6).await;
    for nag in &messages[2..5] {
        assert!(DEFAULT_NAGS.contains(&nag.as_str()), "unexpected nag {nag:?}");
    }
    assert_eq!(
        messages[5],
        "Too slow! The stand-up's finished now. Catch up in the channel."
    );

    reply(&ctx, "U1", "sorry, here now").await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        standup.reply_state(&UserId::from("U1")),
        Some(ReplyState::TimedOutAbsent { partial: None })
    );
    assert_eq!(platform.messages_to(&dm("U1")).len(), 6);
}

#[tokio::test(start_paused = true)]
async fn partial_answers_survive_the_timeout() {
    let platform = Arc::new(MockPlatform::new().user("U1", "alice").channel("C1", &["U1"]));
    let config = config();
    let ctx = context(&platform, &config);
    let standup = Standup::new(channel("C1", "eng"), &config).unwrap();
    let round = tokio::spawn(standup.clone().run(ctx.clone()));

    platform.wait_for(&dm("U1"), 2).await;
    reply(&ctx, "U1", "half done").await;

    let report = round.await.unwrap().unwrap();
    assert_eq!(
        report.outcomes[0].state,
        Some(ReplyState::TimedOutAbsent {
            partial: Some(vec![Some("half done".into()), None])
        })
    );
    assert!(report.summary.contains("• half done\nbut didn't respond to the rest."));

    // replying stopped the reminders: start, Q1, Q2, too slow
    let messages = platform.wait_for(&dm("U1"), 4).await;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2], "Q2?");
}

#[tokio::test(start_paused = true)]
async fn reminders_are_rearmed_for_a_queued_round() {
    let platform = Arc::new(
        MockPlatform::new()
            .user("U1", "alice")
            .channel("C1", &["U1"])
            .channel("C2", &["U1"]),
    );
    let config = config();
    let ctx = context(&platform, &config);
    let alpha = Standup::new(channel("C1", "alpha"), &config).unwrap();
    let beta = Standup::new(channel("C2", "beta"), &config).unwrap();
    let u1 = UserId::from("U1");

    let first = tokio::spawn(alpha.clone().run(ctx.clone()));
    platform.wait_for(&dm("U1"), 2).await;
    let second = tokio::spawn(beta.clone().run(ctx.clone()));
    wait_until(|| beta.reply_state(&u1).is_some()).await;

    reply(&ctx, "U1", "a1").await;
    platform.wait_for(&dm("U1"), 3).await;
    reply(&ctx, "U1", "a2").await;
    first.await.unwrap().unwrap();

    let beta_report = second.await.unwrap().unwrap();
    assert_eq!(
        beta_report.outcomes[0].state,
        Some(ReplyState::TimedOutAbsent { partial: None })
    );

    // alpha: start, Q1, Q2, thanks; beta: next, start, Q1, three nags, too slow
    let messages = platform.wait_for(&dm("U1"), 11).await;
    assert!(messages[5].contains("#beta"));
    assert_eq!(messages[6], "Q1?");
    for nag in &messages[7..10] {
        assert!(DEFAULT_NAGS.contains(&nag.as_str()), "unexpected nag {nag:?}");
    }
    assert_eq!(
        messages[10],
        "Too slow! The stand-up's finished now. Catch up in the channel."
    );

    // alpha's reminders were cancelled by the first reply and stay quiet
    tokio::time::sleep(config.duration * 2).await;
    assert_eq!(platform.messages_to(&dm("U1")).len(), 11);
}
