//! Simulated purge against an in-memory channel.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use serde::Serialize;

use rangepurge_core::{ChannelId, Config, MessageId, UserId};
use rangepurge_engine::{InMemoryTransport, PurgeRunner, RunOutcome};
use rangepurge_session::{BeginOutcome, PurgeController, Selection, SessionStore};

use crate::sink::TerminalSink;
use crate::SimulateArgs;

const CHANNEL: ChannelId = ChannelId::new(1);
const USER: UserId = UserId::new(1);

/// Machine-readable result of a simulation.
#[derive(Debug, Serialize)]
struct Summary {
    outcome: &'static str,
    total: usize,
    batches: Option<usize>,
    error: Option<String>,
    delete_calls: usize,
    remaining: usize,
}

impl Summary {
    fn new(outcome: &RunOutcome, transport: &InMemoryTransport) -> Self {
        let (name, batches, error) = match outcome {
            RunOutcome::Completed { batches, .. } => ("completed", Some(*batches), None),
            RunOutcome::Failed { error, .. } => ("failed", None, Some(error.to_string())),
            RunOutcome::Exhausted { .. } => ("exhausted", None, None),
            RunOutcome::Cancelled { .. } => ("cancelled", None, None),
            RunOutcome::SinkClosed { .. } => ("sink_closed", None, None),
        };
        Self {
            outcome: name,
            total: outcome.total(),
            batches,
            error,
            delete_calls: transport.delete_calls(CHANNEL).len(),
            remaining: transport.messages(CHANNEL).len(),
        }
    }
}

fn message_at(ids: &[MessageId], pos: usize) -> anyhow::Result<MessageId> {
    match ids.get(pos) {
        Some(id) => Ok(*id),
        None => bail!("position {pos} is outside the channel (0..{})", ids.len()),
    }
}

pub async fn run(args: SimulateArgs, config: &Config) -> anyhow::Result<()> {
    if args.messages == 0 {
        bail!("the simulated channel needs at least one message");
    }
    if args.spacing_secs <= 0 {
        bail!("--spacing-secs must be positive, got {}", args.spacing_secs);
    }
    let spacing = Duration::try_seconds(args.spacing_secs)
        .with_context(|| format!("--spacing-secs {} is out of range", args.spacing_secs))?;

    let transport = Arc::new(InMemoryTransport::new(config.limits.clone()));
    if let Some(n) = args.fail_fetch_at {
        transport.fail_fetch_at(n);
    }
    if let Some(n) = args.fail_delete_at {
        transport.fail_delete_at(n);
    }
    let ids = transport
        .seed_timeline(CHANNEL, args.messages, spacing, Utc::now())
        .context("--messages times --spacing-secs reaches back before 2015")?;

    let store = Arc::new(SessionStore::new());
    let controller = PurgeController::new(store.clone(), config.limits.clone());
    if controller.begin(CHANNEL, USER) != BeginOutcome::Created {
        bail!("simulated channel already has a purge setup");
    }

    if let Some(limit) = args.limit {
        controller.set_bulk_limit(CHANNEL, USER, limit)?;
    }
    let start = message_at(&ids, args.start)?;
    let end = message_at(&ids, args.end)?;
    controller
        .select_start(CHANNEL, USER, start)
        .context("selecting start message")?;
    if controller
        .select_end(CHANNEL, USER, end)
        .context("selecting end message")?
        != Selection::Set
    {
        bail!("end message was not set");
    }

    for pos in &args.exclude {
        let id = message_at(&ids, *pos)?;
        if !controller.exclude(CHANNEL, USER, id)? {
            tracing::info!(position = pos, "Message already excluded");
        }
    }
    for pos in &args.include {
        let id = message_at(&ids, *pos)?;
        if !controller.include(CHANNEL, USER, id)? {
            tracing::info!(position = pos, "Message was not excluded");
        }
    }

    let plan = controller.claim_run(CHANNEL, USER)?;
    let expected = (args.start.abs_diff(args.end) + 1).saturating_sub(plan.exclusions.len());
    let sink = if args.json {
        TerminalSink::hidden()
    } else {
        TerminalSink::new(expected as u64)
    };

    let runner = PurgeRunner::new(transport.clone(), store);
    let handle = runner.spawn(CHANNEL, plan, Arc::new(sink));

    let token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = handle.wait().await.context("purge task panicked")?;
    let summary = Summary::new(&outcome, &transport);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} message(s) left in the channel after {} delete call(s)",
            summary.remaining, summary.delete_calls
        );
    }

    if !outcome.is_completed() {
        bail!("purge did not complete ({})", summary.outcome);
    }
    Ok(())
}
