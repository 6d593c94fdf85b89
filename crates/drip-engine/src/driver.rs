//! Campaign Driver: one pass of one campaign over every eligible owner.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use drip_core::config::{CampaignsConfig, DripConfig};
use drip_core::{CampaignKind, EmailType};
use drip_scheduler::RandomDelay;
use drip_store::{OwnerSource, SendLedger};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::campaigns::{is_eligible, rules_for};
use crate::context::{ContextBuilder, OwnerContext, Recipient};
use crate::decision::{resolve, Outcome};
use crate::error::{EngineError, Result};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::rule::{CampaignRule, Rule};

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Owners processed in parallel.
    pub concurrency: usize,
    pub owner_timeout: Duration,
    pub send_timeout: Duration,
    /// Throttle after each delivered email, per worker.
    pub delay: RandomDelay,
    /// Reservations older than this are released at the start of a run.
    pub stale_after: chrono::Duration,
    /// Resolve and render, but neither deliver nor write the ledger.
    pub dry_run: bool,
    pub campaigns: CampaignsConfig,
    pub from: String,
    pub reply_to: Option<String>,
}

impl DriverOptions {
    pub fn from_config(config: &DripConfig) -> Self {
        let d = &config.driver;
        Self {
            concurrency: d.concurrency.max(1),
            owner_timeout: Duration::from_secs(d.owner_timeout_secs),
            send_timeout: Duration::from_secs(d.send_timeout_secs),
            delay: RandomDelay::from_millis(d.min_delay_ms, d.max_delay_ms),
            stale_after: chrono::Duration::minutes(d.stale_reservation_mins),
            dry_run: false,
            campaigns: config.campaigns.clone(),
            from: config.mailer.from.clone(),
            reply_to: config.mailer.reply_to.clone(),
        }
    }
}

/// Per-run counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub campaign: CampaignKind,
    /// Owners that passed the eligibility filter.
    pub eligible: usize,
    pub sent: usize,
    /// Skip resolutions recorded (an owner can contribute several).
    pub skipped: usize,
    pub paused: usize,
    /// Every rule already handled.
    pub idle: usize,
    /// Lost the reservation race to another run.
    pub conflicts: usize,
    pub failed: usize,
}

impl CampaignSummary {
    fn new(campaign: CampaignKind) -> Self {
        Self {
            campaign,
            eligible: 0,
            sent: 0,
            skipped: 0,
            paused: 0,
            idle: 0,
            conflicts: 0,
            failed: 0,
        }
    }

    fn add(&mut self, outcome: &OwnerOutcome) {
        self.skipped += outcome.skipped.len();
        match outcome.result {
            OwnerResult::Sent => self.sent += 1,
            OwnerResult::Paused => self.paused += 1,
            OwnerResult::Idle => self.idle += 1,
            OwnerResult::Conflict => self.conflicts += 1,
        }
    }
}

impl fmt::Display for CampaignSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} eligible, {} sent, {} skipped, {} paused, {} idle, {} conflicts, {} failed",
            self.campaign,
            self.eligible,
            self.sent,
            self.skipped,
            self.paused,
            self.idle,
            self.conflicts,
            self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerResult {
    Sent,
    Paused,
    Idle,
    Conflict,
}

#[derive(Debug)]
struct OwnerOutcome {
    skipped: Vec<EmailType>,
    result: OwnerResult,
}

/// State shared by every owner task in one run.
struct RunShared {
    kind: CampaignKind,
    rules: Vec<CampaignRule>,
    ledger: Arc<dyn SendLedger>,
    mailer: Arc<dyn Mailer>,
    opts: DriverOptions,
}

pub struct CampaignDriver {
    source: Arc<dyn OwnerSource>,
    ledger: Arc<dyn SendLedger>,
    mailer: Arc<dyn Mailer>,
    opts: DriverOptions,
}

impl CampaignDriver {
    pub fn new(
        source: Arc<dyn OwnerSource>,
        ledger: Arc<dyn SendLedger>,
        mailer: Arc<dyn Mailer>,
        opts: DriverOptions,
    ) -> Self {
        Self {
            source,
            ledger,
            mailer,
            opts,
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.opts
    }

    /// Run every campaign in order. Each campaign reloads the batch so it
    /// sees what earlier campaigns recorded.
    pub async fn run_all(&self, as_of: DateTime<Utc>) -> Result<Vec<CampaignSummary>> {
        let mut summaries = Vec::with_capacity(CampaignKind::ALL.len());
        for kind in CampaignKind::ALL {
            summaries.push(self.run_campaign(kind, as_of).await?);
        }
        Ok(summaries)
    }

    /// One pass of `kind`. Only a failure to load owner data is returned as
    /// an error; everything per owner is counted in the summary.
    #[instrument(skip(self), fields(campaign = %kind, dry_run = self.opts.dry_run))]
    pub async fn run_campaign(
        &self,
        kind: CampaignKind,
        as_of: DateTime<Utc>,
    ) -> Result<CampaignSummary> {
        if !self.opts.dry_run {
            self.ledger.release_stale(Utc::now() - self.opts.stale_after)?;
        }

        let batch = self.source.load_batch()?;
        let builder = ContextBuilder::new(batch, self.opts.campaigns.dormant_after_days);
        let mut summary = CampaignSummary::new(kind);

        let mut work: Vec<(OwnerContext, Recipient)> = Vec::new();
        for owner_id in builder.owner_ids() {
            let Some(recipient) = builder.recipient(owner_id) else {
                debug!(owner_id, "no email address, not eligible");
                continue;
            };
            match builder.build(owner_id, as_of) {
                Ok(ctx) if is_eligible(kind, &ctx) => work.push((ctx, recipient)),
                Ok(_) => {}
                Err(EngineError::NotInstalled(_)) => {
                    debug!(owner_id, "never installed, not eligible");
                }
                Err(e) => {
                    warn!(owner_id, error = %e, "context build failed");
                    summary.failed += 1;
                }
            }
        }
        summary.eligible = work.len();
        info!(
            owners = builder.owner_count(),
            eligible = summary.eligible,
            "campaign run starting"
        );

        let shared = Arc::new(RunShared {
            kind,
            rules: rules_for(kind, &self.opts.campaigns),
            ledger: Arc::clone(&self.ledger),
            mailer: Arc::clone(&self.mailer),
            opts: self.opts.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (ctx, recipient) in work {
            // Acquire before spawning so at most `concurrency` tasks exist.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let shared = Arc::clone(&shared);
            tasks.spawn(async move {
                let owner_id = ctx.owner_id;
                let timeout = shared.opts.owner_timeout;
                let result = match tokio::time::timeout(
                    timeout,
                    process_owner(&shared, &ctx, &recipient),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout(timeout)),
                };

                if matches!(&result, Ok(o) if o.result == OwnerResult::Sent)
                    && !shared.opts.dry_run
                {
                    let pause = shared.opts.delay.sample(&mut rand::thread_rng());
                    tokio::time::sleep(pause).await;
                }
                drop(permit);
                (owner_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.add(&outcome),
                Ok((owner_id, Err(e))) => {
                    warn!(owner_id, error = %e, "owner processing failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "owner task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(%summary, "campaign run finished");
        Ok(summary)
    }
}

async fn process_owner(
    shared: &RunShared,
    ctx: &OwnerContext,
    recipient: &Recipient,
) -> Result<OwnerOutcome> {
    let owner_id = ctx.owner_id;
    let ledger = &shared.ledger;
    let dry_run = shared.opts.dry_run;

    let already_sent: HashSet<EmailType> = ledger.list_sent_types(owner_id)?;
    let resolution = resolve(&shared.rules, ctx, &already_sent);

    for email_type in &resolution.skipped {
        if !dry_run {
            ledger.record_send(owner_id, &ctx.owner_name, *email_type, None)?;
        }
        info!(owner_id, %email_type, "step skipped");
    }

    let result = match resolution.outcome {
        Outcome::Exhausted => {
            debug!(owner_id, "campaign complete for owner");
            OwnerResult::Idle
        }
        Outcome::Paused(email_type) => {
            debug!(owner_id, %email_type, "paused");
            OwnerResult::Paused
        }
        Outcome::Send(rule) => deliver(shared, ctx, recipient, rule).await?,
    };

    Ok(OwnerOutcome {
        skipped: resolution.skipped,
        result,
    })
}

async fn deliver(
    shared: &RunShared,
    ctx: &OwnerContext,
    recipient: &Recipient,
    rule: &CampaignRule,
) -> Result<OwnerResult> {
    let owner_id = ctx.owner_id;
    let email_type = rule.email_type();
    let rendered = rule.render(ctx, recipient);

    if shared.opts.dry_run {
        info!(owner_id, %email_type, to = %recipient.email, subject = %rendered.subject, "dry run, would send");
        return Ok(OwnerResult::Sent);
    }

    let reservation = Uuid::new_v4().to_string();
    if !shared
        .ledger
        .reserve(owner_id, &ctx.owner_name, email_type, &reservation)?
    {
        info!(owner_id, %email_type, "already reserved by another run");
        return Ok(OwnerResult::Conflict);
    }

    let email = OutgoingEmail {
        from: shared.opts.from.clone(),
        to: recipient.email.clone(),
        reply_to: shared.opts.reply_to.clone(),
        subject: rendered.subject,
        text: rendered.body,
        idempotency_key: Some(format!("{owner_id}/{email_type}")),
        tags: vec![
            ("campaign".to_string(), shared.kind.to_string()),
            ("email_type".to_string(), email_type.to_string()),
        ],
    };

    let send_timeout = shared.opts.send_timeout;
    let delivered = match tokio::time::timeout(send_timeout, shared.mailer.send(&email)).await {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(e)) => {
            release(shared, owner_id, email_type, &reservation);
            return Err(e.into());
        }
        Err(_) => {
            release(shared, owner_id, email_type, &reservation);
            return Err(EngineError::Timeout(send_timeout));
        }
    };

    shared
        .ledger
        .confirm(owner_id, email_type, &reservation, &delivered.id)?;
    info!(
        owner_id,
        %email_type,
        mailer = shared.mailer.name(),
        id = %delivered.id,
        "email sent"
    );
    Ok(OwnerResult::Sent)
}

/// Free the slot after a failed delivery so the next cycle retries.
fn release(shared: &RunShared, owner_id: i64, email_type: EmailType, reservation: &str) {
    if let Err(e) = shared.ledger.release(owner_id, email_type, reservation) {
        // The stale-reservation sweep will pick it up.
        error!(owner_id, %email_type, error = %e, "failed to release reservation");
    }
}
