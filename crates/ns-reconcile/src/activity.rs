//! Replays the blueprint's scheduled activity stream against created objects.

use std::time::Duration;

use ns_blueprint::{ActivityAction, ActivityEvent, Blueprint, EntityKind};
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;

use crate::Reconciler;
use crate::audit::{AuditAction, AuditEntry};
use crate::error::{ReconcileError, ReconcileResult};
use crate::payload::{comment_payload, paragraph_block, rich_text, select_patch};

/// Shortest pause between ticks, in seconds.
const MIN_TICK_SLEEP_SECS: f64 = 1.0;
/// Longest pause between ticks: one week.
const MAX_TICK_SLEEP_SECS: f64 = 7.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub tick_minutes: f64,
    /// Fractional spread applied to each pause, clamped to `0.0..=1.0`.
    pub jitter: f64,
    /// Number of passes; at least one always runs.
    pub iterations: usize,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            tick_minutes: 5.0,
            jitter: 0.2,
            iterations: 1,
        }
    }
}

impl ActivityOptions {
    /// Pause before the next tick: `tick * 60 * (1 + u)`, `u` uniform in `[-jitter, jitter]`.
    pub fn sleep_between_ticks(&self, rng: &mut impl Rng) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let spread = if jitter > 0.0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let raw = self.tick_minutes.max(0.0) * 60.0 * (1.0 + spread);
        let secs = if raw.is_finite() {
            raw.clamp(MIN_TICK_SLEEP_SECS, MAX_TICK_SLEEP_SECS)
        } else {
            MAX_TICK_SLEEP_SECS
        };
        Duration::from_secs_f64(secs)
    }
}

/// Outcome of a single pass over the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub executed: usize,
    /// Due events whose target has no remote object yet.
    pub missing_target: Vec<String>,
    /// Due events of a kind that is never dispatched.
    pub unsupported: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityReport {
    pub executed: usize,
    pub ticks: usize,
    pub missing_target: Vec<String>,
    pub unsupported: Vec<String>,
}

impl ActivityReport {
    fn absorb(&mut self, tick: TickReport) {
        self.ticks += 1;
        self.executed += tick.executed;
        for event_id in tick.missing_target {
            if !self.missing_target.contains(&event_id) {
                self.missing_target.push(event_id);
            }
        }
        for event_id in tick.unsupported {
            if !self.unsupported.contains(&event_id) {
                self.unsupported.push(event_id);
            }
        }
    }
}

impl Reconciler<'_> {
    /// Run `options.iterations` ticks, reading the current time from `clock`
    /// at the start of each one.
    pub async fn run_activity<C>(
        &self,
        blueprint: &Blueprint,
        options: &ActivityOptions,
        clock: C,
    ) -> ReconcileResult<ActivityReport>
    where
        C: Fn() -> OffsetDateTime,
    {
        let iterations = options.iterations.max(1);
        let mut report = ActivityReport::default();
        for tick in 0..iterations {
            if tick > 0 {
                let pause = options.sleep_between_ticks(&mut rand::thread_rng());
                tracing::debug!(tick, pause_secs = pause.as_secs_f64(), "sleeping before next tick");
                tokio::time::sleep(pause).await;
            }
            let result = self.run_activity_tick(blueprint, clock()).await?;
            report.absorb(result);
        }
        tracing::info!(
            executed = report.executed,
            ticks = report.ticks,
            missing_target = report.missing_target.len(),
            "activity finished"
        );
        Ok(report)
    }

    /// Execute every event due at `now` that has not run before.
    pub async fn run_activity_tick(
        &self,
        blueprint: &Blueprint,
        now: OffsetDateTime,
    ) -> ReconcileResult<TickReport> {
        let mut report = TickReport::default();
        for event in &blueprint.activity_stream {
            if !event.is_due(now) || self.store.was_event_run(&event.event_id)? {
                continue;
            }
            if matches!(event.action, ActivityAction::PageCreate { .. }) {
                tracing::debug!(event_id = %event.event_id, "page_create events are not dispatched");
                report.unsupported.push(event.event_id.clone());
                continue;
            }
            let Some(remote_id) = self.store.remote_id_of(&event.target_synth_id)? else {
                tracing::warn!(
                    event_id = %event.event_id,
                    target = %event.target_synth_id,
                    "activity target was never created; skipping"
                );
                report.missing_target.push(event.event_id.clone());
                continue;
            };
            self.dispatch(event, &remote_id).await?;
            self.store.mark_event_run(&event.event_id)?;
            report.executed += 1;
        }
        Ok(report)
    }

    async fn dispatch(&self, event: &ActivityEvent, remote_id: &str) -> ReconcileResult<()> {
        let (kind, action) = match &event.action {
            ActivityAction::PageEdit { append } => {
                self.workspace
                    .append_blocks(remote_id, &[paragraph_block(append)])
                    .await
                    .map_err(|e| ReconcileError::entity(EntityKind::Page, &event.target_synth_id, e))?;
                (EntityKind::Page, AuditAction::ActivityPageEdit)
            }
            ActivityAction::CommentAdd { body } => {
                let payload = comment_payload(remote_id, rich_text(body));
                self.workspace
                    .create_object(EntityKind::Comment, &payload)
                    .await
                    .map_err(|e| ReconcileError::entity(EntityKind::Comment, &event.target_synth_id, e))?;
                (EntityKind::Page, AuditAction::ActivityCommentAdd)
            }
            ActivityAction::RowUpdate { selects } => {
                self.workspace
                    .update_object(EntityKind::Row, remote_id, &select_patch(selects))
                    .await
                    .map_err(|e| ReconcileError::entity(EntityKind::Row, &event.target_synth_id, e))?;
                (EntityKind::Row, AuditAction::ActivityRowUpdate)
            }
            ActivityAction::PageCreate { .. } => return Ok(()),
        };
        tracing::debug!(event_id = %event.event_id, %kind, remote_id, "activity event executed");
        self.audit.record(
            &AuditEntry::new(action, Some(kind), &event.target_synth_id, Some(remote_id))
                .with_detail(serde_json::json!({ "event_id": event.event_id })),
        )
    }
}
