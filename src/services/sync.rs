// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestration: list, detail, insert, checkpoint.
//!
//! All provider calls and store writes for one run are issued sequentially.
//! The unit of durable work is one insertion batch; a run that stops early
//! (quota, auth) flushes what it has before returning.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{
    ActivityRecord, PausedRun, PhotoRecord, ProgressSnapshot, StoredActivity, SyncCursor,
    SyncMode, SyncOutcome, SyncPhase, SyncSummary, TokenBundle,
};
use crate::services::dedup::DedupInserter;
use crate::services::gateway::ProviderReply;
use crate::services::progress::{ProgressReporter, SyncEvents};
use crate::services::strava::{StravaActivity, StravaApi};
use crate::services::transform::RecordTransformer;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Tunable run limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Summaries requested per list page
    pub page_size: u32,
    /// Hard cap on summaries accumulated by one listing
    pub safety_cap: usize,
    /// Items per insertion batch
    pub batch_size: usize,
    /// Overlap applied to the incremental lower bound
    pub lookback_days: i64,
    /// Requested photo size in pixels
    pub photo_size_hint: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            safety_cap: 10_000,
            batch_size: 50,
            lookback_days: 7,
            photo_size_hint: 2048,
        }
    }
}

/// One logical run for one user.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub user_id: String,
    pub mode: SyncMode,
    pub credential: TokenBundle,
    /// Set when resuming a paused run
    pub cursor: Option<SyncCursor>,
}

/// Terminal state of a run.
///
/// `refreshed_credential` is reported regardless of outcome; the caller must
/// persist it because the original bundle may no longer be valid.
#[derive(Debug)]
pub struct SyncReport {
    pub outcome: Result<SyncOutcome, SyncError>,
    pub refreshed_credential: Option<TokenBundle>,
}

impl SyncReport {
    pub fn user_message(&self) -> &'static str {
        match &self.outcome {
            Ok(SyncOutcome::Completed(_)) => "Sync complete",
            Ok(SyncOutcome::Paused(_)) => SyncError::RESUME_MESSAGE,
            Err(e) => e.user_message(),
        }
    }
}

/// Per-run mutable state.
struct RunContext<'a> {
    user_id: &'a str,
    credential: TokenBundle,
    refreshed: Option<TokenBundle>,
    reporter: &'a ProgressReporter,
}

impl RunContext<'_> {
    /// Adopt any refreshed credential and unwrap the payload.
    fn absorb<T>(&mut self, reply: ProviderReply<T>) -> Result<T, SyncError> {
        if let Some(bundle) = reply.refreshed_credential {
            self.credential = bundle.clone();
            self.refreshed = Some(bundle);
        }
        reply.payload
    }
}

/// Activity batch awaiting insertion plus the running totals.
struct ActivityProgress {
    batch: Vec<ActivityRecord>,
    summary: SyncSummary,
    detailed: u32,
    /// Lower bound carried into every checkpoint
    after: Option<i64>,
    cursor: Option<SyncCursor>,
}

/// Photo batch awaiting insertion plus the running totals.
struct PhotoProgress {
    batch: Vec<PhotoRecord>,
    pending_activities: usize,
    pending_oldest: Option<i64>,
    total: u32,
    summary: SyncSummary,
    cursor: Option<SyncCursor>,
}

/// Drives full, incremental and photo sync runs.
#[derive(Clone)]
pub struct SyncOrchestrator {
    api: StravaApi,
    transformer: RecordTransformer,
    store: Arc<dyn SyncStore>,
    inserter: DedupInserter,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        api: StravaApi,
        transformer: RecordTransformer,
        store: Arc<dyn SyncStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            api,
            transformer,
            inserter: DedupInserter::new(store.clone()),
            store,
            settings,
        }
    }

    /// Run in a background task and stream its progress.
    ///
    /// The stream yields progress snapshots and ends with exactly one
    /// `SyncEvent::Finished`.
    pub fn spawn(&self, request: SyncRequest) -> SyncEvents {
        let (reporter, events) = ProgressReporter::channel();
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let report = orchestrator.run(request, &reporter).await;
            reporter.finish(report);
        });

        events
    }

    pub async fn full_historical_sync(
        &self,
        user_id: &str,
        credential: TokenBundle,
        cursor: Option<SyncCursor>,
        reporter: &ProgressReporter,
    ) -> SyncReport {
        self.run(
            SyncRequest {
                user_id: user_id.to_string(),
                mode: SyncMode::Full,
                credential,
                cursor,
            },
            reporter,
        )
        .await
    }

    pub async fn incremental_sync(
        &self,
        user_id: &str,
        credential: TokenBundle,
        cursor: Option<SyncCursor>,
        reporter: &ProgressReporter,
    ) -> SyncReport {
        self.run(
            SyncRequest {
                user_id: user_id.to_string(),
                mode: SyncMode::Incremental,
                credential,
                cursor,
            },
            reporter,
        )
        .await
    }

    pub async fn photo_sync(
        &self,
        user_id: &str,
        credential: TokenBundle,
        cursor: Option<SyncCursor>,
        reporter: &ProgressReporter,
    ) -> SyncReport {
        self.run(
            SyncRequest {
                user_id: user_id.to_string(),
                mode: SyncMode::Photos,
                credential,
                cursor,
            },
            reporter,
        )
        .await
    }

    pub async fn run(&self, request: SyncRequest, reporter: &ProgressReporter) -> SyncReport {
        tracing::info!(
            user_id = %request.user_id,
            mode = ?request.mode,
            cursor = ?request.cursor,
            "Starting sync run"
        );

        let mut ctx = RunContext {
            user_id: &request.user_id,
            credential: request.credential.clone(),
            refreshed: None,
            reporter,
        };

        let outcome = match request.mode {
            SyncMode::Full => self.sync_activities(&mut ctx, None, request.cursor).await,
            SyncMode::Incremental => match self
                .incremental_lower_bound(&request.user_id, request.cursor)
                .await
            {
                Ok(after) => self.sync_activities(&mut ctx, after, request.cursor).await,
                Err(e) => Err(e),
            },
            SyncMode::Photos => self.sync_photos(&mut ctx, request.cursor).await,
        };

        match &outcome {
            Ok(SyncOutcome::Completed(summary)) => {
                tracing::info!(
                    user_id = %request.user_id,
                    imported = summary.imported,
                    fetched = summary.fetched,
                    photos_inserted = summary.photos_inserted,
                    "Sync run complete"
                );
                reporter.report(snapshot_for(SyncPhase::Done, summary));
            }
            Ok(SyncOutcome::Paused(paused)) => {
                tracing::info!(
                    user_id = %request.user_id,
                    window = %paused.window,
                    resume_at = %paused.resume_at,
                    cursor = ?paused.cursor,
                    "Sync run paused on quota"
                );
                let mut snapshot = snapshot_for(SyncPhase::Paused, &paused.summary);
                snapshot.oldest_processed_timestamp = paused.cursor.map(|c| c.before);
                reporter.report(snapshot);
            }
            Err(e) => {
                tracing::error!(user_id = %request.user_id, error = %e, "Sync run failed");
                reporter.report(ProgressSnapshot {
                    phase: Some(SyncPhase::Failed),
                    ..Default::default()
                });
            }
        }

        SyncReport {
            outcome,
            refreshed_credential: ctx.refreshed,
        }
    }

    /// `after` bound for incremental runs: last successful sync minus the
    /// lookback. No prior sync means no lower bound.
    ///
    /// A resumed run keeps the bound its cursor carries. The marker has
    /// already moved during the interrupted run, so recomputing it would
    /// skip the remainder.
    async fn incremental_lower_bound(
        &self,
        user_id: &str,
        cursor: Option<SyncCursor>,
    ) -> Result<Option<i64>, SyncError> {
        if let Some(cursor) = cursor {
            return Ok(cursor.after);
        }

        let Some(last_sync) = self.store.last_sync_timestamp(user_id).await? else {
            return Ok(None);
        };
        let lookback_days = self.settings.lookback_days;
        Duration::try_days(lookback_days)
            .and_then(|lookback| last_sync.checked_sub_signed(lookback))
            .map(|after| Some(after.timestamp()))
            .ok_or_else(|| {
                SyncError::InvariantViolation(format!(
                    "Lookback of {} days out of range",
                    lookback_days
                ))
            })
    }

    async fn sync_activities(
        &self,
        ctx: &mut RunContext<'_>,
        after: Option<i64>,
        cursor: Option<SyncCursor>,
    ) -> Result<SyncOutcome, SyncError> {
        let summaries = match self.list_summaries(ctx, after, cursor).await? {
            Ok(summaries) => summaries,
            Err(paused) => return Ok(SyncOutcome::Paused(paused)),
        };

        let mut progress = ActivityProgress {
            batch: Vec::with_capacity(self.settings.batch_size),
            summary: SyncSummary {
                fetched: summaries.len() as u32,
                ..Default::default()
            },
            detailed: 0,
            after,
            cursor,
        };

        ctx.reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Detailing),
            fetched: Some(progress.summary.fetched),
            ..Default::default()
        });

        for native in &summaries {
            let reply = self
                .api
                .get_activity(ctx.user_id, &ctx.credential, native.id)
                .await;

            let record = match ctx.absorb(reply) {
                Ok(detail) => self.transformer.transform(&detail, ctx.user_id),
                Err(SyncError::RateLimited {
                    window,
                    retry_after,
                }) => {
                    self.flush_activities(ctx, &mut progress).await?;
                    return Ok(SyncOutcome::Paused(PausedRun {
                        cursor: progress.cursor,
                        window,
                        resume_at: retry_after,
                        summary: progress.summary,
                    }));
                }
                Err(e @ SyncError::AuthExpired(_)) => {
                    self.flush_activities(ctx, &mut progress).await?;
                    return Err(e);
                }
                Err(e) if e.is_item_level() => {
                    let err = SyncError::DetailFetch {
                        activity_id: native.id,
                        message: e.to_string(),
                    };
                    tracing::warn!(
                        user_id = ctx.user_id,
                        error = %err,
                        "Falling back to summary record"
                    );
                    self.transformer.transform(native, ctx.user_id)
                }
                Err(e) => return Err(e),
            };

            progress.detailed += 1;
            progress.batch.push(record);

            if progress.batch.len() >= self.settings.batch_size {
                self.flush_activities(ctx, &mut progress).await?;
            }
        }

        self.flush_activities(ctx, &mut progress).await?;
        Ok(SyncOutcome::Completed(progress.summary))
    }

    /// Page through the list endpoint. The inner `Err` is a quota pause.
    async fn list_summaries(
        &self,
        ctx: &mut RunContext<'_>,
        after: Option<i64>,
        cursor: Option<SyncCursor>,
    ) -> Result<Result<Vec<StravaActivity>, PausedRun>, SyncError> {
        // Inclusive of the cursor second: records sharing the oldest flushed
        // start time may not have been processed yet.
        let before = cursor.map(|c| c.before.saturating_add(1));
        let per_page = self.settings.page_size.max(1);
        let cap = self.settings.safety_cap;

        let mut summaries: Vec<StravaActivity> = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1u32;

        loop {
            let reply = self
                .api
                .list_activities(ctx.user_id, &ctx.credential, page, per_page, after, before)
                .await;

            let batch = match ctx.absorb(reply) {
                Ok(batch) => batch,
                Err(SyncError::RateLimited {
                    window,
                    retry_after,
                }) => {
                    return Ok(Err(PausedRun {
                        cursor,
                        window,
                        resume_at: retry_after,
                        summary: SyncSummary::default(),
                    }));
                }
                Err(e) => return Err(e),
            };

            let returned = batch.len();
            summaries.extend(batch.into_iter().filter(|s| {
                before.map_or(true, |b| s.start_date.timestamp() < b) && seen.insert(s.id)
            }));

            tracing::info!(
                user_id = ctx.user_id,
                page,
                returned,
                total = summaries.len(),
                "Listed activity page"
            );
            ctx.reporter.report(ProgressSnapshot {
                phase: Some(SyncPhase::Listing),
                fetched: Some(summaries.len() as u32),
                ..Default::default()
            });

            if summaries.len() >= cap {
                tracing::warn!(user_id = ctx.user_id, cap, "Listing hit safety cap");
                break;
            }
            if returned < per_page as usize {
                break;
            }
            page += 1;
        }

        // Newest first, so the cursor only ever moves backward in time.
        summaries.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        summaries.truncate(cap);
        Ok(Ok(summaries))
    }

    async fn flush_activities(
        &self,
        ctx: &mut RunContext<'_>,
        progress: &mut ActivityProgress,
    ) -> Result<(), SyncError> {
        if progress.batch.is_empty() {
            return Ok(());
        }

        ctx.reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Inserting),
            fetched: Some(progress.summary.fetched),
            detailed: Some(progress.detailed),
            ..Default::default()
        });

        let inserted = self.inserter.insert_activities(&progress.batch).await?;
        progress.summary.imported += inserted as u32;

        // Only new rows move the marker; a batch of known records must not
        // mask data a later incremental run should still pick up.
        if inserted > 0 {
            self.store
                .update_last_sync_timestamp(ctx.user_id, Utc::now())
                .await?;
        }

        let oldest = progress
            .batch
            .iter()
            .map(|r| r.start_time.timestamp())
            .min();
        if let Some(before) = oldest {
            progress.cursor = Some(SyncCursor::new(before, progress.after));
        }
        progress.batch.clear();

        ctx.reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Checkpointed),
            fetched: Some(progress.summary.fetched),
            detailed: Some(progress.detailed),
            inserted: Some(progress.summary.imported),
            oldest_processed_timestamp: oldest,
            ..Default::default()
        });
        Ok(())
    }

    async fn sync_photos(
        &self,
        ctx: &mut RunContext<'_>,
        cursor: Option<SyncCursor>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut activities: Vec<StoredActivity> = self
            .store
            .find_with_nonzero_photo_count(ctx.user_id)
            .await?;
        activities.sort_by(|a, b| b.record.start_time.cmp(&a.record.start_time));
        if let Some(cursor) = cursor {
            activities.retain(|a| a.record.start_time.timestamp() <= cursor.before);
        }

        let mut progress = PhotoProgress {
            batch: Vec::new(),
            pending_activities: 0,
            pending_oldest: None,
            total: activities.len() as u32,
            summary: SyncSummary::default(),
            cursor,
        };

        ctx.reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Detailing),
            activities_processed: Some(0),
            total_activities: Some(progress.total),
            ..Default::default()
        });

        for stored in &activities {
            let activity_id = stored.record.provider_activity_id;
            let reply = self
                .api
                .get_activity_photos(
                    ctx.user_id,
                    &ctx.credential,
                    activity_id,
                    self.settings.photo_size_hint,
                )
                .await;

            match ctx.absorb(reply) {
                Ok(photos) => progress.batch.extend(
                    photos
                        .iter()
                        .filter_map(|p| self.transformer.transform_photo(p, &stored.internal_id)),
                ),
                Err(SyncError::RateLimited {
                    window,
                    retry_after,
                }) => {
                    self.flush_photos(ctx, &mut progress).await?;
                    return Ok(SyncOutcome::Paused(PausedRun {
                        cursor: progress.cursor,
                        window,
                        resume_at: retry_after,
                        summary: progress.summary,
                    }));
                }
                Err(e @ SyncError::AuthExpired(_)) => {
                    self.flush_photos(ctx, &mut progress).await?;
                    return Err(e);
                }
                Err(e) if e.is_item_level() => {
                    tracing::warn!(
                        user_id = ctx.user_id,
                        activity_id,
                        error = %e,
                        "Skipping photos for activity"
                    );
                }
                Err(e) => return Err(e),
            }

            progress.summary.activities_processed += 1;
            progress.pending_activities += 1;
            progress.pending_oldest = Some(stored.record.start_time.timestamp());

            if progress.pending_activities >= self.settings.batch_size {
                self.flush_photos(ctx, &mut progress).await?;
            }
        }

        self.flush_photos(ctx, &mut progress).await?;
        Ok(SyncOutcome::Completed(progress.summary))
    }

    async fn flush_photos(
        &self,
        ctx: &mut RunContext<'_>,
        progress: &mut PhotoProgress,
    ) -> Result<(), SyncError> {
        if progress.pending_activities == 0 {
            return Ok(());
        }

        let inserted = self.inserter.insert_photos(&progress.batch).await?;
        progress.summary.photos_inserted += inserted as u32;
        if let Some(before) = progress.pending_oldest {
            progress.cursor = Some(SyncCursor::new(before, None));
        }

        progress.batch.clear();
        progress.pending_activities = 0;

        ctx.reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Checkpointed),
            activities_processed: Some(progress.summary.activities_processed),
            total_activities: Some(progress.total),
            photos_inserted: Some(progress.summary.photos_inserted),
            oldest_processed_timestamp: progress.pending_oldest.take(),
            ..Default::default()
        });
        Ok(())
    }
}

fn snapshot_for(phase: SyncPhase, summary: &SyncSummary) -> ProgressSnapshot {
    ProgressSnapshot {
        phase: Some(phase),
        fetched: Some(summary.fetched),
        inserted: Some(summary.imported),
        activities_processed: Some(summary.activities_processed),
        photos_inserted: Some(summary.photos_inserted),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.page_size, 200);
        assert_eq!(settings.safety_cap, 10_000);
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.lookback_days, 7);
        assert_eq!(settings.photo_size_hint, 2048);
    }

    #[test]
    fn test_report_user_messages() {
        let paused = SyncReport {
            outcome: Ok(SyncOutcome::Paused(PausedRun {
                cursor: None,
                window: "short".to_string(),
                resume_at: Utc::now(),
                summary: SyncSummary::default(),
            })),
            refreshed_credential: None,
        };
        assert_eq!(paused.user_message(), SyncError::RESUME_MESSAGE);

        let auth = SyncReport {
            outcome: Err(SyncError::AuthExpired("revoked".to_string())),
            refreshed_credential: None,
        };
        assert_eq!(auth.user_message(), SyncError::RECONNECT_MESSAGE);

        let store = SyncReport {
            outcome: Err(SyncError::Store("down".to_string())),
            refreshed_credential: None,
        };
        assert_eq!(store.user_message(), SyncError::FAILURE_MESSAGE);
    }
}
