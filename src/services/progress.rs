// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Progress events for sync runs.
//!
//! A run produces a finite sequence of progress snapshots terminated by
//! exactly one `Finished` event. Sending never blocks and a consumer that
//! stops listening does not affect the run.

use crate::models::ProgressSnapshot;
use crate::services::sync::SyncReport;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SyncEvent {
    Progress(ProgressSnapshot),
    Finished(SyncReport),
}

/// Producer side handed to the orchestrator.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl ProgressReporter {
    /// Reporter that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Reporter paired with the stream that receives its events.
    pub fn channel() -> (Self, SyncEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx: Some(tx) },
            SyncEvents {
                rx,
                finished: false,
            },
        )
    }

    pub fn report(&self, snapshot: ProgressSnapshot) {
        tracing::debug!(
            phase = ?snapshot.phase,
            fetched = ?snapshot.fetched,
            detailed = ?snapshot.detailed,
            inserted = ?snapshot.inserted,
            photos_inserted = ?snapshot.photos_inserted,
            oldest = ?snapshot.oldest_processed_timestamp,
            "Sync progress"
        );
        self.send(SyncEvent::Progress(snapshot));
    }

    /// Emit the terminal event. Consumes the reporter so nothing follows it.
    pub fn finish(self, report: SyncReport) {
        self.send(SyncEvent::Finished(report));
    }

    fn send(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is watching; the run continues.
            let _ = tx.send(event);
        }
    }
}

/// Consumer side: a `Stream` that ends after the `Finished` event.
pub struct SyncEvents {
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    finished: bool,
}

impl SyncEvents {
    /// Drain the stream and return the final report, if one arrived.
    pub async fn into_report(mut self) -> Option<SyncReport> {
        use futures_util::StreamExt;

        while let Some(event) = self.next().await {
            if let SyncEvent::Finished(report) = event {
                return Some(report);
            }
        }
        None
    }
}

impl Stream for SyncEvents {
    type Item = SyncEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if matches!(event, SyncEvent::Finished(_)) {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SyncOutcome, SyncPhase, SyncSummary};
    use futures_util::StreamExt;

    fn report() -> SyncReport {
        SyncReport {
            outcome: Ok(SyncOutcome::Completed(SyncSummary::default())),
            refreshed_credential: None,
        }
    }

    #[tokio::test]
    async fn test_stream_ends_after_finished() {
        let (reporter, events) = ProgressReporter::channel();
        reporter.report(ProgressSnapshot {
            phase: Some(SyncPhase::Listing),
            fetched: Some(3),
            ..Default::default()
        });
        let extra = reporter.clone();
        reporter.finish(report());
        // Anything after the terminal event is never observed.
        extra.report(ProgressSnapshot::default());

        let collected: Vec<SyncEvent> = events.collect().await;
        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[0], SyncEvent::Progress(_)));
        assert!(matches!(collected[1], SyncEvent::Finished(_)));
    }

    #[tokio::test]
    async fn test_dropped_consumer_does_not_fail_producer() {
        let (reporter, events) = ProgressReporter::channel();
        drop(events);
        reporter.report(ProgressSnapshot::default());
        reporter.finish(report());
    }

    #[tokio::test]
    async fn test_into_report_skips_progress() {
        let (reporter, events) = ProgressReporter::channel();
        reporter.report(ProgressSnapshot::default());
        reporter.finish(report());

        let report = events.into_report().await.expect("final report");
        assert!(report.outcome.is_ok());
    }
}
