// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One pass over the durable delivery queue.

use chrono::Utc;
use otalink_core::{OtalinkError, QueueStatus, QueuedMessage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dispatcher::ChannelDispatcher;

/// Outcome counters of a [`ChannelDispatcher::sweep_queue`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rows whose TTL had elapsed.
    pub expired: u64,
    /// Rows claimed and re-attempted.
    pub attempted: u64,
    pub sent: u64,
    /// Failed again and returned to the queue.
    pub retried: u64,
    /// Failed again and out of retries.
    pub failed: u64,
}

impl ChannelDispatcher {
    /// Expires stale rows, then re-attempts a batch of queued messages.
    ///
    /// Redelivery never re-enqueues: a failed attempt only updates the
    /// existing row. Callers decide how often to sweep.
    ///
    /// Rows left `PROCESSING` by an interrupted sweep are picked up again
    /// once `queue.claim_lease_ms` has passed since their claim.
    pub async fn sweep_queue(&self) -> Result<SweepReport, OtalinkError> {
        let now = Utc::now();
        let stale_before =
            QueuedMessage::stale_claim_cutoff(now, self.queue_config.claim_lease_ms);
        let mut report = SweepReport {
            expired: self.storage.expire_queued(now, stale_before).await?,
            ..SweepReport::default()
        };

        let claimed = self
            .storage
            .claim_queued(now, stale_before, self.queue_config.sweep_batch_size)
            .await?;

        for row in claimed {
            report.attempted += 1;
            let message = row.to_message();
            let candidates = self
                .candidates(&message.device_id, Some(message.priority))
                .await;

            match self.attempt_delivery(&message, &candidates).await {
                Ok(_) => {
                    // An unrecorded outcome leaves the row to the lease.
                    if let Err(e) = self.storage.mark_sent(row.id).await {
                        warn!(
                            row_id = row.id,
                            message_id = %row.message_id,
                            error = %e,
                            "failed to mark queued message sent"
                        );
                    }
                    report.sent += 1;
                }
                Err(error) => {
                    let status = match self
                        .storage
                        .record_failure(row.id, &error, self.queue_config.max_retries)
                        .await
                    {
                        Ok(status) => status,
                        Err(e) => {
                            warn!(
                                row_id = row.id,
                                message_id = %row.message_id,
                                error = %e,
                                "failed to record delivery failure"
                            );
                            report.retried += 1;
                            continue;
                        }
                    };
                    if status == QueueStatus::Failed {
                        warn!(
                            device_id = %row.device_id,
                            message_id = %row.message_id,
                            retries = row.retry_count + 1,
                            "queued message failed permanently"
                        );
                        report.failed += 1;
                    } else {
                        debug!(
                            device_id = %row.device_id,
                            message_id = %row.message_id,
                            "queued message returned to queue"
                        );
                        report.retried += 1;
                    }
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                attempted = report.attempted,
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "queue sweep finished"
            );
        }
        Ok(report)
    }
}
