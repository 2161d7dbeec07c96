//! Notifier that writes deliveries to the log
//!
//! Stands in for a chat frontend: every observer gets one structured event
//! per notification.

use async_trait::async_trait;
use cw_watcher::{ChangeReport, ErrorReport, Notification, Notifier, NotifyError};
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        for line in describe(&notification) {
            info!(target: "catwatch::notify", "{}", line);
        }
        Ok(())
    }

    async fn report_error(&self, report: ErrorReport) -> Result<(), NotifyError> {
        error!(target: "catwatch::notify", context = %report.context, "{}", report.message);
        Ok(())
    }
}

/// One line per observer and change
pub fn describe(notification: &Notification) -> Vec<String> {
    let mut lines = Vec::new();
    match notification {
        Notification::ItemUpdates {
            observers,
            owner,
            updates,
        } => {
            for observer in observers {
                for update in updates {
                    let change = match &update.change {
                        ChangeReport::Diff(summary) => summary.to_string(),
                        ChangeReport::Baseline => {
                            "first snapshot, diff reported on next update".to_string()
                        }
                        ChangeReport::Unavailable { reason } => {
                            format!("files unavailable: {}", reason)
                        }
                    };
                    lines.push(format!(
                        "[{}] owner {} updated {} - {} ({}): {}",
                        observer.id, owner, update.item.id, update.item.artist, update.item.title, change
                    ));
                }
            }
        }
        Notification::Activity {
            observers,
            entity,
            activities,
        } => {
            for observer in observers {
                for activity in activities {
                    lines.push(format!(
                        "[{}] entity {} {} #{} at {}",
                        observer.id,
                        entity,
                        activity.kind,
                        activity.id,
                        activity.created_at.format("%Y-%m-%d %H:%M:%S")
                    ));
                }
            }
        }
    }
    lines
}
