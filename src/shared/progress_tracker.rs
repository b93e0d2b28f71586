use std::sync::Mutex;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::features::bulk_download::aggregator::{StatusKind, StatusMessage};
use crate::features::bulk_download::models::{DownloadTaskState, TaskStatus};
use crate::features::bulk_download::observer::JobObserver;

/// Terminal progress bar for a bulk job, one tick per finished image.
pub struct CliProgressTracker {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressTracker {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(bar) = bar.as_ref() {
                f(bar);
            }
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

impl Default for CliProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobObserver for CliProgressTracker {
    fn on_start(&self, item_ids: &[String]) {
        let bar = ProgressBar::new(item_ids.len() as u64);
        bar.set_style(Self::style());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_progress(&self, task: &DownloadTaskState) {
        match task.status {
            TaskStatus::Completed => self.with_bar(|bar| {
                bar.inc(1);
                bar.set_message(task.item_id.clone());
            }),
            TaskStatus::Error => self.with_bar(|bar| {
                bar.inc(1);
                bar.set_message(format!("{} failed", task.item_id).red().to_string());
            }),
            TaskStatus::Retrying => self.with_bar(|bar| {
                bar.set_message(format!("retrying {}", task.item_id).yellow().to_string());
            }),
            TaskStatus::Pending | TaskStatus::Downloading => {}
        }
    }

    fn on_cancel(&self) {
        self.with_bar(|bar| bar.set_message("cancelling...".yellow().to_string()));
    }

    fn on_status(&self, message: &StatusMessage) {
        let line = match message.kind {
            StatusKind::Started => message.text.cyan(),
            StatusKind::FullSuccess => message.text.green(),
            StatusKind::PartialSuccess | StatusKind::Cancelled => message.text.yellow(),
            StatusKind::TotalFailure => message.text.red(),
        };
        if message.kind == StatusKind::Started {
            self.with_bar(|bar| bar.println(line.to_string()));
            return;
        }
        self.with_bar(ProgressBar::finish_and_clear);
        println!("{line}");
        info!(kind = ?message.kind, "{}", message.text);
    }
}
