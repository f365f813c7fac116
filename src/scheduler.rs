use chrono::{DateTime, TimeDelta, Utc};
use log::{error, info};
use std::time::Duration;

use crate::error::{ConfigError, PassError};
use crate::mail_reader::{ImapMailSource, MailSource};
use crate::notification::Notifier;
use crate::settings::Config;
use crate::storage::{Persistence, Storage};

/// Builds the collaborators of a pass. Called once per pass, so nothing is
/// held open between passes.
pub trait Collaborators: Send + Sync {
    fn mail_source(&self) -> Box<dyn MailSource>;
    fn persistence(&self) -> Box<dyn Persistence>;
    fn notifier(&self) -> Notifier;
}

pub struct ConfiguredCollaborators {
    config: Config,
}

impl ConfiguredCollaborators {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Collaborators for ConfiguredCollaborators {
    fn mail_source(&self) -> Box<dyn MailSource> {
        Box::new(ImapMailSource::new(
            self.config.imap.clone(),
            self.config.paths.attachments_dir.clone(),
        ))
    }

    fn persistence(&self) -> Box<dyn Persistence> {
        Box::new(Storage::from_config(&self.config))
    }

    fn notifier(&self) -> Notifier {
        Notifier::new(&self.config.notification)
    }
}

#[derive(Debug)]
pub enum PassOutcome {
    /// Nothing new; no sink was touched and nothing was sent.
    Empty,
    Processed {
        count: usize,
        sink_errors: Vec<PassError>,
        notified: bool,
    },
    Failed {
        error: PassError,
        notified: bool,
    },
}

/// One retrieve-persist-notify cycle. Every failure ends up in the returned
/// outcome; nothing escapes to the caller.
pub async fn run_pass(collaborators: &dyn Collaborators) -> PassOutcome {
    let mut mail_source = collaborators.mail_source();
    let persistence = collaborators.persistence();
    let notifier = collaborators.notifier();

    let batch = match mail_source.get_emails().await {
        Ok(batch) => batch,
        Err(e) => {
            let error = PassError::from(e);
            error!("Error in main process: {}", error);
            let notified = if notifier.is_enabled() {
                collaborators.notifier().send_error(&error).await
            } else {
                false
            };
            return PassOutcome::Failed { error, notified };
        }
    };

    if batch.is_empty() {
        info!("No new emails to process");
        return PassOutcome::Empty;
    }

    let sink_errors: Vec<PassError> = persistence
        .save_all(&batch)
        .await
        .into_iter()
        .map(PassError::from)
        .collect();

    let notified = notifier.send_summary(&batch, &sink_errors).await;

    PassOutcome::Processed {
        count: batch.len(),
        sink_errors,
        notified,
    }
}

/// When the next pass is due. Starts out due, so the first check runs a pass.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    interval: TimeDelta,
    next_due: DateTime<Utc>,
}

impl ScheduleState {
    pub fn new(interval: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            next_due: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_due
    }

    /// Re-arms from the instant a pass finished, so an overrunning pass pushes
    /// the next one back instead of queueing it.
    pub fn rearm(&mut self, finished_at: DateTime<Utc>) {
        self.next_due = finished_at + self.interval;
    }

    pub fn next_due(&self) -> DateTime<Utc> {
        self.next_due
    }
}

/// Process-wide context of the polling loop.
pub struct Scheduler {
    collaborators: Box<dyn Collaborators>,
    schedule: ScheduleState,
    tick: Duration,
}

impl Scheduler {
    pub fn new(collaborators: Box<dyn Collaborators>, interval: TimeDelta, tick: Duration) -> Self {
        Self {
            collaborators,
            schedule: ScheduleState::new(interval, Utc::now()),
            tick,
        }
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let interval = TimeDelta::from_std(config.scheduler.interval()).map_err(|e| ConfigError::Invalid {
            key: "scheduler.interval_minutes",
            reason: e.to_string(),
        })?;
        let tick = config.scheduler.tick();
        Ok(Self::new(
            Box::new(ConfiguredCollaborators::new(config)),
            interval,
            tick,
        ))
    }

    /// Runs a pass if one is due at `now`. The pass is awaited to completion
    /// before the schedule is re-armed.
    pub async fn run_if_due(&mut self, now: DateTime<Utc>) -> Option<PassOutcome> {
        if !self.schedule.is_due(now) {
            return None;
        }

        let outcome = run_pass(self.collaborators.as_ref()).await;
        self.schedule.rearm(Utc::now());
        info!(
            "Pass finished: {}; next check due at {}",
            describe(&outcome),
            self.schedule.next_due().format("%Y-%m-%d %H:%M:%S")
        );
        Some(outcome)
    }

    pub async fn run_forever(&mut self) {
        loop {
            self.run_if_due(Utc::now()).await;
            tokio::time::sleep(self.tick).await;
        }
    }
}

fn describe(outcome: &PassOutcome) -> String {
    match outcome {
        PassOutcome::Empty => "no new emails".to_string(),
        PassOutcome::Processed {
            count,
            sink_errors,
            notified,
        } => format!(
            "{} emails processed, {} sink errors, summary {}",
            count,
            sink_errors.len(),
            if *notified { "sent" } else { "not sent" }
        ),
        PassOutcome::Failed { error, notified } => format!(
            "failed ({}), alert {}",
            error,
            if *notified { "sent" } else { "not sent" }
        ),
    }
}
