//! Migration pipeline orchestration.
//!
//! The pipeline drives the two drivers in lock-step: options are verified
//! before any I/O, metadata is replicated first, then document batches flow
//! until the source reports exhaustion. Drivers never call each other; all
//! coordination happens here.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::drivers::{create_driver, Driver, Role};
use crate::error::{Error, Result};

/// Migration statistics.
#[derive(Debug, Default, Clone)]
pub struct MigrationStats {
    /// Documents written to the target.
    pub transferred: u64,
    /// Batches processed.
    pub batches: u64,
    /// Total documents the source reported for the query.
    pub total: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    /// Throughput in documents per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.transferred as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Migration pipeline over one source and one target driver.
pub struct Pipeline {
    config: MigrationConfig,
    source: Box<dyn Driver>,
    target: Box<dyn Driver>,
}

impl Pipeline {
    /// Builds both drivers from the configuration.
    #[must_use]
    pub fn new(config: MigrationConfig) -> Self {
        let source = create_driver(&config.source, &config.options);
        let target = create_driver(&config.target, &config.options);
        Self {
            config,
            source,
            target,
        }
    }

    /// Runs the migration: verify, reset, stats, metadata, then the data
    /// loop until the source is exhausted.
    ///
    /// # Errors
    ///
    /// Fails before any I/O when option verification reports problems, and
    /// with the first driver error afterwards — including
    /// [`Error::RetryExhausted`], after which no further batch is attempted.
    pub async fn run(&mut self) -> Result<MigrationStats> {
        let start = std::time::Instant::now();
        let mut stats = MigrationStats::default();

        let mut problems = self.source.verify_options(Role::Source);
        problems.extend(self.target.verify_options(Role::Target));
        if !problems.is_empty() {
            return Err(Error::Config(problems.join("; ")));
        }

        self.source.reset().await?;
        self.target.reset().await?;

        match self.source.source_stats().await {
            Ok(s) => info!(
                "source: version {}, status {}, documents {:?}",
                s.version, s.cluster_status, s.docs
            ),
            Err(Error::Unsupported { .. }) => debug!("source driver reports no stats"),
            Err(e) => return Err(e),
        }
        match self.target.target_stats().await {
            Ok(s) => info!("target: version {}, status {}", s.version, s.cluster_status),
            Err(Error::Unsupported { .. }) => debug!("target driver reports no stats"),
            Err(e) => return Err(e),
        }

        let meta = self.source.get_meta().await?;
        self.target.put_meta(&meta).await?;

        let progress = create_progress_bar(0);

        loop {
            let batch = self.source.get_data().await?;
            if batch.docs.is_empty() {
                break;
            }

            if stats.batches == 0 {
                stats.total = batch.total;
                progress.set_length(batch.total);
            }
            stats.batches += 1;

            if self.config.options.dry_run {
                debug!("dry run, discarding {} documents", batch.docs.len());
            } else {
                self.target.put_data(&batch.docs).await?;
            }
            stats.transferred += batch.docs.len() as u64;
            progress.inc(batch.docs.len() as u64);
        }

        progress.finish_with_message("Migration complete");

        self.source.end().await?;
        self.target.end().await?;

        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Migration complete: {} documents in {} batches in {:.2}s ({:.0} docs/sec)",
            stats.transferred,
            stats.batches,
            stats.duration_secs,
            stats.throughput()
        );

        Ok(stats)
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}
