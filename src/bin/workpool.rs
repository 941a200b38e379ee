//! workpool CLI: run demo workloads against the engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use workpool::config::Config;
use workpool::telemetry::{TelemetryConfig, init_telemetry};
use workpool::{CancelToken, CompletionHandle, Engine, Job};

#[derive(Parser)]
#[command(name = "workpool", about = "Bounded worker-thread pool")]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a batch of sleeping jobs and report their outcomes
    Run {
        /// Worker threads (defaults to the configured count)
        #[arg(long)]
        workers: Option<usize>,
        /// Number of jobs to submit
        #[arg(long, default_value_t = 6)]
        jobs: usize,
        /// Job i sleeps delay_ms * (i + 1)
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
        /// Every n-th job fails (0 = none fail)
        #[arg(long, default_value_t = 2)]
        fail_every: usize,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Command::Run {
            workers,
            jobs,
            delay_ms,
            fail_every,
        } => cmd_run(config, workers, jobs, delay_ms, fail_every).await,
        Command::Config => {
            println!("workers:        {}", config.engine.workers);
            println!("thread prefix:  {}", config.engine.thread_prefix);
            println!(
                "otel endpoint:  {}",
                config.otel_endpoint.as_deref().unwrap_or("-")
            );
            println!("log level:      {}", config.log_level);
            Ok(())
        }
    }
}

async fn cmd_run(
    config: Config,
    workers: Option<usize>,
    jobs: usize,
    delay_ms: u64,
    fail_every: usize,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workpool".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let cancel = CancelToken::new();
    let engine = Arc::new(Engine::with_config(cancel.clone(), config.engine.clone()));
    engine.start(workers.unwrap_or(config.engine.workers))?;
    info!(engine = engine.id(), workers = engine.worker_count(), "running demo");

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("interrupted, cancelling");
        ctrl_c.cancel();
    });

    let started = Instant::now();

    // Submitting blocks until the dispatcher takes each job.
    let submitter = Arc::clone(&engine);
    let handles: Vec<(usize, CompletionHandle)> = tokio::task::spawn_blocking(move || {
        (0..jobs)
            .map(|i| {
                let job = SleepJob {
                    delay: Duration::from_millis(delay_ms * (i as u64 + 1)),
                    fail: fail_every > 0 && (i + 1) % fail_every == 0,
                    done: false,
                };
                submitter.submit(job).map(|handle| (i, handle))
            })
            .collect::<workpool::Result<Vec<_>>>()
    })
    .await??;

    println!("{:<4}  {:<8}  {:<8}  OUTCOME", "#", "JOB", "DELAY");
    println!("{}", "-".repeat(36));
    let mut failures = 0;
    for (i, handle) in handles {
        let job_id = handle.job_id();
        let success = handle.await;
        if !success {
            failures += 1;
        }
        println!(
            "{:<4}  {:<8}  {:<8}  {}",
            i,
            job_id,
            format!("{}ms", delay_ms * (i as u64 + 1)),
            if success { "success" } else { "failure" }
        );
    }

    println!(
        "\n{jobs} job(s), {failures} failed, {}ms wall time",
        started.elapsed().as_millis()
    );

    let engine = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    Ok(())
}

/// Demo job: sleeps, then succeeds or fails.
struct SleepJob {
    delay: Duration,
    fail: bool,
    done: bool,
}

impl Job for SleepJob {
    fn execute(&mut self) -> anyhow::Result<()> {
        std::thread::sleep(self.delay);
        if self.fail {
            anyhow::bail!("configured to fail after {:?}", self.delay);
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.done
    }

    fn on_success(&mut self) {
        self.done = true;
    }

    fn on_failure(&mut self, error: &anyhow::Error) {
        warn!(%error, "demo job failed");
    }
}
