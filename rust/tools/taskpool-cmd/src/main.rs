use anyhow::Result;
use clap::{Parser, Subcommand};
use taskpool::SchedulingPolicy;

mod commands;

#[derive(Parser)]
#[command(name = "taskpool-cmd")]
#[command(about = "Run synthetic workloads against a taskpool worker pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a batch of synthetic tasks and report how the pool handled them
    Run {
        /// Path to a JSON pool configuration
        #[arg(long)]
        config: Option<String>,

        /// Number of worker threads (overrides the configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Admission order: fifo, lifo or priority (overrides the configuration)
        #[arg(short, long)]
        policy: Option<SchedulingPolicy>,

        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 100)]
        tasks: usize,

        /// Simulated work per task, in milliseconds
        #[arg(long, default_value_t = 5)]
        task_ms: u64,

        /// Make every N-th task fail (0 disables failures)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,

        /// Resize the pool to this many workers right after submission
        #[arg(long)]
        resize_to: Option<usize>,

        /// Shut the pool down this many milliseconds after submission
        #[arg(long)]
        shutdown_after_ms: Option<u64>,

        /// Seed for the random priorities
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Print the effective pool configuration as JSON
    ShowConfig {
        /// Path to a JSON pool configuration
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            workers,
            policy,
            tasks,
            task_ms,
            fail_every,
            resize_to,
            shutdown_after_ms,
            seed,
        } => commands::run::run(commands::run::RunArgs {
            config,
            workers,
            policy,
            tasks,
            task_ms,
            fail_every,
            resize_to,
            shutdown_after_ms,
            seed,
        }),
        Commands::ShowConfig { config } => commands::show_config::run(config),
    }
}
