use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kron")]
#[command(about = "Runs Kubernetes job templates on cron schedules")]
pub(crate) struct Cli {
    /// YAML file with defaults for any `KRON_*` setting
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Namespace to watch and create executions in
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// API server address; inferred from the environment when unset
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Log level or filter directive (`RUST_LOG` takes precedence)
    #[arg(short = 'l', long = "loglevel", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Watch templates and run them on schedule (default)
    Server(ServerArgs),
    /// List schedulable templates and their schedules
    Templates,
    /// Run one retention pass and exit
    Gc,
}

#[derive(Debug, Args)]
pub(crate) struct ServerArgs {
    /// Disable garbage collection of old executions
    #[arg(long)]
    pub no_gc: bool,

    /// Minutes between garbage collection passes
    #[arg(long)]
    pub gc_interval: Option<u64>,

    /// Age in hours after which executions are collected
    #[arg(long)]
    pub gc_age: Option<f64>,
}

impl Cli {
    /// Flags that were given, keyed like the environment variables they
    /// override.
    pub(crate) fn overrides(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                vars.insert(key.to_string(), v);
            }
        };
        put("KRON_NAMESPACE", self.namespace.clone());
        put("KRON_HOST", self.host.clone());
        put("KRON_LOG_LEVEL", self.log_level.clone());

        if let Some(Commands::Server(args)) = &self.command {
            put("KRON_GC_ENABLED", args.no_gc.then(|| "false".to_string()));
            put(
                "KRON_GC_INTERVAL_MINUTES",
                args.gc_interval.map(|v| v.to_string()),
            );
            put("KRON_GC_AGE_HOURS", args.gc_age.map(|v| v.to_string()));
        }
        vars
    }
}
