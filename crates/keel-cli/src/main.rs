//! Keel CLI - release orchestration for Kubernetes charts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use error::Result;
use util::parse_duration;

/// Environment variable holding the log filter
const LOG_ENV: &str = "KEEL_LOG";

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Keel Contributors")]
#[command(version)]
#[command(about = "Release orchestration for Kubernetes charts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server configuration file (default: <config dir>/keel/config.yaml)
    #[arg(long, global = true, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a chart locally, without a cluster
    Template {
        /// Release name (for template context)
        name: String,

        /// Chart directory
        chart: PathBuf,

        /// Values file(s) to merge
        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Kubernetes version to render against
        #[arg(long, default_value = "v1.28.0")]
        kube_version: String,

        /// Extra API versions the cluster is assumed to serve
        #[arg(short = 'a', long = "api-versions")]
        api_versions: Vec<String>,

        /// Show only templates whose path contains this string
        #[arg(short = 's', long)]
        show_only: Option<String>,

        /// Write each manifest under this directory instead of stdout
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Install a chart as a new release
    Install {
        /// Chart directory
        chart: PathBuf,

        /// Release name; generated when omitted
        #[arg(long)]
        name: Option<String>,

        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        #[arg(long = "set")]
        set: Vec<String>,

        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Render and classify only
        #[arg(long)]
        dry_run: bool,

        /// Skip lifecycle hooks
        #[arg(long)]
        no_hooks: bool,

        /// Take over the name of a deleted or failed release
        #[arg(long)]
        replace: bool,

        /// Bound on each wait, e.g. 90s or 5m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Upgrade a release to a new chart or configuration
    Upgrade {
        name: String,

        chart: PathBuf,

        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        #[arg(long = "set")]
        set: Vec<String>,

        /// Start again from the chart's default values
        #[arg(long, conflicts_with = "reuse_values")]
        reset_values: bool,

        /// Carry the previous effective values forward
        #[arg(long)]
        reuse_values: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        no_hooks: bool,

        /// Restart pods of updated workloads
        #[arg(long)]
        recreate_pods: bool,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Roll a release back to an earlier revision
    Rollback {
        name: String,

        /// Target revision (default: the previous one)
        #[arg(default_value_t = 0)]
        revision: u32,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        no_hooks: bool,

        #[arg(long)]
        recreate_pods: bool,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Remove a release from the cluster
    Uninstall {
        name: String,

        /// Also remove the release history
        #[arg(long)]
        purge: bool,

        #[arg(long)]
        no_hooks: bool,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Show the revisions of a release
    History {
        name: String,

        /// Maximum number of revisions shown
        #[arg(long, default_value_t = 256)]
        max: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show the status of a release
    Status {
        name: String,

        /// Revision (default: the latest)
        #[arg(long, default_value_t = 0)]
        revision: u32,

        /// Also print the rendered manifest
        #[arg(long)]
        show_manifest: bool,

        #[arg(long)]
        json: bool,
    },

    /// List releases
    #[command(alias = "ls")]
    List {
        /// Regular expression matched against release names
        filter: Option<String>,

        /// Show releases in every status
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        deleted: bool,

        #[arg(long)]
        failed: bool,

        #[arg(long)]
        pending: bool,

        /// Only releases in this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Maximum number of releases (default: server setting)
        #[arg(short, long, default_value_t = 0)]
        max: usize,

        /// Start listing at this release name
        #[arg(short, long)]
        offset: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Run a release's test hooks
    Test {
        name: String,

        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
}

fn init_tracing() {
    let env = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();
    init_tracing();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Template {
            name,
            chart,
            values,
            set,
            namespace,
            kube_version,
            api_versions,
            show_only,
            output_dir,
        } => {
            let opts = commands::template::TemplateArgs {
                name,
                chart,
                values,
                set,
                namespace,
                kube_version,
                api_versions,
                show_only,
                output_dir,
            };
            commands::template::run(opts).await
        }

        Commands::Install {
            chart,
            name,
            values,
            set,
            namespace,
            dry_run,
            no_hooks,
            replace,
            timeout,
        } => {
            let opts = commands::install::InstallArgs {
                chart,
                name,
                values,
                set,
                namespace,
                dry_run,
                no_hooks,
                replace,
                timeout,
            };
            commands::install::run(util::load_config(config_path)?, opts).await
        }

        Commands::Upgrade {
            name,
            chart,
            values,
            set,
            reset_values,
            reuse_values,
            dry_run,
            no_hooks,
            recreate_pods,
            timeout,
        } => {
            let opts = commands::upgrade::UpgradeArgs {
                name,
                chart,
                values,
                set,
                reset_values,
                reuse_values,
                dry_run,
                no_hooks,
                recreate_pods,
                timeout,
            };
            commands::upgrade::run(util::load_config(config_path)?, opts).await
        }

        Commands::Rollback {
            name,
            revision,
            dry_run,
            no_hooks,
            recreate_pods,
            timeout,
        } => {
            let config = util::load_config(config_path)?;
            commands::rollback::run(
                config,
                &name,
                revision,
                dry_run,
                no_hooks,
                recreate_pods,
                timeout,
            )
            .await
        }

        Commands::Uninstall {
            name,
            purge,
            no_hooks,
            timeout,
        } => {
            let config = util::load_config(config_path)?;
            commands::uninstall::run(config, &name, purge, no_hooks, timeout).await
        }

        Commands::History { name, max, json } => {
            commands::history::run(util::load_config(config_path)?, &name, max, json).await
        }

        Commands::Status {
            name,
            revision,
            show_manifest,
            json,
        } => {
            let config = util::load_config(config_path)?;
            commands::status::run(config, &name, revision, show_manifest, json).await
        }

        Commands::List {
            filter,
            all,
            deleted,
            failed,
            pending,
            namespace,
            max,
            offset,
            json,
        } => {
            let opts = commands::list::ListArgs {
                filter,
                all,
                deleted,
                failed,
                pending,
                namespace,
                max,
                offset,
                json,
            };
            commands::list::run(util::load_config(config_path)?, opts).await
        }

        Commands::Test { name, timeout } => {
            commands::test::run(util::load_config(config_path)?, &name, timeout).await
        }
    }
}
