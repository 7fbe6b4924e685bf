//! ZAP Wrapper - DAST scan orchestration CLI

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use zap_wrapper::budget::SystemClock;
use zap_wrapper::cancel::{
    CancellationMonitor, CancellationSource, EventFolderCancellation, FlagCancellation,
};
use zap_wrapper::config::{self, CliOverrides, WrapperConfig};
use zap_wrapper::context::{ContextInputs, ScanContext};
use zap_wrapper::engine::ZapApiClient;
use zap_wrapper::error::{ExitCode, Result};
use zap_wrapper::messages::{FolderMessageWriter, LogMessageWriter, MessageWriter};
use zap_wrapper::rules::{DeactivatedRuleReferences, ZapFullRuleset};
use zap_wrapper::scan::ScanOrchestrator;

/// ZAP Wrapper - drives an OWASP ZAP instance through a complete DAST scan
#[derive(Parser)]
#[command(name = "zap-wrapper", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Run a web scan against a target
    Scan {
        /// Target URL to scan
        #[arg(short, long)]
        target_url: String,

        /// Report file the SARIF result is written to
        #[arg(short, long)]
        report: PathBuf,

        /// Job UUID, used as ZAP context name
        #[arg(long)]
        job_uuid: Option<String>,

        /// SecHub configuration file holding the webScan section
        #[arg(long)]
        sechub_config_file: Option<PathBuf>,

        /// Run the AJAX spider before the classic spider
        #[arg(long)]
        ajax_spider: bool,

        /// Run the active scan after the passive scan
        #[arg(long)]
        active_scan: bool,

        /// Browser used by the AJAX spider
        #[arg(long)]
        ajax_spider_browser_id: Option<String>,

        /// ZAP host
        #[arg(long)]
        zap_host: Option<String>,

        /// ZAP port
        #[arg(long)]
        zap_port: Option<u16>,

        /// ZAP API key
        #[arg(long)]
        zap_api_key: Option<String>,

        /// Upstream proxy host used by ZAP
        #[arg(long)]
        proxy_host: Option<String>,

        /// Upstream proxy port used by ZAP
        #[arg(long)]
        proxy_port: Option<u16>,

        /// JSON file with all passive and active rules of ZAP
        #[arg(long)]
        full_ruleset_file: Option<PathBuf>,

        /// JSON file with the rule references to deactivate
        #[arg(long)]
        rules_deactivation_file: Option<PathBuf>,

        /// Rule references to deactivate (comma-separated)
        #[arg(long, value_delimiter = ',')]
        deactivate_rules: Option<Vec<String>>,

        /// Status poll interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Folder user messages are written to
        #[arg(long)]
        pds_user_message_folder: Option<PathBuf>,

        /// Folder watched for job events such as cancellation
        #[arg(long)]
        pds_event_folder: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the rules of a full ruleset file
    Rules {
        /// JSON file with all passive and active rules of ZAP
        #[arg(long)]
        full_ruleset_file: PathBuf,
    },
}

fn print_banner() {
    let banner = r#"
    ╔═══════════════════════════════════════╗
    ║  ZAP WRAPPER v0.1.0                   ║
    ║  DAST scan orchestration              ║
    ╚═══════════════════════════════════════╝
    "#;
    println!("{}", banner.cyan());
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "zap_wrapper=debug"
    } else {
        "zap_wrapper=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn load_wrapper_config(config_path: Option<&Path>, cli: CliOverrides) -> Result<WrapperConfig> {
    let mut wrapper_config = if let Some(path) = config_path {
        config::load_config(path)?
    } else {
        let default_path = Path::new("config/default.toml");
        if default_path.exists() {
            config::load_config(default_path)?
        } else {
            WrapperConfig::default()
        }
    };
    config::apply_env_overrides(&mut wrapper_config)?;
    config::merge_cli_args(&mut wrapper_config, cli);
    config::validate(&wrapper_config)?;
    Ok(wrapper_config)
}

fn cancellation_monitor(wrapper_config: &WrapperConfig) -> CancellationMonitor {
    let source: Arc<dyn CancellationSource> = match &wrapper_config.pds.event_folder {
        Some(folder) => Arc::new(EventFolderCancellation::new(folder.clone())),
        None => {
            let flag = FlagCancellation::new();
            let signal = flag.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl+C received, cancelling scan");
                    signal.cancel();
                }
            });
            Arc::new(flag)
        }
    };
    CancellationMonitor::new(source)
}

fn message_writer(wrapper_config: &WrapperConfig) -> Arc<dyn MessageWriter> {
    match &wrapper_config.pds.user_message_folder {
        Some(folder) => Arc::new(FolderMessageWriter::new(folder.clone())),
        None => Arc::new(LogMessageWriter),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    target_url: String,
    report: PathBuf,
    job_uuid: Option<String>,
    sechub_config_file: Option<PathBuf>,
    full_ruleset_file: Option<PathBuf>,
    rules_deactivation_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
    cli: CliOverrides,
) -> Result<()> {
    let wrapper_config = load_wrapper_config(config_path.as_deref(), cli)?;

    let sechub = sechub_config_file
        .as_deref()
        .map(config::load_sechub_configuration)
        .transpose()?;
    let full_ruleset = full_ruleset_file
        .as_deref()
        .map(ZapFullRuleset::load)
        .transpose()?;
    let rules_deactivation = rules_deactivation_file
        .as_deref()
        .map(DeactivatedRuleReferences::load)
        .transpose()?;

    let context = ScanContext::from_config(
        &wrapper_config,
        ContextInputs {
            target_url: &target_url,
            report_file: &report,
            job_uuid,
            sechub: sechub.as_ref(),
            full_ruleset,
            rules_deactivation,
        },
    )?;

    println!("  {} {}", "Target:".bold(), context.target_url.as_str().green());
    println!("  {} {}", "Context:".bold(), context.context_name.cyan());
    println!(
        "  {} {}",
        "ZAP:".bold(),
        wrapper_config.zap.base_url().cyan()
    );
    println!(
        "  {} ajax spider {}, active scan {}\n",
        "Phases:".bold(),
        on_off(context.ajax_spider_enabled),
        on_off(context.active_scan_enabled)
    );

    let client = ZapApiClient::from_config(&wrapper_config.zap)?;
    let mut orchestrator = ScanOrchestrator::new(
        Arc::new(client.clone()),
        context,
        cancellation_monitor(&wrapper_config),
        Arc::new(SystemClock::new()),
        message_writer(&wrapper_config),
    );
    orchestrator.scan().await?;

    println!(
        "\n  {} {}",
        "Report saved to:".bold(),
        report.display().to_string().green()
    );
    println!(
        "  {} {}",
        "ZAP API calls:".bold(),
        client.request_count().to_string().cyan()
    );
    Ok(())
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".yellow()
    }
}

fn list_rules(full_ruleset_file: &Path) -> Result<()> {
    let ruleset = ZapFullRuleset::load(full_ruleset_file)?;

    println!("  {}\n", "Passive Rules:".bold());
    for rule in ruleset.passive_rules() {
        println!("    {} {}", format!("{:8}", rule.id).cyan().bold(), rule.reference);
    }
    println!("\n  {}\n", "Active Rules:".bold());
    for rule in ruleset.active_rules() {
        println!("    {} {}", format!("{:8}", rule.id).red().bold(), rule.reference);
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            target_url,
            report,
            job_uuid,
            sechub_config_file,
            ajax_spider,
            active_scan,
            ajax_spider_browser_id,
            zap_host,
            zap_port,
            zap_api_key,
            proxy_host,
            proxy_port,
            full_ruleset_file,
            rules_deactivation_file,
            deactivate_rules,
            poll_interval_ms,
            pds_user_message_folder,
            pds_event_folder,
            config: config_path,
            verbose,
        } => {
            init_logging(verbose);
            print_banner();

            let overrides = CliOverrides {
                zap_host,
                zap_port,
                zap_api_key,
                proxy_host,
                proxy_port,
                ajax_spider,
                active_scan,
                ajax_spider_browser_id,
                poll_interval_ms,
                user_message_folder: pds_user_message_folder,
                event_folder: pds_event_folder,
                deactivate_rules,
            };
            run_scan(
                target_url,
                report,
                job_uuid,
                sechub_config_file,
                full_ruleset_file,
                rules_deactivation_file,
                config_path,
                overrides,
            )
            .await
        }

        Commands::Rules { full_ruleset_file } => {
            print_banner();
            list_rules(&full_ruleset_file)
        }
    };

    if let Err(e) = result {
        let exit_code = e.exit_code();
        eprintln!("\n  {} {e}", "Error:".red().bold());
        std::process::exit(exit_code.code());
    }
    std::process::exit(ExitCode::Ok.code());
}
