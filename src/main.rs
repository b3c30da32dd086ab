use campaign_mailer::project::Project;
use campaign_mailer::transport::SendmailTransport;
use campaign_mailer::{AppConfig, Campaign, CampaignPlan, LogDiagnostics, Mode};
use clap::{Arg, Command};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("campaign-mailer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("File-driven bulk and personalized email campaigns")
        .long_about(
            "Sends a campaign described by a project directory of flat files:\n\
             • single mode: one email to the merged recipient set\n\
             • multi mode: one personalized email per filter line\n\
             • dry run: every email goes to the approver list, marked as a draft",
        )
        .arg(
            Arg::new("project")
                .short('p')
                .long("project")
                .value_name("DIR")
                .help("Campaign project directory")
                .required_unless_present("generate-config"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("campaign-mailer.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Sending mode")
                .value_parser(["single", "multi"])
                .default_value("single"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Send every email to the approvers instead of the real recipients")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("inventory")
                .short('i')
                .long("inventory")
                .value_name("FILE")
                .help("Inventory CSV (overrides the configuration)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("plan-only")
                .long("plan-only")
                .help("Resolve recipients and write audit files without sending")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("campaign-mailer.yaml");
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    if let Some(inventory) = matches.get_one::<String>("inventory") {
        config.inventory_path = PathBuf::from(inventory);
    }

    let mode: Mode = match matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("single")
        .parse()
    {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };
    let dry_run = matches.get_flag("dry-run");
    let plan_only = matches.get_flag("plan-only");

    let Some(project_dir) = matches.get_one::<String>("project") else {
        eprintln!("❌ --project is required");
        process::exit(1);
    };

    if let Err(e) = run(Path::new(project_dir), config, mode, dry_run, plan_only).await {
        log::error!("{e:#}");
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

async fn run(
    project_dir: &Path,
    config: AppConfig,
    mode: Mode,
    dry_run: bool,
    plan_only: bool,
) -> anyhow::Result<()> {
    let diag = LogDiagnostics;
    let sendmail = config.sendmail_path.clone();
    let project = Project::open(project_dir)?;
    let campaign = Campaign::new(project, config, &diag);

    log::info!(
        "Planning {mode} campaign for {}{}",
        project_dir.display(),
        if dry_run { " (dry run)" } else { "" }
    );
    let plan = campaign.plan(mode, dry_run)?;
    campaign.write_audit(&plan)?;
    print_plan(&plan);

    if plan_only {
        println!("Plan only: nothing sent");
        return Ok(());
    }

    let transport = SendmailTransport::new(sendmail);
    let report = campaign.send(&plan, &transport).await?;
    println!(
        "✅ Sent {} email(s) in {} batch(es); {} skipped, {} batch(es) failed",
        report.emails_sent, report.batches_sent, report.emails_skipped, report.batches_failed
    );
    if report.batches_failed > 0 {
        anyhow::bail!("{} batch(es) could not be submitted", report.batches_failed);
    }
    Ok(())
}

fn print_plan(plan: &CampaignPlan) {
    println!("📧 Campaign plan ({} mode{})", plan.mode, if plan.dry_run { ", dry run" } else { "" });
    println!("   From: {}", plan.from);
    if let Some(source) = plan.source {
        println!("   Recipient source: {source}");
    }
    if plan.persisted_direct_list {
        println!("   Resolved list saved to to.txt");
    }
    for email in &plan.emails {
        println!();
        println!("   #{} {}", email.sequence_number, email.subject);
        if let Some(line) = &email.filter_line {
            println!("      Filter: {line}");
        }
        println!(
            "      Recipients: {} to, {} cc, {} bcc",
            email.original.to, email.original.cc, email.original.bcc
        );
        if email.dry_run {
            println!("      Delivered to: {} approver(s)", email.recipients.to.len());
        }
    }
    println!();
}

fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    if Path::new(path).exists() {
        Ok(AppConfig::from_file(path)?)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(AppConfig::default())
    }
}

fn generate_default_config(path: &str) {
    let config = AppConfig::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
