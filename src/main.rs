//! # Rover Reminder
//!
//! Emails players when their stamina is about to overflow.
//!
//! Usage:
//!   rover-reminder init                                   # Write a default config
//!   rover-reminder run                                    # Start the reminder daemon
//!   rover-reminder sweep                                  # Run one sweep and exit
//!   rover-reminder status                                 # Today's delivery counters
//!   rover-reminder push on --user 10001 --bot onebot --uid 100000001

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reminder_api::KuroClient;
use reminder_core::config::{ReminderConfig, expand_path};
use reminder_core::settings;
use reminder_core::traits::{NoStatusImage, RecordStore};
use reminder_core::types::{AccountIdentity, StaminaRecord};
use reminder_mail::{HtmlTemplate, SmtpGateway};
use reminder_scheduler::{
    DailyCounters, NotificationQueue, ReconciliationScheduler, ReminderPolicy, SqliteRecordStore,
    TickOutcome, spawn_scheduler,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(
    name = "rover-reminder",
    version,
    about = "🔔 Rover Reminder — stamina threshold reminders by email"
)]
struct Cli {
    /// Config file (default: ~/.rover-reminder/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and mail queue until Ctrl-C
    Run,
    /// Run one sweep now and print the result
    Sweep,
    /// Show today's and yesterday's delivery counts
    Status,
    /// Turn stamina reminders on or off for an account
    Push {
        #[arg(value_enum)]
        state: Switch,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Set the notification email of an account
    Email {
        address: String,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Set the reminder threshold of an account (120-240)
    Threshold {
        value: u32,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Bind the remote session token of an account
    Bind {
        #[arg(long)]
        token: String,
        #[arg(long, default_value = "")]
        device_id: String,
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Forget an account and its token, or every account of a user with --all
    Unbind {
        /// Chat user id
        #[arg(long)]
        user: String,
        /// Bot channel id
        #[arg(long)]
        bot: String,
        /// Bot instance id
        #[arg(long, default_value = "")]
        instance: String,
        /// Game account uid
        #[arg(long, required_unless_present = "all")]
        uid: Option<String>,
        /// Remove every account of the user on this bot channel
        #[arg(long, conflicts_with = "uid")]
        all: bool,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct AccountArgs {
    /// Chat user id
    #[arg(long)]
    user: String,
    /// Bot channel id
    #[arg(long)]
    bot: String,
    /// Bot instance id
    #[arg(long, default_value = "")]
    instance: String,
    /// Game account uid
    #[arg(long)]
    uid: String,
}

impl AccountArgs {
    fn identity(&self) -> AccountIdentity {
        AccountIdentity::new(&self.user, &self.bot, &self.instance, &self.uid)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(ReminderConfig::default_path)
}

fn load_config(cli: &Cli, path: &Path) -> Result<ReminderConfig> {
    let config = match cli.config {
        None => ReminderConfig::load()?,
        Some(_) if path.exists() => ReminderConfig::load_from(path)?,
        Some(_) => ReminderConfig::default(),
    };
    Ok(config)
}

fn init_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    let filter = if verbose {
        "rover_reminder=debug,reminder_core=debug,reminder_api=debug,reminder_mail=debug,reminder_scheduler=debug,mail=info"
    } else {
        "rover_reminder=info,reminder_core=info,reminder_api=info,reminder_mail=info,reminder_scheduler=info,mail=info"
    };
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    std::fs::create_dir_all(log_dir)?;
    let mail_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("mail.log"))?;
    let mail = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(mail_log))
        .with_filter(Targets::new().with_target("mail", tracing::Level::INFO));

    tracing_subscriber::registry().with(console).with(mail).init();
    Ok(())
}

fn print_record(r: &StaminaRecord, default_threshold: u32) {
    let threshold = reminder_scheduler::policy::resolve_threshold(r.threshold, default_threshold);
    println!("   Account:   {}", r.identity);
    println!("   Push:      {}", if r.notification_enabled { "on" } else { "off" });
    println!("   Email:     {}", r.email().unwrap_or("-"));
    println!("   Threshold: {threshold}");
    if r.is_suppressed() {
        println!(
            "   ⚠️  Suppressed after {} failed deliveries; set the email again to reset.",
            r.consecutive_failures
        );
    }
}

fn build_scheduler(
    config: &ReminderConfig,
    store: Arc<SqliteRecordStore>,
    counters: Arc<DailyCounters>,
) -> Result<(Arc<ReconciliationScheduler>, Arc<NotificationQueue>)> {
    let fetcher = Arc::new(KuroClient::new(config.api.clone())?);
    let gateway = Arc::new(SmtpGateway::new(config.mail.clone()));
    let profile = gateway.default_profile().to_string();
    let queue = Arc::new(NotificationQueue::new(gateway, counters, &config.queue));
    let template = Arc::new(HtmlTemplate::load(
        &expand_path(&config.mail.template_path),
        config.mail.subject.clone(),
    ));
    let policy = ReminderPolicy::new(
        store.clone(),
        store.clone(),
        fetcher,
        config.push.threshold,
        config.push.active_user_days,
    );
    let scheduler = Arc::new(ReconciliationScheduler::new(
        policy,
        store,
        queue.clone(),
        template,
        Arc::new(NoStatusImage),
        config.push.enabled,
        profile,
    ));
    Ok((scheduler, queue))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(&cli);

    if let Command::Init { force } = cli.command {
        if path.exists() && !force {
            println!("⚠️  Config already exists at {} (use --force to overwrite)", path.display());
            return Ok(());
        }
        match cli.config {
            None => ReminderConfig::default().save()?,
            Some(_) => ReminderConfig::default().save_to(&path)?,
        }
        println!("✅ Default config written to {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli, &path)?;
    init_logging(cli.verbose, &expand_path(&config.storage.log_dir))?;

    let store = Arc::new(SqliteRecordStore::open(&expand_path(&config.storage.db_path))?);
    let counters = Arc::new(DailyCounters::new(&expand_path(&config.storage.status_path)));

    match cli.command {
        Command::Run => {
            if !config.push.enabled {
                tracing::warn!("⚠️ Stamina push is disabled in {}; sweeps will be skipped", path.display());
            }
            let (scheduler, queue) = build_scheduler(&config, store, counters)?;
            let loop_handle = tokio::spawn(spawn_scheduler(scheduler, config.push.check_interval_secs));
            tracing::info!("🚀 Rover Reminder running — press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            tracing::info!("👋 Shutting down");
            loop_handle.abort();
            queue.stop().await;
        }
        Command::Sweep => {
            let (scheduler, queue) = build_scheduler(&config, store, counters)?;
            match scheduler.tick().await {
                TickOutcome::Completed(r) => {
                    println!("🔄 Sweep complete");
                    println!("   Examined: {}", r.examined);
                    println!("   Sent:     {}", r.sent);
                    println!("   Failed:   {}", r.failed);
                    println!("   Skipped:  {}", r.skipped);
                    println!("   Errored:  {}", r.errored);
                }
                TickOutcome::Disabled => println!("🔕 Stamina push is disabled in the config"),
                TickOutcome::Busy => println!("⏳ A sweep is already running"),
            }
            queue.stop().await;
        }
        Command::Status => {
            let today = counters.today();
            let yesterday = counters.yesterday();
            println!("📊 Stamina reminders");
            println!("   Push:      {}", if config.push.enabled { "on" } else { "off" });
            println!("   Today:     {} sent, {} failed", today.success, today.fail);
            println!("   Yesterday: {} total", yesterday.total());
        }
        Command::Push { state, account } => {
            let id = account.identity();
            store.record_activity(&id.owner_user_id, &id.bot_channel_id, &id.bot_instance_id, Utc::now())?;
            let enabled = matches!(state, Switch::On);
            let record = settings::set_push_switch(&*store, &config.push, &id, enabled).await?;
            println!("✅ Stamina push {}", if enabled { "enabled" } else { "disabled" });
            print_record(&record, config.push.threshold);
        }
        Command::Email { address, account } => {
            let id = account.identity();
            store.record_activity(&id.owner_user_id, &id.bot_channel_id, &id.bot_instance_id, Utc::now())?;
            let record = settings::set_push_email(&*store, &id, &address).await?;
            println!("✅ Notification email updated");
            print_record(&record, config.push.threshold);
        }
        Command::Threshold { value, account } => {
            let id = account.identity();
            store.record_activity(&id.owner_user_id, &id.bot_channel_id, &id.bot_instance_id, Utc::now())?;
            let record = settings::set_push_threshold(&*store, &id, value).await?;
            println!("✅ Threshold updated");
            print_record(&record, config.push.threshold);
        }
        Command::Bind { token, device_id, account } => {
            let id = account.identity();
            store.record_activity(&id.owner_user_id, &id.bot_channel_id, &id.bot_instance_id, Utc::now())?;
            store.bind_credential(&id, &token, &device_id).await?;
            println!("🔗 Token bound for {id}");
        }
        Command::Unbind { user, bot, uid: None, .. } => {
            let removed = store.unbind_user(&user, &bot).await?;
            println!("🗑️  Removed {removed} account(s) of {user} on {bot}");
        }
        Command::Unbind { user, bot, instance, uid: Some(uid), .. } => {
            let id = AccountIdentity::new(user, bot, instance, uid);
            let removed = store.delete(&id).await?;
            let had_token = store.remove_credential(&id)?;
            if removed || had_token {
                println!("🗑️  Removed {id}");
            } else {
                println!("⚠️  No record for {id}");
            }
        }
        Command::Init { .. } => {}
    }

    Ok(())
}
