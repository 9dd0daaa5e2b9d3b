mod config;
mod database;
mod monitoring;
mod orchestrator;
mod pool;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use config::Config;
use database::{LibsqlStore, MonitoredTarget, Owner, TargetStore, UserProfile, initialize_database};
use monitoring::clock::SystemClock;
use monitoring::validation::{validate_email, validate_target_url};
use monitoring::{HttpProbe, Probe};
use orchestrator::{Orchestrator, RetentionPolicy, RetentionSweeper};

#[derive(Debug, Parser)]
#[command(name = "sitewatch", version, about = "Keeps an eye on registered HTTP endpoints")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitor loop and the retention sweeper (default)
    Run,
    /// Register a URL to monitor
    Add {
        url: String,
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// List an owner's targets with their last known status
    List {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Stop monitoring a target
    Remove {
        id: Uuid,
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// Probe a URL once and print the classification
    Check { url: String },
    /// Delete expired guest targets now
    Sweep,
    /// Print the effective configuration
    Config,
    /// Manage registered user profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    /// Create a profile, or update the username of the one registered under this email
    Save {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Show a user's profile, or the display name of a guest session
    Show {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct OwnerArgs {
    /// Registered user id
    #[arg(long)]
    user: Option<i64>,
    /// Guest session token
    #[arg(long)]
    guest: Option<String>,
}

impl OwnerArgs {
    fn into_owner(self) -> Result<Owner> {
        match (self.user, self.guest) {
            (Some(id), None) => Ok(Owner::User(id)),
            (None, Some(session)) => Ok(Owner::Guest(session)),
            _ => bail!("exactly one of --user or --guest is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (config, created) =
        Config::from_config(cli.config.as_deref()).context("failed to load configuration")?;
    logger::init_with_level(&config.logging.level);
    if let Some(path) = created {
        tracing::info!(path = %path.display(), "Wrote default configuration");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let pool = pool::open_pool(&config.database.path, config.database.max_connections).await?;
            Orchestrator::start(config, pool).await
        }
        Command::Add { url, owner } => {
            let store = open_store(&config).await?;
            let target =
                register_target(store.as_ref(), &url, owner.into_owner()?, config.targets.allow_private)
                    .await?;
            println!("Added {} ({})", target.id, target.url);
            Ok(())
        }
        Command::List { owner, json } => {
            let targets = open_store(&config).await?.list_targets_for_owner(&owner.into_owner()?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else {
                print_targets(&targets);
            }
            Ok(())
        }
        Command::Remove { id, owner } => {
            let owner = owner.into_owner()?;
            if !open_store(&config).await?.delete_target(id, &owner).await? {
                bail!("no target {id} owned by {owner}");
            }
            println!("Removed {id}");
            Ok(())
        }
        Command::Check { url } => {
            let probe = HttpProbe::new(config.monitor.probe_timeout(), config.monitor.expected_status_code)?;
            let outcome = probe.probe(&url).await;
            let detail = match (outcome.status_code, &outcome.reason) {
                (_, Some(reason)) => reason.clone(),
                (Some(code), None) => format!("HTTP {code}"),
                (None, None) => String::new(),
            };
            println!("{url}: {} {detail}", monitoring::TargetStatus::from(outcome.health));
            Ok(())
        }
        Command::Sweep => {
            let sweeper = RetentionSweeper::new(
                open_store(&config).await?,
                Arc::new(SystemClock),
                RetentionPolicy::from(&config.retention),
            );
            println!("Deleted {} expired guest target(s)", sweeper.sweep().await?);
            Ok(())
        }
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        Command::Profile { action: ProfileCommand::Save { email, username } } => {
            let store = open_store(&config).await?;
            let profile = save_profile(store.as_ref(), &email, username.as_deref()).await?;
            println!("Profile saved, user id {}", profile.id);
            Ok(())
        }
        Command::Profile { action: ProfileCommand::Show { owner, json } } => match owner.into_owner()? {
            Owner::User(id) => {
                let Some(profile) = open_store(&config).await?.get_profile(id).await? else {
                    bail!("user {id} not found");
                };
                if json {
                    println!("{}", serde_json::to_string_pretty(&profile)?);
                } else {
                    print_profile(&profile);
                }
                Ok(())
            }
            Owner::Guest(session) => {
                let name = UserProfile::guest_display_name(&session);
                if json {
                    println!("{}", serde_json::json!({ "type": "guest", "username": name }));
                } else {
                    println!("{name} (guest session)");
                }
                Ok(())
            }
        },
    }
}

/// Validate a URL and store it as a new target.
/// Registered owners must have a profile.
async fn register_target(
    store: &dyn TargetStore,
    url: &str,
    owner: Owner,
    allow_private: bool,
) -> Result<MonitoredTarget> {
    let url = validate_target_url(url, allow_private)?;

    if let Owner::User(id) = &owner {
        if store.get_profile(*id).await?.is_none() {
            bail!("user {id} not found, create it with `sitewatch profile save`");
        }
    }

    let target = MonitoredTarget::new(url, owner, Utc::now());
    store.add_target(&target).await?;
    Ok(target)
}

/// Upsert a profile by email; blank usernames are stored as missing
async fn save_profile(store: &dyn TargetStore, email: &str, username: Option<&str>) -> Result<UserProfile> {
    let email = validate_email(email)?;
    let username = username.map(str::trim).filter(|name| !name.is_empty());
    store.save_profile(username, &email, Utc::now()).await
}

async fn open_store(config: &Config) -> Result<Arc<LibsqlStore>> {
    let pool = pool::open_pool(&config.database.path, config.database.max_connections).await?;
    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);
    Ok(Arc::new(LibsqlStore::new_from_pool(pool)))
}

fn print_targets(targets: &[MonitoredTarget]) {
    if targets.is_empty() {
        println!("No targets registered");
        return;
    }

    for target in targets {
        let checked = target
            .last_checked_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".into());
        println!("{}  {:<7}  {:<19}  {}", target.id, target.status, checked, target.url);
    }
}

fn print_profile(profile: &UserProfile) {
    println!("User {}", profile.id);
    println!("  Username: {}", profile.username.as_deref().unwrap_or("-"));
    println!("  Email:    {}", profile.email);
    println!("  Created:  {}", profile.created_at.format("%Y-%m-%d %H:%M:%S"));
}
