use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ezmount::modules::config::{Locations, SessionConfig, Settings, UnmountScope};
use ezmount::modules::constants::DEFAULT_WATCH_INTERVAL_SECS;
use ezmount::modules::logging;
use ezmount::modules::menu;
use ezmount::modules::password::{FixedPrompt, Passphrase, PassphrasePrompt, TerminalPrompt};
use ezmount::modules::remotes::{BucketSource, FixedBuckets, MountPointAllocator, TerminalBuckets};
use ezmount::modules::session::{self, MountOutcome, Session};
use libc::{SIGINT, SIGTERM};
use log::{error, info};
use signal_hook::flag;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the mount table and credentials (defaults to the
    /// current directory)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Mount table to use instead of <dir>/mounts.csv
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    /// Credentials file to use instead of searching for rclone.conf
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Session log file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Settings file to use instead of ezmount.json
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Skip the passphrase prompt (the credentials file is not encrypted)
    #[arg(long, global = true)]
    no_password: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Menu,
    /// Show the status of every mount entry
    Status {
        /// Redraw until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Seconds between redraws
        #[arg(short, long, default_value_t = DEFAULT_WATCH_INTERVAL_SECS)]
        interval: u64,
    },
    /// Mount one entry
    Mount {
        /// Label or 1-based index
        target: String,
    },
    /// Unmount one entry
    Unmount {
        /// Label or 1-based index
        target: String,
    },
    /// Mount every entry
    MountAll,
    /// Stop mount processes
    UnmountAll {
        /// Which processes to stop (defaults to the settings file)
        #[arg(long, value_enum)]
        scope: Option<UnmountScope>,
    },
    /// Generate the mount table from the remotes in the credentials file
    Init {
        /// Overwrite an existing mount table
        #[arg(short, long)]
        force: bool,
        /// Extra buckets for an S3-style remote, e.g. `media=photos,videos`
        /// (repeatable; skips the bucket prompt)
        #[arg(short, long, value_name = "REMOTE=BUCKETS")]
        buckets: Vec<String>,
        /// Do not ask for extra buckets
        #[arg(long, conflicts_with = "buckets")]
        no_bucket_prompt: bool,
    },
    /// Open the session log
    Log,
}

fn main() {
    let cli = Cli::parse();

    let config = match session_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    };

    logging::init(&config.log_path, cli.verbose);
    info!("Starting ezmount...");

    if let Err(e) = run(cli, config) {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let local_dir = match &cli.dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("cannot determine the current directory")?,
    };
    let mut config = SessionConfig::from_locations(Locations::discover(local_dir))?;

    if let Some(path) = &cli.settings {
        config.settings = Settings::load(path)?;
    }
    if let Some(path) = &cli.table {
        config.table_path = path.clone();
    }
    if let Some(path) = &cli.credentials {
        config.credentials = Some(path.clone());
    }
    if let Some(path) = &cli.log_file {
        config.log_path = path.clone();
    }
    Ok(config)
}

fn prompt(cli: &Cli) -> Box<dyn PassphrasePrompt> {
    if cli.no_password {
        Box::new(FixedPrompt(Passphrase::empty()))
    } else {
        Box::new(TerminalPrompt)
    }
}

fn unlocked(cli: &Cli, config: SessionConfig) -> Result<Session> {
    let mut session = Session::init(config)?;
    session.unlock(prompt(cli).as_ref())?;
    Ok(session)
}

fn run(mut cli: Cli, config: SessionConfig) -> Result<()> {
    match cli.command.take().unwrap_or(Commands::Menu) {
        Commands::Menu => {
            let mut session = unlocked(&cli, config)?;
            menu::run(&mut session)?;
        }
        Commands::Status { watch, interval } => {
            let mut session = Session::init(config)?;
            if watch {
                watch_status(&mut session, Duration::from_secs(interval.max(1)))?;
            } else {
                print_status(&mut session);
            }
        }
        Commands::Mount { target } => {
            let mut session = unlocked(&cli, config)?;
            let index = session.find(&target)?;
            let entry = session.entries()[index].clone();
            match session.mount(index)? {
                MountOutcome::Launched(pid) => {
                    println!("Mounting {} at {} (pid {})", entry.label, entry.mount_point, pid)
                }
                MountOutcome::InUse => {
                    println!("{} is already in use; {} was not mounted", entry.mount_point, entry.label)
                }
            }
        }
        Commands::Unmount { target } => {
            let mut session = Session::init(config)?;
            let index = session.find(&target)?;
            let label = session.entries()[index].label.clone();
            if session.unmount(index)? {
                println!("Unmounting {}", label);
            } else {
                println!("{} is not mounted by any running process", label);
            }
        }
        Commands::MountAll => {
            let mut session = unlocked(&cli, config)?;
            let report = session.mount_all()?;
            println!("{}", report);
        }
        Commands::UnmountAll { scope } => {
            let mut session = Session::init(config)?;
            let count = session.unmount_all(scope)?;
            println!("Stopped {} mount process(es)", count);
        }
        Commands::Init {
            force,
            buckets,
            no_bucket_prompt,
        } => {
            let buckets: Box<dyn BucketSource> = if buckets.is_empty() && !no_bucket_prompt {
                Box::new(TerminalBuckets)
            } else {
                Box::new(FixedBuckets::parse(&buckets)?)
            };
            let mut allocator = MountPointAllocator::for_platform();
            let entries = session::generate_table(
                &config,
                prompt(&cli).as_ref(),
                buckets.as_ref(),
                &mut allocator,
                force,
            )?;
            println!("Wrote {} entries to {}", entries.len(), config.table_path.display());
            for entry in &entries {
                println!("  {}", entry);
            }
        }
        Commands::Log => {
            session::open_log(&config.log_path)?;
        }
    }

    Ok(())
}

fn print_status(session: &mut Session) {
    for status in session.status() {
        println!("{:>3}  {}  {}", status.number, status.entry, status.status);
    }
}

fn watch_status(session: &mut Session, interval: Duration) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        flag::register(signal, Arc::clone(&interrupted))?;
    }
    let tick = Duration::from_millis(100);

    while !interrupted.load(Ordering::Relaxed) {
        print!("\x1B[2J\x1B[H");
        print_status(session);

        let mut waited = Duration::ZERO;
        while waited < interval && !interrupted.load(Ordering::Relaxed) {
            thread::sleep(tick);
            waited += tick;
        }
    }
    info!("Received signal, leaving status watch");
    Ok(())
}
