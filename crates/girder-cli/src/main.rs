//! Girder CLI - The `girder` command.
//!
//! Runs an application script inside a Girder interpreter host.
//!
//! # Architecture
//!
//! The CLI binary wires together:
//!
//! - **girder-core**: Interpreter registry, messages, virtual filesystem, Rhai API
//! - **girder-std**: The bootstrap program and script library, mounted last
//!   on the search path so project files can override them

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use girder_core::{Config, Core, ExecutionMode, FrameClock, MountSource};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::fs;
use std::path::{Path, PathBuf};

/// Girder - multi-interpreter Rhai host
#[derive(Parser, Debug)]
#[command(name = "girder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Rhai applications on a multi-interpreter host", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an application script
    Run {
        /// Virtual path of the application script
        #[arg(value_name = "SCRIPT")]
        script: String,

        /// Configuration file (defaults to the user config, if any)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Additional directories appended to the search path
        #[arg(short = 'm', long = "mount", value_name = "DIR")]
        mounts: Vec<PathBuf>,

        /// Tar archives prepended to the search path
        #[arg(short = 'a', long = "archive", value_name = "TAR")]
        archives: Vec<PathBuf>,

        /// Directory that saves are written into
        #[arg(long, value_name = "DIR")]
        write_dir: Option<PathBuf>,

        /// Do not mount the base directory
        #[arg(long)]
        no_base_dir: bool,

        /// Run the main interpreter on its own thread
        #[arg(long)]
        threaded: bool,

        /// Write logs to a file instead of stderr
        #[arg(long, value_name = "FILE")]
        log_file: Option<PathBuf>,

        /// Log at debug level unless RUST_LOG says otherwise
        #[arg(short, long)]
        verbose: bool,

        /// Arguments stored as arg0..argN for the application
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Write a commented default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Copy the embedded bootstrap program and script library to a directory
    ExportScripts {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Show version information
    Version,
}

/// Options of the `run` subcommand.
struct RunOptions {
    script: String,
    config: Option<PathBuf>,
    mounts: Vec<PathBuf>,
    archives: Vec<PathBuf>,
    write_dir: Option<PathBuf>,
    no_base_dir: bool,
    threaded: bool,
    args: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            script,
            config,
            mounts,
            archives,
            write_dir,
            no_base_dir,
            threaded,
            log_file,
            verbose,
            args,
        } => {
            init_logger(log_file.as_deref(), verbose)?;
            run(RunOptions {
                script,
                config,
                mounts,
                archives,
                write_dir,
                no_base_dir,
                threaded,
                args,
            })
        }
        Commands::InitConfig { force } => init_config(force),
        Commands::ExportScripts { dir } => {
            let written = girder_std::extract_to(&dir)
                .with_context(|| format!("Failed to export scripts to {}", dir.display()))?;
            println!("Exported {} scripts to {}", written, dir.display());
            Ok(())
        }
        Commands::Version => {
            println!("girder {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Modular Architecture:");
            println!("  - girder-core: Interpreter host, messages, VFS, Rhai API");
            println!(
                "  - girder-std:  Bootstrap and script library ({} files)",
                girder_std::script_count()
            );
            Ok(())
        }
    }
}

fn init_logger(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp(None);

    if let Some(path) = log_file {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn run(options: RunOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(),
    };

    // Command line flags override the config file
    config.vfs.directories.extend(options.mounts);
    config.vfs.archives.extend(options.archives);
    if let Some(dir) = options.write_dir {
        config.vfs.write_dir = Some(dir);
    }
    if options.no_base_dir {
        config.vfs.mount_base_dir = false;
    }

    let core = Core::new(config);
    core.vfs()
        .mount(MountSource::Embedded(girder_std::scripts()), "", true)
        .context("Failed to mount the standard scripts")?;

    for (i, arg) in options.args.iter().enumerate() {
        core.set_store_text(&format!("arg{}", i), arg)?;
    }
    core.set_store_text("argc", &options.args.len().to_string())?;

    let main = core.spawn_interpreter(Some("main"));
    main.attach(Box::new(FrameClock::new()))?;

    spawn_signal_handler(core.clone())?;

    log::info!("Running {}", options.script);
    let result = if options.threaded {
        main.start(&options.script, ExecutionMode::Threaded)
            .and_then(|_| main.join())
    } else {
        main.start(&options.script, ExecutionMode::Inline)
    };

    // Workers started by the application do not outlive it.
    core.stop_all_interpreters();
    core.join_all();

    result.with_context(|| format!("Interpreter failed running {}", options.script))?;
    log::info!(
        "Done ({} interpreters, {} live messages)",
        core.interpreter_count(),
        core.allocator().live_messages()
    );
    Ok(())
}

/// Stop every interpreter on SIGINT/SIGTERM.
fn spawn_signal_handler(core: Core) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    std::thread::Builder::new()
        .name("girder-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                log::info!("Received signal {}, stopping interpreters", signal);
                core.stop_all_interpreters();
            }
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    let path = Config::create_default_config_file()?;
    println!("Created config file: {}", path.display());
    Ok(())
}
