use clap::{Parser, Subcommand};
use devdock::models::{LogEntry, LogLevel, UnifiedProcessEntry};
use devdock::{commands, AppState, SupervisorConfig};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Supervise local dev projects and the ports they listen on")]
struct Cli {
    /// Data directory holding config.json and projects.json
    #[arg(long, env = "DEVDOCK_HOME", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level for supervisor diagnostics
    #[arg(long, env = "DEVDOCK_LOG", global = true, default_value = "warn")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show processes that listen on a port, use a lot of memory, or are managed
    Ps {
        #[arg(long)]
        json: bool,
    },
    /// Terminate a process (and its group) by pid
    Kill { pid: u32 },
    /// List registered projects
    Projects,
    /// Show one project and its scripts
    Show { id: String },
    /// Register a project directory
    Add {
        name: String,
        path: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        repo: Option<String>,
    },
    /// Unregister a project
    Remove { id: String },
    /// Check whether a directory can back a project
    Validate { path: String },
    /// Run a project script in the foreground; Ctrl-C stops it
    Run { id: String, script: String },
}

fn init_logger(level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    // A logger may already be installed when embedded; that is fine.
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    let config = match cli.data_dir {
        Some(dir) => SupervisorConfig::load_from(&dir),
        None => SupervisorConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(config);
    match execute(&state, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(state: &AppState, command: Commands) -> devdock::Result<()> {
    match command {
        Commands::Ps { json } => {
            let table = commands::list_processes(state).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print_table(&table);
            }
        }
        Commands::Kill { pid } => commands::kill_process(state, pid).await?,
        Commands::Projects => {
            for project in commands::list_projects(state).await? {
                println!("{}  {}  {}", project.id, project.name, project.path.display());
            }
        }
        Commands::Show { id } => {
            let project = commands::get_project(state, &id).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Commands::Add {
            name,
            path,
            url,
            repo,
        } => {
            let project = commands::add_project(state, name, path, url, repo).await?;
            println!("{}", project.id);
            if project.scripts.is_empty() {
                eprintln!("warning: no scripts found for {}", project.path.display());
            }
        }
        Commands::Remove { id } => commands::remove_project(state, &id).await?,
        Commands::Validate { path } => {
            let result = commands::validate_path(path).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Run { id, script } => run_foreground(state, &id, &script).await?,
    }
    Ok(())
}

async fn run_foreground(state: &AppState, id: &str, script: &str) -> devdock::Result<()> {
    let pid = commands::run_project(state, id, script).await?;
    eprintln!("started pid {} (Ctrl-C to stop)", pid);

    let mut last = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                commands::stop_project(state, id).await?;
                print_new_logs(state, id, &mut last).await?;
                return Ok(());
            }
            _ = ticker.tick() => {
                print_new_logs(state, id, &mut last).await?;
                if !commands::project_status(state, id).await?.running {
                    return Ok(());
                }
            }
        }
    }
}

// The buffer is bounded and evicts from the front, so resume after the last
// entry printed rather than at an index.
async fn print_new_logs(
    state: &AppState,
    id: &str,
    last: &mut Option<LogEntry>,
) -> devdock::Result<()> {
    let logs = commands::project_logs(state, id).await?;
    let start = last
        .as_ref()
        .and_then(|seen| {
            logs.iter()
                .rposition(|e| e.timestamp == seen.timestamp && e.message == seen.message)
        })
        .map(|pos| pos + 1)
        .unwrap_or(0);

    for entry in &logs[start..] {
        match entry.level {
            LogLevel::Info => println!("{}", entry.message),
            LogLevel::Warn | LogLevel::Error => eprintln!("{}", entry.message),
        }
    }
    if let Some(entry) = logs.last() {
        *last = Some(entry.clone());
    }
    Ok(())
}

fn print_table(table: &[UnifiedProcessEntry]) {
    println!(
        "{:>7}  {:<24} {:>6}  {:<12} {:<10} {:>9} {:>6}",
        "PID", "NAME", "PORT", "TYPE", "STATUS", "MEM(MB)", "CPU%"
    );
    for entry in table {
        let port = if entry.port == 0 {
            "-".to_string()
        } else {
            entry.port.to_string()
        };
        println!(
            "{:>7}  {:<24} {:>6}  {:<12} {:<10} {:>9.1} {:>6.1}",
            entry.pid,
            truncate(&entry.name, 24),
            port,
            entry.kind,
            format!("{:?}", entry.status),
            entry.memory_mb,
            entry.cpu
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width - 1).collect();
        short.push('~');
        short
    }
}
