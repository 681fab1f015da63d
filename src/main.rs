use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tubevault_backup::App;
use tubevault_config::Config;

/// Back up YouTube playlists and channels to S3, Dropbox or a local directory.
#[derive(Parser)]
#[command(name = "tubevault", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend to use instead of `storage.backend`
    #[arg(short, long, global = true)]
    storage: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue every video of a playlist that isn't backed up yet
    Backup { playlist_id: String },
    /// Queue every video of every playlist of a channel
    BackupChannel { channel_id: String },
    /// Back up a playlist right away, without the job queue
    Direct { playlist_id: String },
    /// Process queued jobs until interrupted
    Worker,
    /// Show the number of queued jobs per status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    let app = match App::from_config(config, cli.storage.as_deref()).await {
        Ok(app) => app,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    let code = run(&app, cli.command).await;
    app.close().await;
    code
}

async fn run(app: &App, command: Command) -> ExitCode {
    let result = match command {
        Command::Backup { playlist_id } => match app.backup() {
            Ok(backup) => backup.backup_playlist(&playlist_id).await.map(|jobs| queued(jobs.len())),
            Err(err) => Err(err),
        },
        Command::BackupChannel { channel_id } => match app.backup() {
            Ok(backup) => backup.backup_channel(&channel_id).await.map(|jobs| queued(jobs.len())),
            Err(err) => Err(err),
        },
        Command::Direct { playlist_id } => match app.backup() {
            Ok(backup) => backup.playlist_immediately(&playlist_id).await.map(|errors| {
                println!("Finished!");
                for err in errors {
                    println!("{err:?}");
                }
            }),
            Err(err) => Err(err),
        },
        Command::Worker => {
            let shutdown = CancellationToken::new();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("Interrupted, finishing in-flight jobs");
                    }
                    shutdown.cancel();
                }
            });
            app.worker().run(shutdown).await
        },
        Command::Status => return status(app).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

fn queued(count: usize) {
    println!("Finished! {count} video(s) queued for backup.");
}

async fn status(app: &App) -> ExitCode {
    match app.queue().counts().await {
        Ok(counts) => {
            println!("storage:   {}", app.backend().name());
            println!("queue:     {}", app.queue().name());
            println!("pending:   {}", counts.pending);
            println!("active:    {}", counts.active);
            println!("succeeded: {}", counts.succeeded);
            println!("failed:    {}", counts.failed);
            ExitCode::SUCCESS
        },
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
