use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use face_timeline::analysis::VideoProcessor;
use face_timeline::config::AppConfig;
use face_timeline::database::models::NewVideo;
use face_timeline::database::repositories::{
    CatalogRepository, SqlxCatalogRepository, SqlxNotificationRepository,
};
use face_timeline::database::{self, DbPool};
use face_timeline::logging;
use face_timeline::media::FfmpegDecoder;
use face_timeline::notification::{NotificationService, NotificationServiceConfig};
use face_timeline::pipeline::{CleanupKind, CleanupService, Pipeline, TaskExecutor, TaskPayload};
use face_timeline::recognition::{GalleryBuilder, HistogramRecognizer};

#[derive(Parser)]
#[command(name = "face-timeline", version, about = "Detect when known people appear in videos")]
struct Cli {
    /// Tracing filter directives replacing the default, e.g. `face_timeline=debug`.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse each video as its own task.
    Process {
        #[arg(required = true)]
        video_ids: Vec<i64>,
    },
    /// Analyse the videos sequentially as one batch task.
    Batch {
        #[arg(required = true)]
        video_ids: Vec<i64>,
    },
    /// Run a housekeeping task.
    Cleanup {
        #[arg(value_enum, default_value_t = CleanupArg::General)]
        kind: CleanupArg,
    },
    /// Start the worker pool and wait for Ctrl-C.
    Run,
    /// Register a known person; the photo path is relative to the faces directory.
    AddPerson { name: String, photo: String },
    /// Register a video file.
    AddVideo { path: String },
    /// List the registered videos.
    Videos,
    /// Print the stored appearances of a video.
    Appearances { video_id: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum CleanupArg {
    Notifications,
    TempFiles,
    General,
}

impl From<CleanupArg> for CleanupKind {
    fn from(arg: CleanupArg) -> Self {
        match arg {
            CleanupArg::Notifications => CleanupKind::Notifications,
            CleanupArg::TempFiles => CleanupKind::TempFiles,
            CleanupArg::General => CleanupKind::General,
        }
    }
}

fn build_pipeline(config: &AppConfig, pool: &DbPool) -> (Pipeline, Arc<NotificationService>) {
    let catalog: Arc<dyn CatalogRepository> = Arc::new(SqlxCatalogRepository::new(pool.clone()));
    let notifications = Arc::new(SqlxNotificationRepository::new(pool.clone()));
    let notifier = Arc::new(NotificationService::with_repository(
        NotificationServiceConfig::default(),
        notifications.clone(),
    ));
    let recognizer = Arc::new(HistogramRecognizer::new());
    let decoder = Arc::new(FfmpegDecoder::with_paths(
        &config.ffmpeg_path,
        &config.ffprobe_path,
    ));

    let processor = VideoProcessor::new(
        catalog.clone(),
        decoder,
        recognizer.clone(),
        config.analysis,
    );
    let executor = TaskExecutor::new(
        catalog,
        processor,
        GalleryBuilder::new(config.faces_dir.clone(), recognizer),
        notifier.clone(),
        CleanupService::new(notifications, config.cleanup_config()),
    );

    let pipeline = Pipeline::new(config.pipeline.clone(), Arc::new(executor), notifier.clone());
    (pipeline, notifier)
}

/// Submit, run until the queue is idle, print the results.
async fn run_once(config: &AppConfig, pool: &DbPool, payloads: Vec<TaskPayload>) -> anyhow::Result<()> {
    let (pipeline, notifier) = build_pipeline(config, pool);
    let submitted = payloads.len();
    for payload in payloads {
        pipeline.submit(payload);
    }

    pipeline.start_default()?;
    pipeline.wait_idle().await;
    pipeline.stop().await;
    notifier.flush().await;

    let results = pipeline.drain_results(usize::MAX);
    println!("{}", serde_json::to_string_pretty(&results)?);
    info!(submitted, completed = results.len(), "Done");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;

    let (logging_config, _guard) = logging::init_logging(&config.log_dir)?;
    if let Some(directive) = cli.log_filter.as_deref() {
        logging_config.set_filter(directive)?;
    }
    debug!(filter = %logging_config.get_filter(), "Logging initialised");
    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    match cli.command {
        Command::Process { video_ids } => {
            let payloads = video_ids
                .into_iter()
                .map(|video_id| TaskPayload::ProcessVideo { video_id })
                .collect();
            run_once(&config, &pool, payloads).await?;
        }
        Command::Batch { video_ids } => {
            run_once(&config, &pool, vec![TaskPayload::BatchProcess { video_ids }]).await?;
        }
        Command::Cleanup { kind } => {
            run_once(&config, &pool, vec![TaskPayload::Cleanup { kind: kind.into() }]).await?;
        }
        Command::Run => {
            let (pipeline, notifier) = build_pipeline(&config, &pool);
            pipeline.start_default()?;
            info!("Pipeline running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            pipeline.stop().await;
            notifier.flush().await;
        }
        Command::AddPerson { name, photo } => {
            let id = SqlxCatalogRepository::new(pool.clone())
                .create_person(&name, &photo)
                .await?;
            println!("{id}");
        }
        Command::AddVideo { path } => {
            let id = SqlxCatalogRepository::new(pool.clone())
                .create_video(&NewVideo::from_path(path))
                .await?;
            println!("{id}");
        }
        Command::Videos => {
            let videos = SqlxCatalogRepository::new(pool.clone()).list_videos().await?;
            println!("{}", serde_json::to_string_pretty(&videos)?);
        }
        Command::Appearances { video_id } => {
            let rows = SqlxCatalogRepository::new(pool.clone())
                .list_appearances(video_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    shutdown.cancel();
    pool.close().await;
    Ok(())
}
