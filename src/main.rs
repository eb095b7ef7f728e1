use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use analysis_tracker::api::{HttpBackend, JobBackend, ResumeFile};
use analysis_tracker::config::{ApiConfig, ClientConfig, PollConfig};
use analysis_tracker::job::{JobHandle, StatusSnapshot};
use analysis_tracker::mock_server::{self, MockBackendState, MockConfig};
use analysis_tracker::poller::{PollEvent, StatusPoller};
use analysis_tracker::session::{AnalysisSession, Callbacks, SessionState};
use analysis_tracker::shutdown::install_shutdown_handler;
use analysis_tracker::submitter::AnalysisInput;

#[derive(Parser, Debug)]
#[command(name = "analysis-tracker")]
#[command(version)]
#[command(about = "Submit resume analysis jobs and track them to completion")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Submit a resume and poll until the analysis finishes
    Analyze {
        #[command(flatten)]
        client: ClientArgs,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Fetch the status of a job once
    Status {
        #[command(flatten)]
        client: ClientArgs,

        /// Job ID returned at submission
        job_id: String,
    },

    /// Poll an already submitted job until it finishes
    Watch {
        #[command(flatten)]
        client: ClientArgs,

        /// Job ID returned at submission
        job_id: String,
    },

    /// Serve a fake analysis service for local development
    MockBackend(MockArgs),
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Base URL of the analysis service
    #[arg(long, short = 'a', env = "ANALYSIS_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Milliseconds between status checks
    #[arg(long, env = "ANALYSIS_POLL_INTERVAL_MS", default_value = "2000")]
    poll_interval_ms: u64,

    /// Give up after this many milliseconds of polling
    #[arg(long, env = "ANALYSIS_MAX_DURATION_MS", default_value = "300000")]
    max_duration_ms: u64,

    /// Consecutive failed status checks tolerated
    #[arg(long, env = "ANALYSIS_MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

impl ClientArgs {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let polling = PollConfig::default()
            .with_interval_ms(self.poll_interval_ms)
            .with_max_duration_ms(self.max_duration_ms)
            .with_max_retries(self.max_retries);
        polling
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid polling options: {}", e))?;

        Ok(ClientConfig::new(self.api_url.clone()).with_polling(polling))
    }
}

#[derive(Parser, Debug)]
struct InputArgs {
    /// Identifier of the job posting the resume is scored against
    #[arg(long, short = 't')]
    target: String,

    /// Resume file (.pdf, .docx, .doc or .txt)
    #[arg(long, short = 'f', conflicts_with = "text", required_unless_present = "text")]
    file: Option<PathBuf>,

    /// Resume text, instead of a file
    #[arg(long)]
    text: Option<String>,
}

#[derive(Parser, Debug)]
struct MockArgs {
    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Progress added on every status check (1-100)
    #[arg(long, default_value = "25", value_parser = clap::value_parser!(u8).range(1..=100))]
    progress_step: u8,

    /// Resumes containing this text fail
    #[arg(long, default_value = "FAIL_ANALYSIS")]
    failure_marker: String,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobStatusOutput {
    job_id: String,
    status: String,
    progress: u8,
    result: Option<Value>,
    error: Option<String>,
    updated_at: Option<String>,
}

impl JobStatusOutput {
    fn new(job_id: &str, snapshot: &StatusSnapshot) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: snapshot.status.to_string(),
            progress: snapshot.progress,
            result: snapshot.result.clone(),
            error: snapshot.error.clone(),
            updated_at: snapshot.updated_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_result(
    job_id: Option<&str>,
    result: &Value,
    output_format: &OutputFormat,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Table => {
            if let Some(job_id) = job_id {
                println!("Job ID:  {}", job_id);
            }
            println!("Status:  completed");
            println!("Result:");
            for line in serde_json::to_string_pretty(result)?.lines() {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

async fn load_input(args: InputArgs) -> anyhow::Result<AnalysisInput> {
    match (args.file, args.text) {
        (Some(path), _) => {
            let file = ResumeFile::from_path(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(AnalysisInput::file(args.target, file))
        }
        (None, Some(text)) => Ok(AnalysisInput::text(args.target, text)),
        (None, None) => bail!("either --file or --text is required"),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_analyze(client: ClientArgs, input: InputArgs) -> anyhow::Result<()> {
    let config = client.client_config()?;
    let input = load_input(input).await?;
    let backend: Arc<dyn JobBackend> = Arc::new(HttpBackend::new(config.api.clone())?);
    let shutdown = install_shutdown_handler();
    tracing::debug!(
        api_url = %config.api.base_url,
        local = config.api.is_local(),
        "Using analysis service"
    );

    let callbacks = Callbacks::new().on_progress(|progress| eprintln!("Progress: {}%", progress));
    let session = AnalysisSession::with_observer(backend, &config, callbacks);

    let handle = tokio::select! {
        submitted = session.submit(input) => submitted?,
        _ = shutdown.cancelled() => {
            session.reset();
            bail!("submission interrupted");
        }
    };
    eprintln!("Job submitted: {}", handle.job_id);
    if let Some(estimate) = &handle.estimated_completion {
        eprintln!("Estimated completion: {}", estimate);
    }

    let state: SessionState = tokio::select! {
        state = session.settled() => state,
        _ = shutdown.cancelled() => {
            session.reset();
            bail!("analysis of job {} interrupted", handle.job_id);
        }
    };

    match (&state.result, &state.error) {
        (Some(result), _) if state.is_completed() => {
            print_result(state.job_id.as_deref(), result, &client.output)
        }
        (_, Some(error)) => bail!("{}", error),
        _ => bail!("analysis ended in state {}", state.status),
    }
}

async fn handle_status(client: ClientArgs, job_id: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(ApiConfig::new(client.api_url.clone()))?;
    let snapshot = backend.fetch_job_status(&job_id).await?;

    match client.output {
        OutputFormat::Json => {
            let output = JobStatusOutput::new(&job_id, &snapshot);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job ID:    {}", job_id);
            println!("Status:    {}", snapshot.status);
            println!("Progress:  {}%", snapshot.progress);
            if let Some(updated_at) = snapshot.updated_at {
                println!("Updated:   {}", updated_at.to_rfc3339());
            }
            if let Some(error) = &snapshot.error {
                println!("Error:     {}", error);
            }
            if let Some(result) = &snapshot.result {
                println!("Result:");
                for line in serde_json::to_string_pretty(result)?.lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_watch(client: ClientArgs, job_id: String) -> anyhow::Result<()> {
    let config = client.client_config()?;
    let backend: Arc<dyn JobBackend> = Arc::new(HttpBackend::new(config.api.clone())?);
    let poller = StatusPoller::new(backend, config.polling.clone());
    let shutdown = install_shutdown_handler();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watch = poller.watch(&JobHandle::new(job_id.clone()), move |event| {
        let _ = tx.send(event);
    });

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = shutdown.cancelled() => {
                watch.stop();
                bail!("watch of job {} interrupted", job_id);
            }
        };

        match event {
            Some(PollEvent::Progress { progress, .. }) => eprintln!("Progress: {}%", progress),
            Some(PollEvent::Completed(result)) => {
                return print_result(Some(&job_id), &result, &client.output);
            }
            Some(PollEvent::Failed(e)) => bail!("{}", e),
            None => bail!("polling of job {} ended without a result", job_id),
        }
    }
}

async fn run_mock_backend(args: MockArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let state = MockBackendState::new(MockConfig {
        progress_step: args.progress_step,
        failure_marker: args.failure_marker,
        ..MockConfig::default()
    });

    let shutdown = install_shutdown_handler();
    mock_server::serve(listener, state, shutdown).await?;
    tracing::info!("Mock backend stopped");
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Commands::Analyze { client, input } => handle_analyze(client, input).await?,
        Commands::Status { client, job_id } => handle_status(client, job_id).await?,
        Commands::Watch { client, job_id } => handle_watch(client, job_id).await?,
        Commands::MockBackend(mock_args) => run_mock_backend(mock_args).await?,
    }

    Ok(())
}
