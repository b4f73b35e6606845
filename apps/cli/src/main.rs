mod api;
mod error;
mod poller;
mod session;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use api::{ApiClient, JobStatus, StatusSource, SubmitRequest};
use poller::{JobPoller, PollOutcome};
use session::{JobRecord, Session, SessionStore, TokenPair};

#[derive(Parser)]
#[command(name = "resumeai")]
#[command(about = "Submit CV and cover letter generations and follow them to completion")]
struct Cli {
    /// Base URL of the ResumeAI API
    #[arg(long, env = "RESUMEAI_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Session file (defaults to the platform data directory)
    #[arg(long, env = "RESUMEAI_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session with a token from the identity provider
    Login {
        /// Access token
        #[arg(long)]
        token: String,

        /// Refresh token, if the provider issued one
        #[arg(long)]
        refresh_token: Option<String>,
    },

    /// End the session and forget recorded jobs
    Logout,

    /// Upload a source CV (PDF, DOCX or text)
    Upload {
        file: PathBuf,
    },

    /// Create a job description from a text file
    Jd {
        file: PathBuf,
    },

    /// Submit a generation job and wait for it
    Submit {
        /// Job description ID
        #[arg(long)]
        jd: Uuid,

        /// Source CV document ID
        #[arg(long)]
        source: Option<Uuid>,

        /// cv, cover_letter or both
        #[arg(long)]
        kind: Option<String>,

        /// Template identifier
        #[arg(long)]
        template: Option<String>,

        /// Return right after submission
        #[arg(long)]
        no_wait: bool,
    },

    /// Fetch a job's status once
    Status {
        job: Uuid,
    },

    /// Poll a job until it finishes
    Watch {
        job: Uuid,
    },

    /// List jobs recorded in this session
    Jobs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}=warn", env!("CARGO_PKG_NAME")))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let store = SessionStore::new(cli.session_file.unwrap_or_else(SessionStore::default_path));
    let mut session = store.load()?;

    match cli.command {
        Commands::Login {
            token,
            refresh_token,
        } => {
            let session = Session::login(TokenPair {
                access_token: token,
                refresh_token,
            });
            store.save(&session)?;
            println!("Signed in. Session stored at {}", store.path().display());
        }

        Commands::Logout => {
            session.logout();
            store.clear()?;
            println!("Signed out.");
        }

        Commands::Upload { file } => {
            let client = client_for(&cli.api_url, &session)?;
            let doc = client.upload_document(&file).await?;
            println!(
                "Uploaded {} as {} v{} ({})",
                doc.file_name, doc.doc_type, doc.version, doc.id
            );
        }

        Commands::Jd { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let client = client_for(&cli.api_url, &session)?;
            let jd = client.create_job_description(&text).await?;
            println!("{}", jd.id);
        }

        Commands::Submit {
            jd,
            source,
            kind,
            template,
            no_wait,
        } => {
            let client = client_for(&cli.api_url, &session)?;
            let submitted = client
                .submit_generation(&SubmitRequest {
                    job_description_id: jd,
                    source_document_id: source,
                    output_kind: kind,
                    template,
                })
                .await?;
            session.record_submitted(submitted.job_id);
            store.save(&session)?;
            println!("Job {} {}", submitted.job_id, submitted.status.as_str());

            if !no_wait {
                watch(client, submitted.job_id, &mut session, &store).await?;
            }
        }

        Commands::Status { job } => {
            let client = client_for(&cli.api_url, &session)?;
            match client.job_status(job).await {
                Ok(view) => {
                    let mut record = session
                        .job(job)
                        .cloned()
                        .unwrap_or_else(|| JobRecord::queued(job));
                    record.apply(&view);
                    print_record(&record);
                    session.upsert_job(record);
                    store.save(&session)?;
                }
                Err(e) if e.requires_reauth() => {
                    store.clear()?;
                    bail!(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Watch { job } => {
            let client = client_for(&cli.api_url, &session)?;
            watch(client, job, &mut session, &store).await?;
        }

        Commands::Jobs => {
            let jobs = session.jobs();
            if jobs.is_empty() {
                println!("No jobs recorded in this session.");
            }
            for record in jobs {
                print_record(record);
            }
        }
    }

    Ok(())
}

fn client_for(api_url: &str, session: &Session) -> Result<ApiClient> {
    if !session.is_signed_in() {
        bail!("Not signed in; run `resumeai login --token <token>` first");
    }
    Ok(ApiClient::new(
        api_url,
        session.access_token().map(str::to_string),
    )?)
}

async fn watch(
    client: ApiClient,
    job_id: Uuid,
    session: &mut Session,
    store: &SessionStore,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let poller = JobPoller::new(client);
    let outcome = poller.watch(job_id, session, store, &cancel).await?;
    cancel.cancel();

    match outcome {
        PollOutcome::Settled(record) => {
            print_record(&record);
            if record.status == JobStatus::Error {
                bail!("Job {job_id} failed");
            }
        }
        PollOutcome::Unauthorized => {
            session.logout();
            store.clear()?;
            bail!("Session expired; run `resumeai login` again");
        }
        PollOutcome::Cancelled => {
            warn!("Stopped watching job {job_id}; it keeps running on the server");
            println!("Stopped watching. Resume with `resumeai watch {job_id}`.");
        }
    }
    Ok(())
}

fn print_record(record: &JobRecord) {
    println!("Job {}: {}", record.job_id, record.status.as_str());
    if let Some(id) = record.output_cover_letter_id {
        println!("  cover letter: {id}");
    }
    if let Some(id) = record.output_cv_id {
        println!("  cv:           {id}");
    }
    if let Some(message) = &record.error_message {
        println!("  error:        {message}");
    }
}
