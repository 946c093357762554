use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use boltq::config::{PostgresConfig, ReconcileConfig, RedisConfig, ServiceConfig};
use boltq::node::Node;
use boltq::proto::queue_service_client::QueueServiceClient;
use boltq::proto::{EnqueueJobRequest, GetJobStatusRequest, JobType};
use boltq::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "boltq")]
#[command(version)]
#[command(about = "Job submission service backed by Postgres and Redis")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the queue service
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for gRPC
    #[arg(long, env = "BOLTQ_PORT", default_value = "50051")]
    port: u16,

    /// Server-side cap on a single request, in seconds
    #[arg(long, env = "BOLTQ_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    // === Postgres ===
    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    postgres_host: String,

    #[arg(long, env = "POSTGRES_PORT", default_value = "5432")]
    postgres_port: u16,

    #[arg(long, env = "POSTGRES_USER", default_value = "boltq")]
    postgres_user: String,

    #[arg(long, env = "POSTGRES_PASSWORD", default_value = "boltq_dev", hide_env_values = true)]
    postgres_password: String,

    #[arg(long, env = "POSTGRES_DB", default_value = "boltq")]
    postgres_db: String,

    /// Maximum open database connections
    #[arg(long, env = "POSTGRES_MAX_OPEN_CONNS", default_value = "25")]
    postgres_max_open_conns: u32,

    /// Database connections the pool keeps open at all times
    #[arg(long, env = "POSTGRES_MIN_CONNS", default_value = "5")]
    postgres_min_conns: u32,

    /// Maximum lifetime of a database connection, in seconds
    #[arg(long, env = "POSTGRES_CONN_MAX_LIFETIME_SECS", default_value = "300")]
    postgres_conn_max_lifetime_secs: u64,

    // === Redis ===
    /// Redis address (host:port)
    #[arg(long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    redis_addr: String,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    /// Redis logical database index
    #[arg(long, env = "REDIS_DB", default_value = "0")]
    redis_db: i64,

    /// Maximum pooled Redis connections
    #[arg(long, env = "REDIS_POOL_SIZE", default_value = "25")]
    redis_pool_size: u32,

    // === Reconciliation ===
    /// Disable the sweep that republishes jobs stuck in `queued`
    #[arg(long)]
    no_reconcile: bool,

    /// Seconds between reconciliation sweeps
    #[arg(long, env = "BOLTQ_RECONCILE_INTERVAL_SECS", default_value = "30")]
    reconcile_interval_secs: u64,

    /// Seconds a job must sit in `queued` before it is considered stuck
    #[arg(long, env = "BOLTQ_RECONCILE_GRACE_SECS", default_value = "60")]
    reconcile_grace_secs: u64,

    /// Stale jobs fetched per page while sweeping
    #[arg(long, env = "BOLTQ_RECONCILE_BATCH", default_value = "100")]
    reconcile_batch: usize,
}

impl ServerArgs {
    fn into_config(self) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
        let listen_addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;

        let postgres = PostgresConfig {
            host: self.postgres_host,
            port: self.postgres_port,
            user: self.postgres_user,
            password: self.postgres_password,
            database: self.postgres_db,
            max_open_conns: self.postgres_max_open_conns,
            min_conns: self.postgres_min_conns,
            conn_max_lifetime: Duration::from_secs(self.postgres_conn_max_lifetime_secs),
            ..PostgresConfig::default()
        };

        let redis = RedisConfig {
            addr: self.redis_addr,
            password: self.redis_password,
            db: self.redis_db,
            pool_max_size: self.redis_pool_size,
            ..RedisConfig::default()
        };

        let reconcile = ReconcileConfig {
            enabled: !self.no_reconcile,
            interval: Duration::from_secs(self.reconcile_interval_secs),
            grace: Duration::from_secs(self.reconcile_grace_secs),
            batch_size: self.reconcile_batch,
        };

        let mut config = ServiceConfig::new(listen_addr)
            .with_postgres(postgres)
            .with_redis(redis)
            .with_reconcile(reconcile);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(config)
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobTypeArg {
    #[value(alias = "JOB_STANDARD")]
    Standard,
    #[value(alias = "JOB_BATCH")]
    Batch,
}

impl From<JobTypeArg> for JobType {
    fn from(arg: JobTypeArg) -> Self {
        match arg {
            JobTypeArg::Standard => JobType::JobStandard,
            JobTypeArg::Batch => JobType::JobBatch,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a new job
    Submit {
        /// Job type, which selects the dispatch queue
        #[arg(long = "type", short = 't', default_value = "standard")]
        job_type: JobTypeArg,

        /// Job payload, sent as UTF-8 bytes
        payload: String,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: String,
}

#[derive(Serialize)]
struct JobStatusOutput {
    job_id: String,
    #[serde(rename = "type")]
    job_type: String,
    status: String,
    created_at_ms: i64,
    started_at_ms: Option<i64>,
    completed_at_ms: Option<i64>,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        postgres_host = %config.postgres.host,
        postgres_db = %config.postgres.database,
        redis_addr = %config.redis.addr,
        reconcile = config.reconcile.enabled,
        "Starting boltq queue service"
    );

    let shutdown = install_shutdown_handler()?;
    let node = Node::connect(config).await?;
    node.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &mut QueueServiceClient<Channel>,
    job_type: JobTypeArg,
    payload: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .enqueue_job(EnqueueJobRequest {
            r#type: JobType::from(job_type) as i32,
            payload: payload.into_bytes(),
        })
        .await;

    match response {
        Ok(response) => {
            let resp = response.into_inner();
            match output_format {
                OutputFormat::Json => {
                    let output = JobSubmitOutput { job_id: resp.job_id };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Job submitted successfully!");
                    println!("Job ID: {}", resp.job_id);
                }
            }
            Ok(())
        }
        Err(status) => {
            eprintln!("Error: Job submission failed: {}", status.message());
            std::process::exit(1);
        }
    }
}

async fn handle_job_status(
    client: &mut QueueServiceClient<Channel>,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get_job_status(GetJobStatusRequest { job_id })
        .await?
        .into_inner();

    match output_format {
        OutputFormat::Json => {
            let output = JobStatusOutput {
                job_id: response.job_id,
                job_type: response.r#type,
                status: response.status,
                created_at_ms: response.created_at_ms,
                started_at_ms: response.started_at_ms,
                completed_at_ms: response.completed_at_ms,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job ID:     {}", response.job_id);
            println!("Type:       {}", response.r#type);
            println!("Status:     {}", response.status.to_uppercase());
            println!("Created:    {}", format_ms(response.created_at_ms));
            if let Some(ms) = response.started_at_ms {
                println!("Started:    {}", format_ms(ms));
            }
            if let Some(ms) = response.completed_at_ms {
                println!("Completed:  {}", format_ms(ms));
            }
        }
    }
    Ok(())
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let channel = Channel::from_shared(client.addr.clone())?.connect().await?;
            let mut grpc_client = QueueServiceClient::new(channel);

            match command {
                JobCommands::Submit { job_type, payload } => {
                    handle_job_submit(&mut grpc_client, job_type, payload, &client.output).await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&mut grpc_client, job_id, &client.output).await?;
                }
            }
        }
    }

    Ok(())
}
