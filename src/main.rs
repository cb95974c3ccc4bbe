use std::{fmt::Display, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tollgate::{
    AppState, GovernorError, UsageGovernor, cache,
    config::GovernorConfig,
    db::DbPool,
    governor::CallOutcome,
    models::{PlanType, SubscriptionStatus, UpsertSubscription},
    observability, retention,
    routes::{
        self,
        api::{AdmissionRequest, ReportedStatus, UsageReport},
    },
};
use uuid::Uuid;
use validator::Validate;

/// CLI arguments for Tollgate
#[derive(Parser, Debug)]
#[command(version, about = "Usage governor for metered AI calls", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "tollgate.toml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP sidecar (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Run an admission check for a call
    Check {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        model: String,
        #[arg(long)]
        max_tokens: u32,
    },
    /// Record a completed call
    Record {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "0")]
        input_tokens: u64,
        #[arg(long, default_value = "0")]
        output_tokens: u64,
        #[arg(long, default_value = "0")]
        duration_ms: u64,
        /// Record the call as failed with this message
        #[arg(long)]
        error: Option<String>,
    },
    /// Show current-month usage of an organization
    Summary {
        #[arg(long)]
        org: Uuid,
    },
    /// List the models an organization's plan may call
    Models {
        #[arg(long)]
        org: Uuid,
    },
    /// Manage subscriptions
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    /// Run one retention pass and exit
    Prune,
}

#[derive(clap::Subcommand, Debug)]
enum PlanCommand {
    /// Create or replace an organization's subscription
    Set {
        #[arg(long)]
        org: Uuid,
        /// free, pro or team
        #[arg(long)]
        plan: PlanType,
        #[arg(long, default_value = "active")]
        status: SubscriptionStatus,
        /// End of the current billing period (RFC 3339)
        #[arg(long)]
        period_end: Option<DateTime<Utc>>,
    },
}

fn exit_with(message: impl Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_config(path: &str) -> GovernorConfig {
    if !Path::new(path).exists() {
        eprintln!("Config file {} not found, using defaults", path);
        return GovernorConfig::default();
    }

    match GovernorConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => exit_with(format!("Failed to load config from {}: {}", path, e)),
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => exit_with(e),
    }
}

async fn open_db(config: &GovernorConfig) -> Arc<DbPool> {
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => exit_with(format!("Failed to open database: {}", e)),
    };

    if config.database.run_migrations()
        && let Err(e) = db.run_migrations().await
    {
        exit_with(format!("Failed to run migrations: {}", e));
    }

    Arc::new(db)
}

async fn open_state(config: &GovernorConfig) -> AppState {
    let db = open_db(config).await;
    let cache = match cache::from_config(&config.cache).await {
        Ok(c) => c,
        Err(e) => exit_with(format!("Failed to connect to counter store: {}", e)),
    };

    AppState::new(db, cache, &config.governor)
}

async fn open_governor(config: &GovernorConfig) -> Arc<UsageGovernor> {
    if config.cache.is_memory() {
        tracing::warn!("In-memory counters do not outlive this command; configure Redis");
    }
    open_state(config).await.governor
}

fn validated<T: Validate>(input: T) -> Result<T, GovernorError> {
    input
        .validate()
        .map_err(|e| GovernorError::Validation(e.to_string()))?;
    Ok(input)
}

fn report_governor_result<T: Serialize>(result: Result<T, GovernorError>) {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => exit_with(format!("[{}] {}", e.code(), e)),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Migrate => {
            let db = match DbPool::from_config(&config.database).await {
                Ok(db) => db,
                Err(e) => exit_with(format!("Failed to open database: {}", e)),
            };
            if let Err(e) = db.run_migrations().await {
                exit_with(format!("Failed to run migrations: {}", e));
            }
            println!("Migrations complete");
        }
        Command::Check {
            org,
            model,
            max_tokens,
        } => {
            let governor = open_governor(&config).await;
            let result = async {
                let request = validated(AdmissionRequest {
                    org_id: org,
                    model,
                    max_tokens,
                })?;
                governor
                    .check_admission(request.org_id, &request.model, request.max_tokens)
                    .await
            }
            .await;
            report_governor_result(result);
        }
        Command::Record {
            org,
            user,
            model,
            input_tokens,
            output_tokens,
            duration_ms,
            error,
        } => {
            let governor = open_governor(&config).await;
            let report = UsageReport {
                org_id: org,
                user_id: user,
                model,
                input_tokens,
                output_tokens,
                prompt_length: 0,
                response_length: 0,
                duration_ms,
                status: if error.is_some() {
                    ReportedStatus::Error
                } else {
                    ReportedStatus::Success
                },
                error_message: error,
            };
            let result = async {
                let outcome: CallOutcome = validated(report)?.into();
                governor.record_usage(outcome).await
            }
            .await;
            report_governor_result(result);
        }
        Command::Summary { org } => {
            let governor = open_governor(&config).await;
            report_governor_result(governor.usage_summary(org).await);
        }
        Command::Models { org } => {
            let db = open_db(&config).await;
            let cache = Arc::new(cache::MemoryCache::new(&Default::default()));
            let governor = UsageGovernor::new(cache, &db, &config.governor);
            report_governor_result(governor.available_models(org).await);
        }
        Command::Plan {
            command:
                PlanCommand::Set {
                    org,
                    plan,
                    status,
                    period_end,
                },
        } => {
            let db = open_db(&config).await;
            let input = UpsertSubscription {
                org_id: org,
                plan,
                status,
                current_period_end: period_end,
            };
            match db.subscriptions().upsert(input).await {
                Ok(subscription) => print_json(&subscription),
                Err(e) => exit_with(format!("Failed to save subscription: {}", e)),
            }
        }
        Command::Prune => {
            let db = open_db(&config).await;
            match retention::run_retention(&db, &config.retention).await {
                Ok(result) => print_json(&result),
                Err(e) => exit_with(format!("Retention run failed: {}", e)),
            }
        }
    }
}

async fn run_server(config: GovernorConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let state = open_state(&config).await;
    tracing::info!(
        cache = state.cache.backend(),
        "Starting usage governor"
    );

    if config.retention.enabled {
        tokio::spawn(retention::start_retention_worker(
            state.db.clone(),
            config.retention.clone(),
        ));
    }

    let app = routes::build_app(&config, state);

    let bind_addr = config.server.socket_addr();
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(l) => l,
        Err(e) => exit_with(format!("Failed to bind to {}: {}", bind_addr, e)),
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        exit_with(format!("Server error: {}", e));
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown complete");
}
