//! `crm` command-line front end.
//!
//! # Responsibility
//! - Load `StoreConfig` from the environment and apply flag overrides.
//! - Run one customer operation and print its JSON envelope to stdout.
//!
//! # Invariants
//! - Envelopes go to stdout; setup failures go to stderr with exit code 2.
//! - An envelope carrying an error exits with code 1.

use chrono::Local;
use clap::{Parser, Subcommand};
use crm_core::{
    init_logging, ApiResponse, ConfigError, Customer, CustomerId, CustomerService, LoggingError,
    RepoError, SortDirection, StoreConfig, TableQuery,
};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "crm", version, about = "Customer store maintenance tool")]
struct Cli {
    /// SQLite database file; overrides `CRM_DB_PATH`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log directory; overrides `CRM_LOG_DIR`.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue the next customer code for the current month.
    NextCode,
    /// Show one customer.
    Get { id: CustomerId },
    /// List customers one page at a time.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 0)]
        size: u32,
        /// Sort field, e.g. `full_name`.
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        /// Exact match, `field=value`. Repeatable.
        #[arg(long = "filter", value_parser = parse_pair)]
        filters: Vec<(String, String)>,
        /// Substring match, `field=value`. Repeatable.
        #[arg(long = "search", value_parser = parse_pair)]
        searches: Vec<(String, String)>,
    },
    /// Insert one customer; a code is issued when `--code` is absent.
    Create {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Replace a customer's fields from a JSON object.
    Update {
        id: CustomerId,
        #[arg(long)]
        json: String,
    },
    /// Import a JSON array of customers; codes are assigned per accepted row.
    Import { file: PathBuf },
    /// Soft-delete customers.
    Delete {
        #[arg(required = true)]
        ids: Vec<CustomerId>,
    },
    CheckEmail { email: String },
    CheckPhone { phone: String },
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Store(RepoError),
    Input(serde_json::Error),
    Read { path: PathBuf, source: std::io::Error },
    Output(serde_json::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "failed to open store: {err}"),
            Self::Input(err) => write!(f, "invalid customer json: {err}"),
            Self::Read { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Output(err) => write!(f, "failed to encode output: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Input(err) => Some(err),
            Self::Read { source, .. } => Some(source),
            Self::Output(err) => Some(err),
        }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected `field=value`, got `{raw}`")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("crm: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool, CliError> {
    let mut config = StoreConfig::from_env().map_err(CliError::Config)?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = Some(log_dir);
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir).map_err(CliError::Logging)?;
    }

    let service =
        CustomerService::with_options(config.connection_provider(), config.repository_options())
            .map_err(CliError::Store)?;

    match cli.command {
        Command::NextCode => print(service.create_customer_code(Local::now().date_naive())),
        Command::Get { id } => print(service.get_by_id(&id)),
        Command::List {
            page,
            size,
            sort,
            desc,
            filters,
            searches,
        } => {
            let mut query = TableQuery::page(page, size);
            if let Some(sort) = sort {
                let direction = if desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                query = query.sorted_by(sort, direction);
            }
            for (key, value) in filters {
                query = query.filter(key, value);
            }
            for (key, value) in searches {
                query = query.search(key, value);
            }
            print(service.load_table(&query))
        }
        Command::Create {
            full_name,
            phone,
            email,
            code,
        } => {
            let code = match code {
                Some(code) => code,
                None => {
                    match service.create_customer_code(Local::now().date_naive()) {
                        ApiResponse {
                            data: Some(code), ..
                        } => code,
                        failed => return print(failed),
                    }
                }
            };
            let customer = Customer::new(full_name, phone, email).with_code(code);
            print(service.insert(&[customer]))
        }
        Command::Update { id, json } => {
            let customer: Customer = serde_json::from_str(&json).map_err(CliError::Input)?;
            print(service.update(&id, &customer))
        }
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file).map_err(|source| CliError::Read {
                path: file.clone(),
                source,
            })?;
            let drafts: Vec<Customer> = serde_json::from_str(&raw).map_err(CliError::Input)?;
            print(service.import_customers(Local::now().date_naive(), drafts))
        }
        Command::Delete { ids } => print(service.delete(&ids)),
        Command::CheckEmail { email } => print(service.check_email(&email)),
        Command::CheckPhone { phone } => print(service.check_phone(&phone)),
    }
}

fn print<T: Serialize>(response: ApiResponse<T>) -> Result<bool, CliError> {
    let json = serde_json::to_string_pretty(&response).map_err(CliError::Output)?;
    println!("{json}");
    Ok(response.is_ok())
}
