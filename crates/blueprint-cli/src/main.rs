mod config;

use std::error::Error;

use blueprint::{Connection, MigrationPlan, Reconciler, Risk, StepResult, Table};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use config::Config;
use deadpool_postgres::Runtime;
use owo_colors::OwoColorize;
use tokio_postgres::NoTls;

/// Declarative schema reconciliation for Postgres.
#[derive(Parser, Debug)]
#[command(name = "blueprint")]
#[command(version)]
struct Cli {
    /// Database connection URL (overrides DATABASE_URL and the config file)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current tables as JSON
    Read {
        /// Only tables matching this regular expression (repeatable)
        #[arg(long = "filter", short)]
        filters: Vec<String>,
    },
    /// Show the steps that would bring the database to the blueprints
    Plan {
        /// Blueprint file (defaults to the one in the config)
        file: Option<Utf8PathBuf>,
    },
    /// Bring the database to the blueprints
    Apply {
        /// Blueprint file (defaults to the one in the config)
        file: Option<Utf8PathBuf>,
        /// Run plans riskier than `max_risk`
        #[arg(long)]
        force: bool,
    },
    /// Drop a table
    Drop {
        table: String,
    },
}

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Config file plus the directory relative paths resolve against.
struct Settings {
    config: Config,
    root: Utf8PathBuf,
}

fn load_settings() -> CliResult<Settings> {
    match config::load() {
        Ok((config, path)) => {
            tracing::debug!(path = %path, "loaded config");
            let root = config::project_root(&path)
                .map(|p| p.to_path_buf())
                .unwrap_or_default();
            Ok(Settings { config, root })
        }
        Err(config::ConfigError::NotFound) => Ok(Settings {
            config: Config::default(),
            root: Utf8PathBuf::from("."),
        }),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blueprint=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = load_settings()?;
    blueprint::check_provider(settings.config.provider())?;

    let url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| settings.config.database_url.clone())
        .ok_or("no database URL: pass --database-url, set DATABASE_URL or add database_url to the config")?;
    tracing::info!(database = %mask_password(&url), "connecting");

    let mut pg = deadpool_postgres::Config::new();
    pg.url = Some(url);
    let pool = pg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    let reconciler = Reconciler::new(pool.get().await?);

    match cli.command {
        Command::Read { filters } => {
            let filters: Vec<&str> = filters.iter().map(String::as_str).collect();
            let tables = reconciler.read_state(&filters).await?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Command::Plan { file } => {
            let targets = load_blueprints(&settings, file)?;
            let plan = reconciler.compare_state(&targets).await?;
            print_plan(&plan);
        }
        Command::Apply { file, force } => {
            let targets = load_blueprints(&settings, file)?;
            apply(&reconciler, &settings.config, &targets, force).await?;
        }
        Command::Drop { table } => {
            reconciler.drop_table(&table).await?;
            println!("{} {}", "dropped".red(), table.bold());
        }
    }
    Ok(())
}

async fn apply<C: Connection>(
    reconciler: &Reconciler<C>,
    config: &Config,
    targets: &[Table],
    force: bool,
) -> CliResult<()> {
    let plan = reconciler.compare_state(targets).await?;
    print_plan(&plan);
    let Some(risk) = plan.highest_risk() else {
        return Ok(());
    };

    if let Some(max) = &config.max_risk {
        let max: Risk = max.parse()?;
        if risk > max && !force {
            return Err(format!(
                "plan risk {} is above max_risk {}, rerun with --force to apply it",
                risk, max
            )
            .into());
        }
    }

    let results = plan.execute(reconciler.connection()).await?;
    print_results(&results);
    Ok(())
}

fn load_blueprints(settings: &Settings, file: Option<Utf8PathBuf>) -> CliResult<Vec<Table>> {
    let path = file.unwrap_or_else(|| settings.root.join(settings.config.blueprints()));
    let content =
        std::fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {}", path, e))?;
    let tables: Vec<Table> =
        serde_json::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path, e))?;
    tracing::debug!(path = %path, tables = tables.len(), "loaded blueprints");
    Ok(tables)
}

fn paint(risk: Risk) -> String {
    match risk {
        Risk::None => risk.green().to_string(),
        Risk::Low => risk.cyan().to_string(),
        Risk::Medium => risk.yellow().to_string(),
        Risk::High => risk.red().to_string(),
        Risk::Impossible => risk.red().bold().to_string(),
    }
}

fn print_plan(plan: &MigrationPlan) {
    if plan.is_empty() {
        println!("{}", "Database is up to date.".green());
        return;
    }
    for step in plan.steps() {
        println!(
            "{} {} {}",
            format!("[phase {}]", step.phase).dimmed(),
            paint(step.risk),
            step.description.bold()
        );
        for line in step.query().lines() {
            println!("    {}", line.dimmed());
        }
    }
    if let Some(risk) = plan.highest_risk() {
        println!();
        println!("{} step(s), highest risk {}", plan.len(), paint(risk));
    }
}

fn print_results(results: &[StepResult]) {
    for result in results {
        println!(
            "{} {} {}",
            format!("#{}", result.order + 1).dimmed(),
            paint(result.risk),
            format!("{:.1?}", result.elapsed).dimmed()
        );
    }
    println!("{} {} step(s)", "applied".green(), results.len());
}

fn mask_password(url: &str) -> String {
    // Simple masking: replace password between :// and @
    if let Some(start) = url.find("://")
        && let Some(at) = url.rfind('@')
        && at > start
        && let Some(colon) = url[start + 3..at].find(':')
    {
        let prefix = &url[..start + 3];
        let user = &url[start + 3..start + 3 + colon];
        let suffix = &url[at..];
        return format!("{}{}:***{}", prefix, user, suffix);
    }
    url.to_string()
}
