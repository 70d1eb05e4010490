use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    BudgetChanges, BudgetPeriod, CategoryKind, Engine, MigrationMode, MoneyCents, NewBudget,
    NewCategory, ObjectId, SqlStore, Transaction, TransactionDocument, TransactionQuery,
};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    settings::{Overrides, Settings},
};

mod error;
mod settings;

#[derive(Parser, Debug)]
#[command(name = "fintrack_admin")]
#[command(about = "Admin utilities for the finance tracker (migrations, imports, dashboard)")]
struct Cli {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Database connection string; overrides the config file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Log level for the tool and the engine.
    #[arg(long)]
    level: Option<String>,
    /// Timezone used for calendar months (IANA name).
    #[arg(long)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consolidate category references (dry run unless `--apply`).
    MigrateCategories(MigrateArgs),
    /// Load transactions from an exported JSON array.
    Import(ImportArgs),
    /// Balance and rolling-window totals.
    Summary(NowArgs),
    /// Income and expense per calendar month.
    Monthly(NowArgs),
    /// Expenses per category.
    Breakdown,
    /// Newest transactions with resolved categories.
    Transactions(TransactionArgs),
    Categories(Categories),
    Budgets(Budgets),
}

#[derive(Args, Debug)]
struct MigrateArgs {
    /// Perform the writes.
    #[arg(long, conflicts_with = "dry")]
    apply: bool,
    /// Only report (default).
    #[arg(long)]
    dry: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    path: PathBuf,
}

#[derive(Args, Debug)]
struct NowArgs {
    /// Reference instant (RFC 3339); defaults to the current time.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct TransactionArgs {
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long)]
    limit: Option<i64>,
}

#[derive(Args, Debug)]
struct Categories {
    #[command(subcommand)]
    command: CategoryCommand,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    List,
    Create(CategoryCreateArgs),
    Delete(CategoryDeleteArgs),
    /// Point a transaction at a category, by id or name.
    Assign(CategoryAssignArgs),
}

#[derive(Args, Debug)]
struct CategoryCreateArgs {
    #[arg(long)]
    name: String,
    /// `income` or `expense` (legacy `entrata`/`uscita` accepted).
    #[arg(long, value_parser = parse_kind)]
    kind: CategoryKind,
    #[arg(long)]
    icon: Option<String>,
    #[arg(long)]
    color: Option<String>,
}

#[derive(Args, Debug)]
struct CategoryDeleteArgs {
    id: ObjectId,
}

#[derive(Args, Debug)]
struct CategoryAssignArgs {
    transaction: ObjectId,
    /// Category id or name; omit to clear.
    category: Option<String>,
}

#[derive(Args, Debug)]
struct Budgets {
    #[command(subcommand)]
    command: BudgetCommand,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    List,
    Create(BudgetCreateArgs),
    Update(BudgetUpdateArgs),
    Delete(BudgetDeleteArgs),
}

#[derive(Args, Debug)]
struct BudgetCreateArgs {
    #[arg(long)]
    category: ObjectId,
    /// Amount in major units, e.g. `250` or `99,90`.
    #[arg(long, allow_hyphen_values = true)]
    limit: MoneyCents,
    #[arg(long, value_parser = parse_period)]
    period: Option<BudgetPeriod>,
}

#[derive(Args, Debug)]
struct BudgetUpdateArgs {
    id: ObjectId,
    #[arg(long)]
    category: Option<ObjectId>,
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<MoneyCents>,
    #[arg(long, value_parser = parse_period)]
    period: Option<BudgetPeriod>,
}

#[derive(Args, Debug)]
struct BudgetDeleteArgs {
    id: ObjectId,
}

fn parse_period(raw: &str) -> std::result::Result<BudgetPeriod, String> {
    BudgetPeriod::try_from(raw).map_err(|err| err.to_string())
}

fn parse_kind(raw: &str) -> std::result::Result<CategoryKind, String> {
    CategoryKind::try_from(raw).map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportReport {
    imported: u64,
    errors: Vec<String>,
}

async fn import(engine: &Engine, args: &ImportArgs) -> Result<ImportReport> {
    let raw = tokio::fs::read_to_string(&args.path).await?;
    let documents: Vec<serde_json::Value> = serde_json::from_str(&raw)?;

    let mut report = ImportReport::default();
    for (index, document) in documents.into_iter().enumerate() {
        let parsed = serde_json::from_value::<TransactionDocument>(document)
            .map_err(AppError::from)
            .and_then(|doc| Transaction::try_from(doc).map_err(AppError::from));
        let outcome = match parsed {
            Ok(tx) => engine.insert_transaction(tx).await.map_err(AppError::from),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(_) => report.imported += 1,
            Err(AppError::Engine(err)) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping document");
                report.errors.push(format!("document {index}: {err}"));
            }
        }
    }
    tracing::info!(
        imported = report.imported,
        skipped = report.errors.len(),
        "import finished"
    );
    Ok(report)
}

async fn run(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::MigrateCategories(args) => {
            let mode = if args.apply {
                MigrationMode::Apply
            } else {
                MigrationMode::Dry
            };
            print_json(&engine.migrate_categories(mode).await?)
        }
        Command::Import(args) => print_json(&import(engine, &args).await?),
        Command::Summary(args) => {
            print_json(&engine.summary(args.now.unwrap_or_else(Utc::now)).await?)
        }
        Command::Monthly(args) => {
            print_json(&engine.monthly_trend(args.now.unwrap_or_else(Utc::now)).await?)
        }
        Command::Breakdown => print_json(&engine.expense_breakdown().await?),
        Command::Transactions(args) => {
            let query = TransactionQuery {
                from: args.from,
                to: args.to,
                limit: args.limit,
            };
            print_json(&engine.list_transactions(&query).await?)
        }
        Command::Categories(categories) => match categories.command {
            CategoryCommand::List => print_json(&engine.list_categories().await?),
            CategoryCommand::Create(args) => {
                let created = engine
                    .create_category(NewCategory {
                        name: args.name,
                        kind: args.kind,
                        icon: args.icon,
                        color: args.color,
                    })
                    .await?;
                print_json(&created)
            }
            CategoryCommand::Delete(args) => {
                engine.delete_category(args.id).await?;
                println!("deleted {}", args.id);
                Ok(())
            }
            CategoryCommand::Assign(args) => {
                engine
                    .assign_category(args.transaction, args.category.as_deref())
                    .await?;
                println!("updated {}", args.transaction);
                Ok(())
            }
        },
        Command::Budgets(budgets) => match budgets.command {
            BudgetCommand::List => print_json(&engine.list_budgets().await?),
            BudgetCommand::Create(args) => {
                let created = engine
                    .create_budget(NewBudget {
                        category: args.category,
                        limit: args.limit,
                        period: args.period,
                    })
                    .await?;
                print_json(&created)
            }
            BudgetCommand::Update(args) => {
                let updated = engine
                    .update_budget(
                        args.id,
                        BudgetChanges {
                            category: args.category,
                            limit: args.limit,
                            period: args.period,
                        },
                    )
                    .await?;
                print_json(&updated)
            }
            BudgetCommand::Delete(args) => {
                engine.delete_budget(args.id).await?;
                println!("deleted {}", args.id);
                Ok(())
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(
        cli.config.as_deref(),
        Overrides {
            level: cli.level,
            database_url: cli.database_url,
            timezone: cli.timezone,
        },
    )?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "fintrack_admin={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let store = SqlStore::connect(settings.database.url.as_str()).await?;
    Migrator::up(store.connection(), None).await?;
    tracing::debug!(url = %settings.database.url, "database ready");

    let engine = Engine::builder()
        .store(Arc::new(store.clone()))
        .config(settings.engine)
        .build()?;

    let outcome = run(&engine, cli.command).await;
    drop(engine);
    store.close().await?;
    outcome
}
