//! rset CLI - deferred resultsets from the command line

use clap::{Args, Parser, Subcommand};
use rset::{Config, Database, ResultSet, Value};
use rsql::DialectKind;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rset")]
#[command(about = "Build, inspect and run resultset queries", long_about = None)]
struct Cli {
    /// Config file (relative paths inside it resolve against its directory)
    #[arg(short, long, default_value = "rset.yaml", global = true)]
    config: PathBuf,

    /// Log at DEBUG, including every compiled statement
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create config, schema and sample data
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List result sources, their columns and relationships
    Sources,

    /// Print the compiled SQL and binds without running anything
    Sql {
        #[command(flatten)]
        query: QueryArgs,

        /// Print the row count query instead
        #[arg(long)]
        count: bool,
    },

    /// Run a query and print the rows as JSON
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Also print paging information
        #[arg(long)]
        pager: bool,
    },

    /// Count the rows a query matches
    Count {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Delete the rows a query matches
    Delete {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Result source name, e.g. Album
    source: String,

    /// Condition, e.g. "year > ? AND artist.name = 'Blur'"
    #[arg(short = 'w', long = "where")]
    condition: Option<String>,

    /// Value for the next `?` in the condition
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Ordering, e.g. "year DESC, title"
    #[arg(short, long)]
    order_by: Option<String>,

    /// Relationship to join (repeatable)
    #[arg(short, long)]
    join: Vec<String>,

    /// Comma separated projection
    #[arg(long)]
    columns: Option<String>,

    #[arg(long)]
    rows: Option<u64>,

    #[arg(long)]
    page: Option<u64>,

    #[arg(long)]
    offset: Option<u64>,

    #[arg(long)]
    distinct: bool,

    /// Override the configured dialect
    #[arg(long)]
    dialect: Option<DialectKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { path } => init_database(&path).await,
        Commands::Sources => list_sources(&cli.config).await,
        Commands::Sql { query, count } => print_sql(&cli.config, &query, count).await,
        Commands::Search { query, pager } => search(&cli.config, &query, pager).await,
        Commands::Count { query } => count(&cli.config, &query).await,
        Commands::Delete { query } => delete(&cli.config, &query).await,
    }
}

async fn open(config_path: &Path, dialect: Option<DialectKind>) -> anyhow::Result<Database> {
    let mut config = Config::load(config_path)?;
    if let Some(dialect) = dialect {
        config.dialect = dialect;
    }
    Ok(Database::open(config).await?)
}

/// Apply the command line options to a fresh resultset
fn build(db: &Database, args: &QueryArgs) -> anyhow::Result<ResultSet> {
    let mut rs = db.resultset(&args.source)?;

    for rel in &args.join {
        rs = rs.join(rel.as_str());
    }
    if let Some(condition) = &args.condition {
        let params: Vec<Value> = args.params.iter().map(|p| parse_param(p)).collect();
        rs = rs.search_str(condition, &params)?;
    } else if !args.params.is_empty() {
        anyhow::bail!("--param given without --where");
    }
    if let Some(order) = &args.order_by {
        rs = rs.order_by(rsql::parse_order_by(order)?);
    }
    if let Some(columns) = &args.columns {
        let columns = rsql::parse_columns(columns)?;
        rs = rs.columns(columns.iter().map(|c| c.output_name()));
    }
    if let Some(rows) = args.rows {
        rs = rs.rows(rows);
    }
    if let Some(page) = args.page {
        rs = rs.page(page);
    }
    if let Some(offset) = args.offset {
        rs = rs.offset(offset);
    }
    if args.distinct {
        rs = rs.distinct(true);
    }
    Ok(rs)
}

/// Read a `--param` value as the narrowest scalar it spells
fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::String(raw.to_string())
    }
}

fn report(err: &rset::Error) {
    if let Some(hint) = err.suggestion() {
        eprintln!("hint: {}", hint);
    }
}

async fn init_database(path: &Path) -> anyhow::Result<()> {
    println!("Initializing rset database at {:?}...", path);
    let db = Database::init(path).await?;

    println!("Database initialized successfully!");
    println!();
    println!("Directory structure:");
    println!("  rset.yaml  - Configuration");
    println!("  schema/    - One <Source>.yaml per result source");
    println!("  data/      - One <table>.yaml per table");
    println!();
    println!("Sources: {}", db.sources().iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", "));
    println!();
    println!("Get started:");
    println!("  rset sql Album --where \"year > ?\" --param 1993 --join artist");
    println!("  rset search Album --order-by \"year DESC\" --rows 2 --page 1 --pager");
    println!("  rset count Track --where \"album.title = 'Parklife'\" --join album");

    Ok(())
}

async fn list_sources(config: &Path) -> anyhow::Result<()> {
    let db = open(config, None).await?;
    let sources = db.sources();
    if sources.is_empty() {
        println!("No result sources found.");
        return Ok(());
    }

    for source in sources {
        println!("{} (table {}, primary key {})", source.name, source.table_name(), source.primary_key.join(", "));
        for column in &source.columns {
            let mut flags = Vec::new();
            if column.required {
                flags.push("required".to_string());
            }
            if column.auto_increment {
                flags.push("auto_increment".to_string());
            }
            if let Some(default) = &column.default {
                flags.push(format!("default {}", default));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!("  {}: {}{}", column.name, column.column_type.name(), flags);
        }
        for rel in &source.relationships {
            println!("  -> {} ({:?} {} via {})", rel.name, rel.kind, rel.source, rel.foreign_key);
        }
        println!();
    }
    Ok(())
}

async fn print_sql(config: &Path, args: &QueryArgs, count: bool) -> anyhow::Result<()> {
    let db = open(config, args.dialect).await?;
    let rs = build(&db, args)?;
    let query = if count { rs.as_count_query() } else { rs.as_query() };
    let query = query.inspect_err(report)?;

    println!("{}", query.sql);
    if !query.binds.is_empty() {
        let binds: Vec<Value> = query.binds.into_iter().map(Value::from).collect();
        println!("binds: {}", serde_json::to_string(&binds)?);
    }
    Ok(())
}

async fn search(config: &Path, args: &QueryArgs, with_pager: bool) -> anyhow::Result<()> {
    let db = open(config, args.dialect).await?;
    let rs = build(&db, args)?;

    let mut cursor = rs.cursor();
    let mut shown = 0;
    while let Some(row) = cursor.next().await.inspect_err(report)? {
        println!("{}", serde_json::to_string(&row)?);
        shown += 1;
    }
    println!("({} row(s))", shown);

    if with_pager {
        let pager = rs.pager().await?;
        println!(
            "page {} of {} (entries {}-{} of {})",
            pager.current_page,
            pager.last_page(),
            pager.first(),
            pager.last(),
            pager.total_entries
        );
    }
    Ok(())
}

async fn count(config: &Path, args: &QueryArgs) -> anyhow::Result<()> {
    let db = open(config, args.dialect).await?;
    let rs = build(&db, args)?;
    println!("{}", rs.count().await.inspect_err(report)?);
    Ok(())
}

async fn delete(config: &Path, args: &QueryArgs) -> anyhow::Result<()> {
    let db = open(config, args.dialect).await?;
    let rs = build(&db, args)?;
    let deleted = rs.delete().await.inspect_err(report)?;
    db.flush().await?;
    println!("({} row(s) deleted)", deleted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_flags_parse() {
        let cli = Cli::try_parse_from([
            "rset", "-c", "db/rset.yaml", "sql", "Album", "-w", "year > ?", "-p", "1993", "-j", "artist", "--count",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("db/rset.yaml"));
        match cli.command {
            Commands::Sql { query, count } => {
                assert!(count);
                assert_eq!(query.source, "Album");
                assert_eq!(query.condition.as_deref(), Some("year > ?"));
                assert_eq!(query.params, vec!["1993"]);
                assert_eq!(query.join, vec!["artist"]);
            }
            _ => panic!("expected sql"),
        }
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("NULL"), Value::Null);
        assert_eq!(parse_param("true"), Value::Bool(true));
        assert_eq!(parse_param("1993"), Value::Int(1993));
        assert_eq!(parse_param("2.5"), Value::Float(2.5));
        assert_eq!(parse_param("Blur"), Value::from("Blur"));
    }
}
