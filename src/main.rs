use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, Level};

use pgrel::ast::{check_expr, check_sql, JsonAdapter};
use pgrel::{Compiler, Config, DialectKind, Node};

/// Compile a JSON relational query document into SQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// SQL dialect to compile for (overrides the config file)
    #[arg(long, value_enum)]
    dialect: Option<DialectKind>,

    /// Inline binds as literals instead of printing placeholders
    #[arg(long)]
    substitute: bool,

    /// Parse the compiled SQL to verify its syntax
    #[arg(long)]
    check: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Query document to read (stdin when omitted)
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    config.substitute_binds |= cli.substitute;
    config.check |= cli.check;
    debug!(?config, "configuration loaded");

    let input = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read query document from stdin")?;
            buf
        }
    };

    let node = JsonAdapter::default().parse(&input)?;
    let compiler = Compiler::for_kind(config.dialect);

    let sql = if config.substitute_binds {
        let sql = compiler.to_sql_substituted(&node)?;
        println!("{}", sql);
        sql
    } else {
        let compiled = compiler.compile(&node)?;
        println!("{}", compiled.sql);
        let binds = compiled.bound_values()?;
        println!("{}", serde_json::to_string_pretty(&binds)?);
        compiled.sql
    };

    if config.check {
        let checked = match node {
            Node::SelectStatement(_) => check_sql(&sql, config.dialect),
            _ => check_expr(&sql, config.dialect),
        };
        checked.context("Compiled SQL failed the syntax check")?;
        eprintln!("syntax OK");
    }

    Ok(())
}
