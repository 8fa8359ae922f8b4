//! A tiny REPL for poking at a `graphene` database by hand. Not part of the
//! core engine — a demo crate for manual exploration, not exercised by the
//! library's test suite beyond a smoke test of argument parsing.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::Parser;
use graphene::{BackendConfig, Graph, PropertyMap};

#[derive(Parser, Debug)]
#[command(name = "graphene-cli", about = "Interactive Cypher REPL over a graphene database")]
struct Args {
    /// Path to a database file. Omit for an in-memory, throwaway database.
    #[arg(long)]
    path: Option<std::path::PathBuf>,

    /// Open the database read-only.
    #[arg(long)]
    read_only: bool,

    /// Run a single statement and exit instead of starting the REPL.
    #[arg(long)]
    eval: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.path {
        Some(path) => BackendConfig { path: Some(path.clone()), read_only: args.read_only, ..BackendConfig::default() },
        None => BackendConfig::memory(),
    };

    let graph = Graph::open_sqlite(config)?;

    if let Some(stmt) = args.eval {
        run_statement(&graph, &stmt);
        return Ok(());
    }

    println!("graphene-cli — type Cypher statements, `:quit` to exit");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("graphene> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":q" {
            break;
        }
        run_statement(&graph, line);
    }
    Ok(())
}

fn run_statement(graph: &Graph<graphene::storage::SqliteBackend>, stmt: &str) {
    let is_write = {
        let upper = stmt.trim_start().to_uppercase();
        upper.starts_with("CREATE")
            || upper.starts_with("MERGE")
            || upper.starts_with("SET")
            || upper.starts_with("DELETE")
            || upper.starts_with("REMOVE")
            || upper.starts_with("FOREACH")
    };
    let result = if is_write {
        graph.mutate(stmt, PropertyMap::new())
    } else {
        graph.execute(stmt, PropertyMap::new())
    };
    match result {
        Ok(rows) => {
            for row in &rows.rows {
                println!("{row:?}");
            }
            println!("({} row(s))", rows.rows.len());
        }
        Err(e) => eprintln!("error: {e}"),
    }
}
