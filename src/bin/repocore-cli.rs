//! Thin non-interactive demo binary over `repocore::RepoFacade`: a clap
//! derive CLI that opens a repository, runs one query (log, status, or
//! branches), prints it, and exits. There is no interactive UI loop in
//! this crate.

use clap::{Parser, Subcommand};
use repocore::RepoFacade;

#[derive(Parser)]
#[command(name = "repocore-cli")]
#[command(about = "Inspect a repository through the repocore library")]
#[command(version)]
struct Cli {
    /// Repository path (defaults to the current directory).
    #[arg(short, long, default_value = ".")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the commit log.
    Log {
        #[arg(short = 'n', long, default_value = "20")]
        max_count: usize,
    },
    /// Print working-tree status.
    Status,
    /// List local and remote branches.
    Branches,
    /// Rewrites `pick <short>` lines in a rebase todo file to `<verb> <short>`.
    ///
    /// Invoked as `GIT_SEQUENCE_EDITOR` during `reword`/`squash`; not meant
    /// to be run by hand.
    #[command(hide = true)]
    RebaseTodo {
        /// Path to the rebase todo file git passes as `$1`.
        todo_path: String,
        /// `reword` or `squash`.
        verb: String,
        /// Short commit hashes whose `pick` line should be rewritten.
        shorts: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::RebaseTodo { todo_path, verb, shorts } = &cli.command {
        repocore::commit_ops::rewrite_rebase_todo(std::path::Path::new(todo_path), verb, shorts)?;
        return Ok(());
    }

    let mut facade = RepoFacade::open(&cli.path)?;

    match cli.command {
        Commands::Log { max_count } => print_log(&mut facade, max_count)?,
        Commands::Status => print_status(&facade)?,
        Commands::Branches => print_branches(&mut facade)?,
        Commands::RebaseTodo { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn print_log(facade: &mut RepoFacade, max_count: usize) -> anyhow::Result<()> {
    facade.create_commit_walker()?;
    let mut remaining = max_count;
    while remaining > 0 {
        let batch = facade.load_more_commits(remaining.min(500))?;
        if batch.is_empty() {
            break;
        }
        for commit in &batch {
            println!(
                "\x1b[33m{}\x1b[0m {} \x1b[90m— {} ({})\x1b[0m",
                commit.short_hash(),
                commit.message,
                commit.author_name,
                commit.formatted_date(),
            );
        }
        remaining -= batch.len();
    }
    Ok(())
}

fn print_status(facade: &RepoFacade) -> anyhow::Result<()> {
    for entry in facade.status()? {
        println!("{} {}", entry.code_str(), entry.path);
    }
    Ok(())
}

fn print_branches(facade: &mut RepoFacade) -> anyhow::Result<()> {
    let metadata = facade.load_metadata()?;
    for branch in metadata.branches {
        let marker = if branch.is_current { "*" } else { " " };
        println!("{marker} {} {}", branch.short_hash, branch.name);
    }
    Ok(())
}
