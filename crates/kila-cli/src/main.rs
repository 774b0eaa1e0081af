//! `kila`: inspect a kila content database.
//!
//! Usage:
//!   kila sections                 # page regions
//!   kila sections camp            # sections in one region
//!   kila blocks Anreise           # a section's blocks, packed into rows
//!   kila history Anreise --diff   # history entries with line diffs
//!   kila history --user <uuid>    # everything one user changed
//!   kila diff before.json after.json

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use kila_content::diff::{diff_lines, render};
use kila_content::layout::pack_rows;
use kila_content::store::{BlockStore, SqliteStore};
use kila_content::{HistoryView, KilaConfig, list_sections, section_history, user_history};
use kila_types::block::visible_text;
use kila_types::{BlockType, ContentBlock, ContentSection, GRID_COLUMNS, SectionId, UserId};

#[derive(Parser, Debug)]
#[command(name = "kila")]
#[command(about = "Inspect a kila content database")]
struct Cli {
    /// Config file (default: $KILA_CONFIG, ./kila.toml, ~/.config/kila/kila.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List page regions, or the sections of one region
    Sections { page: Option<String> },

    /// Show a section's blocks packed into grid rows
    Blocks {
        /// Title, title prefix, or id prefix
        section: String,
    },

    /// Show history for a section or a user, newest first
    History {
        /// Title, title prefix, or id prefix
        #[arg(required_unless_present = "user")]
        section: Option<String>,

        /// Editor id
        #[arg(long, conflicts_with = "section")]
        user: Option<String>,

        /// Print the line diff of every entry
        #[arg(long)]
        diff: bool,
    },

    /// Line diff of two text files
    Diff { before: PathBuf, after: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match KilaConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: KilaConfig) -> Result<()> {
    if let Command::Diff { before, after } = &cli.command {
        return diff_files(before, after);
    }

    let database = cli.database.unwrap_or(config.database);
    tracing::debug!(path = %database.display(), "opening database");
    let store = SqliteStore::open(&database, &config.public_base_url)
        .with_context(|| format!("opening {}", database.display()))?;

    match cli.command {
        Command::Sections { page: None } => {
            for region in store.list_page_regions()? {
                println!("{region}");
            }
        }
        Command::Sections { page: Some(page) } => {
            for section in list_sections(&store, &page).await? {
                println!("{}", section_line(&section));
            }
        }
        Command::Blocks { section } => {
            let section = find_section(&store, &section).await?;
            let blocks = store.list_blocks(section.id).await?;
            println!("{}", section_line(&section));
            print!("{}", render_rows(&blocks));
        }
        Command::History { section, user, diff } => {
            let views = match (section, user) {
                (_, Some(user)) => {
                    let user = UserId::parse(&user).with_context(|| format!("bad user id '{user}'"))?;
                    user_history(&store, user).await?
                }
                (Some(query), None) => {
                    let section = find_section(&store, &query).await?;
                    section_history(&store, section.id).await?
                }
                (None, None) => anyhow::bail!("give a section or --user"),
            };
            for view in &views {
                print_history(view, diff);
            }
        }
        Command::Diff { .. } => {}
    }
    Ok(())
}

fn diff_files(before: &Path, after: &Path) -> Result<()> {
    let a = std::fs::read_to_string(before).with_context(|| format!("reading {}", before.display()))?;
    let b = std::fs::read_to_string(after).with_context(|| format!("reading {}", after.display()))?;
    println!("{}", render(&diff_lines(&a, &b)));
    Ok(())
}

/// Resolve a section query against every section in the database.
async fn find_section(store: &SqliteStore, query: &str) -> Result<ContentSection> {
    let mut sections = Vec::new();
    for region in store.list_page_regions()? {
        sections.extend(list_sections(store, &region).await?);
    }
    let id: SectionId =
        kila_types::resolve_section_prefix(sections.iter().map(|s| (s.id, s.title.as_str())), query)?;
    sections
        .into_iter()
        .find(|s| s.id == id)
        .with_context(|| format!("section {id} vanished"))
}

fn section_line(section: &ContentSection) -> String {
    let mut line = format!("{}  {}  ({})", section.id.short(), section.title, section.owner_name);
    if section.show_publish_date
        && let Some(date) = section.publish_date
    {
        line.push_str(&format!("  {date}"));
    }
    line
}

fn render_rows(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for (n, row) in pack_rows(blocks).iter().enumerate() {
        out.push_str(&format!("row {} [{}/{}]\n", n + 1, row.width, GRID_COLUMNS));
        for block in &blocks[row.start..row.end] {
            out.push_str(&format!(
                "  {:>2}. {:<8} w={:<2} {}\n",
                block.order_index,
                block.block_type.as_str(),
                block.width,
                summary(block)
            ));
        }
    }
    out
}

fn summary(block: &ContentBlock) -> String {
    let text = match block.block_type {
        BlockType::Heading | BlockType::Text => visible_text(block.content.as_deref().unwrap_or("")),
        BlockType::Image => block.image_url.clone().unwrap_or_else(|| "(no image)".into()),
        BlockType::Gallery => format!("{} images", block.gallery_images().len()),
        BlockType::Link | BlockType::File => format!(
            "{} -> {}",
            block.content.as_deref().unwrap_or(""),
            block.image_url.as_deref().unwrap_or("")
        ),
    };
    truncate(&text, 60)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn print_history(view: &HistoryView, with_diff: bool) {
    println!(
        "{}  {}  +{} -{}",
        view.entry.created_at.format("%Y-%m-%d %H:%M"),
        view.entry.editor_name,
        view.added(),
        view.removed()
    );
    if with_diff {
        for line in view.changes() {
            println!("  {line}");
        }
    }
}
