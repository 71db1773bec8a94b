//! loopy-rules
//!
//! Generate, merge and verify loop-puzzle rule collections.

use clap::{Parser, Subcommand, ValueEnum};
use loopy_core::binary::BinaryFeatureTable;
use loopy_core::{
    generate_enumerated_rules, generate_implied_rules, standard, BinaryRuleCollection, EmbeddingCache,
    GenerationConfig, PatternBoard,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "loopy-rules", version, about = "Mine and maintain loop-puzzle deduction rules")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a generation pipeline on one board
    Generate {
        /// Board descriptor string, or one of: square, domino, 2x2, corner
        #[arg(long)]
        board: String,
        #[arg(long, value_enum, default_value_t = Mode::Enumerate)]
        mode: Mode,
        /// Mine rules that assume a unique solution
        #[arg(long)]
        highlander: bool,
        /// Generation settings as JSON; flags override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Rules already known; new rules they imply are skipped
        #[arg(long)]
        prior: Option<PathBuf>,
        #[arg(long)]
        max_fixed_edges: Option<usize>,
        #[arg(long)]
        max_rules: Option<usize>,
        /// Output file (stdout if absent)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Union of two collections, skipping rules the first already implies
    Merge {
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Re-verify every rule by exhaustive solving
    Check { collection: PathBuf },
    /// Print the shape of a board
    Describe { board: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Basic rules of every small input
    Enumerate,
    /// Stem-base implications of each face-value assignment
    Implied,
}

fn parse_board(s: &str) -> loopy_core::Result<PatternBoard> {
    match s {
        "square" => PatternBoard::new(standard::square()),
        "domino" => PatternBoard::new(standard::domino()),
        "2x2" => PatternBoard::new(standard::square_2x2()),
        "corner" => PatternBoard::new(standard::corner_square()),
        _ => PatternBoard::from_descriptor_string(s),
    }
}

fn load_collection(path: &Path, known: &[Arc<PatternBoard>]) -> loopy_core::Result<BinaryRuleCollection> {
    let text = std::fs::read_to_string(path)?;
    let json = serde_json::from_str(&text)?;
    BinaryRuleCollection::deserialize_with_boards(&json, known)
}

fn write_collection(collection: &BinaryRuleCollection, out: Option<&Path>) -> loopy_core::Result<()> {
    let text = collection.to_json_string()?;
    match out {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), rules = collection.size(), "wrote collection");
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Generate {
            board,
            mode,
            highlander,
            config,
            prior,
            max_fixed_edges,
            max_rules,
            out,
        } => {
            let board = Arc::new(parse_board(&board)?);
            let mut config = match config {
                Some(path) => GenerationConfig::from_json_file(path)?,
                None => GenerationConfig::default(),
            };
            config.highlander |= highlander;
            if let Some(n) = max_fixed_edges {
                config.max_fixed_edges = n;
            }
            if max_rules.is_some() {
                config.max_rules = max_rules;
            }
            let prior = match prior {
                Some(path) => load_collection(&path, std::slice::from_ref(&board))?,
                None => BinaryRuleCollection::empty(config.highlander),
            };

            let mut cache = EmbeddingCache::new();
            let found = match mode {
                Mode::Enumerate => generate_enumerated_rules(&board, &prior, &config, &mut cache)?,
                Mode::Implied => generate_implied_rules(&board, &prior, &config, &mut cache)?,
            };
            write_collection(&found, out.as_deref())?;
            Ok(true)
        }
        Command::Merge { first, second, out } => {
            let first = load_collection(&first, &[])?;
            let second = load_collection(&second, first.boards())?;
            let mut cache = EmbeddingCache::new();
            let merged = first.with_collection_nonredundant(&second, &mut cache)?;
            tracing::info!(
                first = first.size(),
                second = second.size(),
                merged = merged.size(),
                "merged collections"
            );
            write_collection(&merged, out.as_deref())?;
            Ok(true)
        }
        Command::Check { collection } => {
            let collection = load_collection(&collection, &[])?;
            let mut failures = 0;
            for (i, rule) in collection.rules()?.iter().enumerate() {
                if !rule.is_correct_slow() {
                    failures += 1;
                    println!("rule {} is unsound: {}", i, rule);
                }
            }
            println!("{} rules checked, {} unsound", collection.size(), failures);
            Ok(failures == 0)
        }
        Command::Describe { board } => {
            let board = parse_board(&board)?;
            let mut cache = EmbeddingCache::new();
            let exit_vertices = board.vertices.iter().filter(|v| v.is_exit).count();
            let exit_edges = board.edges.iter().filter(|e| e.is_exit).count();
            let exit_faces = board.faces.iter().filter(|f| f.is_exit).count();
            println!("{}", board.to_descriptor_string());
            println!("  Vertices:      {} ({} exit)", board.vertices.len(), exit_vertices);
            println!("  Edges:         {} ({} exit)", board.edges.len(), exit_edges);
            println!("  Sectors:       {}", board.sectors.len());
            println!("  Faces:         {} ({} exit)", board.faces.len(), exit_faces);
            println!("  Face pairs:    {}", board.face_connectivity().len());
            println!("  Automorphisms: {}", cache.get_automorphisms(&board).len());
            match BinaryFeatureTable::new(&board) {
                Ok(table) => println!("  Binary table:  {} entries", table.len()),
                Err(err) => println!("  Binary table:  {}", err),
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
