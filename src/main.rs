use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use nature_register::{
    load_and_clean, run_batch, BatchOptions, EntityDescription, ExistingLinks, JsonLinesSink,
    LinkStore, NatureAreaAssembler, ReferenceData,
};

#[derive(Parser)]
#[command(name = "nature-register")]
#[command(about = "Reconcile the protected-area register with a knowledge base", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build entity descriptions for every register record
    Import {
        /// Register export (CSV)
        #[arg(long)]
        register: PathBuf,

        /// Directory with the mapping/vocabulary JSON files
        #[arg(long)]
        data_dir: PathBuf,

        /// Link database; read before the run, updated after
        #[arg(long)]
        links: Option<PathBuf>,

        /// Write descriptions as JSON lines (stdout count only when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Nature ids to build but not upload (repeatable)
        #[arg(long = "skip")]
        skip: Vec<String>,
    },

    /// Load a {nature_id: entity_id} JSON file into the link database
    Links {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        import: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            register,
            data_dir,
            links,
            output,
            offset,
            limit,
            skip,
        } => {
            let options = BatchOptions {
                offset,
                limit,
                skip_upload: skip.into_iter().collect::<HashSet<_>>(),
            };
            run_import(&register, &data_dir, links.as_deref(), output.as_deref(), &options)
        }
        Commands::Links { db, import } => run_links_import(&db, &import),
    }
}

fn run_import(
    register: &Path,
    data_dir: &Path,
    links_db: Option<&Path>,
    output: Option<&Path>,
    options: &BatchOptions,
) -> Result<()> {
    println!("🌲 Nature Register Import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Reference data
    println!("\n📚 Loading reference data...");
    let data = ReferenceData::from_dir(data_dir)?;
    println!("✓ {} properties", data.property_count());

    // 2. Register
    println!("\n📂 Loading register...");
    let records = load_and_clean(register)?;
    println!("✓ {} records after cleanup", records.len());

    // 3. Existing links
    let store = match links_db {
        Some(path) => Some(LinkStore::open(path)?),
        None => None,
    };
    let existing = match &store {
        Some(store) => store.existing_links()?,
        None => ExistingLinks::new(),
    };
    println!("✓ {} existing links", existing.len());

    // 4. Batch
    println!("\n🔧 Building entities...");
    let assembler = NatureAreaAssembler::new(&data, &existing);
    let report = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut sink = JsonLinesSink::new(BufWriter::new(file));
            let report = run_batch(&records, &assembler, options, &mut sink)?;
            sink.flush()?;
            println!("✓ Wrote {} descriptions to {:?}", sink.written(), path);
            report
        }
        None => {
            let mut built: Vec<EntityDescription> = Vec::new();
            let report = run_batch(&records, &assembler, options, &mut built)?;
            println!("✓ Built {} descriptions", built.len());
            report
        }
    };

    // 5. Persist confirmed links + diagnostics
    if let Some(store) = &store {
        println!("\n💾 Updating link database...");
        let stored = store.record_batch(&report)?;
        println!("✓ {} new links, {} diagnostics logged", stored, report.diagnostics.len());
    }

    // 6. Summary
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {}", report.summary.summary());
    for name in report.unmatched_names() {
        println!("   ⚠️  no match: {}", name);
    }
    for diagnostic in report.failures().into_iter().chain(report.unsupported_values()) {
        println!("   ❌ {} ({}): {:?}", diagnostic.name, diagnostic.nature_id, diagnostic.kind);
    }

    Ok(())
}

fn run_links_import(db: &Path, import: &Path) -> Result<()> {
    println!("🔗 Importing links...");
    let mut store = LinkStore::open(db)?;
    let count = store.import_links(import)?;
    println!("✓ Imported {} links ({} total)", count, store.link_count()?);
    Ok(())
}
