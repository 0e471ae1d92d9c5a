//! This program aggregates the Google Books Ngram dataset, whose general
//! documentation you can find at
//! <http://storage.googleapis.com/books/ngrams/books/datasetsv3.html>.
//!
//! Every n-gram of a sorted data file is summarized into one document that
//! tells around which publication year the n-gram was most used, and how
//! widely its usage is spread across time.

mod config;
mod emit;
mod file;
mod group;
mod languages;
mod ngram;
mod progress;
mod search;
mod stats;
mod totals;

use crate::{
    config::Config,
    emit::{BackgroundEmitter, DocumentWriter, OutputFormat},
    file::DoneList,
    group::GroupBuilder,
    progress::{ProgressConfig, ProgressReport, Work},
    totals::NormalizationTable,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::{path::PathBuf, pin::Pin, sync::Arc};
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
use tokio::{fs::File, io::AsyncWrite};

/// Aggregate yearly n-gram frequencies into per-n-gram usage statistics
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Operations supported by this program
#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize sorted yearly n-gram records into one document per n-gram
    Index(IndexArgs),

    /// Look up previously indexed documents by term
    Search(SearchArgs),

    /// List the URLs of the Google Books Ngram data files
    Urls(UrlsArgs),
}

/// Range of publication years to be studied
#[derive(clap::Args, Clone, Copy, Debug)]
struct YearArgs {
    /// Earliest accepted book publication year
    ///
    /// Records from older books are silently ignored.
    #[arg(short = 'y', long, default_value = "1800")]
    first_year: Year,

    /// Latest accepted book publication year
    #[arg(short = 'Y', long, default_value = "2008")]
    last_year: Year,
}

/// Arguments of the `index` subcommand
#[derive(clap::Args, Debug)]
struct IndexArgs {
    /// Data files to be processed, in order
    ///
    /// Can be local files or http(s) URLs. Files whose name ends with ".gz"
    /// are decompressed on the fly. Reads standard input if no file is
    /// specified, or when "-" is specified.
    ///
    /// Each input must be sorted by n-gram: records of a given n-gram are only
    /// merged together when they are consecutive.
    inputs: Vec<Box<str>>,

    #[command(flatten)]
    years: YearArgs,

    /// Corpus-wide yearly term frequency totals
    ///
    /// Whitespace-separated "year,total" records. Google's 4-column
    /// "year,match_count,page_count,volume_count" totalcounts records are
    /// also accepted, and then provide document frequency totals as well.
    #[arg(short = 't', long)]
    tf_totals: PathBuf,

    /// Corpus-wide yearly document frequency totals
    ///
    /// Same format as --tf-totals. If unspecified, document frequency totals
    /// are taken from the volume_count column of --tf-totals.
    #[arg(short = 'd', long)]
    df_totals: Option<PathBuf>,

    /// Where documents should be written (default: standard output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output document format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Keep the raw yearly counts of each n-gram in output documents
    ///
    /// This is needed for timeline display in the `search` subcommand, but
    /// makes the output a lot larger.
    #[arg(long, default_value_t = false)]
    store_years: bool,

    /// List of inputs that have already been processed
    ///
    /// Inputs from this list are skipped, and inputs are added to it once
    /// they have been fully processed. This allows resuming an interrupted
    /// run by appending to the previous output.
    #[arg(long)]
    done_list: Option<PathBuf>,

    /// Don't display progress bars
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}
//
impl IndexArgs {
    /// Check index arguments for basic sanity
    fn check(&self) -> Result<()> {
        if let Some(output) = &self.output {
            anyhow::ensure!(
                self.inputs
                    .iter()
                    .all(|input| std::path::Path::new(&**input) != output.as_path()),
                "output file {} is also an input",
                output.display()
            );
        }
        Ok(())
    }
}

/// Arguments of the `search` subcommand
#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Documents produced by the `index` subcommand, in JSON format
    #[arg(short, long)]
    index: PathBuf,

    /// Position of the n-gram token that queries are matched against
    #[arg(long, default_value = "0")]
    field: usize,

    /// Display the yearly relative frequency of each match
    ///
    /// Requires --tf-totals, and documents indexed with --store-years.
    #[arg(long, default_value_t = false)]
    timeline: bool,

    #[command(flatten)]
    years: YearArgs,

    /// Corpus-wide yearly term frequency totals, as in `index`
    #[arg(short = 't', long)]
    tf_totals: Option<PathBuf>,

    /// Corpus-wide yearly document frequency totals, as in `index`
    #[arg(short = 'd', long)]
    df_totals: Option<PathBuf>,
}

/// Arguments of the `urls` subcommand
#[derive(clap::Args, Debug)]
struct UrlsArgs {
    /// Short name of the Google Books Ngram language to be used, e.g.
    /// "eng-fiction"
    ///
    /// Will interactively prompt for a supported language if not specified.
    #[arg(short, long, default_value = None)]
    language: Option<Box<str>>,

    /// Number of words per n-gram
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=5))]
    ngram: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments and dispatch to the requested operation
    match Args::parse().command {
        Command::Index(args) => {
            args.check()?;
            index(Config::new(args)?).await
        }
        Command::Search(args) => search(args).await,
        Command::Urls(args) => urls(args),
    }
}

/// Summarize the configured inputs into documents
async fn index(config: Arc<Config>) -> Result<()> {
    // Load the normalization totals before anything else, so that bad totals
    // are reported before any input is read
    let totals = Arc::new(
        NormalizationTable::load(config.years, &config.tf_totals, config.df_totals.as_deref())
            .await?,
    );

    // Set up progress reporting
    let report = if config.quiet {
        ProgressReport::hidden()
    } else {
        ProgressReport::new()
    };

    // Start the document writer
    let output: Pin<Box<dyn AsyncWrite + Send>> = match &config.output {
        Some(path) => Box::pin(
            File::options()
                .create(true)
                .append(config.done_list.is_some())
                .write(true)
                .truncate(config.done_list.is_none())
                .open(path)
                .await
                .with_context(|| format!("opening output file {}", path.display()))?,
        ),
        None => Box::pin(tokio::io::stdout()),
    };
    let emitted = report.add("Emitting documents", ProgressConfig::new(Work::Unbounded));
    let mut emitter =
        BackgroundEmitter::spawn(DocumentWriter::new(output, config.format), emitted.clone());

    // Aggregate the inputs
    let mut done_list = match &config.done_list {
        Some(path) => Some(DoneList::load(path).await?),
        None => None,
    };
    let mut builder = GroupBuilder::new(config.clone(), totals);
    let client = reqwest::Client::new();
    let processed = file::process_inputs(
        &config,
        &client,
        &mut builder,
        &mut emitter,
        done_list.as_mut(),
        &report,
    )
    .await;

    // Wait for the writer to be done, reporting its errors first as they are
    // the likely root cause of any processing error
    let written = emitter.finish().await;
    emitted.finish();
    log::info!("Emitted {} documents", emitted.position());
    written.and(processed)
}

/// Answer term queries from standard input
async fn search(args: SearchArgs) -> Result<()> {
    let years = config::YearRange::new(args.years.first_year, args.years.last_year)?;
    let totals = match &args.tf_totals {
        Some(tf_totals) => {
            Some(NormalizationTable::load(years, tf_totals, args.df_totals.as_deref()).await?)
        }
        None => None,
    };
    anyhow::ensure!(
        !args.timeline || totals.is_some(),
        "timeline display requires yearly totals (--tf-totals)"
    );
    let documents = search::load_documents(&args.index).await?;
    log::info!(
        "Loaded {} documents from {}",
        documents.len(),
        args.index.display()
    );
    let timeline = if args.timeline { totals.as_ref() } else { None };
    search::answer_queries(
        &documents,
        args.field,
        timeline,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
}

/// Print the URLs of the dataset files for one language
fn urls(args: UrlsArgs) -> Result<()> {
    let language = languages::pick(args.language.as_deref())?;
    for url in language.dataset_urls(args.ngram) {
        println!("{url}");
    }
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Year of Gregorian Calendar
pub type Year = i16;

/// Number of occurences of an n-gram over a single year
///
/// Some n-grams (like "the" in English) occur billions of times per year,
/// which is too much for u32.
pub type TermFrequency = u64;

/// Number of books with occurences of an n-gram over a single year
pub type DocumentFrequency = u64;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

/// Use jemalloc for improved multi-thread performance
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
