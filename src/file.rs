//! Processing of individual data files

use crate::{
    config::Config,
    emit::Emitter,
    group::{GroupBuilder, LineOutcome, StreamSummary},
    ngram::ParseError,
    progress::{ProgressConfig, ProgressReport, ProgressTracker, Work},
    Result,
};
use anyhow::Context;
use async_compression::tokio::bufread::GzipDecoder;
use futures::{stream::Stream, TryStreamExt};
use reqwest::Response;
use std::{
    collections::HashSet,
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
};
use tokio_util::{
    bytes::Bytes,
    io::{ReaderStream, StreamReader},
};

/// Source of dataset lines
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Input {
    /// Standard input
    Stdin,

    /// Local file
    Path(PathBuf),

    /// Remote file, to be downloaded
    Url(Box<str>),
}
//
impl Input {
    /// Interpret a command-line input specification
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.into())
        } else {
            Self::Path(arg.into())
        }
    }

    /// Truth that the input is gzip-compressed, as the dataset files are
    pub fn is_gzipped(&self) -> bool {
        match self {
            Self::Stdin => false,
            Self::Path(path) => path.extension().is_some_and(|ext| ext == "gz"),
            Self::Url(url) => url.ends_with(".gz"),
        }
    }
}
//
impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("-"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Line-oriented input stream
pub type LineReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Process all configured inputs, in order
///
/// Each input is a separate stream: n-grams don't span inputs.
pub async fn process_inputs(
    config: &Config,
    client: &reqwest::Client,
    builder: &mut GroupBuilder,
    emitter: &mut impl Emitter,
    mut done_list: Option<&mut DoneList>,
    report: &ProgressReport,
) -> Result<()> {
    let inputs = report.add(
        "Processing inputs",
        ProgressConfig::new(Work::Steps(config.inputs.len())).dont_show_rate_eta(),
    );
    for input in config.inputs.iter() {
        if done_list.as_ref().is_some_and(|done| done.contains(input)) {
            log::info!("Skipping {input}, which was already processed");
            inputs.make_progress(1);
            continue;
        }

        let lines = open(input, client, report).await?;
        let summary = aggregate_stream(lines, builder, emitter)
            .await
            .with_context(|| format!("processing {input}"))?;
        log::info!("Processed {input}: {summary}");

        if let Some(done_list) = done_list.as_deref_mut() {
            done_list.record(input).await?;
        }
        inputs.make_progress(1);
    }
    Ok(())
}

/// Open an input for line-by-line reading
///
/// Gzipped inputs are transparently decompressed.
pub async fn open(
    input: &Input,
    client: &reqwest::Client,
    report: &ProgressReport,
) -> Result<LineReader> {
    let raw: Pin<Box<dyn AsyncRead + Send>> = match input {
        Input::Stdin => Box::pin(tokio::io::stdin()),
        Input::Path(path) => {
            let context = || format!("opening {}", path.display());
            let file = File::open(path).await.with_context(context)?;
            let len = file.metadata().await.with_context(context)?.len();
            let bytes = report.add(
                format!("Reading {input}"),
                ProgressConfig::new(Work::Bytes(len)),
            );
            track_bytes(ReaderStream::new(file), Some(bytes))
        }
        Input::Url(url) => {
            // Start the download
            let response = client
                .get(&**url)
                .send()
                .await
                .and_then(Response::error_for_status)
                .with_context(|| format!("initiating download of {url}"))?;
            let bytes = response.content_length().map(|len| {
                report.add(
                    format!("Downloading {input}"),
                    ProgressConfig::new(Work::Bytes(len)),
                )
            });

            // Translate reqwest errors into I/O errors
            let stream = response
                .bytes_stream()
                .map_err(|e| io::Error::new(ErrorKind::Other, e));
            track_bytes(stream, bytes)
        }
    };

    // Apply gzip decoder to compressed bytes
    let buffered = BufReader::new(raw);
    if input.is_gzipped() {
        let mut decoder = GzipDecoder::new(buffered);
        decoder.multiple_members(true);
        Ok(Box::pin(BufReader::new(decoder)))
    } else {
        Ok(Box::pin(buffered))
    }
}

/// Track how many input bytes have been read so far
fn track_bytes(
    stream: impl Stream<Item = io::Result<Bytes>> + Send + 'static,
    tracker: Option<ProgressTracker>,
) -> Pin<Box<dyn AsyncRead + Send>> {
    Box::pin(StreamReader::new(stream.inspect_ok(move |block| {
        if let Some(tracker) = &tracker {
            tracker.make_progress(block.len() as u64);
        }
    })))
}

/// Aggregate all lines from a stream, then complete the last n-gram
///
/// Malformed lines, including lines that are not valid UTF-8, are logged and
/// skipped. I/O errors abort processing, and the n-gram that was being
/// accumulated at the time is lost.
pub async fn aggregate_stream(
    mut input: impl AsyncBufRead + Unpin,
    builder: &mut GroupBuilder,
    emitter: &mut impl Emitter,
) -> Result<StreamSummary> {
    let mut summary = StreamSummary::default();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = input
            .read_until(b'\n', &mut buffer)
            .await
            .context("reading a line")?;
        if read == 0 {
            break;
        }
        summary.lines += 1;
        let raw_line = trim_line_ending(&buffer);
        let outcome = match std::str::from_utf8(raw_line) {
            Ok(line) => builder.add_line(line),
            Err(e) => LineOutcome::Rejected(ParseError::Encoding(e)),
        };
        match outcome {
            LineOutcome::Accumulated => {}
            LineOutcome::Closed(document) => {
                emitter.emit(document).await?;
                summary.documents += 1;
            }
            LineOutcome::OutOfRange => summary.out_of_range += 1,
            LineOutcome::Rejected(e) => {
                let line = String::from_utf8_lossy(raw_line);
                log::warn!("Failed to parse line {line:?}: {e}");
                summary.rejected += 1;
            }
        }
    }
    if let Some(document) = builder.finish() {
        emitter.emit(document).await?;
        summary.documents += 1;
    }
    Ok(summary)
}

/// Strip the `\n` or `\r\n` terminator of a line, if any
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Persistent list of fully processed inputs
#[derive(Debug)]
pub struct DoneList {
    /// Location of the list
    path: PathBuf,

    /// Inputs from the list
    done: HashSet<Box<str>>,
}
//
impl DoneList {
    /// Load the list, which may not exist yet
    pub async fn load(path: &Path) -> Result<Self> {
        let done = match tokio::fs::read_to_string(path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(Into::into)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading done list {}", path.display()))
            }
        };
        Ok(Self {
            path: path.into(),
            done,
        })
    }

    /// Truth that an input was already processed
    pub fn contains(&self, input: &Input) -> bool {
        *input != Input::Stdin && self.done.contains(&*input.to_string())
    }

    /// Record that an input was fully processed
    ///
    /// Standard input is never recorded, as it's not the same from one run to
    /// another.
    pub async fn record(&mut self, input: &Input) -> Result<()> {
        if *input == Input::Stdin {
            return Ok(());
        }
        let name = input.to_string();
        let context = || format!("recording {name} into {}", self.path.display());
        let mut file = File::options()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(context)?;
        file.write_all(format!("{name}\n").as_bytes())
            .await
            .with_context(context)?;
        file.flush().await.with_context(context)?;
        self.done.insert(name.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::YearRange, emit::DocumentWriter, emit::OutputFormat, stats::AggregateDocument,
        totals::NormalizationTable,
    };
    use std::{collections::BTreeMap, io::Write, sync::Arc};
    use tempfile::NamedTempFile;

    fn example_config(inputs: Box<[Input]>) -> Arc<Config> {
        Arc::new(Config {
            years: YearRange::new(1950, 1951).unwrap(),
            inputs,
            ..Config::default()
        })
    }

    fn example_builder(config: Arc<Config>) -> GroupBuilder {
        let totals = NormalizationTable::new(
            config.years,
            &BTreeMap::from([(1950, 1000), (1951, 2000)]),
            &BTreeMap::from([(1950, 100), (1951, 200)]),
        )
        .unwrap();
        GroupBuilder::new(config, Arc::new(totals))
    }

    const EXAMPLE: &str = "cat_NN 1950 10 5\ncat_NN 1951 20 8\ndog_NN 1950 4 2\n";

    #[test]
    fn input_kinds() {
        assert_eq!(Input::from_arg("-"), Input::Stdin);
        assert_eq!(
            Input::from_arg("https://example.com/a.gz"),
            Input::Url("https://example.com/a.gz".into())
        );
        assert_eq!(Input::from_arg("data/a.gz"), Input::Path("data/a.gz".into()));
        assert!(Input::from_arg("data/a.gz").is_gzipped());
        assert!(Input::from_arg("http://example.com/a.gz").is_gzipped());
        assert!(!Input::from_arg("data/a.tsv").is_gzipped());
        assert!(!Input::Stdin.is_gzipped());
    }

    #[tokio::test]
    async fn example_stream() {
        let mut builder = example_builder(example_config(Box::new([Input::Stdin])));
        let mut documents = Vec::<AggregateDocument>::new();
        let summary = aggregate_stream(EXAMPLE.as_bytes(), &mut builder, &mut documents)
            .await
            .unwrap();
        assert_eq!(
            summary,
            StreamSummary {
                lines: 3,
                out_of_range: 0,
                rejected: 0,
                documents: 2,
            }
        );
        assert_eq!(&*documents[0].key(), "cat_NN");
        assert_eq!(documents[0].tf.total, 30.0);
        assert!((documents[0].tf.mean_year - 1950.5).abs() < 1e-9);
        assert_eq!(&*documents[1].key(), "dog_NN");
        assert_eq!(documents[1].tf.total, 4.0);
        assert!((documents[1].tf.mean_year - 1950.0).abs() < 1e-9);
        assert!(documents[1].tf.std_dev_year.abs() < 1e-6);
    }

    #[tokio::test]
    async fn stream_summary_counts_skipped_lines() {
        let mut builder = example_builder(example_config(Box::new([Input::Stdin])));
        let mut documents = Vec::<AggregateDocument>::new();
        let input = "a 1950 1 1\n1950 1\na 1700 1 1\n\na 1951 1 1\nb 1951 1 1\n";
        let summary = aggregate_stream(input.as_bytes(), &mut builder, &mut documents)
            .await
            .unwrap();
        assert_eq!(
            summary,
            StreamSummary {
                lines: 6,
                out_of_range: 1,
                rejected: 2,
                documents: 2,
            }
        );
        assert_eq!(documents[0].tf.total, 2.0);
    }

    #[tokio::test]
    async fn invalid_utf8_lines_are_skipped() {
        let mut builder = example_builder(example_config(Box::new([Input::Stdin])));
        let mut documents = Vec::<AggregateDocument>::new();
        let input: &[u8] = b"a 1950 1 1\r\nb\xff 1950 1 1\nc 1950 1 1";
        let summary = aggregate_stream(input, &mut builder, &mut documents)
            .await
            .unwrap();
        assert_eq!(
            summary,
            StreamSummary {
                lines: 3,
                out_of_range: 0,
                rejected: 1,
                documents: 2,
            }
        );
        let keys = documents.iter().map(|d| d.key().into_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn read_failure_loses_open_ngram() {
        let mut builder = example_builder(example_config(Box::new([Input::Stdin])));
        let mut documents = Vec::<AggregateDocument>::new();
        let input = StreamReader::new(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"a 1950 1 1\nb 1950 1 1\n")),
            Err(io::Error::new(ErrorKind::Other, "connection reset")),
            Ok(Bytes::from_static(b"c 1950 1 1\n")),
        ]));
        let result = aggregate_stream(input, &mut builder, &mut documents).await;
        assert!(result.is_err());

        // "a" was complete before the failure, "b" was still open
        assert_eq!(documents.len(), 1);
        assert_eq!(&*documents[0].key(), "a");
    }

    #[tokio::test]
    async fn rerun_is_bit_identical() {
        let mut outputs = Vec::new();
        for _ in 0..2 {
            let mut builder = example_builder(example_config(Box::new([Input::Stdin])));
            let mut writer = DocumentWriter::new(Vec::new(), OutputFormat::Json);
            aggregate_stream(EXAMPLE.as_bytes(), &mut builder, &mut writer)
                .await
                .unwrap();
            outputs.push(writer.finish().await.unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0].iter().filter(|&&b| b == b'\n').count(), 2);
    }

    #[tokio::test]
    async fn process_plain_and_gzipped_files() {
        // Plain file
        let mut plain = NamedTempFile::with_suffix(".tsv").unwrap();
        plain.write_all(EXAMPLE.as_bytes()).unwrap();

        // Gzipped file
        let mut encoder = async_compression::tokio::write::GzipEncoder::new(Vec::new());
        encoder.write_all(b"eel_NN 1951 3 1\n").await.unwrap();
        encoder.shutdown().await.unwrap();
        let mut gzipped = NamedTempFile::with_suffix(".gz").unwrap();
        gzipped.write_all(&encoder.into_inner()).unwrap();

        let config = example_config(Box::new([
            Input::Path(plain.path().into()),
            Input::Path(gzipped.path().into()),
        ]));
        let mut builder = example_builder(config.clone());
        let mut documents = Vec::<AggregateDocument>::new();
        process_inputs(
            &config,
            &reqwest::Client::new(),
            &mut builder,
            &mut documents,
            None,
            &ProgressReport::hidden(),
        )
        .await
        .unwrap();
        let keys = documents.iter().map(|d| d.key().into_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["cat_NN", "dog_NN", "eel_NN"]);
    }

    #[tokio::test]
    async fn done_inputs_are_skipped() {
        let mut first = NamedTempFile::new().unwrap();
        first.write_all(b"a 1950 1 1\n").unwrap();
        let mut second = NamedTempFile::new().unwrap();
        second.write_all(b"b 1950 1 1\n").unwrap();
        let done_dir = tempfile::tempdir().unwrap();
        let done_path = done_dir.path().join("done");

        let first = Input::Path(first.path().into());
        let second = Input::Path(second.path().into());
        {
            let mut done_list = DoneList::load(&done_path).await.unwrap();
            assert!(!done_list.contains(&first));
            done_list.record(&first).await.unwrap();
            done_list.record(&Input::Stdin).await.unwrap();
        }

        let config = example_config(Box::new([first.clone(), second.clone()]));
        let mut builder = example_builder(config.clone());
        let mut documents = Vec::<AggregateDocument>::new();
        let mut done_list = DoneList::load(&done_path).await.unwrap();
        assert!(done_list.contains(&first));
        assert!(!done_list.contains(&Input::Stdin));
        process_inputs(
            &config,
            &reqwest::Client::new(),
            &mut builder,
            &mut documents,
            Some(&mut done_list),
            &ProgressReport::hidden(),
        )
        .await
        .unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(&*documents[0].key(), "b");

        let recorded = std::fs::read_to_string(&done_path).unwrap();
        assert_eq!(recorded, format!("{first}\n{second}\n"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let config = example_config(Box::new([Input::Path("/nonexistent/ngrams.gz".into())]));
        let mut builder = example_builder(config.clone());
        let mut documents = Vec::<AggregateDocument>::new();
        let result = process_inputs(
            &config,
            &reqwest::Client::new(),
            &mut builder,
            &mut documents,
            None,
            &ProgressReport::hidden(),
        )
        .await;
        assert!(result.is_err());
        assert!(documents.is_empty());
    }
}
