//! Output of completed n-gram documents

use crate::{
    progress::ProgressTracker,
    stats::{AggregateDocument, YearMoments},
    DocumentFrequency, Result, TermFrequency, Year,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc,
    task::JoinHandle,
};

/// Destination of completed n-gram documents
///
/// Documents must be handled in the order where they are emitted.
#[allow(async_fn_in_trait)]
pub trait Emitter {
    /// Handle a completed document
    async fn emit(&mut self, document: AggregateDocument) -> Result<()>;
}
//
impl Emitter for Vec<AggregateDocument> {
    async fn emit(&mut self, document: AggregateDocument) -> Result<()> {
        self.push(document);
        Ok(())
    }
}

/// Output document format
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON [`StoredDocument`] per line, can be searched later on
    Json,

    /// One `ngram<TAB>mu_tf sigma_tf tf mu_df sigma_df df` line per n-gram
    Text,
}

/// Persistent form of an [`AggregateDocument`]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StoredDocument {
    /// Tokens of the n-gram, with lowercase terms
    pub tokens: Vec<StoredToken>,

    #[serde(with = "nan_as_null")]
    pub mean_year_tf: f64,
    #[serde(with = "nan_as_null")]
    pub std_dev_year_tf: f64,
    pub total_tf: f64,

    #[serde(with = "nan_as_null")]
    pub mean_year_df: f64,
    #[serde(with = "nan_as_null")]
    pub std_dev_year_df: f64,
    pub total_df: f64,

    /// Raw number of occurences on each year where there were some
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly_tf: Option<BTreeMap<Year, TermFrequency>>,

    /// Raw number of books with occurences on each year where there were some
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly_df: Option<BTreeMap<Year, DocumentFrequency>>,
}
//
impl StoredDocument {
    /// Statistics weighted by occurence count
    pub fn tf(&self) -> YearMoments {
        YearMoments {
            mean_year: self.mean_year_tf,
            std_dev_year: self.std_dev_year_tf,
            total: self.total_tf,
        }
    }

    /// Statistics weighted by book count
    pub fn df(&self) -> YearMoments {
        YearMoments {
            mean_year: self.mean_year_df,
            std_dev_year: self.std_dev_year_df,
            total: self.total_df,
        }
    }

    /// Display the n-gram as a sequence of `word\TAG` tokens
    pub fn ngram(&self) -> String {
        (self.tokens.iter())
            .map(StoredToken::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
//
impl From<&AggregateDocument> for StoredDocument {
    fn from(document: &AggregateDocument) -> Self {
        let (yearly_tf, yearly_df) = match &document.yearly {
            Some(yearly) => (Some(yearly.tf.clone()), Some(yearly.df.clone())),
            None => (None, None),
        };
        Self {
            tokens: (document.tokens.iter())
                .map(|token| StoredToken {
                    term: token.surface.to_lowercase(),
                    pos: token.pos.as_deref().map(Into::into),
                })
                .collect(),
            mean_year_tf: document.tf.mean_year,
            std_dev_year_tf: document.tf.std_dev_year,
            total_tf: document.tf.total,
            mean_year_df: document.df.mean_year,
            std_dev_year_df: document.df.std_dev_year,
            total_df: document.df.total,
            yearly_tf,
            yearly_df,
        }
    }
}

/// Persistent form of an n-gram token
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StoredToken {
    /// Lowercase word, empty for tag-only tokens
    pub term: String,

    /// Grammar tag, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
}
//
impl fmt::Display for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.term)?;
        if let Some(pos) = &self.pos {
            write!(f, "\\{pos}")?;
        }
        Ok(())
    }
}

/// JSON has no NaN, so undefined statistics are stored as null
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Writer of documents into a byte stream
#[derive(Debug)]
pub struct DocumentWriter<W: AsyncWrite> {
    /// Buffered output stream
    output: BufWriter<W>,

    /// Output format
    format: OutputFormat,

    /// Reusable serialization buffer
    buffer: Vec<u8>,
}
//
impl<W: AsyncWrite + Unpin> DocumentWriter<W> {
    /// Prepare to write documents
    pub fn new(output: W, format: OutputFormat) -> Self {
        Self {
            output: BufWriter::new(output),
            format,
            buffer: Vec::new(),
        }
    }

    /// Write a document
    pub async fn write(&mut self, document: &AggregateDocument) -> Result<()> {
        self.buffer.clear();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.buffer, &StoredDocument::from(document))
                    .context("serializing a document")?;
                self.buffer.push(b'\n');
            }
            OutputFormat::Text => {
                use std::io::Write;
                let (tf, df) = (document.tf, document.df);
                writeln!(
                    self.buffer,
                    "{document}\t{} {} {} {} {} {}",
                    tf.mean_year, tf.std_dev_year, tf.total, df.mean_year, df.std_dev_year, df.total
                )
                .expect("writing to a Vec can't fail");
            }
        }
        self.output
            .write_all(&self.buffer)
            .await
            .context("writing a document")
    }

    /// Flush buffered output and get back the output stream
    pub async fn finish(mut self) -> Result<W> {
        self.output.flush().await.context("flushing documents")?;
        Ok(self.output.into_inner())
    }
}
//
impl<W: AsyncWrite + Unpin> Emitter for DocumentWriter<W> {
    async fn emit(&mut self, document: AggregateDocument) -> Result<()> {
        self.write(&document).await
    }
}

/// Emitter that writes documents from a background task
///
/// This lets output writes proceed in parallel with input processing, while
/// preserving document order.
#[derive(Debug)]
pub struct BackgroundEmitter {
    /// Channel to the writer task
    sender: mpsc::Sender<AggregateDocument>,

    /// Writer task
    writer: JoinHandle<Result<()>>,
}
//
impl BackgroundEmitter {
    /// Number of documents that can be waiting for the writer
    const CAPACITY: usize = 1024;

    /// Start the writer task
    pub fn spawn<W>(mut output: DocumentWriter<W>, emitted: ProgressTracker) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<AggregateDocument>(Self::CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(document) = receiver.recv().await {
                output.write(&document).await?;
                emitted.make_progress(1);
            }
            output.finish().await.map(std::mem::drop)
        });
        Self { sender, writer }
    }

    /// Wait for all emitted documents to be written
    pub async fn finish(self) -> Result<()> {
        std::mem::drop(self.sender);
        self.writer.await.context("waiting for the document writer")?
    }
}
//
impl Emitter for BackgroundEmitter {
    async fn emit(&mut self, document: AggregateDocument) -> Result<()> {
        self.sender
            .send(document)
            .await
            .map_err(|_| anyhow::format_err!("the document writer has stopped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::YearRange,
        group::{YearCounts, YearlyCounts},
        ngram::Token,
        progress::{ProgressConfig, ProgressReport, Work},
        stats,
        totals::NormalizationTable,
    };

    fn document(ngram: &str, data: &[(Year, u64, u64)], store_years: bool) -> AggregateDocument {
        let years = YearRange::new(1950, 1951).unwrap();
        let totals = NormalizationTable::new(
            years,
            &BTreeMap::from([(1950, 1000), (1951, 2000)]),
            &BTreeMap::from([(1950, 100), (1951, 200)]),
        )
        .unwrap();
        let mut counts = YearlyCounts::new(years);
        for &(year, tf, df) in data {
            counts.set(year, YearCounts { tf, df });
        }
        let tokens = ngram.split_whitespace().filter_map(Token::parse).collect();
        let document = stats::summarize(tokens, &counts, &totals);
        if store_years {
            document.with_yearly_counts(&counts)
        } else {
            document
        }
    }

    #[test]
    fn stored_document_contents() {
        let stored = StoredDocument::from(&document("The_DET _NOUN_", &[(1950, 10, 5)], true));
        assert_eq!(
            stored.tokens,
            vec![
                StoredToken {
                    term: "the".into(),
                    pos: Some("DET".into())
                },
                StoredToken {
                    term: "".into(),
                    pos: Some("NOUN".into())
                },
            ]
        );
        assert_eq!(stored.ngram(), "the\\DET \\NOUN");
        assert_eq!(stored.total_tf, 10.0);
        assert_eq!(stored.yearly_tf, Some(BTreeMap::from([(1950, 10)])));
        assert_eq!(stored.yearly_df, Some(BTreeMap::from([(1950, 5)])));
    }

    #[test]
    fn json_layout() {
        let stored = StoredDocument::from(&document("cat_NN", &[(1951, 2000, 200)], false));
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tokens": [{"term": "cat", "pos": "NN"}],
                "mean_year_tf": 1951.0,
                "std_dev_year_tf": 0.0,
                "total_tf": 2000.0,
                "mean_year_df": 1951.0,
                "std_dev_year_df": 0.0,
                "total_df": 200.0,
            })
        );
    }

    #[test]
    fn undefined_statistics_are_stored_as_null() {
        let stored = StoredDocument::from(&document("ghost", &[], false));
        let json = serde_json::to_string(&stored).unwrap();
        assert!(json.contains("\"mean_year_tf\":null"));
        let loaded = serde_json::from_str::<StoredDocument>(&json).unwrap();
        assert!(loaded.mean_year_tf.is_nan());
        assert!(loaded.std_dev_year_df.is_nan());
        assert_eq!(loaded.total_tf, 0.0);
        assert!(loaded.yearly_tf.is_none());
    }

    #[tokio::test]
    async fn text_output() {
        let mut writer = DocumentWriter::new(Vec::new(), OutputFormat::Text);
        writer
            .emit(document("the", &[(1951, 2000, 200)], false))
            .await
            .unwrap();
        let text = String::from_utf8(writer.finish().await.unwrap()).unwrap();
        assert_eq!(text, "the\t1951 0 2000 1951 0 200\n");
    }

    #[tokio::test]
    async fn background_emitter_preserves_order() {
        let (client, server) = tokio::io::duplex(64);
        let report = ProgressReport::hidden();
        let mut emitter = BackgroundEmitter::spawn(
            DocumentWriter::new(client, OutputFormat::Json),
            report.add("Emitting", ProgressConfig::new(Work::Unbounded)),
        );
        let reader = tokio::spawn(async move {
            let mut output = String::new();
            let mut server = tokio::io::BufReader::new(server);
            tokio::io::AsyncReadExt::read_to_string(&mut server, &mut output)
                .await
                .map(|_| output)
        });
        let ngrams = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>();
        for ngram in &ngrams {
            emitter
                .emit(document(ngram, &[(1950, 1, 1)], false))
                .await
                .unwrap();
        }
        emitter.finish().await.unwrap();
        let output = reader.await.unwrap().unwrap();
        let written = output
            .lines()
            .map(|line| serde_json::from_str::<StoredDocument>(line).unwrap().ngram())
            .collect::<Vec<_>>();
        assert_eq!(written, ngrams);
    }
}
