//! Term lookup in previously indexed documents

use crate::{emit::StoredDocument, totals::NormalizationTable, Result};
use anyhow::Context;
use rayon::prelude::*;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use unicase::UniCase;

/// Load documents that were indexed in JSON format
pub async fn load_documents(path: &Path) -> Result<Vec<StoredDocument>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading documents from {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_idx, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parsing document at {}:{}", path.display(), idx + 1))
        })
        .collect()
}

/// Find documents whose token at position `field` has a certain term,
/// regardless of case
///
/// Matches are returned in the order of `documents`.
pub fn find_matches<'docs>(
    documents: &'docs [StoredDocument],
    field: usize,
    query: &str,
) -> Vec<&'docs StoredDocument> {
    let query = UniCase::new(query);
    documents
        .par_iter()
        .filter(|document| {
            document
                .tokens
                .get(field)
                .is_some_and(|token| UniCase::new(token.term.as_str()) == query)
        })
        .collect()
}

/// Relative frequency of a document's n-gram on every year of the totals'
/// range, 0 on years where it was not seen
///
/// Requires documents that were indexed with raw yearly counts.
pub fn timeline(document: &StoredDocument, totals: &NormalizationTable) -> Result<Vec<f64>> {
    let yearly_tf = document.yearly_tf.as_ref().with_context(|| {
        format!(
            "document {} has no yearly data, was it indexed with --store-years?",
            document.ngram()
        )
    })?;
    Ok(totals
        .years()
        .years()
        .map(|year| {
            let count = yearly_tf.get(&year).copied().unwrap_or(0);
            count as f64 / totals.tf_total(year)
        })
        .collect())
}

/// Answer term queries, one per input line, until EOF or an empty line
pub async fn answer_queries(
    documents: &[StoredDocument],
    field: usize,
    timeline_totals: Option<&NormalizationTable>,
    input: impl AsyncRead + Unpin,
    mut output: impl AsyncWrite + Unpin,
) -> Result<()> {
    let mut queries = BufReader::new(input).lines();
    while let Some(query) = queries.next_line().await.context("reading a query")? {
        let query = query.trim();
        if query.is_empty() {
            break;
        }
        let matches = find_matches(documents, field, query);
        log::debug!("Found {} matches for {query:?}", matches.len());

        let mut answer = String::new();
        for document in matches {
            let (tf, df) = (document.tf(), document.df());
            answer.push_str(&format!(
                "{}\t{} {} {} {} {} {}\n",
                document.ngram(),
                tf.mean_year,
                tf.std_dev_year,
                tf.total,
                df.mean_year,
                df.std_dev_year,
                df.total
            ));
            if let Some(totals) = timeline_totals {
                let frequencies = timeline(document, totals)?
                    .iter()
                    .map(f64::to_string)
                    .collect::<Vec<_>>();
                answer.push_str(&frequencies.join(" "));
                answer.push('\n');
            }
        }
        output
            .write_all(answer.as_bytes())
            .await
            .context("writing query results")?;
        output.flush().await.context("writing query results")?;
    }
    Ok(())
}
