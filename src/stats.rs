//! N-gram usage statistics

use crate::{
    group::YearlyCounts,
    ngram::{self, Token},
    totals::NormalizationTable,
    DocumentFrequency, TermFrequency, Year,
};
use std::{collections::BTreeMap, fmt};

/// Summary of an n-gram's usage across the years of interest
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateDocument {
    /// Tokens of the n-gram
    pub tokens: Box<[Token]>,

    /// Statistics weighted by occurence count
    pub tf: YearMoments,

    /// Statistics weighted by book count
    pub df: YearMoments,

    /// Raw yearly data, if requested
    pub yearly: Option<YearlySeries>,
}
//
impl AggregateDocument {
    /// Identity of the n-gram, in dataset syntax
    pub fn key(&self) -> Box<str> {
        ngram::ngram_key(&self.tokens)
    }

    /// Attach raw yearly data to the document
    pub fn with_yearly_counts(self, counts: &YearlyCounts) -> Self {
        let mut yearly = YearlySeries::default();
        for (year, data) in counts.iter() {
            if data.tf != 0 {
                yearly.tf.insert(year, data.tf);
            }
            if data.df != 0 {
                yearly.df.insert(year, data.df);
            }
        }
        Self {
            yearly: Some(yearly),
            ..self
        }
    }
}
//
impl fmt::Display for AggregateDocument {
    /// Display the n-gram as a sequence of `word\TAG` tokens
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, token) in self.tokens.iter().enumerate() {
            if idx != 0 {
                f.write_str(" ")?;
            }
            f.write_str(&token.surface.to_lowercase())?;
            if let Some(pos) = &token.pos {
                write!(f, "\\{pos}")?;
            }
        }
        Ok(())
    }
}

/// Raw yearly data about an n-gram, for years where it was seen
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct YearlySeries {
    /// Number of occurences on each year
    pub tf: BTreeMap<Year, TermFrequency>,

    /// Number of books with occurences on each year
    pub df: BTreeMap<Year, DocumentFrequency>,
}

/// Distribution of an n-gram's usage over publication years
///
/// Each year is weighted by the n-gram's frequency that year, relative to the
/// size of the corpus that year. Statistics are NaN for n-grams that were
/// never seen over the years of interest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YearMoments {
    /// Mean publication year
    pub mean_year: f64,

    /// Standard deviation of the publication year
    pub std_dev_year: f64,

    /// Raw count over all years of interest
    pub total: f64,
}
//
impl YearMoments {
    /// Compute statistics from `(year, count, corpus_total)` samples
    ///
    /// The samples are iterated twice, because the variance can only be
    /// computed once the mean is known.
    pub fn compute(samples: impl Iterator<Item = (Year, u64, f64)> + Clone) -> Self {
        let mut weighted_years = 0.0;
        let mut total_weight = 0.0;
        let mut total = 0.0;
        for (year, count, corpus_total) in samples.clone() {
            debug_assert!(corpus_total > 0.0, "corpus totals should be positive");
            let weight = count as f64 / corpus_total;
            weighted_years += f64::from(year) * weight;
            total_weight += weight;
            total += count as f64;
        }
        let mean_year = weighted_years / total_weight;

        let variance = samples
            .map(|(year, count, corpus_total)| {
                let deviation = f64::from(year) - mean_year;
                count as f64 * deviation * deviation / corpus_total
            })
            .sum::<f64>()
            / total_weight;

        Self {
            mean_year,
            std_dev_year: variance.sqrt(),
            total,
        }
    }

    /// Truth that the n-gram was seen at all
    pub fn is_defined(&self) -> bool {
        self.mean_year.is_finite()
    }
}

/// Summarize the yearly data of an n-gram
pub fn summarize(
    tokens: Box<[Token]>,
    counts: &YearlyCounts,
    totals: &NormalizationTable,
) -> AggregateDocument {
    debug_assert_eq!(counts.years(), totals.years());
    let tf = YearMoments::compute(
        counts
            .iter()
            .map(|(year, data)| (year, data.tf, totals.tf_total(year))),
    );
    let df = YearMoments::compute(
        counts
            .iter()
            .map(|(year, data)| (year, data.df, totals.df_total(year))),
    );
    AggregateDocument {
        tokens,
        tf,
        df,
        yearly: None,
    }
}
