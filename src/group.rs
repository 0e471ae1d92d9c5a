//! Grouping of consecutive dataset records into per-n-gram documents

use crate::{
    config::{Config, YearRange},
    ngram::{ParseError, Record, Token},
    stats::{self, AggregateDocument},
    totals::NormalizationTable,
    DocumentFrequency, TermFrequency, Year,
};
use std::{fmt, sync::Arc};

/// Data about an n-gram over a single year
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct YearCounts {
    /// Number of recorded occurences
    pub tf: TermFrequency,

    /// Number of books across which occurences were recorded
    pub df: DocumentFrequency,
}
//
impl YearCounts {
    /// Truth that nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.tf == 0 && self.df == 0
    }
}

/// Yearly data about an n-gram, densely stored over a year range
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct YearlyCounts {
    /// Years covered by the counts
    years: YearRange,

    /// Counts for each year of the range
    counts: Box<[YearCounts]>,
}
//
impl YearlyCounts {
    /// Set up zeroed counts
    pub fn new(years: YearRange) -> Self {
        Self {
            years,
            counts: vec![YearCounts::default(); years.len()].into(),
        }
    }

    /// Years covered by the counts
    pub fn years(&self) -> YearRange {
        self.years
    }

    /// Record data for a year, returning the data it replaces
    ///
    /// # Panics
    ///
    /// If the year is out of range.
    pub fn set(&mut self, year: Year, counts: YearCounts) -> YearCounts {
        let idx = self
            .years
            .index(year)
            .unwrap_or_else(|| panic!("year {year} is out of range"));
        std::mem::replace(&mut self.counts[idx], counts)
    }

    /// Iterate over yearly data, in increasing year order
    pub fn iter(&self) -> impl Iterator<Item = (Year, YearCounts)> + Clone + '_ {
        self.years.years().zip(self.counts.iter().copied())
    }

    /// Go back to zeroed counts
    pub fn reset(&mut self) {
        self.counts.fill(YearCounts::default());
    }
}

/// Accumulator that turns a sorted stream of dataset records into per-n-gram
/// documents
///
/// Records should be added in the order where they come in data files, where
/// all records about an n-gram are consecutive. Records about one n-gram that
/// are separated by records about another n-gram end up in distinct
/// documents.
#[derive(Debug)]
pub struct GroupBuilder {
    /// Data collection configuration
    config: Arc<Config>,

    /// Yearly corpus totals
    totals: Arc<NormalizationTable>,

    /// N-gram whose records are being accumulated, if any
    current: Option<OpenGroup>,

    /// Yearly data accumulated about the current n-gram
    ///
    /// Reset rather than reallocated when switching to the next n-gram.
    counts: YearlyCounts,
}
//
impl GroupBuilder {
    /// Set up the accumulator
    pub fn new(config: Arc<Config>, totals: Arc<NormalizationTable>) -> Self {
        assert_eq!(
            config.years,
            totals.years(),
            "normalization totals should cover the configured year range"
        );
        Self {
            counts: YearlyCounts::new(config.years),
            config,
            totals,
            current: None,
        }
    }

    /// Integrate a dataset line
    ///
    /// Malformed lines are reported in the outcome and otherwise ignored.
    /// Years too large to be represented are out of range, like any other.
    pub fn add_line(&mut self, line: &str) -> LineOutcome {
        match Record::parse(line) {
            Ok(record) => self.add_record(record),
            Err(ParseError::UnrepresentableYear(year)) => {
                log::trace!("Ignored {line:?} because year {year} is out of range");
                LineOutcome::OutOfRange
            }
            Err(e) => LineOutcome::Rejected(e),
        }
    }

    /// Integrate a dataset record
    pub fn add_record(&mut self, record: Record) -> LineOutcome {
        // Ignore data from years we're not interested in
        if !self.config.years.contains(record.year) {
            log::trace!("Ignored {record:?} because its year is out of range");
            return LineOutcome::OutOfRange;
        }

        // If the record is about a new n-gram, the current n-gram is complete
        let Record {
            tokens,
            key,
            year,
            term_frequency,
            document_frequency,
        } = record;
        let same_ngram = (self.current.as_ref()).is_some_and(|group| group.key == key);
        let closed = if same_ngram {
            None
        } else {
            self.switch_group(Some(OpenGroup { key, tokens }))
        };

        // Record the yearly data. Duplicate years are not expected in the
        // dataset, if they happen the last record wins.
        let former = self.counts.set(
            year,
            YearCounts {
                tf: term_frequency,
                df: document_frequency,
            },
        );
        if !former.is_empty() {
            log::trace!("Overwrote {former:?} for year {year} with a duplicate record");
        }

        match closed {
            Some(document) => LineOutcome::Closed(document),
            None => LineOutcome::Accumulated,
        }
    }

    /// Complete the current n-gram, if any
    ///
    /// Call this at the end of an input stream. The builder can then be used
    /// again for another stream.
    pub fn finish(&mut self) -> Option<AggregateDocument> {
        self.switch_group(None)
    }

    /// Summarize the current n-gram, if any, and switch to another one (or
    /// none at all)
    fn switch_group(&mut self, new_group: Option<OpenGroup>) -> Option<AggregateDocument> {
        let former = std::mem::replace(&mut self.current, new_group)?;
        let mut document = stats::summarize(former.tokens, &self.counts, &self.totals);
        if self.config.store_years {
            document = document.with_yearly_counts(&self.counts);
        }
        log::debug!("adding {document}");
        if !document.tf.is_defined() {
            log::trace!("{} was never used over the years of interest", document.key());
        }
        self.counts.reset();
        Some(document)
    }
}

/// N-gram whose records are being accumulated
#[derive(Debug)]
struct OpenGroup {
    /// Identity of the n-gram
    key: Box<str>,

    /// Tokens of the n-gram
    tokens: Box<[Token]>,
}

/// What happened to a line given to [`GroupBuilder::add_line()`]
#[derive(Debug)]
pub enum LineOutcome {
    /// The line's data was added to the current n-gram
    Accumulated,

    /// The line started a new n-gram, and the previous one is complete
    Closed(AggregateDocument),

    /// The line was ignored because its year is out of range
    OutOfRange,

    /// The line could not be parsed and was ignored
    Rejected(ParseError),
}

/// Line counts from a single input stream
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StreamSummary {
    /// Number of lines read
    pub lines: usize,

    /// Number of lines ignored because their year is out of range
    pub out_of_range: usize,

    /// Number of lines that could not be parsed
    pub rejected: usize,

    /// Number of completed n-grams
    pub documents: usize,
}
//
impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} out of year range, {} malformed, {} n-grams",
            self.lines, self.out_of_range, self.rejected, self.documents
        )
    }
}
