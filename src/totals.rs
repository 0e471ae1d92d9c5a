//! Corpus-wide yearly totals, used to normalize n-gram frequencies
//!
//! The corpus grows a lot over time (Google has ~100x more books from 2000
//! than from 1800), so raw yearly n-gram frequencies must be divided by the
//! yearly corpus size before they can be compared across years.

use crate::{config::YearRange, DocumentFrequency, Result, TermFrequency, Year};
use anyhow::Context;
use std::{collections::BTreeMap, path::Path};

/// Yearly corpus totals for every year of the range of interest
///
/// All totals are strictly positive, this is checked on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizationTable {
    /// Years covered by this table
    years: YearRange,

    /// Total number of n-gram occurences, indexed by year
    tf: Box<[f64]>,

    /// Total number of books, indexed by year
    df: Box<[f64]>,
}
//
impl NormalizationTable {
    /// Build the table from yearly totals, which may cover more years than
    /// needed but must not miss any year in range
    pub fn new(
        years: YearRange,
        tf: &BTreeMap<Year, TermFrequency>,
        df: &BTreeMap<Year, DocumentFrequency>,
    ) -> Result<Self> {
        Ok(Self {
            years,
            tf: densify(years, tf).context("checking term frequency totals")?,
            df: densify(years, df).context("checking document frequency totals")?,
        })
    }

    /// Load the table from totals files
    ///
    /// See [`TotalsRecord`] for the file format. Document frequency totals
    /// come from `df_path` if specified, otherwise from the volume count
    /// column of `tf_path`.
    pub async fn load(years: YearRange, tf_path: &Path, df_path: Option<&Path>) -> Result<Self> {
        let tf_records = load_totals(tf_path).await?;
        let tf = (tf_records.iter())
            .map(|record| (record.year, record.total))
            .collect::<BTreeMap<_, _>>();
        let df = if let Some(df_path) = df_path {
            (load_totals(df_path).await?.iter())
                .map(|record| (record.year, record.volume_total.unwrap_or(record.total)))
                .collect::<BTreeMap<_, _>>()
        } else {
            (tf_records.iter())
                .map(|record| {
                    record.volume_total.map(|total| (record.year, total)).with_context(|| {
                        format!(
                            "{} has no volume count for year {}, please specify document frequency totals",
                            tf_path.display(),
                            record.year
                        )
                    })
                })
                .collect::<Result<BTreeMap<_, _>>>()?
        };
        let table = Self::new(years, &tf, &df)
            .with_context(|| format!("loading yearly totals from {}", tf_path.display()))?;
        log::info!(
            "Loaded yearly totals for {}..={}",
            years.first(),
            years.last()
        );
        Ok(table)
    }

    /// Years covered by this table
    pub fn years(&self) -> YearRange {
        self.years
    }

    /// Total number of n-gram occurences on a given year
    ///
    /// # Panics
    ///
    /// If the year is out of range.
    pub fn tf_total(&self, year: Year) -> f64 {
        self.tf[self.position(year)]
    }

    /// Total number of books on a given year
    ///
    /// # Panics
    ///
    /// If the year is out of range.
    pub fn df_total(&self, year: Year) -> f64 {
        self.df[self.position(year)]
    }

    /// Position of a year in the inner arrays
    fn position(&self, year: Year) -> usize {
        self.years
            .index(year)
            .unwrap_or_else(|| panic!("year {year} is not covered by the normalization table"))
    }
}

/// Turn sparse yearly totals into a dense array over the year range
fn densify(years: YearRange, totals: &BTreeMap<Year, u64>) -> Result<Box<[f64]>> {
    years
        .years()
        .map(|year| match totals.get(&year) {
            Some(&total) if total > 0 => Ok(total as f64),
            Some(_) => anyhow::bail!("total for year {year} is zero"),
            None => anyhow::bail!("no total for year {year}"),
        })
        .collect()
}

/// Record from a totals file
///
/// Totals files contain whitespace-separated records, either of the
/// `year,total` form or of the `year,match_count,page_count,volume_count`
/// form used by the Google Books Ngram totalcounts files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TotalsRecord {
    /// Year of the record
    pub year: Year,

    /// Total, or match count for 4-column records
    pub total: u64,

    /// Volume count of 4-column records
    pub volume_total: Option<u64>,
}
//
impl TotalsRecord {
    /// Parse a single record
    pub fn parse(s: &str) -> Result<Self> {
        let fields = s.split(',').map(str::trim).collect::<Vec<_>>();
        let parse_total = |field: &str| {
            field
                .parse::<u64>()
                .with_context(|| format!("parsing total {field:?}"))
        };
        let (year, total, volume_total) = match fields[..] {
            [year, total] => (year, parse_total(total)?, None),
            [year, match_count, _page_count, volume_count] => {
                (year, parse_total(match_count)?, Some(parse_total(volume_count)?))
            }
            _ => anyhow::bail!("expected 2 or 4 comma-separated fields, found {}", fields.len()),
        };
        let year = year
            .parse::<Year>()
            .with_context(|| format!("parsing year {year:?}"))?;
        Ok(Self {
            year,
            total,
            volume_total,
        })
    }
}

/// Parse the contents of a totals file
pub fn parse_totals(text: &str) -> Result<Vec<TotalsRecord>> {
    text.split_whitespace()
        .map(|record| {
            TotalsRecord::parse(record).with_context(|| format!("parsing totals record {record:?}"))
        })
        .collect()
}

/// Load and parse a totals file
async fn load_totals(path: &Path) -> Result<Vec<TotalsRecord>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading yearly totals from {}", path.display()))?;
    parse_totals(&text).with_context(|| format!("parsing yearly totals from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn range() -> YearRange {
        YearRange::new(1950, 1951).unwrap()
    }

    #[test]
    fn parse_both_record_forms() {
        let records = parse_totals("1950,1000\n 1951,2000,30,200\t").unwrap();
        assert_eq!(
            records,
            vec![
                TotalsRecord {
                    year: 1950,
                    total: 1000,
                    volume_total: None
                },
                TotalsRecord {
                    year: 1951,
                    total: 2000,
                    volume_total: Some(200)
                },
            ]
        );
    }

    #[test]
    fn reject_malformed_records() {
        assert!(parse_totals("1950").is_err());
        assert!(parse_totals("1950,1,2").is_err());
        assert!(parse_totals("year,1000").is_err());
        assert!(parse_totals("1950,-1").is_err());
    }

    #[test]
    fn table_ignores_extra_years() {
        let tf = BTreeMap::from([(1949, 1), (1950, 1000), (1951, 2000), (1952, 3)]);
        let df = BTreeMap::from([(1950, 100), (1951, 200)]);
        let table = NormalizationTable::new(range(), &tf, &df).unwrap();
        assert_eq!(table.tf_total(1950), 1000.0);
        assert_eq!(table.tf_total(1951), 2000.0);
        assert_eq!(table.df_total(1950), 100.0);
        assert_eq!(table.df_total(1951), 200.0);
    }

    #[test]
    fn table_rejects_missing_or_zero_totals() {
        let df = BTreeMap::from([(1950, 100), (1951, 200)]);
        let missing = BTreeMap::from([(1950, 1000)]);
        assert!(NormalizationTable::new(range(), &missing, &df).is_err());
        let zero = BTreeMap::from([(1950, 1000), (1951, 0)]);
        assert!(NormalizationTable::new(range(), &df, &zero).is_err());
    }

    #[test]
    #[should_panic]
    fn out_of_range_lookup_panics() {
        let totals = BTreeMap::from([(1950, 1), (1951, 1)]);
        let table = NormalizationTable::new(range(), &totals, &totals).unwrap();
        table.tf_total(1952);
    }

    #[tokio::test]
    async fn load_google_totalcounts() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, " 1950,1000,50,100\t1951,2000,70,200\t1952,1,1,1").unwrap();
        let table = NormalizationTable::load(range(), file.path(), None)
            .await
            .unwrap();
        assert_eq!(table.tf_total(1951), 2000.0);
        assert_eq!(table.df_total(1951), 200.0);
    }

    #[tokio::test]
    async fn load_separate_totals() {
        let mut tf = NamedTempFile::new().unwrap();
        writeln!(tf, "1950,1000\n1951,2000").unwrap();
        let mut df = NamedTempFile::new().unwrap();
        writeln!(df, "1950,100 1951,200").unwrap();

        // Two-column tf totals alone don't provide df totals
        assert!(NormalizationTable::load(range(), tf.path(), None)
            .await
            .is_err());

        let table = NormalizationTable::load(range(), tf.path(), Some(df.path()))
            .await
            .unwrap();
        assert_eq!(table.tf_total(1950), 1000.0);
        assert_eq!(table.df_total(1950), 100.0);
    }
}
