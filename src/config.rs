//! Processing pipeline configuration

use crate::{emit::OutputFormat, file::Input, IndexArgs, Result, Year, YearArgs};
use serde::{Deserialize, Serialize};
use std::{ops::RangeInclusive, path::PathBuf, sync::Arc};

/// Final `index` configuration
///
/// This is the result of digesting [`IndexArgs`]. Please refer to
/// [`IndexArgs`] to know more about individual fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// Publication years of interest
    pub years: YearRange,

    /// Inputs to be processed, in order
    pub inputs: Box<[Input]>,

    // Other fields have the same meaning as in IndexArgs
    pub tf_totals: PathBuf,
    pub df_totals: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub store_years: bool,
    pub done_list: Option<PathBuf>,
    pub quiet: bool,
}
//
impl Config {
    /// Determine process configuration from CLI arguments
    pub(crate) fn new(args: IndexArgs) -> Result<Arc<Self>> {
        let IndexArgs {
            inputs,
            years: YearArgs {
                first_year,
                last_year,
            },
            tf_totals,
            df_totals,
            output,
            format,
            store_years,
            done_list,
            quiet,
        } = args;
        let inputs = if inputs.is_empty() {
            Box::new([Input::Stdin]) as Box<[Input]>
        } else {
            inputs.iter().map(|arg| Input::from_arg(arg)).collect()
        };
        Ok(Arc::new(Self {
            years: YearRange::new(first_year, last_year)?,
            inputs,
            tf_totals,
            df_totals,
            output,
            format,
            store_years,
            done_list,
            quiet,
        }))
    }
}
//
impl Default for Config {
    fn default() -> Self {
        Self {
            years: YearRange::default(),
            inputs: Box::new([Input::Stdin]),
            tf_totals: PathBuf::new(),
            df_totals: None,
            output: None,
            format: OutputFormat::Json,
            store_years: false,
            done_list: None,
            quiet: false,
        }
    }
}

/// Inclusive range of publication years
///
/// Yearly data is stored in dense arrays covering this range, and records
/// from other years are discarded.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct YearRange {
    /// First year of the range
    first: Year,

    /// Last year of the range
    last: Year,
}
//
impl YearRange {
    /// Set up a year range, checking that it isn't empty
    pub fn new(first: Year, last: Year) -> Result<Self> {
        anyhow::ensure!(
            first <= last,
            "requested year range {first}..={last} contains no year"
        );
        Ok(Self { first, last })
    }

    /// First year of the range
    pub fn first(&self) -> Year {
        self.first
    }

    /// Last year of the range
    pub fn last(&self) -> Year {
        self.last
    }

    /// Number of years in the range
    pub fn len(&self) -> usize {
        usize::try_from(i32::from(self.last) - i32::from(self.first) + 1)
            .expect("YearRange type invariant guarantees that first <= last")
    }

    /// Truth that a year belongs to this range
    pub fn contains(&self, year: Year) -> bool {
        (self.first..=self.last).contains(&year)
    }

    /// Position of a year within dense yearly arrays, if it is in range
    pub fn index(&self, year: Year) -> Option<usize> {
        self.contains(year)
            .then(|| (i32::from(year) - i32::from(self.first)) as usize)
    }

    /// Iterate over the years of the range, in increasing order
    pub fn years(&self) -> RangeInclusive<Year> {
        self.first..=self.last
    }
}
//
impl Default for YearRange {
    /// Years for which the 20120701 English dataset has books
    fn default() -> Self {
        Self {
            first: 1800,
            last: 2008,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_year_range_is_rejected() {
        assert!(YearRange::new(1951, 1950).is_err());
        assert!(YearRange::new(1950, 1950).is_ok());
    }

    #[test]
    fn year_indexing() {
        let range = YearRange::new(1950, 1952).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range.index(1949), None);
        assert_eq!(range.index(1950), Some(0));
        assert_eq!(range.index(1952), Some(2));
        assert_eq!(range.index(1953), None);
        assert_eq!(range.years().collect::<Vec<_>>(), vec![1950, 1951, 1952]);
    }

    #[test]
    fn default_range_matches_dataset() {
        let range = YearRange::default();
        assert_eq!((range.first(), range.last()), (1800, 2008));
        assert_eq!(range.len(), 209);
    }
}
