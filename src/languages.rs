//! Supported Google Books Ngrams languages

use crate::Result;
use anyhow::Context;
use dialoguer::FuzzySelect;
use std::sync::OnceLock;

/// Pick the requested language, or ask the user if none was requested
pub fn pick(short_name: Option<&str>) -> Result<LanguageInfo> {
    match short_name {
        Some(short_name) => get(short_name),
        None => Ok(prompt()?),
    }
}

/// Get information about a language dictionary
pub fn get(short_name: &str) -> Result<LanguageInfo> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(_long_name, lang)| lang.short_name == short_name)
        .map(|(_long_name, lang)| *lang)
        .with_context(|| format!("Failed to find user-requested language {short_name}"))
}

/// Ask the user to select a language dictionary
pub fn prompt() -> dialoguer::Result<LanguageInfo> {
    let language_names = SUPPORTED_LANGUAGES
        .iter()
        .map(|(name, info)| format!("{name} ({})", info.short_name))
        .collect::<Vec<_>>();
    let language_idx = FuzzySelect::new()
        .with_prompt("Which dictionary should I use?")
        .items(&language_names)
        .default(0)
        .max_length(usize::MAX)
        .interact()?;
    Ok(SUPPORTED_LANGUAGES[language_idx].1)
}

/// What we know about a language in the Google Books Ngrams dataset
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LanguageInfo {
    /// Short name, as in dataset URLs
    pub short_name: &'static str,
}
//
impl LanguageInfo {
    /// Generate the URLs of the dataset files for n-grams of a certain length
    ///
    /// # Panics
    ///
    /// If the n-gram length is not between 1 and 5, as the dataset has no
    /// such files.
    pub fn dataset_urls(&self, ngram: u8) -> impl Iterator<Item = Box<str>> + '_ {
        assert!((1..=5).contains(&ngram), "no dataset files for {ngram}-grams");
        file_prefixes(ngram).iter().map(move |prefix| {
            format!(
                "http://storage.googleapis.com/books/ngrams/books/googlebooks-{}-all-{ngram}gram-20120701-{prefix}.gz",
                self.short_name,
            )
            .into()
        })
    }
}

/// Languages of the 20120701 dataset, keyed by human-readable name
const SUPPORTED_LANGUAGES: &[(&str, LanguageInfo)] = &[
    ("English", LanguageInfo { short_name: "eng" }),
    ("English One Million", LanguageInfo { short_name: "eng-1M" }),
    ("American English", LanguageInfo { short_name: "eng-us" }),
    ("British English", LanguageInfo { short_name: "eng-gb" }),
    ("English Fiction", LanguageInfo { short_name: "eng-fiction" }),
    ("Chinese (simplified)", LanguageInfo { short_name: "chi-sim" }),
    ("French", LanguageInfo { short_name: "fre" }),
    ("German", LanguageInfo { short_name: "ger" }),
    ("Hebrew", LanguageInfo { short_name: "heb" }),
    ("Italian", LanguageInfo { short_name: "ita" }),
    ("Russian", LanguageInfo { short_name: "rus" }),
    ("Spanish", LanguageInfo { short_name: "spa" }),
];

/// Prefixes of the data files, which are split by n-gram starting characters
fn file_prefixes(ngram: u8) -> &'static [Box<str>] {
    static UNIGRAMS: OnceLock<Box<[Box<str>]>> = OnceLock::new();
    static NGRAMS: OnceLock<Box<[Box<str>]>> = OnceLock::new();
    let digits = || ('0'..='9').map(|c| Box::<str>::from(c.to_string()));
    if ngram == 1 {
        UNIGRAMS.get_or_init(|| {
            digits()
                .chain(('a'..='z').map(|c| Box::<str>::from(c.to_string())))
                .chain(["other", "pos", "punctuation"].map(Box::<str>::from))
                .collect()
        })
    } else {
        NGRAMS.get_or_init(|| {
            const TAGS: [&str; 10] = [
                "ADJ", "ADP", "ADV", "CONJ", "DET", "NOUN", "NUM", "PRON", "PRT", "VERB",
            ];
            digits()
                .chain(TAGS.iter().map(|tag| Box::<str>::from(format!("_{tag}_"))))
                .chain(('a'..='z').flat_map(|first| {
                    std::iter::once('_')
                        .chain('a'..='z')
                        .map(move |second| Box::<str>::from(format!("{first}{second}")))
                }))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(get("eng-fiction").unwrap().short_name, "eng-fiction");
        assert_eq!(pick(Some("fre")).unwrap(), LanguageInfo { short_name: "fre" });
        assert!(get("klingon").is_err());
    }

    #[test]
    fn unigram_urls() {
        let urls = get("eng").unwrap().dataset_urls(1).collect::<Vec<_>>();
        assert_eq!(urls.len(), 10 + 26 + 3);
        assert_eq!(
            &*urls[0],
            "http://storage.googleapis.com/books/ngrams/books/googlebooks-eng-all-1gram-20120701-0.gz"
        );
        assert!(urls.iter().any(|url| url.ends_with("-1gram-20120701-q.gz")));
        assert!(urls.iter().any(|url| url.ends_with("-punctuation.gz")));
    }

    #[test]
    fn ngram_urls() {
        let urls = get("ger").unwrap().dataset_urls(3).collect::<Vec<_>>();
        assert_eq!(urls.len(), 10 + 10 + 26 * 27);
        assert!(urls.iter().all(|url| url.contains("googlebooks-ger-all-3gram-20120701-")));
        assert!(urls.iter().any(|url| url.ends_with("-_NOUN_.gz")));
        assert!(urls.iter().any(|url| url.ends_with("-a_.gz")));
        assert!(urls.iter().any(|url| url.ends_with("-zz.gz")));
        assert!(!urls.iter().any(|url| url.ends_with("-other.gz")));
    }

    #[test]
    #[should_panic]
    fn no_sixgrams() {
        get("eng").unwrap().dataset_urls(6).count();
    }
}
