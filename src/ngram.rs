//! Parsing of individual dataset lines
//!
//! Each line of a data file is a yearly record about one n-gram, made of
//! whitespace-separated fields: the n-gram's tokens, then the year, the number
//! of occurences that year and the number of books with occurences that year.
//!
//! Tokens can be plain words (`cat`), words with a grammar tag (`cat_NOUN`),
//! or bare grammar tags standing for any word of that kind (`_NOUN_`).

use crate::{DocumentFrequency, TermFrequency, Year};
use std::{
    fmt,
    num::{IntErrorKind, ParseIntError},
    str::Utf8Error,
};
use thiserror::Error;

/// Token of an n-gram
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Token {
    /// Word, with its dataset casing
    ///
    /// Empty for tag-only tokens.
    pub surface: Box<str>,

    /// Grammar tag, if any
    pub pos: Option<Box<str>>,
}
//
impl Token {
    /// Parse a token, or tell that it doesn't look like one
    pub fn parse(token: &str) -> Option<Self> {
        match TokenShape::classify(token) {
            TokenShape::Word { surface, tag } => Some(Self {
                surface: surface.into(),
                pos: tag.map(Into::into),
            }),
            TokenShape::TagOnly(tag) => Some(Self {
                surface: "".into(),
                pos: Some(tag.into()),
            }),
            TokenShape::Unrecognized => None,
        }
    }
}
//
impl fmt::Display for Token {
    /// Display the token in dataset syntax
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&*self.surface, &self.pos) {
            ("", Some(tag)) => write!(f, "_{tag}_"),
            (word, Some(tag)) => write!(f, "{word}_{tag}"),
            (word, None) => f.write_str(word),
        }
    }
}

/// Syntactic shape of a token
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenShape<'token> {
    /// Word with an optional trailing `_TAG`
    Word {
        surface: &'token str,
        tag: Option<&'token str>,
    },

    /// Bare `_TAG_`
    TagOnly(&'token str),

    /// Not a token (e.g. empty string)
    Unrecognized,
}
//
impl<'token> TokenShape<'token> {
    /// Determine the shape of a token
    pub fn classify(token: &'token str) -> Self {
        if token.is_empty() {
            return Self::Unrecognized;
        }

        // A bare tag is 1+ uppercase ASCII letters between underscores...
        if let Some(tag) = token
            .strip_prefix('_')
            .and_then(|rest| rest.strip_suffix('_'))
            .filter(|tag| is_tag(tag))
        {
            return Self::TagOnly(tag);
        }

        // ...while a tagged word ends with an underscore and a tag. The tag
        // cannot contain underscores, so it must follow the last one.
        if let Some((surface, tag)) = token.rsplit_once('_') {
            if !surface.is_empty() && is_tag(tag) {
                return Self::Word {
                    surface,
                    tag: Some(tag),
                };
            }
        }

        // Anything else is an untagged word, odd underscores included
        Self::Word {
            surface: token,
            tag: None,
        }
    }
}

/// Truth that a string is a well-formed grammar tag
fn is_tag(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Yearly record about an n-gram
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// Tokens of the n-gram
    pub tokens: Box<[Token]>,

    /// Identity of the n-gram
    ///
    /// Records with equal keys are about the same n-gram.
    pub key: Box<str>,

    /// Year on which the data was recorded
    pub year: Year,

    /// Number of recorded occurences
    pub term_frequency: TermFrequency,

    /// Number of books across which occurences were recorded
    pub document_frequency: DocumentFrequency,
}
//
impl Record {
    /// Parse a dataset line
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        let [ngram @ .., year, term_frequency, document_frequency] = &fields[..] else {
            return Err(ParseError::TooFewFields(fields.len()));
        };
        let year = year.parse::<Year>().map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                ParseError::UnrepresentableYear((*year).into())
            }
            _ => ParseError::Year((*year).into(), e),
        })?;
        let term_frequency = term_frequency
            .parse::<TermFrequency>()
            .map_err(|e| ParseError::TermFrequency((*term_frequency).into(), e))?;
        let document_frequency = document_frequency
            .parse::<DocumentFrequency>()
            .map_err(|e| ParseError::DocumentFrequency((*document_frequency).into(), e))?;

        // Tokens that don't look like tokens are left out of the n-gram
        let tokens = ngram
            .iter()
            .filter_map(|token| Token::parse(token))
            .collect::<Box<[_]>>();
        if tokens.is_empty() {
            return Err(ParseError::NoNgram);
        }
        let key = ngram_key(&tokens);
        Ok(Self {
            tokens,
            key,
            year,
            term_frequency,
            document_frequency,
        })
    }
}

/// Serialize n-gram tokens into a key that identifies the n-gram
pub fn ngram_key(tokens: &[Token]) -> Box<str> {
    tokens
        .iter()
        .map(Token::to_string)
        .collect::<Vec<_>>()
        .join(" ")
        .into()
}

/// Reasons why a dataset line could not be parsed
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    /// Year, term frequency and document frequency are all mandatory
    #[error("expected an n-gram followed by year, term frequency and document frequency, found {0} fields")]
    TooFewFields(usize),

    #[error("invalid year {0:?}")]
    Year(Box<str>, #[source] ParseIntError),

    /// The year is an integer, but too far from the present to be studied
    #[error("year {0} is out of the supported range")]
    UnrepresentableYear(Box<str>),

    #[error("invalid term frequency {0:?}")]
    TermFrequency(Box<str>, #[source] ParseIntError),

    #[error("invalid document frequency {0:?}")]
    DocumentFrequency(Box<str>, #[source] ParseIntError),

    /// The line has numeric fields, but nothing before them
    #[error("no n-gram before the numeric fields")]
    NoNgram,

    /// The line is not text
    #[error("line is not valid UTF-8")]
    Encoding(#[source] Utf8Error),
}
