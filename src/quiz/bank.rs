use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::quiz::errors::{BankError, QuizError};
use crate::quiz::{Letter, Question};

/// Which countdown a collection's questions run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Standard,
    Reading,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub kind: CollectionKind,
    pub questions: Vec<Question>,
}

/// All question collections, loaded once at process start and read-only
/// afterwards. Standard levels keep their own keys ("A1".."C2"); reading
/// collections are stored under "reading_<LEVEL>".
pub struct QuestionBank {
    collections: HashMap<String, Collection>,
}

/// A question as it appears in the data files. The `correct` field has
/// accumulated three encodings over time (0-based number, letter string,
/// full answer text) and some records use `answer` instead; everything is
/// normalized to one index here and never re-interpreted later.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "text")]
    question: String,
    #[serde(default)]
    passage: Option<String>,
    options: Vec<String>,
    #[serde(default)]
    correct: Option<CorrectField>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorrectField {
    Index(i64),
    Text(String),
}

type RawCollections = HashMap<String, Vec<RawQuestion>>;

impl QuestionBank {
    pub fn from_files(
        questions: impl AsRef<Path>,
        reading: impl AsRef<Path>,
    ) -> Result<Self, BankError> {
        let standard: RawCollections =
            serde_json::from_reader(BufReader::new(File::open(questions)?))?;
        let reading: RawCollections = serde_json::from_reader(BufReader::new(File::open(reading)?))?;
        Self::build(standard, reading)
    }

    pub fn from_json(questions: &str, reading: &str) -> Result<Self, BankError> {
        Self::build(serde_json::from_str(questions)?, serde_json::from_str(reading)?)
    }

    fn build(standard: RawCollections, reading: RawCollections) -> Result<Self, BankError> {
        let mut collections = HashMap::new();
        for (key, raws) in standard {
            let questions = adapt_collection(&key, raws);
            if questions.is_empty() {
                return Err(BankError::EmptyCollection(key));
            }
            collections.insert(key, Collection { kind: CollectionKind::Standard, questions });
        }
        for (level, raws) in reading {
            let key = format!("reading_{level}");
            let questions = adapt_collection(&key, raws);
            if questions.is_empty() {
                return Err(BankError::EmptyCollection(key));
            }
            collections.insert(key, Collection { kind: CollectionKind::Reading, questions });
        }
        Ok(Self { collections })
    }

    pub fn questions_for(&self, key: &str) -> Result<&Collection, QuizError> {
        self.collections
            .get(key)
            .ok_or_else(|| QuizError::UnknownLevel(key.to_string()))
    }

    pub fn question(&self, key: &str, index: usize) -> Option<&Question> {
        self.collections.get(key).and_then(|c| c.questions.get(index))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.collections.contains_key(key)
    }
}

fn adapt_collection(key: &str, raws: Vec<RawQuestion>) -> Vec<Question> {
    raws.into_iter()
        .filter_map(|raw| match adapt_question(raw) {
            Ok(question) => Some(question),
            Err(reason) => {
                warn!("dropping question in {key:?}: {reason}");
                None
            }
        })
        .collect()
}

fn adapt_question(raw: RawQuestion) -> Result<Question, String> {
    if raw.options.len() < 2 || raw.options.len() > Letter::ALL.len() {
        return Err(format!(
            "{:?}: expected 2..=4 options, got {}",
            raw.question,
            raw.options.len()
        ));
    }
    let correct = normalize(&raw)
        .ok_or_else(|| format!("{:?}: correct answer not recognized", raw.question))?;
    if correct >= raw.options.len() {
        return Err(format!("{:?}: correct index {correct} out of range", raw.question));
    }
    Ok(Question {
        prompt: raw.question,
        passage: raw.passage,
        options: raw.options,
        correct,
        explanation: raw.explanation,
    })
}

/// Resolution order mirrors the historical data variants: an `answer` letter
/// wins, then an `answer` matching an option's text, then a numeric
/// `correct`, then a `correct` letter or option text.
fn normalize(raw: &RawQuestion) -> Option<usize> {
    if let Some(answer) = &raw.answer {
        if let Some(letter) = Letter::parse(answer) {
            return Some(letter.index());
        }
        if let Some(index) = position_of(&raw.options, answer) {
            return Some(index);
        }
    }
    match &raw.correct {
        Some(CorrectField::Index(index)) => usize::try_from(*index).ok(),
        Some(CorrectField::Text(text)) => Letter::parse(text)
            .map(Letter::index)
            .or_else(|| position_of(&raw.options, text)),
        None => None,
    }
}

fn position_of(options: &[String], answer: &str) -> Option<usize> {
    options
        .iter()
        .position(|option| option.trim().eq_ignore_ascii_case(answer.trim()))
}
