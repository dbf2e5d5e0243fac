pub mod bank;
pub mod engine;
pub mod errors;
pub mod scores;
pub mod session;
pub mod timer;

use async_trait::async_trait;

use errors::PresentationFailure;

/// A single multiple-choice question. Immutable after load; sessions keep a
/// clone of the question they are showing rather than re-deriving it by index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub prompt: String,
    /// Reading-comprehension questions carry the passage they refer to.
    pub passage: Option<String>,
    pub options: Vec<String>,
    /// Canonical 0-based index, normalized once at load time.
    pub correct: usize,
    pub explanation: Option<String>,
}

impl Question {
    pub fn correct_letter(&self) -> Letter {
        // the bank rejects questions whose index is out of range
        Letter::ALL[self.correct]
    }
}

/// One of the four answer buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Letter> {
        Self::ALL.get(index).copied()
    }

    pub fn parse(text: &str) -> Option<Letter> {
        match text.trim() {
            "A" | "a" => Some(Letter::A),
            "B" | "b" => Some(Letter::B),
            "C" | "c" => Some(Letter::C),
            "D" | "d" => Some(Letter::D),
            _ => None,
        }
    }
}

impl std::fmt::Display for Letter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
        };
        write!(f, "{letter}")
    }
}

/// Chat user identifier; sessions and leaderboard records are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlayerId(pub i64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a message the transport delivered. The engine only keeps
/// these around to edit or delete its own UI later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef(pub i64);

/// Comment band for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    Excellent,
    Great,
    Good,
    Average,
    NeedsPractice,
}

impl ScoreTier {
    pub fn for_percent(percent: u32) -> ScoreTier {
        if percent >= 90 {
            ScoreTier::Excellent
        } else if percent >= 75 {
            ScoreTier::Great
        } else if percent >= 60 {
            ScoreTier::Good
        } else if percent >= 40 {
            ScoreTier::Average
        } else {
            ScoreTier::NeedsPractice
        }
    }
}

/// Everything the engine asks the presentation layer to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowQuestion {
        /// 0-based; renderers display `index + 1`.
        index: usize,
        total: usize,
        prompt: String,
        passage: Option<String>,
        options: Vec<String>,
    },
    ShowTimerTick {
        remaining_secs: u64,
        total_secs: u64,
    },
    ShowFeedback {
        was_correct: bool,
        /// `None` when the question timed out.
        chosen: Option<Letter>,
        chosen_text: Option<String>,
        correct: Letter,
        correct_text: String,
        explanation: Option<String>,
    },
    ShowResults {
        score: u32,
        total: usize,
        percent: u32,
        tier: ScoreTier,
    },
    ShowPausedControls,
}

/// The messaging port. Implementations render effects for one chat platform;
/// the engine never sees platform types, only these three operations.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, user: PlayerId, effect: &Effect) -> Result<MessageRef, PresentationFailure>;

    async fn edit(
        &self,
        user: PlayerId,
        message: MessageRef,
        effect: &Effect,
    ) -> Result<(), PresentationFailure>;

    async fn delete(&self, user: PlayerId, message: MessageRef) -> Result<(), PresentationFailure>;
}
