//! Heuristic content analysis for model suggestion
//!
//! Scores a content sample along four independent modalities (text, code,
//! structured data, errors) and extracts the boolean features the scoring
//! engine keys on. Pure pattern matching, no I/O and no state.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Scale applied to the raw code score before clipping
const CODE_SCORE_WEIGHT: f64 = 1.5;

/// Divisor turning error and stack-trace hits into a score
const ERROR_HIT_NORMALIZER: f64 = 10.0;

/// Structured score at which content counts as structured data
const STRUCTURED_FEATURE_THRESHOLD: f64 = 0.25;

/// Content modality axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Modality {
    Text,
    Code,
    Structured,
    Errors,
}

/// Per-modality scores, also used as a family affinity vector
///
/// Scores are independent and do not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityScores {
    pub text: f64,
    pub code: f64,
    pub structured: f64,
    pub errors: f64,
}

impl ModalityScores {
    /// Neutral affinity, 1.0 on every axis
    pub const NEUTRAL: Self = Self {
        text: 1.0,
        code: 1.0,
        structured: 1.0,
        errors: 1.0,
    };

    /// Value on one axis
    pub const fn get(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Text => self.text,
            Modality::Code => self.code,
            Modality::Structured => self.structured,
            Modality::Errors => self.errors,
        }
    }

    /// Mutable value on one axis
    pub const fn get_mut(&mut self, modality: Modality) -> &mut f64 {
        match modality {
            Modality::Text => &mut self.text,
            Modality::Code => &mut self.code,
            Modality::Structured => &mut self.structured,
            Modality::Errors => &mut self.errors,
        }
    }

    /// Dot product with another vector
    pub fn dot(&self, other: &Self) -> f64 {
        self.text * other.text + self.code * other.code + self.structured * other.structured + self.errors * other.errors
    }

    /// Whether every component is finite and non-negative
    pub fn is_valid(&self) -> bool {
        [self.text, self.code, self.structured, self.errors]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Coarse content length class
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LengthBucket {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl LengthBucket {
    /// Position of the bucket on a 0.2 to 1.0 scale
    pub const fn scale(self) -> f64 {
        match self {
            Self::Xs => 0.2,
            Self::S => 0.4,
            Self::M => 0.6,
            Self::L => 0.8,
            Self::Xl => 1.0,
        }
    }
}

/// Bucket a content length using the fixed 500/2000/5000/10000 boundaries
pub const fn length_bucket(len: usize) -> LengthBucket {
    match len {
        0..500 => LengthBucket::Xs,
        500..2_000 => LengthBucket::S,
        2_000..5_000 => LengthBucket::M,
        5_000..10_000 => LengthBucket::L,
        _ => LengthBucket::Xl,
    }
}

/// Structural features of a sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ContentFeatures {
    /// Fenced block or at least two code constructs
    pub has_code_snippet: bool,
    /// Table, markup, or JSON-shaped content
    pub has_structured_data: bool,
    /// Any word from the error vocabulary
    pub has_error_keywords: bool,
    /// At least one stack-trace frame
    pub has_stack_trace: bool,
    /// Number of fenced code blocks
    pub code_blocks: usize,
    /// Sample length in characters
    pub char_count: usize,
}

/// Combined result of one analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct ContentAnalysis {
    pub scores: ModalityScores,
    pub features: ContentFeatures,
}

// -- Regex patterns compiled once via LazyLock --

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?(?:```|\z)").unwrap());

static CODE_PATTERN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:function|def|class|fn|func|interface|struct)\s+[A-Za-z_]\w*",
        r"(?m)^\s*(?:import|from|use|#include|require)\b",
        r"\b(?:if|for|while|switch|catch|elif)\s*\(",
        r"\b(?:else|try|finally|do)\s*\{",
        r"(?:=>|->)\s*\{",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Structured-data patterns with (score per match, cap)
static STRUCTURED_RES: LazyLock<Vec<(Regex, f64, f64)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\{[^{}]*\}").unwrap(), 0.15, 0.4),
        (Regex::new(r"\[[^\[\]]*\]").unwrap(), 0.1, 0.3),
        (Regex::new(r"(?m)^[ \t]*\|[^\n]*\|[ \t]*$").unwrap(), 0.1, 0.3),
        (
            Regex::new(r"<[A-Za-z][\w:-]*(?:\s[^<>]*)?>[^<]*</[A-Za-z][\w:-]*\s*>").unwrap(),
            0.1,
            0.3,
        ),
    ]
});

static ERROR_VOCAB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:errors?|exceptions?|failed|failure|crash(?:ed)?|traceback|fatal|panic(?:ked)?|segfault|abort(?:ed)?|denied|refused|timeout|undefined)\b",
    )
    .unwrap()
});

static STACK_TRACE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bat\s+[\w.$<>\[\]]+\s+\([^()\n]*:\d+(?::\d+)?\)",
        r#"File "[^"]+", line \d+"#,
        r"\bat\s+[\w.$]+\([\w$]+\.(?:java|kt|scala):\d+\)",
        r"panicked at [^\n]*:\d+:\d+",
        r"(?m)^\s*at\s+\S+:\d+:\d+\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Score a sample along the four modalities
pub fn analyze(sample: &str) -> ModalityScores {
    analyze_content(sample).scores
}

/// Extract structural features from a sample
pub fn extract_features(sample: &str) -> ContentFeatures {
    analyze_content(sample).features
}

/// Score a sample and extract its features in one pass
pub fn analyze_content(sample: &str) -> ContentAnalysis {
    let mut consumed = Coverage::new(sample.len());

    let code_blocks = count_into(&CODE_FENCE_RE, sample, &mut consumed);
    let code_patterns: usize = CODE_PATTERN_RES
        .iter()
        .map(|re| count_into(re, sample, &mut consumed))
        .sum();

    let mut structured = 0.0;
    for (re, per_match, cap) in STRUCTURED_RES.iter() {
        let hits = count_into(re, sample, &mut consumed);
        structured += (hits as f64 * per_match).min(*cap);
    }

    let vocabulary_hits = count_into(&ERROR_VOCAB_RE, sample, &mut consumed);
    let stack_hits: usize = STACK_TRACE_RES
        .iter()
        .map(|re| count_into(re, sample, &mut consumed))
        .sum();

    let raw_code = (code_blocks as f64 / 3.0).min(1.0) + (code_patterns as f64 / 5.0).min(2.0);
    let scores = ModalityScores {
        text: 1.0 - consumed.fraction(),
        code: clip(raw_code * CODE_SCORE_WEIGHT),
        structured: clip(structured),
        errors: clip((vocabulary_hits + stack_hits) as f64 / ERROR_HIT_NORMALIZER),
    };

    let features = ContentFeatures {
        has_code_snippet: code_blocks > 0 || code_patterns >= 2,
        has_structured_data: scores.structured >= STRUCTURED_FEATURE_THRESHOLD || looks_like_json(sample),
        has_error_keywords: vocabulary_hits > 0,
        has_stack_trace: stack_hits > 0,
        code_blocks,
        char_count: sample.chars().count(),
    };

    ContentAnalysis { scores, features }
}

/// Truncate to at most `limit` characters on a char boundary
pub fn truncate_sample(sample: &str, limit: usize) -> &str {
    sample.char_indices().nth(limit).map_or(sample, |(end, _)| &sample[..end])
}

fn looks_like_json(sample: &str) -> bool {
    let trimmed = sample.trim();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

const fn clip(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn count_into(re: &Regex, sample: &str, coverage: &mut Coverage) -> usize {
    let mut hits = 0;
    for found in re.find_iter(sample) {
        coverage.mark(found.range());
        hits += 1;
    }
    hits
}

/// Byte coverage of all matched regions
struct Coverage {
    bytes: Vec<bool>,
}

impl Coverage {
    fn new(len: usize) -> Self {
        Self { bytes: vec![false; len] }
    }

    fn mark(&mut self, range: Range<usize>) {
        for byte in &mut self.bytes[range] {
            *byte = true;
        }
    }

    fn fraction(&self) -> f64 {
        if self.bytes.is_empty() {
            return 0.0;
        }
        self.bytes.iter().filter(|b| **b).count() as f64 / self.bytes.len() as f64
    }
}
