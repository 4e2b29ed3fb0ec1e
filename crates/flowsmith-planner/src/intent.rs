//! Keyword-driven intent parsing.
//!
//! Turns a free-text request into an [`Intent`]: which action families it asks
//! for (with confidences), which sources and output channels it names, and how
//! often it should run. Parsing never fails; text with nothing recognisable
//! yields the zero-value intent.

use std::sync::LazyLock;

use regex::Regex;

use flowsmith_types::{DetectedAction, Intent};

/// Actions scoring below this are dropped after detection.
pub const ACTION_CONFIDENCE_THRESHOLD: f64 = 0.25;

/// Requests longer than this (in characters, after trimming) that match no
/// action get a synthetic `fetch` so planning has something to work with.
pub const FALLBACK_MIN_TEXT_LEN: usize = 10;

/// The synthetic action injected by the fallback rule.
pub const FALLBACK_ACTION: &str = "fetch";
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

const BASE_MATCH_SCORE: f64 = 0.8;
const MAX_POSITION_BONUS: f64 = 0.1;
const MAX_LENGTH_BONUS: f64 = 0.1;
const LENGTH_BONUS_PER_CHAR: f64 = 0.01;

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

/// One action with its synonyms. A hit's local score is multiplied by
/// `base_confidence`.
#[derive(Debug, Clone, Copy)]
pub struct ActionFamily {
    pub name: &'static str,
    pub base_confidence: f64,
    pub keywords: &'static [&'static str],
}

const ACTION_FAMILIES: &[ActionFamily] = &[
    ActionFamily {
        name: "fetch",
        base_confidence: 0.9,
        keywords: &[
            "fetch", "get", "retrieve", "pull", "download", "grab", "collect", "scrape",
            "read", "monitor", "watch", "track", "check",
        ],
    },
    ActionFamily {
        name: "summarize",
        base_confidence: 0.9,
        keywords: &[
            "summarize", "summarise", "summary", "summaries", "digest", "condense", "tldr",
            "recap", "shorten",
        ],
    },
    ActionFamily {
        name: "filter",
        base_confidence: 0.85,
        keywords: &["filter", "exclude", "only", "select", "matching", "keep only"],
    },
    ActionFamily {
        name: "transform",
        base_confidence: 0.8,
        keywords: &["transform", "convert", "format", "reformat", "clean", "normalize", "map"],
    },
    ActionFamily {
        name: "extract",
        base_confidence: 0.8,
        keywords: &["extract", "parse", "pick out", "pull out"],
    },
    ActionFamily {
        name: "analyze",
        base_confidence: 0.85,
        keywords: &[
            "analyze", "analyse", "analysis", "sentiment", "classify", "categorize",
            "categorise", "detect",
        ],
    },
    ActionFamily {
        name: "translate",
        base_confidence: 0.9,
        keywords: &["translate", "translation", "translated"],
    },
    ActionFamily {
        name: "notify",
        base_confidence: 0.85,
        keywords: &[
            "notify", "alert", "alerts", "remind", "ping", "notification", "notifications",
            "let me know", "tell me",
        ],
    },
    ActionFamily {
        name: "send",
        base_confidence: 0.85,
        keywords: &["send", "email", "post", "share", "forward", "deliver", "message", "text"],
    },
    ActionFamily {
        name: "store",
        base_confidence: 0.8,
        keywords: &["save", "store", "archive", "log", "record", "backup", "append", "write"],
    },
];

const SOURCES: &[(&str, &[&str])] = &[
    ("rss", &["rss", "feed", "feeds"]),
    ("blog", &["blog", "blogs", "blog posts"]),
    ("news", &["news", "headlines", "articles"]),
    ("web", &["website", "websites", "webpage", "web page", "site"]),
    ("api", &["api", "endpoint", "json"]),
    ("inbox", &["inbox", "emails", "my email"]),
    ("reddit", &["reddit", "subreddit"]),
    ("twitter", &["twitter", "tweets", "tweet"]),
    ("github", &["github", "repo", "repository", "issues"]),
    ("calendar", &["calendar", "meetings", "events"]),
    ("weather", &["weather", "forecast"]),
    ("stocks", &["stock", "stocks", "stock price", "crypto"]),
];

const OUTPUTS: &[(&str, &[&str])] = &[
    ("email", &["email", "e-mail", "mail", "gmail"]),
    ("slack", &["slack"]),
    ("sms", &["sms", "text message", "text me"]),
    ("discord", &["discord"]),
    ("telegram", &["telegram"]),
    ("webhook", &["webhook"]),
    ("sheets", &["google sheets", "spreadsheet", "sheet", "sheets"]),
    ("database", &["database", "db", "postgres", "mysql"]),
    ("file", &["file", "csv"]),
];

enum Frequency {
    Fixed(&'static str),
    EveryMinutes,
}

const FREQUENCY_PATTERNS: &[(Frequency, &str)] = &[
    (
        Frequency::Fixed("daily"),
        r"\b(?:daily|every day|each day|every morning|each morning|every evening|every night)\b",
    ),
    (Frequency::Fixed("hourly"), r"\b(?:hourly|every hour|each hour)\b"),
    (
        Frequency::Fixed("weekly"),
        r"\b(?:weekly|every week|each week|every (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
    ),
    (Frequency::Fixed("monthly"), r"\b(?:monthly|every month|each month)\b"),
    (Frequency::EveryMinutes, r"\bevery (\d+) (?:minutes?|mins?)\b"),
    (
        Frequency::Fixed("realtime"),
        r"\b(?:real[- ]?time|instantly|immediately|as soon as|whenever)\b",
    ),
    (Frequency::Fixed("once"), r"\b(?:once|one time|one-off)\b"),
];

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Keyword {
    text: &'static str,
    pattern: Regex,
}

impl Keyword {
    fn new(text: &'static str) -> Self {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(text)))
            .expect("escaped keyword is a valid pattern");
        Self { text, pattern }
    }
}

struct CompiledFamily {
    name: &'static str,
    base_confidence: f64,
    keywords: Vec<Keyword>,
}

/// Intent parser with its lexicon compiled once.
pub struct IntentParser {
    actions: Vec<CompiledFamily>,
    sources: Vec<(&'static str, Vec<Keyword>)>,
    outputs: Vec<(&'static str, Vec<Keyword>)>,
    frequencies: Vec<(&'static Frequency, Regex)>,
    threshold: f64,
}

static DEFAULT_PARSER: LazyLock<IntentParser> = LazyLock::new(IntentParser::new);

/// Parse `text` with the shared default lexicon.
pub fn parse_intent(text: &str) -> Intent {
    DEFAULT_PARSER.parse(text)
}

impl IntentParser {
    pub fn new() -> Self {
        Self::with_lexicon(ACTION_FAMILIES, ACTION_CONFIDENCE_THRESHOLD)
    }

    /// A parser with its own action families and drop threshold. Sources,
    /// outputs and frequencies keep the default lexicon.
    pub fn with_lexicon(families: &[ActionFamily], threshold: f64) -> Self {
        Self {
            actions: families
                .iter()
                .map(|f| CompiledFamily {
                    name: f.name,
                    base_confidence: f.base_confidence,
                    keywords: f.keywords.iter().map(|k| Keyword::new(*k)).collect(),
                })
                .collect(),
            sources: compile_lexicon(SOURCES),
            outputs: compile_lexicon(OUTPUTS),
            frequencies: FREQUENCY_PATTERNS
                .iter()
                .map(|(freq, pat)| {
                    (freq, Regex::new(pat).expect("frequency pattern is valid"))
                })
                .collect(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn parse(&self, text: &str) -> Intent {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Intent {
                raw: text.to_string(),
                ..Intent::default()
            };
        }

        let mut actions = self.detect_actions(&normalized);
        let sources = detect_names(&self.sources, &normalized);
        let outputs = detect_names(&self.outputs, &normalized);
        let frequency = self.detect_frequency(&normalized);

        let average = if actions.is_empty() {
            0.0
        } else {
            actions.iter().map(|a| a.confidence).sum::<f64>() / actions.len() as f64
        };
        let completeness = match (sources.is_empty(), outputs.is_empty()) {
            (false, false) => 0.10,
            (false, true) | (true, false) => 0.05,
            (true, true) => 0.0,
        };
        let confidence = (average + completeness).min(1.0);

        let before = actions.len();
        actions.retain(|a| a.confidence >= self.threshold);
        let dropped = before - actions.len();
        if dropped > 0 {
            tracing::debug!(dropped, threshold = self.threshold, "Dropped low-confidence actions");
        }

        if actions.is_empty() && normalized.chars().count() > FALLBACK_MIN_TEXT_LEN {
            tracing::debug!(
                action = FALLBACK_ACTION,
                confidence = FALLBACK_CONFIDENCE,
                "No actions recognised; injecting fallback action"
            );
            actions.push(DetectedAction::new(FALLBACK_ACTION, FALLBACK_CONFIDENCE));
        }

        tracing::debug!(
            actions = actions.len(),
            sources = sources.len(),
            outputs = outputs.len(),
            frequency = frequency.as_deref().unwrap_or("none"),
            confidence,
            "Parsed intent"
        );

        Intent {
            actions,
            sources,
            outputs,
            frequency,
            confidence,
            raw: text.to_string(),
        }
    }

    fn detect_actions(&self, text: &str) -> Vec<DetectedAction> {
        let len = text.len() as f64;
        let mut actions: Vec<DetectedAction> = self
            .actions
            .iter()
            .filter_map(|family| {
                let best = family
                    .keywords
                    .iter()
                    .filter_map(|kw| {
                        kw.pattern
                            .find(text)
                            .map(|m| match_score(m.start() as f64, len, kw.text))
                    })
                    .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
                Some(DetectedAction::new(family.name, family.base_confidence * best))
            })
            .collect();
        actions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        actions
    }

    fn detect_frequency(&self, text: &str) -> Option<String> {
        self.frequencies.iter().find_map(|(freq, re)| {
            let caps = re.captures(text)?;
            match freq {
                Frequency::Fixed(name) => Some((*name).to_string()),
                Frequency::EveryMinutes => {
                    caps.get(1).map(|n| format!("every_{}_minutes", n.as_str()))
                }
            }
        })
    }
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Local score for one keyword hit: earlier and longer keywords score higher.
fn match_score(position: f64, text_len: f64, keyword: &str) -> f64 {
    let position_bonus = if text_len > 0.0 {
        MAX_POSITION_BONUS * (1.0 - position / text_len)
    } else {
        0.0
    };
    let length_bonus = (keyword.len() as f64 * LENGTH_BONUS_PER_CHAR).min(MAX_LENGTH_BONUS);
    (BASE_MATCH_SCORE + position_bonus + length_bonus).min(1.0)
}

fn compile_lexicon(
    list: &[(&'static str, &'static [&'static str])],
) -> Vec<(&'static str, Vec<Keyword>)> {
    list.iter()
        .map(|(name, kws)| (*name, kws.iter().map(|k| Keyword::new(*k)).collect()))
        .collect()
}

fn detect_names(lexicon: &[(&'static str, Vec<Keyword>)], text: &str) -> Vec<String> {
    lexicon
        .iter()
        .filter(|(_, kws)| kws.iter().any(|kw| kw.pattern.is_match(text)))
        .map(|(name, _)| (*name).to_string())
        .collect()
}
