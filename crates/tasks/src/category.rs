//! Keyword categorization.

use taskbridge_queue::Category;

/// A category and the words or phrases that select it.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub category: Category,
    /// Lowercase. Single words match whole words; multi-word entries match
    /// the same words in sequence.
    pub keywords: &'static [&'static str],
}

/// Checked in order, first match wins. Anything unmatched is
/// [`Category::General`].
pub const RULES: &[Rule] = &[
    Rule {
        category: Category::Code,
        keywords: &[
            "code",
            "script",
            "bug",
            "debug",
            "function",
            "compile",
            "deploy",
            "refactor",
            "program",
            "api",
            "regex",
            "sql",
            "repo",
            "repository",
            "commit",
            "implement",
            "unit test",
            "pull request",
        ],
    },
    Rule {
        category: Category::Research,
        keywords: &[
            "research",
            "investigate",
            "compare",
            "analyze",
            "analyse",
            "summarize",
            "summarise",
            "article",
            "paper",
            "find out",
            "look up",
            "look into",
            "learn about",
            "what is",
            "how does",
        ],
    },
    Rule {
        category: Category::Reminder,
        keywords: &[
            "remind",
            "reminder",
            "remember to",
            "don't forget",
            "dont forget",
            "deadline",
            "appointment",
            "tomorrow",
            "tonight",
            "schedule",
        ],
    },
    Rule {
        category: Category::Note,
        keywords: &[
            "note", "notes", "idea", "jot", "memo", "journal", "thought", "write down",
        ],
    },
];

/// Classify a message body.
#[must_use]
pub fn categorize(body: &str) -> Category {
    categorize_with(body, RULES)
}

#[must_use]
pub fn categorize_with(body: &str, rules: &[Rule]) -> Category {
    let words = tokenize(body);
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| contains_phrase(&words, kw)))
        .map_or(Category::General, |rule| rule.category)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}
