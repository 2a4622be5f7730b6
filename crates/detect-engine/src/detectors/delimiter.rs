//! Detects delimiter-based context escapes: fake system boundaries,
//! SQL-style injection, code-comment smuggling, and delimiter walls.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::DetectionMode;
use crate::detector::{all_matches, compiled, Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

/// Corroborating keywords shared by the gated categories. In balanced mode a
/// delimiter match only fires when one of these appears somewhere in the
/// input.
const ATTACK_KEYWORDS: [&str; 19] = [
    "ignore",
    "disregard",
    "forget",
    "bypass",
    "override",
    "admin",
    "root",
    "system",
    "sudo",
    "privilege",
    "reveal",
    "show",
    "display",
    "leak",
    "expose",
    "execute",
    "run",
    "eval",
    "command",
];

pub struct DelimiterDetector {
    mode: DetectionMode,
    /// Fake context switches such as `---END SYSTEM---`. The trailing
    /// context word is optional so bare `---END ...---` markers still count.
    system_boundary: Regex,
    /// `/* ... */`, `--`, `#`, `//` comment smuggling.
    code_comment: Regex,
    /// `'; DROP TABLE ...--` and friends.
    sql_style: Regex,
    /// Runs of stacked delimiter tokens.
    excessive: Regex,
}

impl DelimiterDetector {
    pub fn new(mode: DetectionMode) -> Self {
        Self {
            mode,
            system_boundary: compiled(
                r"(?i)(?:---|===|###)\s*(?:end|begin|start|stop)\s*(?:system|prompt|context|instructions?|user|assistant)?",
            ),
            code_comment: compiled(r"(?:/\*|\*/|--|#|//)\s*\w+"),
            sql_style: compiled(
                r"(?i)[';]\s*(?:DROP|SELECT|INSERT|UPDATE|DELETE|OR\s+\d+=\d+).*?(?:--|/\*|#)",
            ),
            excessive: compiled(r"(?:---|===|###|\*\*\*){2,}"),
        }
    }

    /// Balanced mode only trusts a delimiter hit when an attack keyword
    /// corroborates it; aggressive mode takes every hit at face value.
    fn corroborated(&self, input_lower: &str) -> bool {
        self.mode == DetectionMode::Aggressive
            || ATTACK_KEYWORDS.iter().any(|kw| input_lower.contains(kw))
    }
}

impl Detector for DelimiterDetector {
    fn name(&self) -> &'static str {
        "delimiter"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let input_lower = input.to_lowercase();
        let corroborated = self.corroborated(&input_lower);
        let mut fold = PatternFold::new();

        // SQL-style injection is flagged regardless of mode.
        let matches = all_matches(&self.sql_style, input);
        if !matches.is_empty() {
            fold.push(PatternKind::DelimiterSqlStyle, 0.95, matches);
        }

        let matches = all_matches(&self.system_boundary, input);
        if !matches.is_empty() && corroborated {
            fold.push(PatternKind::DelimiterSystemBoundary, 0.90, matches);
        }

        let matches = all_matches(&self.code_comment, input);
        if !matches.is_empty() && corroborated {
            fold.push(PatternKind::DelimiterCodeComment, 0.75, matches);
        }

        let matches = all_matches(&self.excessive, input);
        if !matches.is_empty() && corroborated {
            fold.push(PatternKind::DelimiterExcessive, 0.75, matches);
        }

        fold.into_result()
    }
}
