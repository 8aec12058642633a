//! Reconcile expected output lines against what a step actually printed.
use std::fmt;

/// How a single expected line is compared to an actual line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    Substring,
}

/// Whether expected lines must be found in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchOrder {
    #[default]
    Sequential,
    None,
}

impl MatchMode {
    pub const VALID: &'static [&'static str] = &["exact", "substring"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "exact" => Some(Self::Exact),
            "substring" => Some(Self::Substring),
            _ => None,
        }
    }

    fn accepts(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Exact => actual == expected,
            Self::Substring => actual.contains(expected),
        }
    }
}

impl MatchOrder {
    pub const VALID: &'static [&'static str] = &["sequential", "none"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sequential" => Some(Self::Sequential),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
        })
    }
}

impl fmt::Display for MatchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::None => "none",
        })
    }
}

/// Result of matching one output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Actual line index consumed by each expected line, in declaration order.
    pub positions: Vec<Option<usize>>,
    /// Expected lines with no remaining actual line to satisfy them.
    pub missing: Vec<String>,
    /// Some expected lines were found, but not in declaration order.
    pub out_of_order: bool,
    matched: Vec<bool>,
}

impl MatchOutcome {
    pub fn success(&self) -> bool {
        self.missing.is_empty() && !self.out_of_order
    }

    /// Whether the actual line at `index` satisfied some expected line.
    pub fn is_matched(&self, index: usize) -> bool {
        self.matched.get(index).copied().unwrap_or(false)
    }
}

/// Match `expected` against `actual`.
///
/// Each actual line can satisfy at most one expected line. Consumed lines are
/// blanked rather than removed so positions stay in the input index space
/// for the ordering check and the report.
pub fn match_lines<S: AsRef<str>>(
    expected: &[String],
    actual: &[S],
    mode: MatchMode,
    order: MatchOrder,
) -> MatchOutcome {
    let mut remaining: Vec<Option<&str>> = actual.iter().map(|line| Some(line.as_ref())).collect();
    let mut positions = Vec::with_capacity(expected.len());
    let mut missing = Vec::new();

    for want in expected {
        let found = remaining
            .iter()
            .position(|line| line.is_some_and(|line| mode.accepts(line, want)));
        match found {
            Some(index) => {
                remaining[index] = None;
                positions.push(Some(index));
            }
            None => {
                missing.push(want.clone());
                positions.push(None);
            }
        }
    }

    let out_of_order = order == MatchOrder::Sequential
        && positions
            .iter()
            .flatten()
            .zip(positions.iter().flatten().skip(1))
            .any(|(earlier, later)| later < earlier);

    let mut matched = vec![false; actual.len()];
    for index in positions.iter().flatten() {
        matched[*index] = true;
    }

    MatchOutcome {
        positions,
        missing,
        out_of_order,
        matched,
    }
}
