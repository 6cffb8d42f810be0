// Which detection labels get censored
use std::collections::HashSet;

/// Labels censored when none are configured
pub const DEFAULT_CENSORED_LABELS: &[&str] = &[
    "EXPOSED_GENITALIA_F",
    "COVERED_GENITALIA_F",
    "EXPOSED_BREAST_F",
    "EXPOSED_BUTTOCKS",
];

/// Immutable set of labels that trigger an overlay.
/// An empty policy censors nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    labels: HashSet<String>,
}

impl LabelPolicy {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Configured labels, sorted
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CENSORED_LABELS.iter().copied())
    }
}
