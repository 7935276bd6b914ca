//! Queue selection for worker pools.

use queue_backend::{Priority, QueueConfig};
use serde::{Deserialize, Serialize};

/// Which queues a worker pool consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum QueueSelector {
    /// Exact queue names
    ByName(Vec<String>),
    /// Queues whose default priority is in the set
    ByPriorities(Vec<Priority>),
    /// Queues carrying at least one of these labels
    ByLabels(Vec<String>),
}

impl QueueSelector {
    /// Single queue by name.
    pub fn queue(name: impl Into<String>) -> Self {
        Self::ByName(vec![name.into()])
    }

    /// Resolve the selector against the configured queues.
    ///
    /// `ByName` keeps its order (including names without a stored config);
    /// the other selectors return matches in the backend's listing order.
    pub fn resolve(&self, configs: &[QueueConfig]) -> Vec<String> {
        match self {
            Self::ByName(names) => names.clone(),
            Self::ByPriorities(priorities) => configs
                .iter()
                .filter(|config| priorities.contains(&config.default_priority))
                .map(|config| config.name.clone())
                .collect(),
            Self::ByLabels(labels) => configs
                .iter()
                .filter(|config| config.labels.iter().any(|label| labels.contains(label)))
                .map(|config| config.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> Vec<QueueConfig> {
        let mut critical = QueueConfig::new("alerts");
        critical.default_priority = Priority::Critical;
        vec![
            critical,
            QueueConfig::new("emails").with_labels(vec!["notifications".into()]),
            QueueConfig::new("reports").with_labels(vec!["batch".into()]),
        ]
    }

    #[test]
    fn test_by_name_keeps_order() {
        let selector = QueueSelector::ByName(vec!["b".into(), "a".into()]);
        assert_eq!(selector.resolve(&configs()), vec!["b", "a"]);
    }

    #[test]
    fn test_by_priorities() {
        let selector = QueueSelector::ByPriorities(vec![Priority::Critical]);
        assert_eq!(selector.resolve(&configs()), vec!["alerts"]);
    }

    #[test]
    fn test_by_labels() {
        let selector = QueueSelector::ByLabels(vec!["batch".into(), "notifications".into()]);
        assert_eq!(selector.resolve(&configs()), vec!["emails", "reports"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let selector = QueueSelector::ByLabels(vec!["missing".into()]);
        assert!(selector.resolve(&configs()).is_empty());
    }

    #[test]
    fn test_selector_serde() {
        let selector = QueueSelector::queue("emails");
        let encoded = serde_json::to_string(&selector).unwrap();
        assert_eq!(encoded, r#"{"kind":"by_name","value":["emails"]}"#);
    }
}
