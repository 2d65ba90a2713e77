use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::finding::Severity;

/// The operation family a rule belongs to.
///
/// Every intercepted call is evaluated under exactly one category, and all
/// findings it produces are filtered by that category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Object creation, destruction, allocation and freeing.
    ObjectLifecycle,
    /// Begin, end and reset of command buffers.
    CommandBuffer,
    /// Copies, clears, blits and resolves.
    Transfer,
    /// Draws and dispatches.
    Draw,
    Barrier,
    /// Pipeline, descriptor, vertex/index buffer and dynamic state binding.
    Bind,
    RenderPass,
    /// Secondary command buffer execution.
    Execute,
    /// Queue submission and completion.
    Submit,
}

/// The configuration read interface.
///
/// The host owns configuration loading; the validator only asks whether a
/// category (and severity) should be reported.
pub trait RuleFilter: Send + Sync {
    /// Whether the validator should run at all.
    fn validation_enabled(&self) -> bool {
        true
    }

    fn is_enabled(&self, category: RuleCategory) -> bool;

    /// Whether findings of the given severity are reported.
    fn reports(&self, severity: Severity) -> bool {
        let _ = severity;
        true
    }
}

/// Host-facing validation settings.
///
/// Deserializable so a host can embed it in its own configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Master switch. When off, calls are neither tracked nor checked.
    pub enabled: bool,
    /// Categories whose findings are dropped.
    pub disabled_categories: HashSet<RuleCategory>,
    pub report_warnings: bool,
    pub report_info: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_categories: HashSet::new(),
            report_warnings: true,
            report_info: false,
        }
    }
}

impl ValidationSettings {
    /// Returns these settings with `category` disabled.
    pub fn without(mut self, category: RuleCategory) -> Self {
        self.disabled_categories.insert(category);
        self
    }
}

impl RuleFilter for ValidationSettings {
    fn validation_enabled(&self) -> bool {
        self.enabled
    }

    fn is_enabled(&self, category: RuleCategory) -> bool {
        !self.disabled_categories.contains(&category)
    }

    fn reports(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => true,
            Severity::Warning => self.report_warnings,
            Severity::Info => self.report_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ValidationSettings::default();
        assert!(settings.validation_enabled());
        assert!(settings.is_enabled(RuleCategory::Transfer));
        assert!(settings.reports(Severity::Warning));
        assert!(!settings.reports(Severity::Info));
    }

    #[test]
    fn test_parse_partial_settings() {
        let settings: ValidationSettings = serde_json::from_str(
            r#"{ "disabled_categories": ["draw", "barrier"], "report_warnings": false }"#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert!(!settings.is_enabled(RuleCategory::Draw));
        assert!(!settings.is_enabled(RuleCategory::Barrier));
        assert!(settings.is_enabled(RuleCategory::Transfer));
        assert!(!settings.reports(Severity::Warning));
        assert!(settings.reports(Severity::Error));
    }

    #[test]
    fn test_without() {
        let settings = ValidationSettings::default().without(RuleCategory::Submit);
        assert!(!settings.is_enabled(RuleCategory::Submit));
    }
}
