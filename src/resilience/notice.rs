//! User-facing recovery notices.
//!
//! A [`RecoveryNotice`] is the structured description of a failure that the
//! display layer renders instead of a raw error: what happened, how severe
//! it is, what the user can do next, and whether their data is safe.

use serde::{Deserialize, Serialize};

use super::timeout::TimeoutError;

/// Severity of a recovery notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    /// Informational, nothing went wrong for the user.
    Info,
    /// Something degraded but the user can carry on.
    Warning,
    /// The requested operation failed.
    #[default]
    Error,
}

impl std::fmt::Display for NoticeSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeSeverity::Info => write!(f, "info"),
            NoticeSeverity::Warning => write!(f, "warning"),
            NoticeSeverity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for NoticeSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(NoticeSeverity::Info),
            "warning" => Ok(NoticeSeverity::Warning),
            "error" => Ok(NoticeSeverity::Error),
            _ => Err(format!("Unknown notice severity: {}", s)),
        }
    }
}

/// Visual treatment of a suggested action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    /// The recommended next step.
    #[default]
    Primary,
    /// An alternative step.
    Secondary,
    /// A step that discards or replaces data.
    Danger,
}

/// A suggested action attached to a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeAction {
    label: String,
    variant: ActionVariant,
}

impl NoticeAction {
    /// Create an action.
    pub fn new(label: impl Into<String>, variant: ActionVariant) -> Self {
        Self {
            label: label.into(),
            variant,
        }
    }

    /// Button label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Visual variant.
    pub fn variant(&self) -> ActionVariant {
        self.variant
    }
}

/// Structured, immutable description of a failure for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryNotice {
    title: String,
    message: String,
    severity: NoticeSeverity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    actions: Vec<NoticeAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    safe_state_message: Option<String>,
}

impl RecoveryNotice {
    /// Create a notice with no actions.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NoticeSeverity,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            actions: Vec::new(),
            detail: None,
            safe_state_message: None,
        }
    }

    /// Append a suggested action; actions keep insertion order.
    pub fn with_action(mut self, label: impl Into<String>, variant: ActionVariant) -> Self {
        self.actions.push(NoticeAction::new(label, variant));
        self
    }

    /// Attach technical detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a message confirming that no data was lost.
    pub fn with_safe_state(mut self, message: impl Into<String>) -> Self {
        self.safe_state_message = Some(message.into());
        self
    }

    /// Short headline.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// User-facing explanation.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity level.
    pub fn severity(&self) -> NoticeSeverity {
        self.severity
    }

    /// Suggested actions, in display order.
    pub fn actions(&self) -> &[NoticeAction] {
        &self.actions
    }

    /// Technical detail, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Confirmation that data is safe, if any.
    pub fn safe_state_message(&self) -> Option<&str> {
        self.safe_state_message.as_deref()
    }

    /// Whether the notice offers at least one next step.
    pub fn is_actionable(&self) -> bool {
        !self.actions.is_empty()
    }

    /// A session record could not be read and no usable copy was found.
    ///
    /// `intact_sessions` is the number of other sessions whose records are
    /// still valid; when non-zero the notice reassures the user about them.
    pub fn session_unrecoverable(
        session_id: &str,
        detail: impl Into<String>,
        intact_sessions: usize,
    ) -> Self {
        let notice = Self::new(
            "Session could not be restored",
            format!(
                "The saved data for session '{}' is damaged and no usable copy was found.",
                session_id
            ),
            NoticeSeverity::Error,
        )
        .with_action("Start a new session", ActionVariant::Primary)
        .with_action("Contact support", ActionVariant::Secondary)
        .with_detail(detail);

        if intact_sessions > 0 {
            notice.with_safe_state(format!(
                "Your other {} session(s) are intact and were not modified.",
                intact_sessions
            ))
        } else {
            notice
        }
    }

    /// A damaged session record was replaced by a usable copy.
    pub fn session_recovered(session_id: &str, source_key: &str) -> Self {
        Self::new(
            "Session restored",
            format!(
                "Session '{}' was restored from a saved copy after its latest record failed to load.",
                session_id
            ),
            NoticeSeverity::Warning,
        )
        .with_action("Continue", ActionVariant::Primary)
        .with_detail(format!("Recovered from {}", source_key))
        .with_safe_state("The damaged record was kept for inspection.")
    }

    /// The storage backend kept failing.
    pub fn storage_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            "Storage unavailable",
            "Your session could not be reached right now.",
            NoticeSeverity::Error,
        )
        .with_action("Try again", ActionVariant::Primary)
        .with_action("Contact support", ActionVariant::Secondary)
        .with_detail(detail)
        .with_safe_state("Nothing was changed; previously saved work is untouched.")
    }

    /// An operation ran past its deadline.
    pub fn operation_timed_out(err: &TimeoutError) -> Self {
        Self::new(
            "Operation timed out",
            "The operation took too long to complete.",
            NoticeSeverity::Warning,
        )
        .with_action("Try again", ActionVariant::Primary)
        .with_detail(err.to_string())
    }

    /// A change was rejected because its input was invalid.
    pub fn change_rejected(detail: impl Into<String>) -> Self {
        Self::new(
            "Change not saved",
            "The change was rejected because it would leave the session inconsistent.",
            NoticeSeverity::Warning,
        )
        .with_action("Review your input", ActionVariant::Primary)
        .with_detail(detail)
        .with_safe_state("Your session was not modified.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_keeps_action_order() {
        let notice = RecoveryNotice::new("Title", "Body", NoticeSeverity::Info)
            .with_action("First", ActionVariant::Primary)
            .with_action("Second", ActionVariant::Danger);

        assert_eq!(notice.title(), "Title");
        assert_eq!(notice.message(), "Body");
        assert_eq!(notice.severity(), NoticeSeverity::Info);
        assert_eq!(notice.actions().len(), 2);
        assert_eq!(notice.actions()[0].label(), "First");
        assert_eq!(notice.actions()[1].variant(), ActionVariant::Danger);
        assert!(notice.detail().is_none());
        assert!(notice.safe_state_message().is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let notice = RecoveryNotice::new("Oops", "Failed", NoticeSeverity::Warning)
            .with_action("Retry", ActionVariant::Primary)
            .with_safe_state("All good");

        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(
            value,
            json!({
                "title": "Oops",
                "message": "Failed",
                "severity": "warning",
                "actions": [{"label": "Retry", "variant": "primary"}],
                "safeStateMessage": "All good"
            })
        );
    }

    #[test]
    fn test_minimal_notice_omits_optionals() {
        let value =
            serde_json::to_value(RecoveryNotice::new("T", "M", NoticeSeverity::Error)).unwrap();
        assert!(value.get("actions").is_none());
        assert!(value.get("detail").is_none());
        assert!(value.get("safeStateMessage").is_none());
    }

    #[test]
    fn test_session_unrecoverable_safe_state() {
        let notice = RecoveryNotice::session_unrecoverable("s-1", "bad json", 2);
        assert_eq!(notice.severity(), NoticeSeverity::Error);
        assert!(notice.is_actionable());
        assert_eq!(notice.detail(), Some("bad json"));
        assert!(notice.safe_state_message().unwrap().contains('2'));

        let alone = RecoveryNotice::session_unrecoverable("s-1", "bad json", 0);
        assert!(alone.safe_state_message().is_none());
    }

    #[test]
    fn test_timeout_notice_detail() {
        let err = TimeoutError {
            timeout_ms: 300,
            message: "Read timed out".to_string(),
        };
        let notice = RecoveryNotice::operation_timed_out(&err);
        assert_eq!(notice.detail(), Some("Read timed out (after 300ms)"));
        assert!(notice.is_actionable());
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("INFO".parse::<NoticeSeverity>(), Ok(NoticeSeverity::Info));
        assert_eq!("error".parse::<NoticeSeverity>(), Ok(NoticeSeverity::Error));
        assert!("fatal".parse::<NoticeSeverity>().is_err());
    }
}
