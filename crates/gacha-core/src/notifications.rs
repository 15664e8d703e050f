use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Draft,
    Scheduled,
    Sent,
    Cancelled,
}

impl NotificationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Draft => "draft",
            NotificationStatus::Scheduled => "scheduled",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Cancelled => "cancelled",
        }
    }

    /// Sent and cancelled notifications are frozen.
    #[must_use]
    pub fn is_editable(self) -> bool {
        matches!(self, NotificationStatus::Draft | NotificationStatus::Scheduled)
    }
}

impl FromStr for NotificationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(NotificationStatus::Draft),
            "scheduled" => Ok(NotificationStatus::Scheduled),
            "sent" => Ok(NotificationStatus::Sent),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown notification status '{other}'"
            ))),
        }
    }
}
