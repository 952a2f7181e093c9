use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SpanscopeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    SystemUpdate,
    Performance,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::SystemUpdate => "systemUpdate",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = SpanscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "systemupdate" | "system_update" => Ok(Self::SystemUpdate),
            "performance" => Ok(Self::Performance),
            _ => Err(SpanscopeError::Validation(format!(
                "unknown notification type: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub service_name: Option<String>,
    pub trace_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CreateNotification {
    pub fn new(kind: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            service_name: None,
            trace_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    pub fn with_trace(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), SpanscopeError> {
        if self.title.trim().is_empty() {
            return Err(SpanscopeError::Validation(
                "notification title cannot be empty".to_string(),
            ));
        }
        if self.message.trim().is_empty() {
            return Err(SpanscopeError::Validation(
                "notification message cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Stamps a fresh id and timestamp onto the request.
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4().to_string(),
            kind: self.kind,
            title: self.title,
            message: self.message,
            timestamp: now,
            is_read: false,
            service_name: self.service_name,
            trace_id: self.trace_id,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

/// Change feed published on every store mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum NotificationEvent {
    Created { notification: Notification },
    Read { id: String },
    AllRead { count: usize },
    Deleted { id: String },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Read { .. } => "read",
            Self::AllRead { .. } => "allRead",
            Self::Deleted { .. } => "deleted",
        }
    }
}
