use spanscope_core::error::Result;
use spanscope_core::model::notification::{CreateNotification, Notification};

use crate::Store;

/// Where background checks deliver their findings.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, request: CreateNotification) -> Result<Notification>;
}

impl NotificationSink for Store {
    fn notify(&self, request: CreateNotification) -> Result<Notification> {
        self.create_notification(request)
    }
}
