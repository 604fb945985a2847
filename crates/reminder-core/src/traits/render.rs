//! Notification content rendering capabilities.

use chrono::{DateTime, Utc};

use crate::types::{AccountIdentity, Snapshot};

/// Fields the scheduler hands to the renderer. Markup is the renderer's job.
#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub identity: AccountIdentity,
    pub current_value: u32,
    pub threshold: u32,
    pub observed_at: DateTime<Utc>,
    /// PNG bytes of an optional status card.
    pub status_image: Option<Vec<u8>>,
}

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub html: String,
}

/// Turns notification fields into a subject and an HTML body.
pub trait NotificationRenderer: Send + Sync {
    fn render(&self, content: &NotificationContent) -> RenderedMail;
}

/// Optional status card renderer. Resolved once at startup.
pub trait StatusImageRenderer: Send + Sync {
    fn render(&self, identity: &AccountIdentity, snapshot: &Snapshot) -> Option<Vec<u8>>;
}

/// Default status image renderer: never produces an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatusImage;

impl StatusImageRenderer for NoStatusImage {
    fn render(&self, _identity: &AccountIdentity, _snapshot: &Snapshot) -> Option<Vec<u8>> {
        None
    }
}
