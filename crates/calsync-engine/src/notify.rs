//! User-facing notification channel.
//!
//! The engine reports grace period progress through [`UserNotifier::info`]
//! and transport failures through [`UserNotifier::weak_error`]. Both are
//! best effort: a notifier never fails the workflow that calls it.

use std::time::Duration;

use notify_rust::Notification;
#[cfg(target_os = "linux")]
use notify_rust::Urgency;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;

/// Sink for user-visible messages.
pub trait UserNotifier: Send + Sync {
    /// Shows an informational message (grace period progress).
    fn info(&self, message: &str);

    /// Shows a non-blocking error.
    fn weak_error(&self, title: &str, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl UserNotifier for TracingNotifier {
    fn info(&self, message: &str) {
        info!(message = %message, "Calendar notification");
    }

    fn weak_error(&self, title: &str, message: &str) {
        warn!(title = %title, message = %message, "Calendar error");
    }
}

/// Configuration for desktop notifications.
#[derive(Debug, Clone)]
pub struct DesktopNotifierConfig {
    /// Application name shown by the notification daemon.
    pub app_name: String,
    /// How long informational messages stay visible.
    pub info_timeout: Duration,
    /// How long errors stay visible.
    pub error_timeout: Duration,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
}

impl Default for DesktopNotifierConfig {
    fn default() -> Self {
        Self {
            app_name: "calsync".to_string(),
            info_timeout: Duration::from_secs(5),
            error_timeout: Duration::from_secs(3),
            icon_path: None,
        }
    }
}

/// Notifier showing desktop notifications.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier {
    config: DesktopNotifierConfig,
}

impl DesktopNotifier {
    pub fn new(config: DesktopNotifierConfig) -> Self {
        Self { config }
    }

    /// Desktop notifier whose errors stay up for the engine's error display delay.
    pub fn for_engine(config: &EngineConfig) -> Self {
        Self::default().with_error_timeout(config.error_display_delay)
    }

    pub fn with_error_timeout(mut self, timeout: Duration) -> Self {
        self.config.error_timeout = timeout;
        self
    }

    pub fn config(&self) -> &DesktopNotifierConfig {
        &self.config
    }

    fn show(&self, summary: &str, body: &str, timeout: Duration, critical: bool) {
        let mut notification = Notification::new();
        notification
            .appname(&self.config.app_name)
            .summary(summary)
            .body(body)
            .timeout(timeout);

        if let Some(ref icon) = self.config.icon_path {
            notification.icon(icon);
        }

        #[cfg(target_os = "linux")]
        notification.urgency(if critical {
            Urgency::Critical
        } else {
            Urgency::Normal
        });
        #[cfg(not(target_os = "linux"))]
        let _ = critical;

        match notification.show() {
            Ok(_) => debug!(summary = %summary, "Notification sent"),
            Err(e) => error!(error = %e, summary = %summary, "Failed to send notification"),
        }
    }
}

impl UserNotifier for DesktopNotifier {
    fn info(&self, message: &str) {
        self.show("Calendar", message, self.config.info_timeout, false);
    }

    fn weak_error(&self, title: &str, message: &str) {
        self.show(title, message, self.config.error_timeout, true);
    }
}
