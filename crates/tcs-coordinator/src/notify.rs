//! Pause and resume notifications
//!
//! Titles and messages are minijinja templates rendered against a
//! [`NotificationContext`]. A template that fails to render is sent as its
//! raw text. Sending is best effort: failures are logged and never stop a
//! pause or resume.

use minijinja::Environment;
use serde::Serialize;
use serde_json::json;
use tcs_config::Options;
use tcs_core::{domains, Context};
use tcs_host::SharedHost;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Paused,
    Resumed,
}

/// Variables available to notification templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationContext {
    pub trigger_sensor: Option<String>,
    pub trigger_sensor_name: String,
    pub open_sensors: Vec<String>,
    pub open_sensor_names: Vec<String>,
    pub open_count: usize,
    pub open_doors: usize,
    pub open_windows: usize,
    pub open_timeout: u32,
    pub close_timeout: u32,
    pub previous_mode: String,
    pub thermostat: String,
    pub thermostat_name: String,
}

#[derive(Debug, Clone)]
struct Templates {
    title: String,
    message: String,
}

pub struct Notifier {
    env: Environment<'static>,
    service: Option<String>,
    tag: String,
    paused: Templates,
    resumed: Templates,
}

impl Notifier {
    pub fn from_options(options: &Options) -> Self {
        Self {
            env: Environment::new(),
            service: options.notify_service_name().map(str::to_string),
            tag: options.notification_tag.clone(),
            paused: Templates {
                title: options.notify_title_paused.clone(),
                message: options.notify_message_paused.clone(),
            },
            resumed: Templates {
                title: options.notify_title_resumed.clone(),
                message: options.notify_message_resumed.clone(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Render a template, falling back to its raw text
    pub fn render(&self, template: &str, context: &NotificationContext) -> String {
        match self.env.render_str(template, context) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "Failed to render notification template");
                template.to_string()
            }
        }
    }

    /// The `notify.*` payload for `kind`
    pub fn payload(&self, kind: NotificationKind, context: &NotificationContext) -> serde_json::Value {
        let templates = match kind {
            NotificationKind::Paused => &self.paused,
            NotificationKind::Resumed => &self.resumed,
        };
        json!({
            "title": self.render(&templates.title, context),
            "message": self.render(&templates.message, context),
            "data": { "tag": self.tag },
        })
    }

    pub async fn send(&self, host: &SharedHost, kind: NotificationKind, context: &NotificationContext) {
        let Some(service) = &self.service else {
            debug!(?kind, "No notification service configured");
            return;
        };

        let payload = self.payload(kind, context);
        match host
            .call_service(domains::NOTIFY, service, payload, Context::new())
            .await
        {
            Ok(_) => info!(?kind, service = %service, "Sent notification"),
            Err(err) => warn!(?kind, service = %service, error = %err, "Failed to send notification"),
        }
    }
}
