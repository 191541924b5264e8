use anyhow::Result;
use tracing::info;

use crate::services::NotificationSender;

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogSender;

impl NotificationSender for LogSender {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        info!(recipients = ?recipients, subject, body, "[NOTIFY]");
        Ok(())
    }
}

/// Replaces `${name}` placeholders with instance variables. Unknown names
/// are left as they are.
pub fn render_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
