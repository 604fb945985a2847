//! HTML notification template.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use reminder_core::traits::{NotificationContent, NotificationRenderer, RenderedMail};

const BUILTIN_TEMPLATE: &str = concat!(
    "<div style=\"font-family:Arial,Helvetica,sans-serif;background:#0f1222;padding:24px;color:#eaeaea\">",
    "<div style=\"max-width:640px;margin:0 auto;background:#161a2f;border-radius:16px;padding:24px\">",
    "<h2 style=\"margin:0 0 12px 0;color:#f6d15e\">鸣潮体力推送</h2>",
    "<p style=\"margin:0 0 8px 0\">漂泊者，您的体力已达到阈值。</p>",
    "<ul style=\"list-style:none;padding:0;margin:12px 0;line-height:1.8\">",
    "<li>UID：{{uid}}</li>",
    "<li>当前体力：{{stamina}}</li>",
    "<li>阈值：{{threshold}}</li>",
    "<li>时间：{{time}}</li>",
    "</ul>",
    "<div style=\"margin-top:12px\">",
    "<img src=\"data:image/png;base64,{{stamina_image}}\" alt=\"stamina\" style=\"width:100%;border-radius:12px\"/>",
    "</div>",
    "<p style=\"margin-top:16px;color:#9aa3c1\">请及时上线使用体力。</p>",
    "</div>",
    "</div>",
);

const EMPTY_IMAGE_SRC: &str = "src=\"data:image/png;base64,\"";

/// Placeholder template rendered into every reminder mail.
#[derive(Debug, Clone)]
pub struct HtmlTemplate {
    subject: String,
    template: String,
}

impl HtmlTemplate {
    /// The built-in template.
    pub fn builtin(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            template: BUILTIN_TEMPLATE.to_string(),
        }
    }

    /// Use the file at `path` when it exists and is non-empty, else the built-in template.
    pub fn load(path: &Path, subject: impl Into<String>) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                tracing::info!("📝 Mail template loaded from {}", path.display());
                Self {
                    subject: subject.into(),
                    template: content,
                }
            }
            Ok(_) => Self::builtin(subject),
            Err(e) => {
                if path.exists() {
                    tracing::warn!("⚠️ Mail template {} unreadable: {e}", path.display());
                }
                Self::builtin(subject)
            }
        }
    }
}

impl NotificationRenderer for HtmlTemplate {
    fn render(&self, content: &NotificationContent) -> RenderedMail {
        let id = &content.identity;
        let time = content
            .observed_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let mut html = self
            .template
            .replace("{{uid}}", &id.account_uid)
            .replace("{{user_id}}", &id.owner_user_id)
            .replace("{{bot_id}}", &id.bot_channel_id)
            .replace("{{bot_self_id}}", &id.bot_instance_id)
            .replace("{{stamina}}", &content.current_value.to_string())
            .replace("{{threshold}}", &content.threshold.to_string())
            .replace("{{time}}", &time);

        match content.status_image.as_deref() {
            Some(png) if !png.is_empty() => {
                html = html.replace("{{stamina_image}}", &STANDARD.encode(png));
            }
            _ => {
                html = html
                    .replace("{{stamina_image}}", "")
                    .replace(EMPTY_IMAGE_SRC, "src=\"\"");
            }
        }

        RenderedMail {
            subject: self.subject.clone(),
            html,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reminder_core::types::AccountIdentity;

    fn content(image: Option<Vec<u8>>) -> NotificationContent {
        NotificationContent {
            identity: AccountIdentity::new("10001", "onebot", "bot-a", "100000001"),
            current_value: 231,
            threshold: 230,
            observed_at: Utc::now(),
            status_image: image,
        }
    }

    #[test]
    fn test_builtin_placeholders_filled() {
        let mail = HtmlTemplate::builtin("鸣潮体力推送").render(&content(None));
        assert_eq!(mail.subject, "鸣潮体力推送");
        assert!(mail.html.contains("UID：100000001"));
        assert!(mail.html.contains("当前体力：231"));
        assert!(mail.html.contains("阈值：230"));
        assert!(!mail.html.contains("{{"));
    }

    #[test]
    fn test_missing_image_neutralizes_data_src() {
        let mail = HtmlTemplate::builtin("s").render(&content(None));
        assert!(mail.html.contains("src=\"\""));
        assert!(!mail.html.contains("base64,\""));
    }

    #[test]
    fn test_image_embedded_as_base64() {
        let mail = HtmlTemplate::builtin("s").render(&content(Some(vec![0x89, b'P', b'N', b'G'])));
        assert!(mail.html.contains("data:image/png;base64,iVBORw=="));
    }

    #[test]
    fn test_custom_template_file() {
        let dir = std::env::temp_dir().join("rover-reminder-test-template");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("template.html");
        std::fs::write(&path, "<p>{{user_id}}@{{bot_id}}/{{bot_self_id}}: {{stamina}}</p>").unwrap();

        let mail = HtmlTemplate::load(&path, "s").render(&content(None));
        assert_eq!(mail.html, "<p>10001@onebot/bot-a: 231</p>");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_or_missing_file_falls_back() {
        let dir = std::env::temp_dir().join("rover-reminder-test-template-empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("template.html");
        std::fs::write(&path, "   \n").unwrap();

        let mail = HtmlTemplate::load(&path, "s").render(&content(None));
        assert!(mail.html.contains("鸣潮体力推送"));

        let mail = HtmlTemplate::load(&dir.join("missing.html"), "s").render(&content(None));
        assert!(mail.html.contains("UID：100000001"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
