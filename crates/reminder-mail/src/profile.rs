//! Mail provider profiles and their presets.

use reminder_core::config::{MailConfig, MailProfile};

/// Generic SMTP profile name.
pub const PROFILE_SMTP: &str = "smtp";
/// QQ Mail profile name.
pub const PROFILE_QQ: &str = "qq";

const DEFAULT_PORT: u16 = 465;

/// A profile with presets applied and every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Envelope sender address.
    pub sender: String,
    pub sender_name: Option<String>,
    pub use_ssl: bool,
    pub starttls: bool,
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// QQ Mail defaults. User values win over every preset field.
fn qq_preset(profile: &MailProfile) -> MailProfile {
    let mut p = profile.clone();
    if non_blank(&p.host).is_none() {
        p.host = Some("smtp.qq.com".into());
    }
    p.port.get_or_insert(DEFAULT_PORT);
    p.use_ssl.get_or_insert(true);
    if non_blank(&p.password).is_none() {
        p.password = non_blank(&p.auth_code);
    }
    p
}

/// Look up `name` in `config` and resolve it into a sendable profile.
pub fn resolve(name: &str, config: &MailConfig) -> Result<ResolvedProfile, String> {
    let profile = match name {
        PROFILE_SMTP => config.smtp.clone(),
        PROFILE_QQ => qq_preset(&config.qq),
        other => return Err(format!("unknown mail profile: {other}")),
    };

    let (Some(host), Some(user), Some(password)) = (
        non_blank(&profile.host),
        non_blank(&profile.user),
        non_blank(&profile.password),
    ) else {
        return Err(format!("mail profile '{name}' is incomplete (host, user, password)"));
    };

    let mut sender = non_blank(&profile.sender).unwrap_or_else(|| user.clone());
    let mut sender_name = non_blank(&profile.sender_name);
    if !sender.contains('@') {
        sender_name = Some(sender);
        sender = user.clone();
    }

    let use_ssl = profile.use_ssl.unwrap_or(true);
    Ok(ResolvedProfile {
        host,
        port: profile.port.unwrap_or(DEFAULT_PORT),
        user,
        password,
        sender,
        sender_name,
        use_ssl,
        starttls: !use_ssl && profile.starttls.unwrap_or(false),
    })
}
