//! # Rover Reminder Mail
//!
//! SMTP delivery with provider presets, and the HTML reminder template.

pub mod gateway;
pub mod profile;
pub mod template;

pub use gateway::SmtpGateway;
pub use template::HtmlTemplate;
