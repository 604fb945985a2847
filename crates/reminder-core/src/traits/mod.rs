//! Collaborator traits. The scheduler only talks to the outside world through these.

pub mod activity;
pub mod delivery;
pub mod fetcher;
pub mod render;
pub mod store;

pub use activity::ActivityOracle;
pub use delivery::DeliveryGateway;
pub use fetcher::{CredentialSource, SnapshotFetcher};
pub use render::{NoStatusImage, NotificationContent, NotificationRenderer, RenderedMail, StatusImageRenderer};
pub use store::RecordStore;
