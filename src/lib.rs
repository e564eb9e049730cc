pub mod cli;
pub mod config;
pub mod error;
pub mod meditation;
pub mod protocol;
pub mod rooms;
pub mod session;

pub use config::ClientConfig;
pub use error::HarmonyError;
pub use meditation::MeditationClient;
pub use rooms::{MediationRoom, ResolutionChat};
pub use session::{SessionManager, Subscription, MAX_RECONNECT_ATTEMPTS, RETRY_BASE_MS};
