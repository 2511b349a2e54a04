use tracing::error;

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Microphone access denied. Please allow microphone access in your system settings.";

/// Blocking user-facing notification
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        error!("{}", message);
    }
}
