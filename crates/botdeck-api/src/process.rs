use tracing::info;

use botdeck_types::models::Bot;

/// Start/stop notifications for the worker behind a bot. Fire-and-forget:
/// callers never wait on or observe the outcome.
pub trait ProcessControl: Send + Sync {
    fn start(&self, bot: &Bot);
    fn stop(&self, bot: &Bot);
}

/// Bots have no real worker yet, so starting and stopping only logs.
pub struct LoggingProcessControl;

impl ProcessControl for LoggingProcessControl {
    fn start(&self, bot: &Bot) {
        info!("Starting bot {} ({})", bot.name, bot.id);
    }

    fn stop(&self, bot: &Bot) {
        info!("Stopping bot {} ({})", bot.name, bot.id);
    }
}
