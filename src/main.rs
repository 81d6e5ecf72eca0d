use promptdeck::{app, logging};

fn main() {
    let _guard = logging::init();
    if let Err(err) = app::run() {
        tracing::error!(event_type = "app_lifecycle", error = %err, "PromptDeck failed");
        eprintln!("PromptDeck failed: {err}");
    }
}
