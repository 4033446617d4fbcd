mod config;
mod console;
mod menu;
mod packages;

use config::AppConfig;
use console::Console;
use menu::App;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    deckhand_util::init_tracing("warn")?;
    deckhand_util::init_app_telemetry("deckhand", env!("CARGO_PKG_VERSION"));

    let mut app = App::new(AppConfig::load(), Console::stdio())?;
    app.run().await?;
    Ok(())
}
