use log::{error, info};
use serialbot::config::{credentials_from_env, Config};
use serialbot::crawler::Crawler;
use serialbot::store::ApiStore;
use serialbot::translator::TranslationClient;
use serialbot::Error;
use std::time::Duration;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::load();

    let credentials = credentials_from_env();
    if credentials.is_empty() {
        // Refusing to start beats silently publishing untranslated text
        // for every chapter.
        return Err(Error::Config(
            "no translation credentials; set TRANSLATE_API_KEY (and _2, _3, ...)".to_string(),
        ));
    }
    info!("{} translation credential(s) loaded", credentials.len());

    let store = ApiStore::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?;
    let translator = TranslationClient::new(&config.translation, credentials);
    let crawler = Crawler::new(config, store, translator)?;

    info!("crawler starting");
    tokio::select! {
        _ = crawler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
