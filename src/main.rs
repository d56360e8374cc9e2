use datachat::app;
use datachat::config::Config;
use env_logger::Env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Start the web application
    let config = Config::from_env();
    app::run(config).await?;

    Ok(())
}
