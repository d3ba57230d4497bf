use anyhow::Result;
use rcon_client::config::Cli;
use rcon_client::{Connection, RconCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::load_config()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let connection = Connection::from_config(&config);
    connection.wait_until_connected().await?;
    log::info!("connected to {}:{}", config.host, config.port);

    let players = connection.get_players(config.version.into()).await?;
    log::info!("players response: {}", players.content_body);

    connection.disconnect().await;
    Ok(())
}
