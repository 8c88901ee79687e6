use bittorrent_peer_banner::{app, bootstrap};

#[tokio::main]
async fn main() -> Result<(), bittorrent_peer_banner::error::Error> {
    let (config, info) = bootstrap::app::setup()?;

    app::run(&config, &info).await
}
