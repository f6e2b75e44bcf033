use bucketedit::cli::Cli;
use bucketedit::logging::setup_logging;
use bucketedit::server::Server;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    setup_logging();

    let server = Server::new(Cli::parse());
    server.run().await.map_err(|err| {
        eprintln!("Server error: {err}");
        err.into()
    })
}
