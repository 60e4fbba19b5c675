use dotenvy::dotenv;
use edupay_server::{cli::handle_command_line_args, config::ServerConfig, server::run_server};
use log::info;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    handle_command_line_args();
    let config = ServerConfig::from_env_or_default();

    info!("🚀️ Starting the wallet gateway on {}:{}", config.host, config.port);
    if let Err(e) = run_server(config).await {
        eprintln!("The server did not shut down cleanly. {e}");
        std::process::exit(1);
    }
}
