use dotenv::dotenv;
use log::error;

use crate::config::Settings;

mod chunk;
mod config;
mod err;
mod ident;
mod layer;
mod model;
mod schema;
mod serve;
mod storage;
mod transfer;
mod web;

#[cfg(test)]
mod test_util;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = serve::start_server(settings).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
