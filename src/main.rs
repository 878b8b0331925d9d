use stamp_keeper_lib::AppConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args_os().nth(1) {
        Some(dir) => AppConfig::with_data_dir(&PathBuf::from(dir)),
        None => AppConfig::default(),
    };

    if let Err(e) = stamp_keeper_lib::run(config).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
