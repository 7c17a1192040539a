use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match vigil::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("vigil failed to start: {}", e);
            log::error!("{}", e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}
