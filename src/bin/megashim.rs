use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match megashim::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            megashim::cli::print_error(&e);
            ExitCode::from(megashim::cli::exit_code(&e))
        }
    }
}
