use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match pipegpt::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Help, version and usage errors print and exit the way clap intends.
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                clap_err.exit();
            }
            eprintln!("pipegpt: {err:#}");
            ExitCode::FAILURE
        }
    }
}
