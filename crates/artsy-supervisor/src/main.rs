// ABOUTME: artsy CLI entry point
// ABOUTME: artsy [--data-dir <path>] [kiosk]; exit 0 on clean shutdown, 1 on usage or startup failure

use artsy_supervisor::config::usage_exit_code;
use artsy_supervisor::status;
use artsy_supervisor::{shutdown_signal, Cli, Config, Supervisor};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    artsy_log::init();

    let config = match Config::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            status::failure(e.to_string());
            return ExitCode::from(e.exit_code());
        }
    };

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            status::failure(e.to_string());
            return ExitCode::from(e.exit_code());
        }
    };

    match supervisor.run(shutdown_signal()).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            status::failure(e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}
