use std::process::ExitCode;

fn main() -> ExitCode {
    demandcast_cli::run()
}
