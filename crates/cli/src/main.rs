use std::process::ExitCode;

fn main() -> ExitCode {
    roadside_cli::run()
}
