use std::process::ExitCode;

fn main() -> ExitCode {
    risepal_cli::run()
}
