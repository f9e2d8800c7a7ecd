use std::process::ExitCode;

fn main() -> ExitCode {
    match releasegate::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            releasegate::ui::output::error(format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
