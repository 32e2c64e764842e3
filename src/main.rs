use env_logger::Env;
use governor_indexer::cli;
use governor_indexer::report::{set_report_file, set_report_format, ReportFormat};
use std::path::PathBuf;
use std::process;

fn main() {
    let matches = cli::build_cli().get_matches();

    let default_filter = if matches.get_flag("verbose") {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if matches.get_flag("json") {
        set_report_format(ReportFormat::Json);
    }
    set_report_file(matches.get_one::<PathBuf>("log-file").cloned());

    if let Err(err) = cli::run(&matches) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
