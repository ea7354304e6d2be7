mod cmd;

use std::process::ExitCode;

use cmd::HeapGraph;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let heapgraph: HeapGraph = argh::from_env();
    if let Err(err) = heapgraph.init() {
        eprintln!("\x1b[31m error: {err:#} \x1b[0m");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
