use std::process;

use dodo::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    logging::init_logging(args.log_level, args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
