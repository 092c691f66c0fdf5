use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use pro::cli::{self, Query};
use pro::{Evaluator, OsHost};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("pro: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    let default_level = if args.debug { "pro=debug" } else { "pro=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut ev = Evaluator::with_host(OsHost, args.config());
    let ok = ev.evaluate(&args.file);
    for line in ev.take_output() {
        eprintln!("{line}");
    }

    if args.queries.is_empty() {
        let vars = ev.variables();
        for name in vars.sorted_names() {
            println!("{name} = {}", vars.values(name).join(" "));
        }
    }
    for query in &args.queries {
        match query {
            Query::Test(expr) => println!("{}", ev.test(expr)),
            Query::Expand(expr) => {
                for value in ev.expand(expr) {
                    println!("{value}");
                }
            }
            Query::Var(name) => println!("{name} = {}", ev.values(name).join(" ")),
        }
    }
    // Queries may run message() and friends.
    for line in ev.take_output() {
        eprintln!("{line}");
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
