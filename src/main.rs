fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = wepub::cli::Args::parse();
    wepub::cli::init_logging(&args);
    if let Err(e) = wepub::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
