use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_env("STENCIL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = stencil_cli::run_from_env() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
