use clap::Parser;

#[tokio::main]
async fn main() {
    autolikectl::init_logging("info");
    let cli = autolikectl::Cli::parse();
    if let Err(err) = autolikectl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
