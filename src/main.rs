use server_launcher::cli::Cli;
use server_launcher::error::chain;

#[tokio::main]
async fn main() {
    if let Err(e) = Cli::run().await {
        eprintln!("✗ Error: {}", chain(&e));
        std::process::exit(1);
    }
}
