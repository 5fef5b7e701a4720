use std::process;

#[tokio::main]
async fn main() {
    if let Err(err) = musicbox::cli::run().await {
        eprintln!("{err}");
        process::exit(1);
    }
}
