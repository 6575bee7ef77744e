//! Binary entry point for `filetxn`.

use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = filetxn::run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
