#![allow(unexpected_cfgs)]

use std::process;

#[tokio::main]
async fn main() {
    process::exit(revaer_cli::run().await);
}
