//! x402 facilitator HTTP server binary.

mod chain;
mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        process::exit(1);
    }
}
