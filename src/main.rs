use crate::cli::run;

pub mod cli;
mod config;
pub mod domain;
pub mod interrupt;
pub mod lookup;
pub mod organize;
pub mod progress;
pub mod reconcile;
pub mod tags;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
