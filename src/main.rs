//! Binary entry point for engram.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// CLI output goes through stdout/stderr by design.
#![allow(clippy::print_stderr)]

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    engram::cli::run().await.context("engram failed")
}
