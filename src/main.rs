#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use kfold_annotate::api::cli::{self, Args};
use kfold_annotate::common::log::init_tracing;

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match cli::run(&args) {
        Ok(report) => {
            info!(
                partitions = report.partitions.len(),
                rows = report.rows(),
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(code = err.code() as u32, "{err}");
            ExitCode::from(err.code() as u8)
        }
    }
}
