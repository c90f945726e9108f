// Copyright 2022 Oxide Computer Company

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use slog::{o, Drain};

use tmin::{process_file, Opts};

fn main() -> Result<()> {
    let opts = Opts::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let log = slog::Logger::root(drain, o!());

    let summary = process_file(&opts, &log)?;

    println!(
        "{}",
        format!(
            "{} tables: {} entries -> {}",
            summary.tables,
            summary.entries_before,
            summary.entries_after
        )
        .as_str()
        .bright_white()
    );

    Ok(())
}
