// Copyright 2022 Oxide Computer Company

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use anyhow::{anyhow, Result};
use clap::Parser;
use slog::{debug, info, Logger};

use mctables::aliases::Aliases;
use mctables::stream;
use mctables::{defaults, mtrie, ordered};

#[derive(Parser)]
#[clap(version = "0.1")]
pub struct Opts {
    /// File of routing tables to minimise.
    pub in_file: String,

    /// Filename to write the minimised tables to.
    pub out_file: String,

    /// Which minimiser to run.
    #[clap(value_enum, long, default_value_t = Algorithm::Ordered)]
    pub algorithm: Algorithm,

    /// Stop minimising a table once it fits in this many entries.
    /// Zero means minimise as far as possible.
    #[clap(long, default_value_t = 0)]
    pub target_length: usize,

    /// Strip default-routable entries before minimising.
    #[clap(long)]
    pub remove_defaults: bool,

    /// Also dump each minimised table as JSON on stdout.
    #[clap(long)]
    pub json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Route-partitioned trie merging. Exact within each route and
    /// insensitive to table order; cannot merge across routes.
    Mtrie,
    /// Ordered covering. Merges across routes under first-match
    /// semantics; sorts each table by ascending generality first.
    Ordered,
    /// m-Trie then ordered covering.
    Both,
}

/// Totals across one processed stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub tables: usize,
    pub entries_before: usize,
    pub entries_after: usize,
}

/// Run the selected passes over one table in place.
pub fn minimise_table(
    table: &mut mctables::Table,
    algorithm: Algorithm,
    target_length: usize,
    remove_defaults: bool,
) {
    if remove_defaults {
        defaults::minimise(table);
    }
    match algorithm {
        Algorithm::Mtrie => {
            mtrie::minimise(table);
        }
        Algorithm::Ordered => {
            table.sort_by_generality();
            let mut aliases = Aliases::new();
            ordered::minimise(table, target_length, &mut aliases);
        }
        Algorithm::Both => {
            mtrie::minimise(table);
            table.sort_by_generality();
            let mut aliases = Aliases::new();
            ordered::minimise(table, target_length, &mut aliases);
        }
    }
}

/// Stream every frame of `input` through the passes into `output`.
pub fn process_stream<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    opts: &Opts,
    log: &Logger,
) -> Result<Summary> {
    let mut summary = Summary::default();

    while let Some(mut frame) = stream::read_frame(input)
        .map_err(|e| anyhow!("read tables: {}", e))?
    {
        let before = frame.table.len();
        minimise_table(
            &mut frame.table,
            opts.algorithm,
            opts.target_length,
            opts.remove_defaults,
        );
        let after = frame.table.len();

        info!(log, "minimised table";
            "x" => frame.x,
            "y" => frame.y,
            "before" => before,
            "after" => after
        );
        if opts.target_length > 0 && after > opts.target_length {
            debug!(log, "table does not fit the target";
                "x" => frame.x,
                "y" => frame.y,
                "target" => opts.target_length
            );
        }

        if opts.json {
            println!("{}", serde_json::to_string_pretty(&frame.table)?);
        }

        stream::write_frame(output, &frame)
            .map_err(|e| anyhow!("write tables: {}", e))?;

        summary.tables += 1;
        summary.entries_before += before;
        summary.entries_after += after;
    }

    Ok(summary)
}

pub fn process_file(opts: &Opts, log: &Logger) -> Result<Summary> {
    let in_file = File::open(&opts.in_file)
        .map_err(|e| anyhow!("open input: {}: {}", opts.in_file, e))?;
    let out_file = File::create(&opts.out_file)
        .map_err(|e| anyhow!("open output: {}: {}", opts.out_file, e))?;

    let mut input = BufReader::new(in_file);
    let mut output = BufWriter::new(out_file);
    let summary = process_stream(&mut input, &mut output, opts, log)?;
    output
        .flush()
        .map_err(|e| anyhow!("write tables: {}", e))?;

    Ok(summary)
}
