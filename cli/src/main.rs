use std::fs::{self, File};
use std::io::{stdout, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{get_int_arg, parse_count_options, parse_mode, parse_store_options};
use kmerdb::serialization::{write_feature_matrix, MATRIX_EXT};
use kmerdb::{
    add_files_with, extract_vectors, ingest_with, store_info, vocabulary, IngestSummary, Progress,
};

mod cli;

fn output_to<F>(output_fn: F, output: Option<&str>, extension: &str) -> Result<()>
where
    F: Fn(&mut dyn Write) -> Result<()>,
{
    match output {
        None => {
            let mut out = stdout();
            output_fn(&mut out)?;
        }
        Some(o) => {
            // if the filename doesn't have the right extension
            // add it on
            let filename = String::from(o);
            let out_filename = if filename.ends_with(extension) {
                filename
            } else {
                filename + extension
            };

            let mut out = File::create(&out_filename)
                .context(format!("unable to create '{}'", out_filename))?;
            output_fn(&mut out)?;
        }
    };
    Ok(())
}

/// The INPUT paths with every directory replaced by the regular files in it,
/// sorted by name.
fn expand_inputs(matches: &ArgMatches) -> Result<Vec<String>> {
    let inputs = matches
        .values_of("INPUT")
        .ok_or_else(|| anyhow!("Bad INPUT"))?;

    let mut filenames = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if !path.is_dir() {
            filenames.push(input.to_string());
            continue;
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).context(format!("unable to list '{}'", input))? {
            let entry = entry.context(format!("unable to list '{}'", input))?;
            if entry.file_type()?.is_file() {
                entries.push(entry.path().display().to_string());
            }
        }
        if entries.is_empty() {
            bail!("Directory {} holds no files", input);
        }
        entries.sort();
        filenames.extend(entries);
    }
    Ok(filenames)
}

fn store_path<'a>(matches: &'a ArgMatches) -> Result<&'a str> {
    matches
        .value_of("store")
        .ok_or_else(|| anyhow!("Bad store"))
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(bar)
}

fn set_threads(matches: &ArgMatches) -> Result<()> {
    if matches.occurrences_of("threads") > 0 {
        let threads: usize = get_int_arg(matches, "threads")?;
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}

fn report(summary: &IngestSummary) {
    info!(
        files = summary.files,
        kmers = summary.kmers_written,
        vocabulary = summary.vocabulary_size,
        "store updated"
    );
}

fn run() -> Result<()> {
    let matches = cli::build_cli().get_matches();

    match matches.subcommand() {
        ("ingest", Some(matches)) => {
            set_threads(matches)?;
            let filenames = expand_inputs(matches)?;
            let files: Vec<&str> = filenames.iter().map(|f| f.as_str()).collect();
            let params = parse_count_options(matches)?;
            let config = parse_store_options(matches)?;

            let bar = progress_bar(files.len())?;
            let mut observer = |p: &Progress<'_>| {
                bar.set_length(p.total as u64);
                bar.set_position(p.done as u64);
                bar.set_message(format!("{} {}", p.phase, p.file));
            };
            let summary = ingest_with(
                &files,
                &params,
                parse_mode(matches),
                store_path(matches)?,
                &config,
                &mut observer,
            )?;
            bar.finish_and_clear();
            report(&summary);
        }
        ("add", Some(matches)) => {
            set_threads(matches)?;
            let filenames = expand_inputs(matches)?;
            let files: Vec<&str> = filenames.iter().map(|f| f.as_str()).collect();
            let config = parse_store_options(matches)?;

            let bar = progress_bar(files.len())?;
            let mut observer = |p: &Progress<'_>| {
                bar.set_position(p.done as u64);
                bar.set_message(format!("{} {}", p.phase, p.file));
            };
            let summary = add_files_with(&files, store_path(matches)?, &config, &mut observer)?;
            bar.finish_and_clear();
            report(&summary);
        }
        ("vectors", Some(matches)) => {
            let filenames = expand_inputs(matches)?;
            let files: Vec<&str> = filenames.iter().map(|f| f.as_str()).collect();
            let matrix = extract_vectors(&files, store_path(matches)?)?;

            output_to(
                |writer| {
                    write_feature_matrix(writer, &matrix)?;
                    Ok(())
                },
                matches.value_of("output_file"),
                MATRIX_EXT,
            )?;
        }
        ("vocab", Some(matches)) => {
            let kmers = vocabulary(store_path(matches)?)?;

            output_to(
                |writer| {
                    serde_json::to_writer(writer, &kmers)
                        .map_err(|_| anyhow!("Could not serialize JSON to file"))?;
                    Ok(())
                },
                matches.value_of("output_file"),
                ".json",
            )?;
        }
        ("info", Some(matches)) => {
            let path = store_path(matches)?;
            let info = store_info(path)?;

            println!("{}", path);
            match info.meta {
                Some(meta) => {
                    println!("  Kmer length: {}", meta.params.kmer_length);
                    println!("  Minimum count: {}", meta.params.min_count);
                    println!("  Record boundaries: {:?}", meta.params.boundaries);
                    println!("  Vocabulary: {:?}", meta.mode);
                }
                None => println!("  Nothing ingested yet"),
            }
            println!("  Vocabulary size: {}", info.vocabulary_size);

            for file in &info.files {
                println!("{}", file.file);
                println!("  Distinct kmers: {}", file.distinct_kmers);
                println!("  Total kmers: {}", file.total_kmers);
                let mean = file
                    .histogram
                    .iter()
                    .enumerate()
                    .map(|(i, v)| ((i as f32 + 1f32) * *v as f32, *v as f32))
                    .fold((0f32, 0f32), |e, s| (e.0 + s.0, e.1 + s.1));
                if mean.1 > 0f32 {
                    println!("  Average count: {}", mean.0 / mean.1);
                }
                println!("  Histogram: {:?}", file.histogram);
            }
        }
        other => bail!("Unknown subcommand: {:?}", other.0),
    };

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}
