use anyhow::{anyhow, Result};
use clap::{
    crate_authors, crate_version, App, AppSettings, Arg, ArgGroup, ArgMatches, SubCommand,
};
use kmerdb::{CountParams, RecordBoundaries, StoreConfig, VocabularyMode};
use std::str::FromStr;

pub fn build_cli() -> App<'static, 'static> {
    App::new("kmerdb")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Count genome k-mers into a store and extract aligned count vectors")
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::ArgRequiredElseHelp)
        .subcommand(ingest_command())
        .subcommand(add_command())
        .subcommand(vectors_command())
        .subcommand(vocab_command())
        .subcommand(info_command())
}

fn input_arg(help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name("INPUT")
        .help(help)
        .multiple(true)
        .required(true)
}

fn ingest_command() -> App<'static, 'static> {
    let mut ingest_command = SubCommand::with_name("ingest")
        .about("Count FASTA/Q file(s) into a store and build its vocabulary")
        .arg(input_arg(
            "The file(s) to count; directories are expanded to their files",
        ))
        .arg(
            Arg::with_name("intersect")
                .long("intersect")
                .help("Only keep k-mers found in every input file"),
        );
    ingest_command = add_store_options(ingest_command);
    ingest_command = add_count_options(ingest_command);
    ingest_command
}

fn add_command() -> App<'static, 'static> {
    let add_command = SubCommand::with_name("add")
        .about("Count more file(s) into an existing store with its recorded parameters")
        .arg(input_arg(
            "The file(s) to add; directories are expanded to their files",
        ));
    add_store_options(add_command)
}

fn vectors_command() -> App<'static, 'static> {
    let mut vectors_command = SubCommand::with_name("vectors")
        .about("Output one count vector per file, aligned to the store's vocabulary")
        .arg(input_arg(
            "Previously counted file(s) to extract; directories are expanded to their files",
        ));
    vectors_command = add_store_path(vectors_command);
    vectors_command = add_output_options(vectors_command);
    vectors_command
}

fn vocab_command() -> App<'static, 'static> {
    let vocab_command = SubCommand::with_name("vocab")
        .about("Output the store's vocabulary in vector order");
    add_output_options(add_store_path(vocab_command))
}

fn info_command() -> App<'static, 'static> {
    let info_command = SubCommand::with_name("info")
        .about("Display the store's parameters and per-file statistics");
    add_store_path(info_command)
}

fn add_store_path<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(
        Arg::with_name("store")
            .short("s")
            .long("store")
            .takes_value(true)
            .required(true)
            .help("Path of the k-mer store"),
    )
}

fn add_store_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    add_store_path(app)
        .arg(
            Arg::with_name("max_tables")
                .long("max-tables")
                .takes_value(true)
                .default_value("400")
                .help("Maximum number of tables the store may hold (one per file plus two)"),
        )
        .arg(
            Arg::with_name("max_size")
                .long("max-size")
                .takes_value(true)
                .default_value("160000000000")
                .help("Maximum size of the store in bytes"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .help("Number of threads used for counting (default: all cores)"),
        )
}

fn add_count_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(
        Arg::with_name("kmer_length")
            .short("k")
            .long("kmer-length")
            .takes_value(true)
            .default_value("10")
            .help("Length of kmers to count"),
    )
    .arg(
        Arg::with_name("min_count")
            .short("m")
            .long("min-count")
            .takes_value(true)
            .default_value("0")
            .help("Kmers seen fewer times than this in a file are dropped from it"),
    )
    .arg(
        Arg::with_name("span_records")
            .long("span-records")
            .help("Let kmers run across the boundary between two records of a file"),
    )
}

fn add_output_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(
        Arg::with_name("output_file")
            .short("o")
            .long("output")
            .help("Output to this file")
            .takes_value(true),
    )
    .arg(
        Arg::with_name("std_out")
            .short("O")
            .long("std-out")
            .help("Output to stdout ('print to terminal')")
            .conflicts_with("output_file"),
    )
    .group(
        ArgGroup::with_name("output")
            .args(&["output_file", "std_out"])
            .required(true),
    )
}

pub fn get_int_arg<T: FromStr>(matches: &ArgMatches, key: &str) -> Result<T> {
    let display_key = key.replace('_', "-");
    matches
        .value_of(key)
        .ok_or_else(|| anyhow!("Bad {}", display_key))?
        .parse::<T>()
        .map_err(|_| anyhow!("{} must be a positive integer", display_key))
}

pub fn parse_count_options(matches: &ArgMatches) -> Result<CountParams> {
    let boundaries = if matches.is_present("span_records") {
        RecordBoundaries::Span
    } else {
        RecordBoundaries::Split
    };
    let params = CountParams {
        kmer_length: get_int_arg(matches, "kmer_length")?,
        min_count: get_int_arg(matches, "min_count")?,
        boundaries,
    };
    params.validate()?;
    Ok(params)
}

pub fn parse_store_options(matches: &ArgMatches) -> Result<StoreConfig> {
    Ok(StoreConfig {
        max_tables: get_int_arg(matches, "max_tables")?,
        max_size: get_int_arg(matches, "max_size")?,
    })
}

pub fn parse_mode(matches: &ArgMatches) -> VocabularyMode {
    if matches.is_present("intersect") {
        VocabularyMode::Intersection
    } else {
        VocabularyMode::Union
    }
}
