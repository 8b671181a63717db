use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use bigsort::{ExternalSorter, ExternalSorterBuilder};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let filename = arg_parser.value_of("filename").expect("value is required");
    let memory = arg_parser.value_of("mem").expect("value has default");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let write_concurrency: usize = arg_parser.value_of_t_or_exit("write_concurrency");
    let keep_runs = arg_parser.is_present("keep_runs");

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_memory_limit(memory.parse::<ByteSize>().expect("value is pre-validated").as_u64())
        .with_write_concurrency(write_concurrency)
        .with_keep_runs(keep_runs);
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("runtime initialization error: {}", err);
            process::exit(1);
        }
    };

    let report = match runtime.block_on(sorter.sort(path::Path::new(filename))) {
        Ok(report) => report,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    println!("internal sort done in {}ms", report.internal_sort.as_millis());
    println!("external sort done in {}ms", report.external_merge.as_millis());
    println!(
        "{} blocks sorted in {} runs -- file {}",
        report.blocks,
        report.runs,
        report.output.display()
    );
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("bigsort")
        .about("lexicographic external sort of 4K blocks")
        .arg(
            clap::Arg::new("filename")
                .help("file to be sorted")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("mem")
                .short('m')
                .long("mem")
                .help("memory available for internal sort")
                .takes_value(true)
                .default_value("1GiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("write_concurrency")
                .short('w')
                .long("write-concurrency")
                .help("maximum number of in-flight block writes")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            clap::Arg::new("keep_runs")
                .short('k')
                .long("keep-runs")
                .help("keep run files after the merge"),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
