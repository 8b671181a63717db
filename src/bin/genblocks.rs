//! Generates `<filename>.sorted` and `<filename>.unsorted` test pattern files.

use std::path;
use std::process;
use std::time::Instant;

use bytesize::ByteSize;
use env_logger;
use log;

use bigsort::pattern::{self, MAX_PATTERN_BLOCKS};
use bigsort::{DiskStorage, WriterOptions, BLOCK_SIZE};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let arg_parser = build_arg_parser();
    let filename = arg_parser.value_of("filename").expect("value is required");
    let size = arg_parser
        .value_of("size")
        .expect("value has default")
        .parse::<ByteSize>()
        .expect("value is pre-validated")
        .as_u64();
    let concurrency: usize = arg_parser.value_of_t_or_exit("write_concurrency");

    let count = size / BLOCK_SIZE as u64;
    if count > MAX_PATTERN_BLOCKS {
        log::error!(
            "pattern files are limited to {} bytes",
            MAX_PATTERN_BLOCKS * BLOCK_SIZE as u64
        );
        process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("runtime initialization error: {}", err);
            process::exit(1);
        }
    };

    let options = WriterOptions {
        concurrency,
        ..WriterOptions::default()
    };
    let start_time = Instant::now();
    let result = runtime.block_on(pattern::generate(
        &DiskStorage,
        path::Path::new(filename),
        count,
        options,
    ));
    if let Err(err) = result {
        log::error!("pattern generation error: {}", err);
        process::exit(1);
    }

    println!("pattern files done in {}ms", start_time.elapsed().as_millis());
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("genblocks")
        .about("4K blocks test pattern generator")
        .arg(
            clap::Arg::new("filename")
                .help("base path of the pattern files")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("size")
                .short('s')
                .long("size")
                .help("size of each pattern file")
                .takes_value(true)
                .default_value("10GiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("write_concurrency")
                .short('w')
                .long("write-concurrency")
                .help("maximum number of in-flight block writes per file")
                .takes_value(true)
                .default_value("20"),
        )
        .get_matches()
}
