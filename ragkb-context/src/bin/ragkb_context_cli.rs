use clap::Parser;
use ragkb_context::{DEFAULT_TEXT_DELIMITERS, TextSplitter};
use std::fs;
use std::io::{self, Read};

/// Chunk a text file into overlapping passages and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum size of each chunk's non-overlapping core, in bytes.
    #[arg(short, long, default_value_t = 1000)]
    max_chunk_size: usize,

    /// Overlap between adjacent chunks, in bytes.
    #[arg(short, long, default_value_t = 200)]
    overlap: usize,

    /// Comma-separated list of regex patterns for delimiters.
    /// Defaults to the prose delimiters if not provided.
    #[arg(short, long, value_delimiter = ',')]
    delimiters: Option<Vec<String>>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    if args.max_chunk_size == 0 || args.overlap >= args.max_chunk_size {
        eprintln!("error: overlap must be smaller than a positive max chunk size");
        std::process::exit(2);
    }

    let content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let patterns_owned: Vec<String> = if let Some(d) = args.delimiters {
        d
    } else {
        DEFAULT_TEXT_DELIMITERS
            .iter()
            .map(|&s| s.to_string())
            .collect()
    };
    let patterns: Vec<&str> = patterns_owned.iter().map(|s| s.as_str()).collect();

    let splitter = TextSplitter::with_delimiters(&patterns, args.max_chunk_size, args.overlap);
    let pieces = splitter.split(&content);

    let json_output = serde_json::to_string_pretty(&pieces)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    println!("{json_output}");

    Ok(())
}
