use clap::Parser;
use folio_context::text::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to split text files into overlapping chunks, printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source path recorded on each chunk. Defaults to the input path.
    #[arg(short, long)]
    path: Option<String>,

    /// Maximum length of each chunk, in characters.
    #[arg(short = 's', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[arg(short = 'o', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = &args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let splitter = TextSplitter::new(args.chunk_size, args.chunk_overlap)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let source_path = args
        .path
        .or(args.input)
        .unwrap_or_else(|| "stdin".to_string());
    let chunks = splitter.split(&source_path, &file_content);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{}", json_output);

    Ok(())
}
