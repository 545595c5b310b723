use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use bitastro_core::{Result, TokenId, Tokenizer, TokenizerConfig};

#[derive(Parser, Debug)]
#[command(name = "bitastro")]
#[command(about = "Byte-level BPE tokenizer tools", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode text into token ids
    Encode {
        /// Merge-rule file (byte-level only when omitted or unreadable)
        #[arg(short, long)]
        merges: Option<PathBuf>,
        /// Text to encode
        text: String,
    },
    /// Decode token ids into text
    Decode {
        /// Merge-rule file (byte-level only when omitted or unreadable)
        #[arg(short, long)]
        merges: Option<PathBuf>,
        /// Token ids
        #[arg(required = true)]
        ids: Vec<TokenId>,
    },
    /// Learn merge rules from a corpus and save them
    Train {
        /// Corpus text file
        #[arg(short, long)]
        input: PathBuf,
        /// Target vocabulary size (256 byte tokens + merges)
        #[arg(long, default_value = "512")]
        vocab_size: usize,
        /// Output merge-rule file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show vocabulary statistics
    Inspect {
        /// Merge-rule file
        #[arg(short, long)]
        merges: PathBuf,
        /// Number of merged tokens to print
        #[arg(long, default_value = "16")]
        limit: usize,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Encode { merges, text } => {
            let tokenizer = open_tokenizer(merges.as_deref());
            let ids: Vec<String> = tokenizer.encode(&text).iter().map(ToString::to_string).collect();
            println!("{}", ids.join(" "));
        }
        Command::Decode { merges, ids } => {
            let tokenizer = open_tokenizer(merges.as_deref());
            println!("{}", tokenizer.decode(&ids));
        }
        Command::Train {
            input,
            vocab_size,
            output,
        } => {
            let corpus = std::fs::read_to_string(&input)?;
            let tokenizer = Tokenizer::default();
            let learned = tokenizer.train(&corpus, vocab_size)?;
            tokenizer.save(&output)?;
            println!("learned {learned} merges -> {}", output.display());
        }
        Command::Inspect { merges, limit } => {
            let tokenizer = Tokenizer::default();
            let summary = tokenizer.load(&merges)?;
            println!("Vocab size: {}", tokenizer.vocab_size());
            println!("Merges: {} ({} lines skipped)", summary.rules_loaded, summary.lines_skipped);
            for rule in tokenizer.merges().iter().take(limit) {
                let bytes = tokenizer.token_bytes(rule.id).unwrap_or_default();
                println!("{}: {:?}", rule.id, String::from_utf8_lossy(&bytes));
            }
        }
    }
    Ok(())
}

/// Falls back to byte-level tokenization when the merge file cannot be read.
fn open_tokenizer(merges: Option<&Path>) -> Tokenizer {
    let tokenizer = Tokenizer::new(&TokenizerConfig::default());
    if let Some(path) = merges {
        if let Err(e) = tokenizer.load(path) {
            eprintln!("warning: {e}; using byte-level tokens");
        }
    }
    tokenizer
}
