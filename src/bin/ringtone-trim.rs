use std::path::PathBuf;

use clap::Parser;
use ringtone_trimmer::{spawn_trim, TrimConfig, TrimRequest};

/// Trim an audio file into a ringtone without re-encoding
#[derive(Parser, Debug)]
#[command(name = "ringtone-trim")]
#[command(about = "Trim an audio file into a ringtone without re-encoding", long_about = None)]
struct Args {
    /// Input audio file (MP3, M4A, MP4)
    input: PathBuf,

    /// Start time in milliseconds
    #[arg(short, long, default_value_t = 0)]
    start_ms: u64,

    /// End time in milliseconds, 0 for the end of the file
    #[arg(short, long, default_value_t = 0)]
    end_ms: u64,

    /// Directory to write the trimmed file to
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = TrimConfig::default();
    if let Some(dir) = args.scratch_dir {
        config = config.with_scratch_dir(dir);
    }

    let request = TrimRequest::from_millis(args.input, args.start_ms, args.end_ms);
    match spawn_trim(config, request).and_then(|handle| handle.wait()) {
        Ok(trimmed) => {
            println!("{}", trimmed.path.display());
            log::info!(
                "{} output, {} samples, {} bytes",
                trimmed.variant,
                trimmed.samples,
                trimmed.bytes
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.kind().code(), e);
            std::process::exit(1);
        }
    }
}
