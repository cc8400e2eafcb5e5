// Poll a scope on a fixed interval. The refresh schedule and the retry
// policy live here in the caller; the session itself never loops.

use std::thread;
use std::time::Duration;

use clap::Parser;
use owonpds_rs::{Capture, PdsScope, ScopeError, TransportError};

#[derive(Parser)]
#[command(about = "Poll an Owon PDS scope at a fixed interval")]
struct Args {
    /// Device index (0 = first matching scope)
    #[arg(short, long, default_value_t = 0)]
    index: usize,

    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = 143)]
    interval_ms: u64,

    /// Number of captures to take before exiting
    #[arg(short, long, default_value_t = 20)]
    count: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let interval = Duration::from_millis(args.interval_ms);

    let mut scope = PdsScope::open(args.index)?;
    println!("Polling {} every {:?}", scope.identity().product, interval);

    let mut completed = 0;
    while completed < args.count {
        match scope.read() {
            Ok(Capture::Vector(vector)) => {
                completed += 1;
                let samples: usize = vector.channels.iter().map(|c| c.samples()).sum();
                println!(
                    "capture {}: {} channels, {} samples",
                    completed,
                    vector.channels.len(),
                    samples
                );
            }
            Ok(Capture::Bitmap(bitmap)) => {
                completed += 1;
                println!(
                    "capture {}: screen dump {}x{}",
                    completed, bitmap.width, bitmap.height
                );
            }
            Err(ScopeError::Transport(TransportError::Timeout(after))) => {
                // A slow device is worth another try; anything else is not.
                println!("transfer timed out after {after:?}, retrying");
            }
            Err(error) => return Err(error.into()),
        }
        thread::sleep(interval);
    }

    Ok(())
}
