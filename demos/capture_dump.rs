// Read one capture from a scope, print a summary and optionally export
// it to <output>.csv (waveforms) or <output>.png (screen dumps).

use std::path::PathBuf;

use clap::Parser;
use owonpds_rs::{Capture, CsvOptions, PdsScope};

#[derive(Parser)]
#[command(about = "Read one capture from an Owon PDS scope")]
struct Args {
    /// Device index (0 = first matching scope)
    #[arg(short, long, default_value_t = 0)]
    index: usize,

    /// Basename for the exported file; the extension is appended
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Include a time column in CSV output
    #[arg(short, long)]
    time: bool,

    /// Include device info lines in CSV output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("owonpds utility {}\n", owonpds_rs::version());

    let mut scope = PdsScope::open(args.index)?;
    let identity = scope.identity();
    println!(
        "Device      {} {}",
        identity.manufacturer, identity.product
    );

    let capture = scope.read()?.clone();
    match &capture {
        Capture::Vector(vector) => {
            println!("Channel Data");
            println!("Name        {}", vector.name);
            for channel in &vector.channels {
                println!("  Channel     {}", channel.name);
                println!("    Timebase    {:.9}s", channel.timebase);
                println!("    Position    {:.3}s", channel.slow);
                println!("    Offset      {:.3}v", channel.offset);
                println!("    Sensitivity {:.2}v", channel.sensitivity);
                println!("    Attenuation {}X", channel.attenuation);
            }
        }
        Capture::Bitmap(bitmap) => {
            println!("Bitmap Data {}x{}", bitmap.width, bitmap.height);
        }
    }

    if let Some(basename) = args.output {
        let path = match &capture {
            Capture::Vector(_) => basename.with_extension("csv"),
            Capture::Bitmap(_) => basename.with_extension("png"),
        };
        let file = std::fs::File::create(&path)?;
        match &capture {
            Capture::Vector(_) => capture.write_csv(
                file,
                CsvOptions {
                    include_time: args.time,
                    verbose: args.verbose,
                },
            )?,
            Capture::Bitmap(_) => capture.write_png(file)?,
        }
        println!("\nWrote {}", path.display());
    }

    scope.close();
    Ok(())
}
