use anyhow::{bail, Result};
use std::path::PathBuf;
use tft_capture::{FrameSource, ReplaySource, StillImageSource};
use tocker_overlay::AppConfig;

enum Source {
    Image(PathBuf),
    Frames(PathBuf),
    Mock,
}

struct Args {
    config: Option<PathBuf>,
    source: Source,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config = None;
    let mut source = None;
    for arg in args {
        if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--image=") {
            source = Some(Source::Image(PathBuf::from(path)));
        } else if let Some(dir) = arg.strip_prefix("--frames=") {
            source = Some(Source::Frames(PathBuf::from(dir)));
        } else if arg == "--mock" {
            source = Some(Source::Mock);
        } else {
            bail!("unrecognized argument '{}'", arg);
        }
    }
    let Some(source) = source else {
        bail!("one of --image=PATH, --frames=DIR or --mock is required");
    };
    Ok(Args { config, source })
}

#[tokio::main]
async fn main() -> Result<()> {
    tocker_overlay::init_tracing();

    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv[1..]) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: {} [--config=PATH] (--image=PATH | --frames=DIR | --mock)",
                argv.first().map(String::as_str).unwrap_or("tocker-overlay")
            );
            std::process::exit(2);
        }
    };

    let config = AppConfig::load(args.config.as_deref())?;
    let source: Box<dyn FrameSource> = match args.source {
        Source::Image(path) => Box::new(StillImageSource::open(&path)?),
        Source::Frames(dir) => Box::new(ReplaySource::open(&dir)?),
        Source::Mock => Box::new(StillImageSource::blank(
            config.layout.resolution.width,
            config.layout.resolution.height,
        )),
    };

    tocker_overlay::run(config, source).await
}
