use clap::Parser;
use monosquash::{
    archive::TarCodec,
    cli::{styles::AnsiStyles, MonosquashArgs},
    config::DEFAULT_LOG_FILTER,
    squash::{self, TracingObserver},
};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const VERBOSE_LOG_FILTER: &str = "monosquash=debug";

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = MonosquashArgs::parse();

    // RUST_LOG wins over both defaults
    let default_filter = if args.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();

    let config = args.to_config();
    tracing::trace!("flattening image: config={config:?}");

    let codec = match config.get_timeout() {
        Some(timeout) => TarCodec::with_timeout(*timeout),
        None => TarCodec::new(),
    };

    let layer = squash::run(&config, &codec, &TracingObserver).await?;

    println!(
        "{} {} {} {}",
        "Flattened".valid(),
        config.get_input().display(),
        "into layer".header(),
        layer.get_id().literal()
    );

    Ok(())
}
