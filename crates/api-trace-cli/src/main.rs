//! api-trace — entry point.

use anyhow::Context;

use api_trace_cli::browser::ChromiumBrowser;
use api_trace_cli::{credential, load_config, parse_args, trace_to_file, Invocation, TraceArgs};

fn init_logging(args: &TraceArgs) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args_os()) {
        Invocation::Usage(text) => {
            print!("{text}");
            return Ok(());
        }
        Invocation::PrintConfig(args) => {
            init_logging(&args);
            let config = load_config(&args)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        Invocation::Trace(args) => args,
    };

    init_logging(&args);
    let config = load_config(&args)?;
    let token = credential(&config.cookie);

    let mut browser = ChromiumBrowser::launch()
        .await
        .context("Chromium not available. Install Chrome or set API_TRACE_CHROMIUM_PATH.")?;

    let mut stdout = std::io::stdout();
    trace_to_file(&config, &mut browser, &args.url, token.as_deref(), &mut stdout).await?;
    Ok(())
}
