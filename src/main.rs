use clap::Parser;
use scour::cli::Cli;
use scour::core::config::Config;
use scour::core::error::Result;
use scour::query::IdQuery;
use scour::web::server::Session;
use scour::workspace::{self, Analysis};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS // --help and --version
            };
            let _ = e.print();
            return code;
        }
    };
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let monitor = match &cli.monitor {
        Some(spec) => Some(IdQuery::from_spec(spec)?),
        None => None,
    };

    let mut cx = Analysis::new();

    if cli.preprocess {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        return workspace::emit_preprocessed(&mut cx, &cli.workspace, &mut out);
    }

    // Pass 1: preprocess and parse every compilation unit
    workspace::process_pass1(&mut cx, &cli.workspace, monitor.as_ref())?;
    if cx.diags.total() > 0 {
        info!(
            "{} preprocessing and {} parse diagnostics",
            cx.diags.cpp_errors, cx.diags.parse_errors
        );
    }

    if cli.compile_only && !cli.report {
        return Ok(());
    }

    // Pass 2: identifier materialization and summaries
    let post = workspace::post_process(&mut cx, monitor.as_ref())?;
    info!(
        "{} identifiers across {} files",
        post.ids.len(),
        cx.files.len()
    );

    if cli.report {
        scour::post::warning_report(&cx, &post.ids);
    }
    if cli.compile_only {
        return Ok(());
    }

    let session = Session::new(cx, post, &config);
    scour::web::server::serve(session, cli.port).await
}
