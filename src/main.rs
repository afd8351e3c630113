use clap::Parser;
use colored::*;
use oapit::{
    OapitError,
    cli::{Cli, OutputFormat},
    commands, telemetry,
    validation::Report,
};
use tokio_util::sync::CancellationToken;

const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_telemetry();

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let output = cli.options.output;
    // The pipeline is synchronous and may block on HTTP fetches
    let worker = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || commands::execute(&cli, &cancel))
    };

    let result = tokio::select! {
        joined = worker => joined.unwrap_or_else(|e| Err(OapitError::IoError(std::io::Error::other(e)))),
        _ = cancel.cancelled() => {
            eprintln!("{}", "✗ Interrupted".red().bold());
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    if let Err(error) = result {
        report_failure(&error, output);
        std::process::exit(error.exit_code());
    }
}

fn report_failure(error: &OapitError, output: OutputFormat) {
    let report = Report::from_error(error);
    match output {
        OutputFormat::Text => {
            eprintln!("{}", format!("✗ {}", report.summary).red().bold());
            for line in report.lines() {
                eprintln!("  {}", line);
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", format!("✗ {} ({})", report.summary, e).red()),
        },
    }
}

/// Cancel `cancel` on SIGINT, SIGTERM or SIGHUP.
async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(mut terminate), Ok(mut hangup)) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                    _ = hangup.recv() => {}
                }
            }
            _ => {
                tracing::warn!("could not install SIGTERM/SIGHUP handlers");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::debug!("termination signal received");
    cancel.cancel();
}
