use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::SubscriberBuilder;

pub fn setup_logging(verbose_level: u8, to_stdout: bool) {
    setup_logging_with_file(verbose_level, to_stdout, None);
}

pub fn setup_logging_for_terminal_ui(verbose_level: u8) {
    // Streamed output owns the terminal, so logs go to a file
    let log_file_path = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ollama-studio")
        .join("terminal.log");

    if let Some(parent) = log_file_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    setup_logging_with_file(verbose_level, false, Some(log_file_path));
}

fn filter_for(verbose_level: u8) -> tracing_subscriber::EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let filter_str = match verbose_level {
            0 => "warn,ollama_studio=info,llm=info,web=info",
            1 => "info,ollama_studio=debug,llm=debug,web=debug",
            _ => "debug,ollama_studio=trace,llm=trace,web=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    }
}

fn setup_logging_with_file(verbose_level: u8, to_stdout: bool, log_file: Option<PathBuf>) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbose_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    if let Some(log_file_path) = log_file {
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
        {
            Ok(file) => {
                subscriber
                    .with_ansi(false)
                    .with_writer(move || match file.try_clone() {
                        Ok(handle) => Box::new(handle) as Box<dyn io::Write + Send>,
                        Err(_) => Box::new(io::sink()) as Box<dyn io::Write + Send>,
                    })
                    .init();
            }
            Err(_) => {
                eprintln!(
                    "Warning: Could not open log file {:?}, logging is disabled",
                    log_file_path
                );
                subscriber
                    .with_writer(|| Box::new(io::sink()) as Box<dyn io::Write + Send>)
                    .init();
            }
        }
    } else {
        let subscriber: SubscriberBuilder<_, _, _, fn() -> Box<dyn io::Write + Send>> = if to_stdout
        {
            subscriber.with_writer(|| Box::new(std::io::stdout()) as Box<dyn io::Write + Send>)
        } else {
            subscriber.with_writer(|| Box::new(std::io::stderr()) as Box<dyn io::Write + Send>)
        };

        subscriber.init();
    }
}
