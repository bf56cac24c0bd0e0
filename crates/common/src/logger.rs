use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set.
pub fn setup_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_ascii_lowercase()))
        .add_directive(quiet("sqlx=warn"))
        .add_directive(quiet("hyper=warn"))
        .add_directive(quiet("tungstenite=warn"))
        .add_directive(quiet("tokio_tungstenite=warn"));

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(filter)
        .init();
}

fn quiet(directive: &'static str) -> tracing_subscriber::filter::Directive {
    directive
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::WARN.into())
}
