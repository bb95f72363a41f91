//! helpers for logging.
use std::sync::Once;

static ONCE: Once = Once::new();

fn install(filter: Option<&str>) {
    ONCE.call_once(|| {
        let mut builder = env_logger::builder();

        if let Some(f) = filter {
            builder.parse_filters(f);
        }

        builder
            .format(|buf, record| {
                use std::io::Write;

                let now = time::OffsetDateTime::now_utc();
                let thread = std::thread::current();

                writeln!(
                    buf,
                    "{} {} time={} target={} thread={}",
                    record.level(),
                    record.args(),
                    now,
                    record.target(),
                    thread.name().unwrap_or("<unnamed>"),
                )
            })
            // Tests may race to install; whoever loses just uses the winner's logger.
            .try_init()
            .ok();
    });
}

/// Log to stderr, filtered by `RUST_LOG`.
///
/// If called multiple times in the same process, only applies once.
pub fn log_to_stderr() {
    install(None);
}

/// Log to stderr with an explicit filter in `RUST_LOG` syntax, e.g. `ammo_orm=debug`.
///
/// Like [log_to_stderr], only the first call in a process does anything.
pub fn log_to_stderr_with_filter(filter: &str) {
    install(Some(filter));
}
