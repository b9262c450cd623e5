//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! ## Check
//!
//! ```text
//! Sources
//!     public/
//!     Default image: images/placeholder.png
//! Cache
//!     public/resize/
//!     Output: WebP q85 (forced)
//!     Auto width cap: 1920px, max side 4096px
//! Locks
//!     Timeout: 5000ms, poll every 100ms
//! Metadata
//!     TTL: 30 days, max 10000 entries
//! Server
//!     127.0.0.1:8080
//! Presets
//!     medium → 300x300
//!     thumb → 150x150
//! ```
//!
//! ## Purge
//!
//! ```text
//! news/photo.jpg: deleted 3 artifacts
//! ```

use crate::config::ServiceConfig;

fn indent(line: impl AsRef<str>) -> String {
    format!("    {}", line.as_ref())
}

fn dir_line(path: &std::path::Path) -> String {
    let shown = path.display().to_string();
    if shown.ends_with('/') {
        indent(shown)
    } else {
        indent(format!("{shown}/"))
    }
}

pub fn format_check_output(config: &ServiceConfig) -> Vec<String> {
    let mut lines = vec!["Sources".to_string(), dir_line(&config.public_root)];
    match &config.default_image {
        Some(default) => lines.push(indent(format!("Default image: {default}"))),
        None => lines.push(indent("Default image: none")),
    }

    lines.push("Cache".to_string());
    lines.push(dir_line(&config.cache_root()));
    let resize = &config.resize;
    lines.push(indent(if resize.force_modern_format {
        format!("Output: WebP q{} (forced)", resize.modern_quality)
    } else {
        format!("Output: source format q{}", resize.original_quality)
    }));
    lines.push(indent(format!(
        "Auto width cap: {}px, max side {}px",
        resize.max_auto_width, resize.max_dimension
    )));

    lines.push("Locks".to_string());
    lines.push(indent(format!(
        "Timeout: {}ms, poll every {}ms",
        config.lock.timeout_ms, config.lock.poll_interval_ms
    )));

    lines.push("Metadata".to_string());
    let ttl = config.metadata.ttl_secs;
    let ttl_text = if ttl % 86_400 == 0 {
        format!("{} days", ttl / 86_400)
    } else {
        format!("{ttl}s")
    };
    lines.push(indent(format!(
        "TTL: {ttl_text}, max {} entries",
        config.metadata.max_entries
    )));

    lines.push("Server".to_string());
    lines.push(indent(&config.server.bind));

    if !config.url.sizes.is_empty() {
        lines.push("Presets".to_string());
        for (name, size) in &config.url.sizes {
            lines.push(indent(format!("{name} → {size}")));
        }
    }
    lines
}

pub fn print_check_output(config: &ServiceConfig) {
    for line in format_check_output(config) {
        println!("{line}");
    }
}

pub fn format_purge_output(slug: &str, deleted: usize) -> String {
    match deleted {
        0 => format!("{slug}: no cached artifacts"),
        1 => format!("{slug}: deleted 1 artifact"),
        n => format!("{slug}: deleted {n} artifacts"),
    }
}
