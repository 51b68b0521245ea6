//! Directory listing page

use crate::response::escape_html;
use chrono::{DateTime, Local};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::Path;
use std::time::SystemTime;

/// Characters escaped in listing links
const LINK: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'#').add(b'?');

struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
    modified: Option<SystemTime>,
}

fn anchor(text: &str, href: &str) -> String {
    let href = if href.is_empty() { "/" } else { href };
    format!(
        "<a href=\"{}\">{}</a>",
        utf8_percent_encode(href, LINK),
        escape_html(text)
    )
}

fn format_date(time: Option<SystemTime>) -> String {
    let text = time
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!("{:>20}", text)
}

/// Link target for `name` inside the directory at `url`
fn entry_url(url: &str, name: &str, is_dir: bool) -> String {
    let mut href = url.trim_end_matches('/').to_string();
    href.push('/');
    href.push_str(name);
    if is_dir {
        href.push('/');
    }
    href
}

/// Render the listing for directory `dir` reached through `url`
///
/// One line per entry with date, size and link, directories first.
pub async fn render_listing(dir: &Path, url: &str, host: &str) -> std::io::Result<String> {
    let mut entries = Vec::new();
    let mut read = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = read.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata().await {
            Ok(meta) => entries.push(Entry {
                name,
                is_dir: meta.is_dir(),
                size: meta.len(),
                modified: meta.modified().ok(),
            }),
            Err(e) => tracing::debug!(name = %name, error = %e, "Listing entry skipped"),
        }
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    let trimmed = url.trim_end_matches('/');
    let parent = &trimmed[..trimmed.rfind('/').unwrap_or(0)];

    let mut html = format!("<h2>http://{}{}</h2><hr/><pre>", escape_html(host), escape_html(url));
    html.push_str(&anchor("[To Parent Directory]", parent));
    html.push_str("\r\n\r\n");

    for entry in &entries {
        html.push_str(&format_date(entry.modified));
        html.push('\t');
        html.push_str(&format!("{:<12}", entry.size));
        html.push_str(&anchor(&entry.name, &entry_url(url, &entry.name, entry.is_dir)));
        html.push_str("\r\n");
    }

    html.push_str("</pre><hr/>");
    html.push_str(&format!("<h5>Count: {}</h5>", entries.len()));
    Ok(html)
}
