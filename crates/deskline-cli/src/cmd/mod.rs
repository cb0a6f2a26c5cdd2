pub mod fetch;
pub mod objects;
pub mod schema;

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

/// Table with the house style and a cyan header
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    let mut table = table(&["Setting", "Value"]);
    let zendesk = &config.zendesk;

    table.add_row(vec![
        "Admin email",
        zendesk.admin_email.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec![
        "API token",
        if zendesk.api_token.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec!["Subdomains", &zendesk.subdomains.join(", ")]);
    table.add_row(vec![
        "Base URL",
        deskline_zendesk::zendesk_base_url(zendesk.base_url.as_deref()),
    ]);
    table.add_row(vec![
        "Output directory",
        &config.output.default_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Workers",
        &format!("{} (max: {})", config.workers.default, config.workers.max),
    ]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, read {}s",
            config.http.connect_timeout, config.http.read_timeout
        ),
    ]);
    table.add_row(vec![
        "Rate limit retries",
        &format!(
            "{} attempts, max wait {}s, jitter {}ms",
            config.http.max_retries, config.http.max_retry_wait, config.http.max_retry_jitter_ms
        ),
    ]);
    if let Some(path) = Config::user_config_path() {
        table.add_row(vec!["User config", &path.display().to_string()]);
    }

    eprintln!("\n{table}");
    Ok(())
}
