//! Fetch subcommand - pull Zendesk objects into JSONL files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use deskline_core::{SharedProgress, fmt_num};
use deskline_zendesk::{RunConfig, SourceConfig};

use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Admin email used for API token authentication
    #[arg(long)]
    pub email: Option<String>,

    /// Zendesk API token
    #[arg(long, env = "ZENDESK_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Zendesk subdomains (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub subdomains: Vec<String>,

    /// Objects to pull (comma-separated, e.g. "Tickets,Ticket Comments")
    #[arg(long, required = true, value_delimiter = ',')]
    pub objects: Vec<String>,

    /// Start of the incremental window (RFC 3339, e.g. 2019-01-01T00:00:00Z)
    #[arg(long)]
    pub start_date: Option<String>,

    /// End of the window (RFC 3339)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Satisfaction rating score filter (e.g. good, bad, offered)
    #[arg(long)]
    pub score: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Base URL template with two %s placeholders (subdomain, path)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Output schema override (Avro-style JSON file, single object only)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let run_config = build_run_config(args, config)?;

    log::info!("Fetching Zendesk objects");
    log::info!("  Subdomains: {}", run_config.source.subdomains);
    log::info!("  Objects: {}", run_config.source.objects_to_pull);
    log::info!("  Output: {}", run_config.output_dir.display());

    deskline_core::install_signal_handlers().context("Cannot install signal handlers")?;

    let summary = deskline_zendesk::run(&run_config, progress)?;

    let mut rows = vec![
        (
            "Assignments",
            format!(
                "{}/{} ({} failed)",
                summary.completed, summary.total, summary.failed
            ),
        ),
        ("Records", fmt_num(summary.records)),
        ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ];
    if deskline_core::is_shutdown_requested() {
        rows.push(("Interrupted", "yes".to_string()));
    }
    print_summary("Zendesk", &rows);

    if !summary.failures.is_empty() {
        let mut table = super::table(&["Failed", "Error"]);
        for (label, error) in &summary.failures {
            table.add_row(vec![Cell::new(label), Cell::new(error)]);
        }
        eprintln!("\n{table}");
    }

    if summary.failed > 0 {
        anyhow::bail!("{} assignment(s) failed", summary.failed);
    }
    if deskline_core::is_shutdown_requested() {
        anyhow::bail!("Interrupted");
    }

    Ok(())
}

/// Merge command-line arguments over the config file
fn build_run_config(args: FetchArgs, config: &Config) -> Result<RunConfig> {
    let zendesk = &config.zendesk;
    let subdomains = if args.subdomains.is_empty() {
        zendesk.subdomains.clone()
    } else {
        args.subdomains
    };

    let schema = args
        .schema
        .map(|path| {
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read schema file: {}", path.display()))
        })
        .transpose()?;

    let source = SourceConfig {
        admin_email: args
            .email
            .or_else(|| zendesk.admin_email.clone())
            .unwrap_or_default(),
        api_token: args
            .token
            .or_else(|| zendesk.api_token.clone())
            .unwrap_or_default(),
        subdomains: subdomains.join(","),
        objects_to_pull: args.objects.join(","),
        start_date: args.start_date,
        end_date: args.end_date,
        satisfaction_ratings_score: args.score,
        max_retry_count: config.http.max_retries,
        max_retry_wait: config.http.max_retry_wait,
        max_retry_jitter_wait: config.http.max_retry_jitter_ms,
        connect_timeout: args.connect_timeout.unwrap_or(config.http.connect_timeout),
        read_timeout: config.http.read_timeout,
        zendesk_base_url: args.base_url.or_else(|| zendesk.base_url.clone()),
        schema,
    };

    Ok(RunConfig {
        source,
        output_dir: args
            .output
            .unwrap_or_else(|| config.output.default_dir.clone()),
        workers: config.workers.resolve(args.workers),
    })
}

/// Print a key-value summary table on stderr
fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = super::table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZendeskConfig;

    fn file_config() -> Config {
        Config {
            zendesk: ZendeskConfig {
                admin_email: Some("admin@acme.com".to_string()),
                api_token: Some("file-token".to_string()),
                subdomains: vec!["acme".to_string(), "globex".to_string()],
                base_url: None,
            },
            ..Config::default()
        }
    }

    fn fetch_args(objects: &[&str]) -> FetchArgs {
        FetchArgs {
            objects: objects.iter().map(|s| s.to_string()).collect(),
            ..FetchArgs::default()
        }
    }

    #[test]
    fn file_values_fill_missing_args() {
        let run = build_run_config(fetch_args(&["Groups", "Tags"]), &file_config()).unwrap();
        assert_eq!(run.source.admin_email, "admin@acme.com");
        assert_eq!(run.source.api_token, "file-token");
        assert_eq!(run.source.subdomains, "acme,globex");
        assert_eq!(run.source.objects_to_pull, "Groups,Tags");
        assert_eq!(run.source.max_retry_count, 20);
        assert_eq!(run.source.read_timeout, 300);
        assert_eq!(run.output_dir, PathBuf::from("./data"));
        assert_eq!(run.workers, 4);
        assert!(run.source.validate().is_empty());
    }

    #[test]
    fn args_override_file() {
        let args = FetchArgs {
            email: Some("ops@globex.com".to_string()),
            token: Some("cli-token".to_string()),
            subdomains: vec!["initech".to_string()],
            output: Some(PathBuf::from("/tmp/out")),
            workers: Some(64),
            base_url: Some("http://%s.localhost/%s".to_string()),
            connect_timeout: Some(10),
            start_date: Some("2019-01-01T00:00:00Z".to_string()),
            ..fetch_args(&["Tickets"])
        };
        let run = build_run_config(args, &file_config()).unwrap();
        assert_eq!(run.source.admin_email, "ops@globex.com");
        assert_eq!(run.source.api_token, "cli-token");
        assert_eq!(run.source.subdomains, "initech");
        assert_eq!(run.source.zendesk_base_url(), "http://%s.localhost/%s");
        assert_eq!(run.source.connect_timeout, 10);
        assert_eq!(run.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(run.workers, 16);
        assert!(run.source.resolve().is_ok());
    }

    #[test]
    fn schema_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(
            &path,
            r#"{"type":"record","name":"tags","fields":[{"name":"name","type":"string"}]}"#,
        )
        .unwrap();
        let args = FetchArgs {
            schema: Some(path),
            ..fetch_args(&["Tags"])
        };
        let run = build_run_config(args, &file_config()).unwrap();
        assert!(run.source.schema.as_deref().unwrap().contains("\"tags\""));

        let missing = FetchArgs {
            schema: Some(dir.path().join("missing.json")),
            ..fetch_args(&["Tags"])
        };
        assert!(build_run_config(missing, &file_config()).is_err());
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let run = build_run_config(fetch_args(&["Groups"]), &Config::default()).unwrap();
        let errors = run.source.validate();
        assert!(errors.for_property("admin_email").next().is_some());
        assert!(errors.for_property("subdomains").next().is_some());
    }
}
