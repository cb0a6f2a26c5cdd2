//! Objects subcommand - list what can be pulled

use anyhow::Result;
use comfy_table::Table;

use deskline_zendesk::ObjectKind;

pub fn run() -> Result<()> {
    eprintln!("\n{}", objects_table());
    Ok(())
}

fn objects_table() -> Table {
    let mut table = super::table(&["Object", "Endpoint", "Mode", "Enriched with"]);
    for kind in ObjectKind::all() {
        let descriptor = kind.descriptor();
        let mode = if descriptor.incremental {
            "incremental"
        } else {
            "list"
        };
        let join = descriptor
            .join
            .as_ref()
            .map(|j| format!("{} ({} -> {})", j.secondary, j.key_field, j.target_field))
            .unwrap_or_default();
        table.add_row(vec![
            descriptor.name.to_string(),
            descriptor.endpoint.to_string(),
            mode.to_string(),
            join,
        ]);
    }
    table
}
