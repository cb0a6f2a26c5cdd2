//! Schema subcommand - print the default output schema of an object

use anyhow::Result;
use clap::Args;

use deskline_zendesk::ObjectKind;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Object name, e.g. "Tickets" or "Ticket Comments"
    pub object: String,
}

pub fn run(args: SchemaArgs) -> Result<()> {
    println!("{}", render(&args.object)?);
    Ok(())
}

fn render(object: &str) -> Result<String> {
    let kind = ObjectKind::from_name(object)?;
    Ok(serde_json::to_string_pretty(&kind.schema().to_json())?)
}
