//! `nova-ext list` - print the command catalog.

use anyhow::Result;
use console::style;

use crate::config::HostConfig;
use crate::extensions::{Catalog, CommandDescriptor};

pub fn run_list(config: &HostConfig, query: Option<&str>) -> Result<()> {
    let catalog = Catalog::new(config.extensions_dir());
    let descriptors = catalog.search(query.unwrap_or_default());

    if descriptors.is_empty() {
        println!(
            "{} {}",
            style("→").cyan(),
            style(format!(
                "No commands found in {}",
                catalog.extensions_dir().display()
            ))
            .dim()
        );
        return Ok(());
    }

    for descriptor in &descriptors {
        println!("{}", format_descriptor(descriptor));
    }
    println!();
    println!(
        "{}",
        style(format!("{} command(s)", descriptors.len())).dim()
    );

    Ok(())
}

fn format_descriptor(descriptor: &CommandDescriptor) -> String {
    let mut line = format!(
        "{} {} {}",
        style(&descriptor.title).bold(),
        style(format!("[{}]", descriptor.mode.as_str())).magenta(),
        style(&descriptor.id).dim()
    );
    if !descriptor.description.is_empty() {
        line.push_str(&format!("\n    {}", descriptor.description));
    }
    line
}
