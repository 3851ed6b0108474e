//! Output formatting

use clap::ValueEnum;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print a whole document; tables fall back to YAML.
    pub fn print<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Yaml | OutputFormat::Table => print!("{}", serde_yaml::to_string(data)?),
        }
        Ok(())
    }

    pub fn is_table(&self) -> bool {
        matches!(self, OutputFormat::Table)
    }
}

/// Render rows as a table with an optional heading.
pub fn table<T: Tabled>(title: &str, rows: &[T]) {
    use colored::Colorize;

    println!("{}", title.bold());
    if rows.is_empty() {
        println!("  {}", "(none)".dimmed());
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
}
