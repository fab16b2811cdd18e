use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use graphpack_types::{Document, ObjectId, TypeId};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Inspect(args) => cmd_inspect(&args.path, cli.format),
        Command::Types(args) => cmd_types(&args.path, cli.format),
        Command::Check(args) => cmd_check(&args.path, args.strict, cli.format),
    }
}

pub fn load_document(path: &Path) -> anyhow::Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let document = Document::from_json_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), objects = document.objects.len(), "document loaded");
    Ok(document)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Summary {
    pub version: u32,
    pub root: String,
    pub root_type: String,
    pub objects: usize,
    pub types: usize,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct TypeRow {
    pub type_id: String,
    /// `None` for ids used by objects but absent from the type table,
    /// which are normally built-in types.
    pub fullname: Option<String>,
    pub instances: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub missing: Vec<String>,
    pub unreachable: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self, strict: bool) -> bool {
        self.missing.is_empty() && (!strict || self.unreachable.is_empty())
    }
}

pub fn summarize(document: &Document) -> Summary {
    Summary {
        version: document.version,
        root: document.root.object.to_string(),
        root_type: document.root.type_id.to_string(),
        objects: document.objects.len(),
        types: document.types.as_ref().map_or(0, BTreeMap::len),
    }
}

pub fn type_rows(document: &Document) -> Vec<TypeRow> {
    let mut instances: BTreeMap<TypeId, usize> = BTreeMap::new();
    for id in document.objects.keys() {
        if let Some(isa) = document.isa(id) {
            *instances.entry(isa.type_id).or_default() += 1;
        }
    }
    if let Some(table) = &document.types {
        for type_id in table.keys() {
            instances.entry(type_id.clone()).or_default();
        }
    }
    instances
        .into_iter()
        .map(|(type_id, count)| TypeRow {
            fullname: document
                .type_info(&type_id)
                .and_then(|info| info.fullname.clone()),
            type_id: type_id.to_string(),
            instances: count,
        })
        .collect()
}

pub fn check(document: &Document) -> CheckReport {
    CheckReport {
        missing: document
            .missing_objects()
            .into_iter()
            .map(|token| token.object.to_string())
            .collect(),
        unreachable: document
            .unreachable_objects()
            .iter()
            .map(ObjectId::to_string)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_inspect(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let summary = summarize(&load_document(path)?);
    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!("Document {}", path.display().to_string().bold());
    println!("  Version: {}", summary.version);
    println!("  Root: {} (type {})", summary.root.yellow(), summary.root_type.cyan());
    println!("  Objects: {}", summary.objects.to_string().bold());
    println!("  Types: {}", summary.types.to_string().bold());
    Ok(())
}

fn cmd_types(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let rows = type_rows(&load_document(path)?);
    if format == OutputFormat::Json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No types.");
        return Ok(());
    }
    for row in &rows {
        let name = match &row.fullname {
            Some(name) => name.normal(),
            None => "(built-in)".dimmed(),
        };
        println!("{:>6}  {:>5}  {}", row.type_id.cyan(), row.instances, name);
    }
    Ok(())
}

fn cmd_check(path: &Path, strict: bool, format: OutputFormat) -> anyhow::Result<()> {
    let report = check(&load_document(path)?);
    if format == OutputFormat::Json {
        print_json(&report)?;
    } else {
        for id in &report.missing {
            println!("  {} referenced object {} has no entry", "missing:".red(), id.yellow());
        }
        for id in &report.unreachable {
            println!("  {} object {} is not reachable from the root", "unreachable:".yellow(), id);
        }
    }
    if !report.is_clean(strict) {
        anyhow::bail!(
            "{} missing, {} unreachable objects",
            report.missing.len(),
            report.unreachable.len()
        );
    }
    if format == OutputFormat::Text {
        println!("{} Document is consistent.", "✓".green().bold());
    }
    Ok(())
}
