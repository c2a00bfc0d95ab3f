use anyhow::{Context, Result};
use clap::Parser;
use class_catalog::cli::{Cli, Commands, ListKind, LogLevel, OutputFormat};
use class_catalog::config::{clear_db, resolve_db_path};
use class_catalog::manifest::{self, Manifest};
use class_catalog::{
    CatalogError, ClassEntry, Database, MethodEntry, MethodSpec, SearchEngine, SearchOptions,
    SearchPattern, SearchResult,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = parse_cli()?;
    init_tracing(cli.log_level);

    let db_path = resolve_db_path(&cli)?;
    match cli.command.clone() {
        Commands::Clear => {
            clear_db(&db_path)?;
        }
        Commands::Init { encoding } => {
            let mut db = open_db(&db_path)?;
            db.init()?;
            if let Some(encoding) = encoding {
                db.transaction(|db| db.set_property("encoding", &encoding))?;
            }
            let output = InitOutput {
                prefix: db.prefix().to_string_lossy().to_string(),
                properties: db.properties().clone(),
            };
            write_output(&output, cli.format, |o| {
                o.properties.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
            })?;
        }
        Commands::Load { manifest } => {
            let mut db = open_db(&db_path)?;
            let output = load_manifest(&mut db, &manifest)?;
            write_output(&output, cli.format, |o| {
                format!(
                    "libraries: {}\nclasses: {}\nmethods: {}\ndocs: {}\nfunctions: {}\nduration_ms: {}\n",
                    o.libraries, o.classes, o.methods, o.docs, o.functions, o.duration_ms
                )
            })?;
        }
        Commands::Query {
            pattern,
            max_combinations,
        } => {
            let db = open_db(&db_path)?;
            let output = query(&db, &pattern, SearchOptions { max_combinations })?;
            write_output(&output, cli.format, render_query_text)?;
        }
        Commands::Show { name } => {
            let db = open_db(&db_path)?;
            // `A::B` is a class when one exists, a constant otherwise
            match db.get_class(&name)? {
                None => {
                    let spec = MethodSpec::parse(&name)
                        .map_err(|_| CatalogError::ClassNotFound { name: name.clone() })?;
                    let method = db.fetch_method(&spec)?;
                    let output = MethodOutput::from_entry(&method, Vec::new());
                    write_output(&output, cli.format, |o| {
                        format!("{}\n{}", o.names.join(", "), o.source)
                    })?;
                }
                Some(class) => {
                    let output = class_output(&db, &class)?;
                    write_output(&output, cli.format, |o| {
                        format!(
                            "{} {}\nancestors: {}\n{}",
                            o.kind,
                            o.name,
                            o.ancestors.join(" < "),
                            o.source
                        )
                    })?;
                }
            }
        }
        Commands::List { what } => {
            let db = open_db(&db_path)?;
            let names = list_names(&db, what)?;
            write_output(&names, cli.format, |n| {
                n.iter().map(|s| format!("{s}\n")).collect()
            })?;
        }
        Commands::Stats => {
            let db = open_db(&db_path)?;
            let stats = db.stats()?;
            write_output(&stats, cli.format, |s| {
                format!(
                    "prefix: {}\nlibraries: {}\nclasses: {}\nmethods: {}\ndocs: {}\nfunctions: {}\nindexed_names: {}\n",
                    s.prefix, s.libraries, s.classes, s.methods, s.docs, s.functions, s.indexed_names
                )
            })?;
        }
    }

    Ok(())
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_query(args)))
}

/// `class-catalog Array#each` means `class-catalog query Array#each`.
fn rewrite_args_for_implicit_query(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = [
        "init", "load", "query", "show", "list", "stats", "clear", "help",
    ];
    let valued = ["--db", "--format", "-f", "--log-level"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if valued.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "query".to_string());
        }
    }

    args
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn open_db(path: &Path) -> Result<Database> {
    Database::open(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

#[derive(Debug, Serialize)]
struct InitOutput {
    prefix: String,
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct LoadOutput {
    manifest: String,
    libraries: usize,
    classes: usize,
    methods: usize,
    docs: usize,
    functions: usize,
    records_written: usize,
    duration_ms: u64,
}

fn load_manifest(db: &mut Database, path: &Path) -> Result<LoadOutput> {
    let start = Instant::now();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let parsed: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
    let summary = manifest::load(db, &parsed)
        .with_context(|| format!("Failed to load manifest: {}", path.display()))?;
    Ok(LoadOutput {
        manifest: path.to_string_lossy().to_string(),
        libraries: summary.libraries,
        classes: summary.classes,
        methods: summary.methods,
        docs: summary.docs,
        functions: summary.functions,
        records_written: summary.commit.records_written,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[derive(Debug, Serialize)]
struct MethodOutput {
    spec: String,
    names: Vec<String>,
    kind: String,
    library: String,
    visibility: String,
    provenance: String,
    origins: Vec<String>,
    source: String,
}

impl MethodOutput {
    fn from_entry(entry: &MethodEntry, origins: Vec<String>) -> Self {
        Self {
            spec: entry.spec().label(),
            names: entry.labels(),
            kind: entry.kind().type_name().to_string(),
            library: entry.id.library.to_string(),
            visibility: entry.visibility.name().to_string(),
            provenance: entry.provenance.name().to_string(),
            origins,
            source: entry.source.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    pattern: String,
    classes: Vec<String>,
    methods: Vec<MethodOutput>,
    determined: bool,
    truncated: bool,
    duration_ms: u64,
}

fn query(db: &Database, pattern: &str, options: SearchOptions) -> Result<QueryOutput> {
    let start = Instant::now();
    let parsed = SearchPattern::parse(pattern)?;
    let result: SearchResult = SearchEngine::with_options(db, options).search(&parsed)?;
    if result.fail() && !parsed.is_empty() {
        let err = if parsed.method.is_none() && parsed.kind.is_none() {
            CatalogError::ClassNotFound {
                name: pattern.to_string(),
            }
        } else {
            CatalogError::MethodNotFound {
                pattern: pattern.to_string(),
                candidates: result.classes.clone(),
            }
        };
        return Err(err.into());
    }

    let mut methods = Vec::with_capacity(result.records.len());
    for record in &result.records {
        if let Some(entry) = db.method(&record.method)? {
            methods.push(MethodOutput::from_entry(&entry, record.origins.clone()));
        }
    }
    Ok(QueryOutput {
        pattern: pattern.to_string(),
        determined: result.determined(),
        truncated: result.truncated,
        classes: result.classes,
        methods,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn render_query_text(output: &QueryOutput) -> String {
    let mut out = String::new();
    if output.methods.is_empty() {
        for class in &output.classes {
            out.push_str(&format!("{class}\n"));
        }
    }
    for m in &output.methods {
        out.push_str(&m.names.join(", "));
        let inherited: Vec<&String> = m
            .origins
            .iter()
            .filter(|o| !m.spec.starts_with(o.as_str()))
            .collect();
        if !inherited.is_empty() {
            let names: Vec<&str> = inherited.iter().map(|s| s.as_str()).collect();
            out.push_str(&format!("  (via {})", names.join(", ")));
        }
        out.push_str(&format!("  [{}]\n", m.library));
    }
    if output.truncated {
        out.push_str("(results truncated)\n");
    }
    out
}

#[derive(Debug, Serialize)]
struct ClassOutput {
    name: String,
    kind: String,
    library: Option<String>,
    superclass: Option<String>,
    included: Vec<String>,
    extended: Vec<String>,
    aliases: Vec<String>,
    ancestors: Vec<String>,
    entries: Vec<String>,
    source: String,
}

fn class_output(db: &Database, class: &ClassEntry) -> Result<ClassOutput> {
    let names = |ids: &[class_catalog::ClassId]| ids.iter().map(|c| c.name()).collect();
    Ok(ClassOutput {
        name: class.name(),
        kind: class.kind.name().to_string(),
        library: class.library.as_ref().map(|l| l.to_string()),
        superclass: class.superclass.as_ref().map(|c| c.name()),
        included: names(&class.included),
        extended: names(&class.extended),
        aliases: class.aliases.clone(),
        ancestors: db.ancestors(&class.id)?.iter().map(|c| c.name()).collect(),
        entries: class.entries.iter().map(|m| m.spec().label()).collect(),
        source: class.source.clone(),
    })
}

fn list_names(db: &Database, what: ListKind) -> Result<Vec<String>> {
    Ok(match what {
        ListKind::Classes => db.class_ids()?.iter().map(|c| c.name()).collect(),
        ListKind::Libraries => db.library_ids()?.iter().map(|l| l.to_string()).collect(),
        ListKind::Docs => db.doc_ids()?.iter().map(|d| d.to_string()).collect(),
        ListKind::Functions => db.function_ids()?.iter().map(|f| f.to_string()).collect(),
    })
}

fn write_output<T: Serialize>(
    value: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => text(value),
    };
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}
