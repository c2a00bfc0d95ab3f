use serde_json::Value;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_catalog_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &std::path::Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn run(args: &[&str]) -> anyhow::Result<Output> {
    let bin = env!("CARGO_BIN_EXE_class-catalog");
    Ok(Command::new(bin).args(args).env_remove("RUST_LOG").output()?)
}

fn run_json(args: &[&str]) -> anyhow::Result<Value> {
    let out = run(args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

const MANIFEST: &str = r#"{
    "libraries": [
        {
            "name": "_builtin",
            "classes": [
                {"name": "Kernel", "kind": "module",
                 "methods": [
                    {"kind": "special_variable", "names": ["stdout"]},
                    {"kind": "module_function", "names": ["puts"]}
                 ]},
                {"name": "Object", "included": ["Kernel"],
                 "methods": [{"kind": "instance_method", "names": ["to_s"]}]},
                {"name": "Hoge", "superclass": "Object",
                 "methods": [{"kind": "instance_method", "names": ["hoge"]}]},
                {"name": "Hoge::Bar", "superclass": "Hoge",
                 "methods": [
                    {"kind": "singleton_method", "names": ["bar"]},
                    {"kind": "constant", "names": ["LIMIT"]}
                 ]}
            ]
        },
        {
            "name": "json",
            "requires": ["_builtin"],
            "added_methods": [
                {"class": "Object", "kind": "instance_method", "names": ["to_json"]}
            ]
        }
    ],
    "docs": [{"name": "glossary", "title": "Glossary"}]
}"#;

fn loaded_db(name: &str) -> anyhow::Result<std::path::PathBuf> {
    let base = temp_dir(name);
    let manifest = base.join("manifest.json");
    write_file(&manifest, MANIFEST)?;
    let db = base.join("db");
    let db_arg = db.to_string_lossy().to_string();
    run_json(&["--db", &db_arg, "init"])?;
    let loaded = run_json(&["--db", &db_arg, "load", &manifest.to_string_lossy()])?;
    assert_eq!(loaded["libraries"], 2);
    assert_eq!(loaded["classes"], 4);
    assert_eq!(loaded["methods"], 7);
    Ok(db)
}

#[test]
fn load_then_query_resolves_partial_patterns() -> anyhow::Result<()> {
    let db = loaded_db("query")?;
    let db_arg = db.to_string_lossy().to_string();

    let out = run_json(&["--db", &db_arg, "B.b"])?;
    assert_eq!(out["determined"], true);
    assert_eq!(out["methods"][0]["spec"], "Hoge::Bar.bar");

    let out = run_json(&["--db", &db_arg, "query", "$std"])?;
    assert_eq!(out["methods"][0]["spec"], "$stdout");

    let out = run_json(&["--db", &db_arg, "Hoge::Bar#to_s"])?;
    let method = &out["methods"][0];
    assert_eq!(method["spec"], "Object#to_s");
    assert_eq!(method["origins"][0], "Hoge::Bar");

    let out = run_json(&["--db", &db_arg, "Hoge::Bar::LIMIT"])?;
    assert_eq!(out["methods"][0]["kind"], "constant");

    let out = run_json(&["--db", &db_arg, "to_j"])?;
    assert_eq!(out["methods"][0]["library"], "json");
    assert_eq!(out["methods"][0]["provenance"], "added");

    let _ = std::fs::remove_dir_all(db.parent().unwrap_or(&db));
    Ok(())
}

#[test]
fn show_list_and_stats() -> anyhow::Result<()> {
    let db = loaded_db("show")?;
    let db_arg = db.to_string_lossy().to_string();

    let class = run_json(&["--db", &db_arg, "show", "Hoge::Bar"])?;
    assert_eq!(class["ancestors"], serde_json::json!(["Hoge::Bar", "Hoge", "Object", "Kernel"]));

    let method = run_json(&["--db", &db_arg, "show", "Kernel.#puts"])?;
    assert_eq!(method["kind"], "module_function");

    let libs = run_json(&["--db", &db_arg, "list", "libraries"])?;
    assert_eq!(libs, serde_json::json!(["_builtin", "json"]));

    let docs = run_json(&["--db", &db_arg, "list", "docs"])?;
    assert_eq!(docs, serde_json::json!(["glossary"]));

    let stats = run_json(&["--db", &db_arg, "stats"])?;
    assert_eq!(stats["classes"], 4);
    assert_eq!(stats["libraries"], 2);
    assert_eq!(stats["properties"]["encoding"], "utf-8");

    let text = run(&["--db", &db_arg, "-f", "text", "Ho"])?;
    assert!(text.status.success());
    let stdout = String::from_utf8_lossy(&text.stdout);
    assert!(stdout.lines().any(|l| l == "Hoge"));

    let _ = std::fs::remove_dir_all(db.parent().unwrap_or(&db));
    Ok(())
}

#[test]
fn unresolved_pattern_fails_with_candidates() -> anyhow::Result<()> {
    let db = loaded_db("missing")?;
    let db_arg = db.to_string_lossy().to_string();

    let out = run(&["--db", &db_arg, "Hoge#nothing_here"])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no such method in Hoge: Hoge#nothing_here"), "{stderr}");

    let out = run(&["--db", &db_arg, "Zzz"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no such class: Zzz"));

    assert!(run(&["--db", &db_arg, "clear"])?.status.success());
    assert!(!db.exists());
    let _ = std::fs::remove_dir_all(db.parent().unwrap_or(&db));
    Ok(())
}
