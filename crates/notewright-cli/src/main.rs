use anyhow::Result;
use notewright_config::Config;
use notewright_engine::io;
use notewright_engine::schema::Schema;
use std::path::{Path, PathBuf};
use std::{env, process};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = Config::config_path();

    let (command, notebooks_path) = match args.len() {
        // Command plus explicit path
        3 => (args[1].clone(), PathBuf::from(&args[2])),
        // Command only - fall back to the config file
        2 => match Config::load() {
            Ok(Some(config)) => (args[1].clone(), config.notebooks_path),
            Ok(None) => {
                eprintln!("Error: No notebooks path provided and no config file found");
                eprintln!("Usage: {} <check|migrate> [notebooks-path]", args[0]);
                eprintln!("Or create a config file at {}", config_path.display());
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: Failed to load config file: {e}");
                eprintln!("Usage: {} <check|migrate> [notebooks-path]", args[0]);
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage: {} <check|migrate> [notebooks-path]", args[0]);
            process::exit(1);
        }
    };

    if !notebooks_path.is_dir() {
        eprintln!(
            "Error: Notebooks path '{}' is not a directory",
            notebooks_path.display()
        );
        process::exit(1);
    }

    let schema = Schema::notebook();
    match command.as_str() {
        "check" => {
            let (ok, failed) = check_documents(&schema, &notebooks_path)?;
            info!("Checked {} document(s) with {} error(s)", ok + failed, failed);
            if failed > 0 {
                process::exit(1);
            }
        }
        "migrate" => {
            let (migrated, failed) = migrate_documents(&schema, &notebooks_path)?;
            info!("Migrated {} document(s) with {} error(s)", migrated, failed);
        }
        other => {
            eprintln!("Error: Unknown command '{other}'");
            eprintln!("Usage: {} <check|migrate> [notebooks-path]", args[0]);
            process::exit(1);
        }
    }

    Ok(())
}

fn document_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Validate every document against the schema. Each file is attempted once;
/// failures are reported and tallied, never fatal.
fn check_documents(schema: &std::sync::Arc<Schema>, dir: &Path) -> Result<(usize, usize)> {
    let mut ok = 0;
    let mut failed = 0;
    for path in document_paths(dir)? {
        match io::read_document(schema, &path) {
            Ok(_) => ok += 1,
            Err(e) => {
                warn!("{}: {e}", path.display());
                failed += 1;
            }
        }
    }
    Ok((ok, failed))
}

/// Rewrite every document through the schema, filling in attribute defaults
/// that older files predate. Unreadable files are counted and left in place.
fn migrate_documents(schema: &std::sync::Arc<Schema>, dir: &Path) -> Result<(usize, usize)> {
    let mut migrated = 0;
    let mut failed = 0;
    for path in document_paths(dir)? {
        let result = io::read_document(schema, &path)
            .and_then(|doc| io::write_document(&doc, &path));
        match result {
            Ok(()) => migrated += 1,
            Err(e) => {
                warn!("{}: {e}", path.display());
                failed += 1;
            }
        }
    }
    Ok((migrated, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notewright_engine::schema::ATTR_LEVEL;
    use serde_json::json;

    #[test]
    fn migrate_fills_missing_attribute_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.json");
        // A heading written before levels were stored explicitly.
        std::fs::write(
            &path,
            r#"{"type":"doc","content":[{"type":"heading","content":[{"type":"text","text":"t"}]}]}"#,
        )
        .unwrap();

        let schema = Schema::notebook();
        let (migrated, failed) = migrate_documents(&schema, dir.path()).unwrap();
        assert_eq!((migrated, failed), (1, 0));

        let doc = io::read_document(&schema, &path).unwrap();
        assert_eq!(doc.child(0).attrs().get(ATTR_LEVEL), Some(&json!(1)));
        // The default is now serialized in the file itself.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("level"));
    }

    #[test]
    fn broken_documents_are_tallied_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"type":"doc","content":[{"type":"paragraph"}]}"#).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let schema = Schema::notebook();
        let (ok, failed) = check_documents(&schema, dir.path()).unwrap();
        assert_eq!((ok, failed), (1, 1));
    }
}
