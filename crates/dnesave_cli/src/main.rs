use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use dnesave_core::container::unpack;
use dnesave_core::core_api::{
    CoreError, CoreErrorCode, Engine, FactTimeline, FactValue, Relationship, SceneRelationships,
    Session,
};
use dnesave_core::decompress::{Decompressor, NoDecompressor, ZlibDecompressor};
use dnesave_core::facts::{FactCatalog, FactDefinition};
use dnesave_core::patch::write_atomic;
use dnesave_render::{
    TreeRenderOptions, render_facts_json, render_facts_text, render_relationships_json,
    render_relationships_text, render_summary_json, render_summary_text, render_tree_json,
    render_tree_text,
};
use log::{info, warn};
use serde_json::Value as JsonValue;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Codec {
    None,
    Zlib,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(value_name = "SAVE")]
    path: PathBuf,
    #[arg(long)]
    tree: bool,
    #[arg(long)]
    offsets: bool,
    #[arg(long)]
    relationships: bool,
    #[arg(long)]
    facts: bool,
    #[arg(long = "fact-defs", value_name = "PATH")]
    fact_defs: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum, default_value_t = Codec::Zlib)]
    codec: Codec,
    #[arg(long, value_name = "PATH")]
    unpack: Option<PathBuf>,
    #[arg(long = "set-fact", value_name = "KEY=VALUE")]
    set_fact: Vec<String>,
    #[arg(long = "set-relationship", value_name = "NAME=l,g,d,gc,dc")]
    set_relationship: Vec<String>,
    #[arg(long = "scene", value_name = "ID")]
    scenes: Vec<String>,
    #[arg(long = "all-scenes", conflicts_with = "scenes")]
    all_scenes: bool,
    #[arg(long)]
    global: bool,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let has_edits = !cli.set_fact.is_empty() || !cli.set_relationship.is_empty();
    if has_edits && cli.output.is_none() {
        eprintln!("--set-* flags require --output <PATH>");
        process::exit(2);
    }
    if !has_edits && cli.output.is_some() {
        eprintln!("--output requires at least one --set-* flag");
        process::exit(2);
    }
    if has_edits && cli.scenes.is_empty() && !cli.all_scenes && !cli.global {
        eprintln!("--set-* flags require --scene <ID>, --all-scenes or --global");
        process::exit(2);
    }

    let fact_edits: Vec<(String, String)> = cli
        .set_fact
        .iter()
        .map(|raw| {
            split_assignment(raw).unwrap_or_else(|| {
                eprintln!("--set-fact expects KEY=VALUE, got {raw:?}");
                process::exit(2);
            })
        })
        .collect();
    let relationship_edits: Vec<Relationship> = cli
        .set_relationship
        .iter()
        .map(|raw| {
            parse_relationship(raw).unwrap_or_else(|e| {
                eprintln!("{e}");
                process::exit(2);
            })
        })
        .collect();

    let bytes = std::fs::read(&cli.path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", cli.path.display());
        process::exit(1);
    });

    if let Some(unpack_path) = &cli.unpack {
        let (encoding, raw) = unpack(bytes.clone(), decompressor(cli.codec).as_ref())
            .unwrap_or_else(|e| {
                eprintln!("Error unpacking {}: {e}", cli.path.display());
                process::exit(1);
            });
        write_atomic(unpack_path, &raw).unwrap_or_else(|e| {
            eprintln!("Error writing {}: {e}", unpack_path.display());
            process::exit(1);
        });
        info!("unpacked {encoding:?} save to {}", unpack_path.display());
    }

    let engine = Engine::new().with_decompressor(decompressor(cli.codec));
    let session = engine.open_bytes(bytes).unwrap_or_else(|e| {
        eprintln!("Error parsing save file: {}", cli.path.display());
        eprintln!("  {e}");
        process::exit(1);
    });

    let catalog = match &cli.fact_defs {
        Some(path) => FactCatalog::load_json(path).unwrap_or_else(|e| {
            eprintln!("Error loading fact definitions: {e}");
            process::exit(1);
        }),
        None => FactCatalog::default(),
    };

    if let Some(out_path) = &cli.output {
        let scenes = if cli.all_scenes {
            session.scene_ids()
        } else {
            cli.scenes.clone()
        };
        apply_edits(
            &session,
            &catalog,
            out_path,
            &fact_edits,
            &relationship_edits,
            &scenes,
            cli.global,
        )
        .unwrap_or_else(|e| {
            eprintln!("Error applying edits: {e}");
            process::exit(1);
        });
    }

    if cli.json {
        let json = if cli.tree {
            render_tree_json(session.container())
        } else if cli.relationships {
            render_relationships_json(&relationships(&session))
        } else if cli.facts {
            render_facts_json(&fact_timelines(&session, &catalog))
        } else {
            render_summary_json(&session)
        };
        print_json(&json);
        return;
    }

    if cli.tree {
        let options = TreeRenderOptions {
            offsets: cli.offsets,
        };
        print!("{}", render_tree_text(session.container(), options));
        return;
    }
    if cli.relationships {
        print!("{}", render_relationships_text(&relationships(&session)));
        return;
    }
    if cli.facts {
        print!("{}", render_facts_text(&fact_timelines(&session, &catalog)));
        return;
    }

    if let Some(out_path) = &cli.output {
        println!("Wrote edited save to {}", out_path.display());
        return;
    }
    print!("{}", render_summary_text(&session));
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Write the working copy to `out_path`, patch it, and persist the patched
/// bytes only when every edit landed.
fn apply_edits(
    session: &Session,
    catalog: &FactCatalog,
    out_path: &Path,
    fact_edits: &[(String, String)],
    relationship_edits: &[Relationship],
    scenes: &[String],
    alter_global: bool,
) -> Result<(), CoreError> {
    let mut buffer = session.write_working_copy(out_path)?;
    let mut complete = true;

    for (key, text) in fact_edits {
        let fact = resolve_fact(session, catalog, key)?;
        let value = FactValue::parse_for(&fact, text)?;
        info!("setting {} to {value}", fact.label());
        if !session.adjust_fact(&mut buffer, &fact, value, scenes, alter_global)? {
            warn!("{} is missing from some target snapshots", fact.label());
            complete = false;
        }
    }
    for relationship in relationship_edits {
        info!("setting relationship {}", relationship.name);
        session.adjust_relationship(&mut buffer, relationship, scenes, alter_global)?;
    }

    if !complete {
        return Err(CoreError::new(
            CoreErrorCode::NotFound,
            "some edits had no target; patched bytes were not written",
        ));
    }
    buffer.write_out()
}

/// `ASSET/FACT` looks the ids up in the save itself; anything else is a fact
/// name resolved through the catalog.
fn resolve_fact(
    session: &Session,
    catalog: &FactCatalog,
    key: &str,
) -> Result<FactDefinition, CoreError> {
    if let Some((asset_id, fact_id)) = key.split_once('/') {
        return session
            .catalog_facts(catalog)?
            .into_iter()
            .map(|timeline| timeline.fact)
            .find(|fact| fact.fact_asset_id == asset_id && fact.fact_id == fact_id)
            .ok_or_else(|| not_found(key));
    }
    catalog.find_by_name(key).cloned().ok_or_else(|| not_found(key))
}

fn not_found(key: &str) -> CoreError {
    CoreError::new(
        CoreErrorCode::NotFound,
        format!("unknown fact {key:?}"),
    )
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn decompressor(codec: Codec) -> Box<dyn Decompressor> {
    match codec {
        Codec::None => Box::new(NoDecompressor),
        Codec::Zlib => Box::new(ZlibDecompressor),
    }
}

fn relationships(session: &Session) -> Vec<SceneRelationships> {
    session.relationships().unwrap_or_else(|e| {
        eprintln!("Error reading relationships: {e}");
        process::exit(1);
    })
}

fn fact_timelines(session: &Session, catalog: &FactCatalog) -> Vec<FactTimeline> {
    session.catalog_facts(catalog).unwrap_or_else(|e| {
        eprintln!("Error reading facts: {e}");
        process::exit(1);
    })
}

fn print_json(json: &JsonValue) {
    let rendered = serde_json::to_string_pretty(json).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(1);
    });
    println!("{rendered}");
}

fn split_assignment(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

fn parse_relationship(raw: &str) -> Result<Relationship, String> {
    let usage = || format!("--set-relationship expects NAME=level,growth,decay,growth_changes,decay_changes, got {raw:?}");
    let (name, values) = split_assignment(raw).ok_or_else(usage)?;
    let parts: Vec<&str> = values.split(',').map(str::trim).collect();
    let [level, growth, decay, growth_changes, decay_changes] = parts.as_slice() else {
        return Err(usage());
    };
    Ok(Relationship {
        name,
        level: level.parse().map_err(|_| usage())?,
        growth: growth.parse().map_err(|_| usage())?,
        decay: decay.parse().map_err(|_| usage())?,
        growth_changes: growth_changes.parse().map_err(|_| usage())?,
        decay_changes: decay_changes.parse().map_err(|_| usage())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_assignment_parses_all_counters() {
        let rel = parse_relationship("Autumn=5, 4, 1, 10, -2").unwrap();
        assert_eq!(rel.name, "Autumn");
        assert_eq!((rel.level, rel.growth, rel.decay), (5, 4, 1));
        assert_eq!((rel.growth_changes, rel.decay_changes), (10, -2));

        assert!(parse_relationship("Autumn=5,4,1").is_err());
        assert!(parse_relationship("Autumn=300,0,0,0,0").is_err());
        assert!(parse_relationship("=1,2,3,4,5").is_err());
    }

    #[test]
    fn assignment_splits_on_first_equals() {
        assert_eq!(
            split_assignment("A1/F2 = 9"),
            Some(("A1/F2".to_string(), "9".to_string()))
        );
        assert_eq!(split_assignment("novalue"), None);
    }
}
