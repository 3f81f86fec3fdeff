use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bevy::app::App;
use bevy::log::{LogPlugin, info, warn};
use clap::{Parser, Subcommand};

use nif_graph::nif::codec::{self, NifFile};
use nif_graph::nif::config::{Game, NifSettings};
use nif_graph::nif::sidecar::{write_bone_ex_mat, write_full_names};
use nif_graph::nif::types::Block;
use nif_graph::nif_animation::text_keys::markers_to_text;
use nif_graph::scene;

#[derive(Parser, Debug)]
#[command(name = "nif_graph", version, about = "Inspect and convert NIF files")]
struct Cli {
    /// Settings file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the game from the settings file.
    #[arg(long, global = true, value_enum)]
    game: Option<Game>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header and every block.
    Inspect { path: PathBuf },
    /// Decode and re-encode a file.
    Roundtrip {
        input: PathBuf,
        output: PathBuf,
        /// Go through the scene view and export for the configured game.
        #[arg(long)]
        scene: bool,
    },
    /// Print armatures and write the BoneExMat, FullNames and Anim tables.
    Bones {
        path: PathBuf,
        /// Directory for the sidecar text files.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Headless app that owns the log subscriber for the whole run.
fn logging_app() -> App {
    let mut app = App::new();
    app.add_plugins(LogPlugin::default());
    app
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _app = logging_app();

    let mut settings = match &cli.config {
        Some(path) => NifSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => NifSettings::default(),
    };
    if let Some(game) = cli.game {
        settings.game = game;
    }

    match &cli.command {
        Command::Inspect { path } => inspect(path),
        Command::Roundtrip {
            input,
            output,
            scene,
        } => roundtrip(input, output, *scene, &settings),
        Command::Bones { path, out } => bones(path, out.as_deref(), &settings),
    }
}

fn read(path: &Path) -> Result<NifFile> {
    codec::read_path(path).with_context(|| format!("reading {}", path.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let file = read(path)?;
    let header = &file.header;
    println!(
        "{} user {} bs {} ({})",
        header.version,
        header.user_version,
        header.bs_version,
        Game::detect(header).map_or("unknown game".to_string(), |g| format!("{g:?}"))
    );
    if !header.author.is_empty() {
        println!("author: {}", header.author);
    }
    for (key, block) in file.blocks.iter() {
        let root = if file.roots.contains(&key) { " (root)" } else { "" };
        println!("{}{root}", file.blocks.context(key));
        if let Block::Node(node) = block {
            println!("    {} children", node.children.iter().filter(|c| !c.is_null()).count());
        }
    }
    Ok(())
}

fn roundtrip(input: &Path, output: &Path, through_scene: bool, settings: &NifSettings) -> Result<()> {
    let file = read(input)?;
    let file = if through_scene {
        let imported = scene::import(&file, settings).context("importing scene")?;
        for warning in &imported.warnings {
            warn!("{warning}");
        }
        scene::export(&imported, settings).context("exporting scene")?
    } else {
        file
    };
    codec::write_path(&file, output).with_context(|| format!("writing {}", output.display()))?;
    let again = read(output)?;
    if again.blocks.len() != file.blocks.len() {
        bail!(
            "{} blocks written but {} read back",
            file.blocks.len(),
            again.blocks.len()
        );
    }
    info!("{} blocks round tripped", again.blocks.len());
    Ok(())
}

fn bones(path: &Path, out: Option<&Path>, settings: &NifSettings) -> Result<()> {
    let file = read(path)?;
    let imported = scene::import(&file, settings).context("importing scene")?;
    for armature in &imported.armatures {
        println!("{}", armature.name);
        for bone in &armature.bones {
            let depth = std::iter::successors(bone.parent, |p| {
                armature.bones.get(*p).and_then(|b| b.parent)
            }).count();
            println!("{}{}", "  ".repeat(depth + 1), bone.name);
        }
    }
    let Some(out) = out else {
        return Ok(());
    };
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let tables = [
        ("BoneExMat.txt", write_bone_ex_mat(&imported.extra_matrices)),
        ("FullNames.txt", write_full_names(&imported.full_names)),
        ("Anim.txt", markers_to_text(&imported.markers)),
    ];
    for (name, text) in tables {
        let target = out.join(name);
        std::fs::write(&target, text).with_context(|| format!("writing {}", target.display()))?;
    }
    info!("Wrote sidecar tables to {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_plugin_is_installed() {
        let app = logging_app();
        assert!(app.is_plugin_added::<LogPlugin>());
    }

    #[test]
    fn game_flag_parses_before_the_subcommand() {
        let cli = Cli::try_parse_from(["nif_graph", "--game", "morrowind", "inspect", "a.nif"])
            .unwrap();
        assert_eq!(cli.game, Some(Game::Morrowind));
        assert!(matches!(cli.command, Command::Inspect { .. }));
    }
}
