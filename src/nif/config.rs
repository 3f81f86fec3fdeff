//! Conversion settings, read from a TOML file.
//!
//! ```toml
//! game = "oblivion"
//! realign = "auto"
//! skeleton = "skinned"
//! combine_shapes = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::codec::Header;
use super::error::Result;
use super::skeleton::SkeletonMode;
use super::transform::{RealignMode, SCALE_EPSILON};
use super::version::NifVersion;

/// Target game of an export. Picks the header version triple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    Morrowind,
    ZooTycoon2,
    Civ4,
    #[default]
    Oblivion,
    Fallout3,
}

impl Game {
    pub const ALL: [Game; 5] = [
        Game::Morrowind,
        Game::ZooTycoon2,
        Game::Civ4,
        Game::Oblivion,
        Game::Fallout3,
    ];

    /// Version, user version and Bethesda stream version.
    pub fn versions(self) -> (NifVersion, u32, u32) {
        match self {
            Game::Morrowind => (NifVersion::V4_0_0_2, 0, 0),
            Game::ZooTycoon2 => (NifVersion::V10_0_1_0, 0, 0),
            Game::Civ4 => (NifVersion::V20_0_0_4, 0, 0),
            Game::Oblivion => (NifVersion::V20_0_0_5, 11, 11),
            Game::Fallout3 => (NifVersion::V20_2_0_7, 11, 34),
        }
    }

    /// Best guess at the game that wrote a header.
    pub fn detect(header: &Header) -> Option<Game> {
        Self::ALL.into_iter().find(|game| {
            game.versions() == (header.version, header.user_version, header.bs_version)
        })
    }
}

/// How rotation keys are interpolated on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuaternionKeyType {
    #[default]
    Quadratic,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NifSettings {
    pub game: Game,
    /// Overrides for the game's header versions.
    pub version: Option<NifVersion>,
    pub user_version: Option<u32>,
    pub bs_version: Option<u32>,

    pub realign: RealignMode,
    pub skeleton: SkeletonMode,
    /// Merge geometry children into matching parent nodes.
    pub combine_shapes: bool,
    /// Treat every node under an armature as a bone.
    pub import_extra_nodes: bool,
    pub animation: bool,

    /// Frames per second; detected from key times when unset.
    pub fps: Option<f32>,
    /// Float comparison tolerance.
    pub epsilon: f32,
    /// Largest allowed per-axis scale spread.
    pub scale_epsilon: f32,
    pub quaternion_keys: QuaternionKeyType,
    /// Longest object name the host accepts.
    pub max_name_length: usize,
    pub author: String,
}

impl Default for NifSettings {
    fn default() -> Self {
        Self {
            game: Game::default(),
            version: None,
            user_version: None,
            bs_version: None,
            realign: RealignMode::default(),
            skeleton: SkeletonMode::default(),
            combine_shapes: false,
            import_extra_nodes: false,
            animation: true,
            fps: None,
            epsilon: 0.005,
            scale_epsilon: SCALE_EPSILON,
            quaternion_keys: QuaternionKeyType::default(),
            max_name_length: 22,
            author: String::new(),
        }
    }
}

impl NifSettings {
    pub fn for_game(game: Game) -> Self {
        Self {
            game,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Header for an export, game defaults with any overrides applied.
    pub fn header(&self) -> Header {
        let (version, user_version, bs_version) = self.game.versions();
        let mut header = Header::new(
            self.version.unwrap_or(version),
            self.user_version.unwrap_or(user_version),
            self.bs_version.unwrap_or(bs_version),
        );
        header.author = self.author.clone();
        header
    }

    pub fn version(&self) -> NifVersion {
        self.version.unwrap_or(self.game.versions().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::error::NifError;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = NifSettings::from_toml_str("").unwrap();
        assert_eq!(settings, NifSettings::default());
        assert_eq!(settings.header().version, NifVersion::V20_0_0_5);
        assert_eq!(settings.header().bs_version, 11);
    }

    #[test]
    fn game_and_modes_parse() {
        let text = r#"
            game = "fallout3"
            realign = "auto"
            skeleton = "skeleton_only"
            combine_shapes = true
            fps = 25.0
            quaternion_keys = "linear"
        "#;
        let settings = NifSettings::from_toml_str(text).unwrap();
        assert_eq!(settings.game, Game::Fallout3);
        assert_eq!(settings.realign, RealignMode::Auto);
        assert_eq!(settings.skeleton, SkeletonMode::SkeletonOnly);
        assert!(settings.combine_shapes);
        assert_eq!(settings.fps, Some(25.0));
        assert_eq!(settings.quaternion_keys, QuaternionKeyType::Linear);
        let header = settings.header();
        assert_eq!(
            (header.version, header.user_version, header.bs_version),
            (NifVersion::V20_2_0_7, 11, 34)
        );
    }

    #[test]
    fn version_override_wins() {
        let settings =
            NifSettings::from_toml_str("game = \"morrowind\"\nversion = \"4.2.2.0\"").unwrap();
        assert_eq!(settings.version(), NifVersion::V4_2_2_0);
        assert_eq!(settings.header().user_version, 0);
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = NifSettings::from_toml_str("gmae = \"oblivion\"").unwrap_err();
        assert!(matches!(err, NifError::Config(_)));
        assert!(NifSettings::from_toml_str("game = \"skyrim\"").is_err());
    }

    #[test]
    fn detect_matches_profiles() {
        for game in Game::ALL {
            assert_eq!(Game::detect(&NifSettings::for_game(game).header()), Some(game));
        }
        let odd = Header::new(NifVersion::V20_0_0_5, 0, 0);
        assert_eq!(Game::detect(&odd), None);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nif.toml");
        std::fs::write(&path, "game = \"civ4\"\n").unwrap();
        assert_eq!(NifSettings::load(&path).unwrap().game, Game::Civ4);
        assert!(matches!(
            NifSettings::load(dir.path().join("missing.toml")),
            Err(NifError::Io(_))
        ));
    }
}
