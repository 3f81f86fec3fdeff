//! Plain text tables that travel next to an imported scene.
//!
//! `BoneExMat` keeps the per-bone correction matrices so a realigned
//! armature exports with its original orientation. `FullNames` maps the
//! shortened scene names back to the names stored in the file.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use super::error::{BlockContext, NifError, NifWarning, Result};
use super::transform::{ExtraMatrixTable, clean_matrix};
use super::types::Matrix4x4;

/// Parses `bone/r0c0,r0c1,r0c2,r0c3;r1...;r2...;r3...` lines.
///
/// Matrices whose rotation part is not orthonormal are repaired and reported.
pub fn parse_bone_ex_mat(text: &str) -> Result<(ExtraMatrixTable, Vec<NifWarning>)> {
    let mut table = ExtraMatrixTable::new();
    let mut warnings = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let syntax = |reason: &str| NifError::SidecarSyntax {
            table: "BoneExMat",
            line: number + 1,
            reason: reason.to_string(),
        };
        let (bone, matrix) = line
            .rsplit_once('/')
            .ok_or_else(|| syntax("expected 'bone/matrix'"))?;
        let rows: Vec<&str> = matrix.split(';').collect();
        if rows.len() != 4 {
            return Err(syntax("expected four rows"));
        }
        let mut m = Matrix4x4::IDENTITY;
        for (i, row) in rows.iter().enumerate() {
            let cells: Vec<&str> = row.split(',').collect();
            if cells.len() != 4 {
                return Err(syntax("expected four values per row"));
            }
            for (j, cell) in cells.iter().enumerate() {
                m.0[i][j] = cell
                    .trim()
                    .parse()
                    .map_err(|_| syntax(&format!("'{cell}' is not a number")))?;
            }
        }
        let m = clean_matrix(bone, &m, &mut warnings);
        table.insert(bone, m);
    }
    Ok((table, warnings))
}

/// One line per stored matrix, sorted by bone name.
pub fn write_bone_ex_mat(table: &ExtraMatrixTable) -> String {
    let mut out = String::new();
    for (bone, m) in table.iter() {
        let rows: Vec<String> = m
            .0
            .iter()
            .map(|row| format!("{},{},{},{}", row[0], row[1], row[2], row[3]))
            .collect();
        let _ = writeln!(out, "{bone}/{}", rows.join(";"));
    }
    out
}

/// Short scene name → original file name.
pub type FullNames = BTreeMap<String, String>;

pub fn parse_full_names(text: &str) -> Result<FullNames> {
    let mut names = FullNames::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (short, original) = line.split_once(';').ok_or(NifError::SidecarSyntax {
            table: "FullNames",
            line: number + 1,
            reason: "expected 'short;original'".to_string(),
        })?;
        names.insert(short.to_string(), original.to_string());
    }
    Ok(names)
}

pub fn write_full_names(names: &FullNames) -> String {
    let mut out = String::new();
    for (short, original) in names {
        if short != original {
            let _ = writeln!(out, "{short};{original}");
        }
    }
    out
}

/// `Bip01 L Foot` becomes `Bip01 Foot.L`, likewise for R.
pub fn bone_name_for_scene(name: &str) -> String {
    for side in ["L", "R"] {
        if let Some(rest) = name.strip_prefix(&format!("Bip01 {side} ")) {
            return format!("Bip01 {rest}.{side}");
        }
    }
    name.to_string()
}

/// Inverse of [`bone_name_for_scene`].
pub fn bone_name_for_nif(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("Bip01 ") {
        for side in ["L", "R"] {
            if let Some(stem) = rest.strip_suffix(&format!(".{side}")) {
                return format!("Bip01 {side} {stem}");
            }
        }
    }
    name.to_string()
}

/// Hands out scene names that are unique and short enough for the host.
#[derive(Debug, Clone)]
pub struct UniqueNames {
    used: HashSet<String>,
    max_length: usize,
    /// Shortened name → name in the file, for the FullNames table.
    pub full_names: FullNames,
}

impl Default for UniqueNames {
    fn default() -> Self {
        Self::new(22)
    }
}

impl UniqueNames {
    pub fn new(max_length: usize) -> Self {
        Self {
            used: HashSet::new(),
            max_length,
            full_names: FullNames::new(),
        }
    }

    /// Picks `name`, or `name.NN` with a free two digit suffix.
    pub fn claim(&mut self, name: &str, fallback: &str) -> Result<String> {
        let base = if name.is_empty() { fallback } else { name };
        let plain: String = base.chars().take(self.max_length.saturating_sub(1)).collect();
        let stem: String = base.chars().take(self.max_length.saturating_sub(4)).collect();
        let candidates =
            std::iter::once(plain).chain((0..100).map(|n| format!("{stem}.{n:02}")));
        for candidate in candidates {
            let candidate = bone_name_for_scene(&candidate);
            if self.used.insert(candidate.clone()) {
                if !name.is_empty() && candidate != name {
                    self.full_names.insert(candidate.clone(), name.to_string());
                }
                return Ok(candidate);
            }
        }
        Err(NifError::invalid(
            BlockContext::new("name"),
            format!("ran out of unique names for '{base}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::transform::BONE_CORRECTION_MATRICES;
    use crate::nif::types::Vector3;

    #[test]
    fn bone_ex_mat_round_trips() {
        let mut table = ExtraMatrixTable::new();
        let m = Matrix4x4::from_parts(&BONE_CORRECTION_MATRICES[3], Vector3::new(0.5, 0.0, -2.0));
        table.insert("Bip01 Spine", m);
        table.insert("Bip01 Head", Matrix4x4::IDENTITY);
        let text = write_bone_ex_mat(&table);
        assert_eq!(text, "Bip01 Spine/0,1,0,0;-1,0,0,0;0,0,1,0;0.5,0,-2,1\n");
        let (back, warnings) = parse_bone_ex_mat(&text).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(back, table);
    }

    #[test]
    fn bone_ex_mat_reports_line_numbers() {
        let text = "Bip01/1,0,0,0;0,1,0,0;0,0,1,0;0,0,0,1\n\nBip01 Neck/1,0,0;0,1,0,0\n";
        match parse_bone_ex_mat(text).unwrap_err() {
            NifError::SidecarSyntax { table, line, .. } => {
                assert_eq!(table, "BoneExMat");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {other}"),
        }
        assert!(parse_bone_ex_mat("Bip01/a,0,0,0;0,1,0,0;0,0,1,0;0,0,0,1").is_err());
    }

    #[test]
    fn skewed_matrix_is_repaired() {
        let text = "Bip01/1,0.1,0,0;0,1,0,0;0,0,1,0;0,0,0,1\n";
        let (table, warnings) = parse_bone_ex_mat(text).unwrap();
        assert_eq!(warnings.len(), 1);
        let rotation = table.get("Bip01").map(|m| m.rotation_part());
        assert!(rotation.is_some_and(|r| r.scaled(1.0 / r.row(0).length()).is_orthonormal(1e-4)));
    }

    #[test]
    fn full_names_round_trip() {
        let text = "Bip01 Foot.L;Bip01 L Foot\nLongMesh.00;LongMeshNameThatWasCut\n";
        let names = parse_full_names(text).unwrap();
        assert_eq!(names["Bip01 Foot.L"], "Bip01 L Foot");
        assert_eq!(write_full_names(&names), text);
        assert!(parse_full_names("no separator").is_err());
    }

    #[test]
    fn side_names_convert_both_ways() {
        assert_eq!(bone_name_for_scene("Bip01 L Foot"), "Bip01 Foot.L");
        assert_eq!(bone_name_for_scene("Bip01 R Upper Arm"), "Bip01 Upper Arm.R");
        assert_eq!(bone_name_for_scene("Bip01 Spine"), "Bip01 Spine");
        assert_eq!(bone_name_for_nif("Bip01 Foot.L"), "Bip01 L Foot");
        assert_eq!(bone_name_for_nif("Bip01 Upper Arm.R"), "Bip01 R Upper Arm");
        assert_eq!(bone_name_for_nif("Sword.L"), "Sword.L");
    }

    #[test]
    fn unique_names_get_numbered() {
        let mut names = UniqueNames::default();
        assert_eq!(names.claim("Bip01 L Hand", "noname").unwrap(), "Bip01 Hand.L");
        assert_eq!(names.claim("Box", "noname").unwrap(), "Box");
        assert_eq!(names.claim("Box", "noname").unwrap(), "Box.00");
        assert_eq!(names.claim("", "noname").unwrap(), "noname");
        assert_eq!(
            names.claim("AVeryLongObjectNameThatIsCut", "noname").unwrap(),
            "AVeryLongObjectNameTh"
        );
        assert_eq!(names.full_names["Bip01 Hand.L"], "Bip01 L Hand");
        assert_eq!(names.full_names["Box.00"], "Box");
    }
}
