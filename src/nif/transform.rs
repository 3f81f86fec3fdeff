//! Matrix helpers and the bind pose algebra.
//!
//! All matrices follow the file convention: row vectors multiply from the
//! left (`v' = v * M`) and the translation is the fourth row. Products read
//! left to right in application order, so `A * B` applies `A` first.

use std::collections::BTreeMap;

use bevy::log::warn;
use bevy::math::{Mat3, Mat4, Quat};

use super::error::{BlockContext, NifError, NifWarning, Result};
use super::types::{Matrix3x3, Matrix4x4, NiTransform, Vector3};

/// Largest tolerated spread between the three axis scales.
pub const SCALE_EPSILON: f32 = 0.02;

/// Tolerance for identity and orthonormality tests.
pub const MATRIX_EPSILON: f32 = 1.0e-4;

impl Matrix3x3 {
    pub const IDENTITY: Matrix3x3 = Matrix3x3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn row(&self, i: usize) -> Vector3 {
        Vector3::from_array(self.0[i])
    }

    pub fn from_rows(rows: [Vector3; 3]) -> Self {
        Matrix3x3([
            rows[0].to_array(),
            rows[1].to_array(),
            rows[2].to_array(),
        ])
    }

    pub fn mul(&self, other: &Matrix3x3) -> Matrix3x3 {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        Matrix3x3(out)
    }

    pub fn scaled(&self, s: f32) -> Matrix3x3 {
        Matrix3x3(self.0.map(|row| row.map(|v| v * s)))
    }

    pub fn transpose(&self) -> Matrix3x3 {
        let m = &self.0;
        Matrix3x3([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    // Mat3 columns hold our rows, i.e. it is the transpose, which has the same determinant.
    fn as_glam_transposed(&self) -> Mat3 {
        Mat3::from_cols_array_2d(&self.0)
    }

    pub fn determinant(&self) -> f32 {
        self.as_glam_transposed().determinant()
    }

    pub fn inverse(&self) -> Matrix3x3 {
        Matrix3x3(self.as_glam_transposed().inverse().to_cols_array_2d())
    }

    /// Applies the matrix to a row vector.
    pub fn transform_vector(&self, v: Vector3) -> Vector3 {
        v.x * self.row(0) + v.y * self.row(1) + v.z * self.row(2)
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Matrix3x3::IDENTITY, MATRIX_EPSILON)
    }

    pub fn approx_eq(&self, other: &Matrix3x3, epsilon: f32) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    /// True when the rows are unit length and pairwise orthogonal.
    pub fn is_orthonormal(&self, epsilon: f32) -> bool {
        self.mul(&self.transpose()).approx_eq(&Matrix3x3::IDENTITY, epsilon)
    }

    /// Gram-Schmidt on the rows, keeping the first row's direction.
    pub fn orthonormalized(&self) -> Matrix3x3 {
        let x = self.row(0).normalize_or(Vector3::X);
        let y = (self.row(1) - x * x.dot(self.row(1))).normalize_or(Vector3::Y);
        let mut z = x.cross(y);
        if z.dot(self.row(2)) < 0.0 {
            z = -z;
        }
        Matrix3x3::from_rows([x, y, z])
    }

    /// Row convention rotation matrix of a quaternion.
    pub fn from_quat(q: Quat) -> Matrix3x3 {
        Matrix3x3(Mat3::from_quat(q).to_cols_array_2d())
    }

    pub fn to_quat(&self) -> Quat {
        Quat::from_mat3(&self.as_glam_transposed()).normalize()
    }
}

impl Matrix4x4 {
    pub const IDENTITY: Matrix4x4 = Matrix4x4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn mul(&self, other: &Matrix4x4) -> Matrix4x4 {
        let mut out = [[0.0; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        Matrix4x4(out)
    }

    pub fn transpose(&self) -> Matrix4x4 {
        let mut out = [[0.0; 4]; 4];
        for (i, row) in self.0.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                out[j][i] = *v;
            }
        }
        Matrix4x4(out)
    }

    pub fn determinant(&self) -> f32 {
        Mat4::from_cols_array_2d(&self.0).determinant()
    }

    pub fn inverse(&self) -> Matrix4x4 {
        Matrix4x4(Mat4::from_cols_array_2d(&self.0).inverse().to_cols_array_2d())
    }

    /// Upper left 3x3 block.
    pub fn rotation_part(&self) -> Matrix3x3 {
        let m = &self.0;
        Matrix3x3([
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ])
    }

    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.0[3][0], self.0[3][1], self.0[3][2])
    }

    pub fn from_parts(rotation: &Matrix3x3, translation: Vector3) -> Matrix4x4 {
        let r = &rotation.0;
        Matrix4x4([
            [r[0][0], r[0][1], r[0][2], 0.0],
            [r[1][0], r[1][1], r[1][2], 0.0],
            [r[2][0], r[2][1], r[2][2], 0.0],
            [translation.x, translation.y, translation.z, 1.0],
        ])
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Matrix4x4::IDENTITY, MATRIX_EPSILON)
    }

    pub fn approx_eq(&self, other: &Matrix4x4, epsilon: f32) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl NiTransform {
    pub fn new(scale: f32, rotation: Matrix3x3, translation: Vector3) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Matrix4x4 {
        compose_srt(self)
    }

    pub fn from_matrix(m: &Matrix4x4) -> Result<NiTransform> {
        decompose_srt(m)
    }

    /// `self * other`: apply `self`, then `other`.
    pub fn then(&self, other: &NiTransform) -> NiTransform {
        NiTransform {
            scale: self.scale * other.scale,
            rotation: self.rotation.mul(&other.rotation),
            translation: other
                .rotation
                .transform_vector(self.translation * other.scale)
                + other.translation,
        }
    }

    pub fn inverse(&self) -> NiTransform {
        let rotation = self.rotation.inverse();
        let scale = 1.0 / self.scale;
        NiTransform {
            scale,
            translation: rotation.transform_vector(-self.translation) * scale,
            rotation,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation.is_identity()
            && self.translation.abs_diff_eq(Vector3::ZERO, MATRIX_EPSILON)
            && (self.scale - 1.0).abs() <= MATRIX_EPSILON
    }
}

pub fn compose_srt(t: &NiTransform) -> Matrix4x4 {
    Matrix4x4::from_parts(&t.rotation.scaled(t.scale), t.translation)
}

/// Splits a matrix into uniform scale, rotation and translation.
pub fn decompose_srt(m: &Matrix4x4) -> Result<NiTransform> {
    decompose_srt_within(m, SCALE_EPSILON)
}

/// [`decompose_srt`] with a caller chosen scale tolerance.
pub fn decompose_srt_within(m: &Matrix4x4, scale_epsilon: f32) -> Result<NiTransform> {
    let scale_rot = m.rotation_part();
    let mut scales = [0, 1, 2].map(|i| scale_rot.row(i).length());
    if scale_rot.determinant() < 0.0 {
        scales = scales.map(|s| -s);
    }
    let spread = (scales[0] - scales[1]).abs() + (scales[1] - scales[2]).abs();
    if spread > scale_epsilon {
        return Err(NifError::NonUniformScale {
            at: BlockContext::new("transform"),
            scales,
        });
    }
    let scale = scales[0];
    if scale == 0.0 {
        return Err(NifError::invalid(
            BlockContext::new("transform"),
            "zero scale",
        ));
    }
    Ok(NiTransform {
        scale,
        rotation: scale_rot.scaled(1.0 / scale),
        translation: m.translation(),
    })
}

/// Keyframe channel relative to the bind pose: `Ctotal = Cchannel * Cbind`.
pub fn channel_from_total(total: &NiTransform, bind: &NiTransform) -> NiTransform {
    let inv_rot = bind.rotation.inverse();
    NiTransform {
        scale: total.scale / bind.scale,
        rotation: total.rotation.mul(&inv_rot),
        translation: inv_rot.transform_vector(total.translation - bind.translation) / bind.scale,
    }
}

pub fn total_from_channel(channel: &NiTransform, bind: &NiTransform) -> NiTransform {
    channel.then(bind)
}

/// Moves a channel into scene bone space: `C' = X * C * inv(X)`.
pub fn import_channel(extra: &NiTransform, channel: &NiTransform) -> NiTransform {
    let inv_rot = extra.rotation.inverse();
    let moved = channel
        .rotation
        .transform_vector(extra.translation * channel.scale)
        + channel.translation
        - extra.translation;
    NiTransform {
        scale: channel.scale,
        rotation: extra.rotation.mul(&channel.rotation).mul(&inv_rot),
        translation: inv_rot.transform_vector(moved) / extra.scale,
    }
}

/// Exact inverse of [`import_channel`].
pub fn export_channel(extra: &NiTransform, channel: &NiTransform) -> NiTransform {
    import_channel(&extra.inverse(), channel)
}

/// Correction matrices per bone name, `SceneBone = X * FileBone`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraMatrixTable {
    matrices: BTreeMap<String, Matrix4x4>,
}

impl ExtraMatrixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity matrices are not stored; inserting one clears the entry.
    pub fn insert(&mut self, bone: impl Into<String>, matrix: Matrix4x4) {
        let bone = bone.into();
        if matrix.is_identity() {
            self.matrices.remove(&bone);
        } else {
            self.matrices.insert(bone, matrix);
        }
    }

    pub fn get(&self, bone: &str) -> Option<&Matrix4x4> {
        self.matrices.get(bone)
    }

    pub fn get_or_identity(&self, bone: &str) -> Matrix4x4 {
        self.get(bone).copied().unwrap_or(Matrix4x4::IDENTITY)
    }

    pub fn remove(&mut self, bone: &str) -> Option<Matrix4x4> {
        self.matrices.remove(bone)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Entries sorted by bone name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Matrix4x4)> {
        self.matrices.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Correction as a transform, for the channel formulas.
    pub fn transform_for(&self, bone: &str) -> Result<NiTransform> {
        match self.get(bone) {
            Some(m) => decompose_srt(m).map_err(|err| match err {
                NifError::NonUniformScale { scales, .. } => NifError::NonUniformScale {
                    at: BlockContext::new("extra matrix").named(bone),
                    scales,
                },
                other => other,
            }),
            None => Ok(NiTransform::default()),
        }
    }
}

/// How bone matrices are adjusted on armature import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RealignMode {
    /// Keep the file matrices.
    #[default]
    Off,
    /// Every bone gets an identity rotation.
    Identity,
    /// Point each bone along its children when they line up well enough.
    Auto,
}

/// Axis swaps that point a bone's Y axis along +X, +Y, +Z, -X, -Y, -Z.
pub const BONE_CORRECTION_MATRICES: [Matrix3x3; 6] = [
    Matrix3x3([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]),
    Matrix3x3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
    Matrix3x3([[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]]),
    Matrix3x3([[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]),
    Matrix3x3([[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]]),
    Matrix3x3([[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]]),
];

/// Largest off-axis share of the child offset that still counts as aligned.
const ALIGNMENT_LIMIT: f32 = 0.25;

/// Picks the axis swap for a bone from the offsets of its child bones.
///
/// `own_translation` stands in when there are no children. Returns the
/// identity when the offset does not line up with a single axis.
pub fn correction_for(own_translation: Vector3, child_translations: &[Vector3]) -> Matrix3x3 {
    let sum = if child_translations.is_empty() {
        own_translation
    } else {
        child_translations.iter().copied().sum()
    };
    let candidates = [sum.x, sum.y, sum.z, -sum.x, -sum.y, -sum.z].map(|c| (c * 200.0) as i64);
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate() {
        if *c > candidates[best] {
            best = i;
        }
    }
    let (along, across) = match best % 3 {
        0 => (sum.x, sum.y.abs() + sum.z.abs()),
        1 => (sum.y, sum.z.abs() + sum.x.abs()),
        _ => (sum.z, sum.x.abs() + sum.y.abs()),
    };
    if along.abs() > 0.0 && across / along.abs() < ALIGNMENT_LIMIT {
        BONE_CORRECTION_MATRICES[best]
    } else {
        Matrix3x3::IDENTITY
    }
}

/// New bone matrix for an armature space matrix under the given mode.
pub fn realign_bone(mode: RealignMode, armature_space: &Matrix4x4, correction: &Matrix3x3) -> Matrix4x4 {
    let head = armature_space.translation();
    match mode {
        RealignMode::Off => *armature_space,
        RealignMode::Identity => Matrix4x4::from_parts(&Matrix3x3::IDENTITY, head),
        RealignMode::Auto => {
            let rotation = correction.mul(&armature_space.rotation_part());
            Matrix4x4::from_parts(&rotation, head)
        }
    }
}

/// `new * inv(old)`, the correction that is stored per bone.
pub fn extra_matrix(new_bone: &Matrix4x4, old_bone: &Matrix4x4) -> Matrix4x4 {
    new_bone.mul(&old_bone.inverse())
}

/// Cyclic swap between file axes and scene axes used for key matrices.
pub const KEY_CORRECTION: Matrix3x3 =
    Matrix3x3([[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]);

/// Rotation key in scene bone space: `K * (inv(rest) * key) * inv(K)`.
pub fn import_keymat(rest_rotation: &Matrix3x3, key: &Matrix3x3) -> Matrix3x3 {
    KEY_CORRECTION
        .mul(&rest_rotation.inverse().mul(key))
        .mul(&KEY_CORRECTION.transpose())
}

/// Inverse of [`import_keymat`] for bones; plain `rest * key` for other objects.
pub fn export_keymat(rest_rotation: &Matrix3x3, key: &Matrix3x3, is_bone: bool) -> Matrix3x3 {
    if is_bone {
        rest_rotation.mul(&KEY_CORRECTION.transpose().mul(key).mul(&KEY_CORRECTION))
    } else {
        rest_rotation.mul(key)
    }
}

/// Re-orthonormalizes a correction whose rotation part drifted, with a warning.
pub fn clean_matrix(bone: &str, m: &Matrix4x4, warnings: &mut Vec<NifWarning>) -> Matrix4x4 {
    let rotation = m.rotation_part();
    let scale = rotation.row(0).length();
    if scale > 0.0 && rotation.scaled(1.0 / scale).is_orthonormal(MATRIX_EPSILON * 10.0) {
        return *m;
    }
    let warning = NifWarning::OrthonormalizedMatrix {
        bone: bone.to_string(),
    };
    warn!("{warning}");
    warnings.push(warning);
    let fixed = rotation.orthonormalized();
    Matrix4x4::from_parts(&fixed.scaled(scale.max(f32::EPSILON)), m.translation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> NiTransform {
        NiTransform::new(
            1.5,
            Matrix3x3::from_quat(Quat::from_euler(bevy::math::EulerRot::XYZ, 0.3, -0.7, 1.1)),
            Vector3::new(1.0, -2.0, 3.5),
        )
    }

    fn assert_transform_eq(a: &NiTransform, b: &NiTransform) {
        assert_relative_eq!(a.scale, b.scale, epsilon = 1e-4);
        assert!(a.rotation.approx_eq(&b.rotation, 1e-4), "{a:?} != {b:?}");
        assert!(a.translation.abs_diff_eq(b.translation, 1e-4), "{a:?} != {b:?}");
    }

    #[test]
    fn srt_round_trips() {
        let t = sample();
        let back = decompose_srt(&compose_srt(&t)).unwrap();
        assert_transform_eq(&t, &back);
        let again = compose_srt(&back);
        assert!(again.approx_eq(&compose_srt(&t), 1e-4));
    }

    #[test]
    fn non_uniform_scale_is_rejected() {
        let mut m = Matrix4x4::IDENTITY;
        m.0[0][0] = 1.0;
        m.0[1][1] = 2.0;
        m.0[2][2] = 1.0;
        let err = decompose_srt(&m).unwrap_err();
        assert!(matches!(err, NifError::NonUniformScale { .. }));
    }

    #[test]
    fn mirrored_matrix_gets_negative_scale() {
        let mut m = Matrix4x4::IDENTITY;
        m.0[0][0] = -2.0;
        m.0[1][1] = -2.0;
        m.0[2][2] = -2.0;
        let t = decompose_srt(&m).unwrap();
        assert_relative_eq!(t.scale, -2.0);
        assert!(t.rotation.is_identity());
    }

    #[test]
    fn quaternion_products_follow_row_convention() {
        let q1 = Quat::from_rotation_x(0.4);
        let q2 = Quat::from_rotation_z(-1.2);
        let lhs = Matrix3x3::from_quat(q1).mul(&Matrix3x3::from_quat(q2));
        assert!(lhs.approx_eq(&Matrix3x3::from_quat(q2 * q1), 1e-5));
        let q = Matrix3x3::from_quat(q1).to_quat();
        assert!(q.abs_diff_eq(q1, 1e-5) || q.abs_diff_eq(-q1, 1e-5));
    }

    #[test]
    fn matrix_products_match_transform_composition() {
        let a = sample();
        let b = NiTransform::new(
            0.5,
            Matrix3x3::from_quat(Quat::from_rotation_y(0.9)),
            Vector3::new(0.0, 4.0, -1.0),
        );
        let composed = a.then(&b).to_matrix();
        assert!(composed.approx_eq(&a.to_matrix().mul(&b.to_matrix()), 1e-4));
        assert!(a.to_matrix().mul(&a.inverse().to_matrix()).is_identity());
    }

    #[test]
    fn bind_pose_formulas_invert_each_other() {
        let bind = sample();
        let total = NiTransform::new(
            3.0,
            Matrix3x3::from_quat(Quat::from_rotation_z(0.25)),
            Vector3::new(-4.0, 0.5, 2.0),
        );
        let channel = channel_from_total(&total, &bind);
        assert_transform_eq(&total_from_channel(&channel, &bind), &total);

        let extra = NiTransform::new(
            1.0,
            Matrix3x3::from_quat(Quat::from_rotation_x(1.0)),
            Vector3::new(0.1, 0.2, 0.3),
        );
        let scene = import_channel(&extra, &channel);
        assert_relative_eq!(scene.scale, channel.scale, epsilon = 1e-5);
        let expected = extra
            .to_matrix()
            .mul(&channel.to_matrix())
            .mul(&extra.to_matrix().inverse());
        assert!(scene.to_matrix().approx_eq(&expected, 1e-4));
        assert_transform_eq(&export_channel(&extra, &scene), &channel);
    }

    #[test]
    fn identity_entries_are_not_stored() {
        let mut table = ExtraMatrixTable::new();
        table.insert("Bip01", Matrix4x4::IDENTITY);
        assert!(table.is_empty());
        let swap = Matrix4x4::from_parts(&BONE_CORRECTION_MATRICES[0], Vector3::ZERO);
        table.insert("Bip01 Spine", swap);
        assert_eq!(table.get("Bip01 Spine"), Some(&swap));
        table.insert("Bip01 Spine", Matrix4x4::IDENTITY);
        assert!(table.get("Bip01 Spine").is_none());
        assert!(table.get_or_identity("Bip01 Spine").is_identity());
    }

    #[test]
    fn correction_follows_children() {
        let along_x = [Vector3::new(10.0, 0.5, 0.0), Vector3::new(5.0, -0.5, 0.2)];
        assert_eq!(correction_for(Vector3::ZERO, &along_x), BONE_CORRECTION_MATRICES[0]);
        let down_z = [Vector3::new(0.0, 0.0, -3.0)];
        assert_eq!(correction_for(Vector3::ZERO, &down_z), BONE_CORRECTION_MATRICES[5]);
        let diagonal = [Vector3::new(1.0, 1.0, 0.0)];
        assert_eq!(correction_for(Vector3::ZERO, &diagonal), Matrix3x3::IDENTITY);
        // A leaf bone uses its own offset.
        assert_eq!(
            correction_for(Vector3::new(0.0, 2.0, 0.0), &[]),
            BONE_CORRECTION_MATRICES[1]
        );
    }

    #[test]
    fn keymat_export_undoes_import() {
        let rest = Matrix3x3::from_quat(Quat::from_rotation_y(0.6));
        let key = Matrix3x3::from_quat(Quat::from_rotation_x(-0.3));
        let scene = import_keymat(&rest, &key);
        assert!(export_keymat(&rest, &scene, true).approx_eq(&key, 1e-5));
    }

    #[test]
    fn dirty_matrix_is_cleaned_with_warning() {
        let mut warnings = Vec::new();
        let clean = Matrix4x4::from_parts(&BONE_CORRECTION_MATRICES[2], Vector3::X);
        assert_eq!(clean_matrix("Bip01", &clean, &mut warnings), clean);
        assert!(warnings.is_empty());
        let mut dirty = clean;
        dirty.0[0][1] += 0.05;
        let fixed = clean_matrix("Bip01", &dirty, &mut warnings);
        let rotation = fixed.rotation_part();
        assert!(rotation.scaled(1.0 / rotation.row(0).length()).is_orthonormal(1e-4));
        assert_eq!(warnings.len(), 1);
    }
}
