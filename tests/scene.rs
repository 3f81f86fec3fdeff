use approx::assert_relative_eq;
use bevy::math::{Quat, Vec2, Vec3};

use nif_graph::nif::codec::{Header, NifFile, decode, encode};
use nif_graph::nif::skin::VertexWeightTable;
use nif_graph::nif::types::{
    Block, BoneData, BoneVertData, Matrix3x3, Matrix4x4, NiGeometryData, NiNode, NiSkinData,
    NiSkinInstance, NiTransform, NiTriShape, NiTriShapeData, RecordLink,
};
use nif_graph::nif::version::NifVersion;
use nif_graph::nif_animation::{Channel, Extrapolation, Interpolation, Rotation, Sample};
use nif_graph::scene::{
    SceneArmature, SceneBone, SceneMesh, SceneObject, SceneSkin, SceneTrack,
};
use nif_graph::{Game, NifError, NifSettings, SceneDescription, export, import};

fn translated(x: f32, y: f32, z: f32) -> Matrix4x4 {
    Matrix4x4::from_parts(&Matrix3x3::IDENTITY, Vec3::new(x, y, z))
}

fn object(name: &str, parent: Option<&str>) -> SceneObject {
    SceneObject {
        name: name.into(),
        parent: parent.map(str::to_string),
        matrix: Matrix4x4::IDENTITY,
    }
}

fn triangle_mesh(name: &str) -> SceneMesh {
    let mut mesh = SceneMesh::new(name);
    mesh.vertices = vec![Vec3::ZERO, Vec3::X, Vec3::new(0.0, 0.0, 10.0)];
    mesh.normals = vec![Vec3::Y; 3];
    mesh.triangles = vec![[0, 1, 2]];
    mesh.uv_layers = vec![vec![Vec2::ZERO, Vec2::X, Vec2::Y]];
    mesh
}

/// Bip01 with a spine and a left thigh, and a body skinned to both.
fn skinned_scene() -> SceneDescription {
    let armature = SceneArmature {
        name: "Bip01".into(),
        parent: None,
        matrix: Matrix4x4::IDENTITY,
        bones: vec![
            SceneBone {
                name: "Bip01 Spine".into(),
                parent: None,
                matrix: translated(0.0, 0.0, 10.0),
            },
            SceneBone {
                name: "Bip01 Thigh.L".into(),
                parent: Some(0),
                matrix: translated(2.0, 0.0, 8.0),
            },
        ],
    };
    let mut weights = VertexWeightTable::new(3);
    weights.add(0, 0, 1.0);
    weights.add(1, 1, 1.0);
    weights.add(2, 0, 0.5);
    weights.add(2, 1, 0.5);
    let mut body = triangle_mesh("Body");
    body.skin = Some(SceneSkin {
        armature: "Bip01".into(),
        bones: vec!["Bip01 Spine".into(), "Bip01 Thigh.L".into()],
        weights,
    });

    let mut box_track = SceneTrack {
        target: "Box".into(),
        translation: Channel::linear([
            (0.0, Vec3::ZERO),
            (7.0, Vec3::new(0.0, 5.0, 0.0)),
            (20.0, Vec3::new(0.0, 5.0, 5.0)),
        ]),
        extrapolation: Extrapolation::Cyclic,
        ..Default::default()
    };
    box_track.rotation.quaternions = Channel::linear([
        (0.0, Quat::IDENTITY),
        (20.0, Quat::from_rotation_z(0.5)),
    ]);
    let spine_track = SceneTrack {
        target: "Bip01 Spine".into(),
        translation: Channel::linear([(0.0, Vec3::ZERO), (10.0, Vec3::new(0.0, 1.0, 0.0))]),
        ..Default::default()
    };

    SceneDescription {
        objects: vec![object("Box", None)],
        armatures: vec![armature],
        meshes: vec![body],
        tracks: vec![box_track, spine_track],
        ..Default::default()
    }
}

fn through_file(scene: &SceneDescription, settings: &NifSettings) -> nif_graph::ImportedScene {
    let file = export(scene, settings).unwrap();
    let back = decode(&encode(&file).unwrap()).unwrap();
    import(&back, settings).unwrap()
}

#[test]
fn export_then_import_keeps_the_scene() {
    let settings = NifSettings::default();
    let imported = through_file(&skinned_scene(), &settings);

    assert!(imported.warnings.is_empty(), "{:?}", imported.warnings);
    assert_eq!(imported.game, Some(Game::Oblivion));
    let names: Vec<&str> = imported.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["Scene Root", "Box"]);

    assert_eq!(imported.armatures.len(), 1);
    let armature = &imported.armatures[0];
    assert_eq!(armature.name, "Bip01");
    assert_eq!(armature.parent.as_deref(), Some("Scene Root"));
    let bones: Vec<&str> = armature.bones.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(bones, ["Bip01 Spine", "Bip01 Thigh.L"]);
    assert_eq!(armature.bones[1].parent, Some(0));
    assert!(
        armature.bones[1]
            .matrix
            .approx_eq(&translated(2.0, 0.0, 8.0), 1e-5)
    );
    assert_eq!(
        imported.full_names.get("Bip01 Thigh.L").map(String::as_str),
        Some("Bip01 L Thigh")
    );

    let body = &imported.meshes[0];
    assert_eq!(body.vertices.len(), 3);
    assert_eq!(body.triangles, vec![[0, 1, 2]]);
    assert_eq!(body.uv_layers[0][2], Vec2::Y);
    let skin = body.skin.as_ref().unwrap();
    assert_eq!(skin.armature, "Bip01");
    assert_eq!(skin.bones, ["Bip01 Spine", "Bip01 Thigh.L"]);
    assert_eq!(skin.weights.weights_of(1), &[(1, 1.0)]);
    assert_eq!(skin.weights.weights_of(2).len(), 2);
}

#[test]
fn tracks_come_back_in_frames() {
    let imported = through_file(&skinned_scene(), &NifSettings::default());
    assert_relative_eq!(imported.fps, 30.0);

    let track = imported.track("Box").unwrap();
    assert_eq!(track.extrapolation, Extrapolation::Cyclic);
    let times: Vec<f32> = track.translation.samples.iter().map(|s| s.time).collect();
    assert_eq!(times.len(), 3);
    assert_relative_eq!(times[1], 7.0, epsilon = 1e-3);
    assert_relative_eq!(times[2], 20.0, epsilon = 1e-3);
    assert!(
        track.translation.samples[2]
            .value
            .abs_diff_eq(Vec3::new(0.0, 5.0, 5.0), 1e-5)
    );
    let last = track.rotation.quaternions.samples.last().unwrap();
    assert!(last.value.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-4));

    // Bone keys are relative to the bind pose in the scene.
    let spine = imported.track("Bip01 Spine").unwrap();
    assert!(spine.translation.samples[0].value.abs_diff_eq(Vec3::ZERO, 1e-5));
    assert!(
        spine.translation.samples[1]
            .value
            .abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5)
    );

    let frames: Vec<i32> = imported.markers.iter().map(|m| m.frame).collect();
    assert_eq!(frames.first(), Some(&0));
    assert_eq!(frames.last(), Some(&20));
}

#[test]
fn stepped_bone_keys_stay_stepped() {
    let mut scene = skinned_scene();
    let spine = scene
        .tracks
        .iter_mut()
        .find(|t| t.target == "Bip01 Spine")
        .unwrap();
    spine.translation = Channel::new(
        Interpolation::Constant,
        vec![
            Sample::new(0.0, Vec3::ZERO),
            Sample::new(10.0, Vec3::new(0.0, 1.0, 0.0)),
        ],
    );
    spine.rotation.quaternions = Channel::new(
        Interpolation::Constant,
        vec![
            Sample::new(0.0, Quat::IDENTITY),
            Sample::new(10.0, Quat::from_rotation_x(0.25)),
        ],
    );

    for game in [Game::Oblivion, Game::Morrowind] {
        let imported = through_file(&scene, &NifSettings::for_game(game));
        let spine = imported.track("Bip01 Spine").unwrap();
        assert_eq!(spine.translation.interpolation, Interpolation::Constant, "{game:?}");
        assert_eq!(
            spine.rotation.quaternions.interpolation,
            Interpolation::Constant,
            "{game:?}"
        );
        assert!(
            spine.translation.samples[1]
                .value
                .abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5)
        );
        // The linear box track is untouched.
        let boxed = imported.track("Box").unwrap();
        assert_eq!(boxed.translation.interpolation, Interpolation::Linear);
    }
}

#[test]
fn old_versions_keep_animation_too() {
    let settings = NifSettings::for_game(Game::Morrowind);
    let imported = through_file(&skinned_scene(), &settings);
    assert_eq!(imported.game, Some(Game::Morrowind));
    let track = imported.track("Box").unwrap();
    assert_eq!(track.translation.len(), 3);
    assert!(!imported.markers.is_empty());
}

#[test]
fn unweighted_vertex_blocks_export() {
    let mut scene = skinned_scene();
    let mut weights = VertexWeightTable::new(3);
    weights.add(0, 0, 1.0);
    weights.add(2, 1, 1.0);
    if let Some(skin) = scene.meshes[0].skin.as_mut() {
        skin.weights = weights;
    }
    let err = export(&scene, &NifSettings::default()).unwrap_err();
    let NifError::UnweightedVertex { at, vertex } = &err else {
        panic!("expected unweighted vertex, got {err}");
    };
    assert_eq!(*vertex, 1);
    assert_eq!(at.name.as_deref(), Some("Body"));
}

#[test]
fn non_uniform_scale_names_the_object() {
    let mut scene = skinned_scene();
    scene.objects[0].matrix = Matrix4x4([
        [2.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    let err = export(&scene, &NifSettings::default()).unwrap_err();
    let NifError::NonUniformScale { at, scales } = &err else {
        panic!("expected non-uniform scale, got {err}");
    };
    assert_eq!(at.name.as_deref(), Some("Box"));
    assert_relative_eq!(scales[0], 2.0);

    // A spread within the tolerance still exports.
    scene.objects[0].matrix = Matrix4x4([
        [1.01, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    assert!(export(&scene, &NifSettings::default()).is_ok());
}

#[test]
fn overlapping_rotation_forms_block_export() {
    let mut scene = skinned_scene();
    scene.tracks[0].rotation.euler[0] = Channel::linear([(5.0, 0.0), (15.0, 1.0)]);
    assert!(matches!(
        export(&scene, &NifSettings::default()),
        Err(NifError::ConflictingRotationRepresentation { .. })
    ));
}

#[test]
fn euler_tracks_export_as_euler_keys() {
    let mut scene = skinned_scene();
    scene.tracks[0].rotation.quaternions = Channel::default();
    scene.tracks[0].rotation.euler = [
        Channel::linear([(0.0, 0.0), (10.0, 1.0), (20.0, 2.0)]),
        Channel::linear([(0.0, 0.0), (20.0, 2.0)]),
        Channel::linear([(10.0, 1.0), (20.0, 2.0)]),
    ];
    let imported = through_file(&scene, &NifSettings::default());
    let track = imported.track("Box").unwrap();
    assert!(track.rotation.quaternions.is_empty());
    for axis in &track.rotation.euler {
        assert_eq!(axis.len(), 3);
    }
    assert_relative_eq!(track.rotation.euler[1].samples[1].value, 1.0, epsilon = 1e-5);
    let merged = track.merged().unwrap();
    assert!(matches!(merged.rotation, Rotation::Euler(_)));
}

#[test]
fn missing_parent_blocks_export() {
    let mut scene = skinned_scene();
    scene.objects.push(object("Lamp", Some("Ceiling")));
    assert!(matches!(
        export(&scene, &NifSettings::default()),
        Err(NifError::InvalidData { .. })
    ));
}

#[test]
fn single_top_level_object_becomes_the_root() {
    let scene = SceneDescription {
        objects: vec![object("Root", None), object("Child", Some("Root"))],
        ..Default::default()
    };
    let file = export(&scene, &NifSettings::default()).unwrap();
    assert_eq!(file.roots.len(), 1);
    assert_eq!(
        file.blocks.resolve(file.roots[0]).and_then(Block::name),
        Some("Root")
    );
    assert_eq!(file.blocks.len(), 2);
}

/// Scene Root > Bip01 > Bip01 Spine, plus a body skinned to the spine only.
fn grandchild_skin_file() -> NifFile {
    let mut file = NifFile::new(Header::new(NifVersion::V20_0_0_5, 11, 11));
    let blocks = &mut file.blocks;
    let mut spine = NiNode::named("Bip01 Spine");
    spine.av_base.transform = NiTransform::new(1.0, Matrix3x3::IDENTITY, Vec3::new(0.0, 0.0, 4.0));
    let spine = blocks.register(Block::Node(spine), None);
    let mut pelvis = NiNode::named("Bip01");
    pelvis.children = vec![RecordLink::Block(spine)];
    let pelvis = blocks.register(Block::Node(pelvis), None);

    let data = blocks.register(
        Block::TriShapeData(NiTriShapeData {
            geom_base: NiGeometryData {
                vertices: vec![Vec3::ZERO, Vec3::X],
                ..Default::default()
            },
            ..Default::default()
        }),
        None,
    );
    let skin_data = blocks.register(
        Block::SkinData(NiSkinData {
            bone_list: vec![BoneData {
                num_vertices: 2,
                vertex_weights: vec![
                    BoneVertData { index: 0, weight: 1.0 },
                    BoneVertData { index: 1, weight: 1.0 },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }),
        None,
    );
    let mut root = NiNode::named("Scene Root");
    root.children = vec![RecordLink::Block(pelvis)];
    let root = blocks.register(Block::Node(root), None);
    let skin = blocks.register(
        Block::SkinInstance(NiSkinInstance {
            data: RecordLink::Block(skin_data),
            skeleton_root: RecordLink::Block(root),
            bones: vec![RecordLink::Block(spine)],
            ..Default::default()
        }),
        None,
    );
    let mut body = NiTriShape::named("Body");
    body.data_link = RecordLink::Block(data);
    body.skin_link = RecordLink::Block(skin);
    let body = blocks.register(Block::TriShape(body), None);
    if let Some(Block::Node(root)) = blocks.resolve_mut(root) {
        root.children.push(RecordLink::Block(body));
    }
    file.roots.push(root);
    file
}

#[test]
fn skin_through_grandchild_marks_the_node_between() {
    let file = decode(&encode(&grandchild_skin_file()).unwrap()).unwrap();
    let imported = import(&file, &NifSettings::default()).unwrap();
    assert!(imported.warnings.is_empty(), "{:?}", imported.warnings);

    assert_eq!(imported.armatures.len(), 1);
    let armature = &imported.armatures[0];
    assert_eq!(armature.name, "Scene Root");
    let bones: Vec<&str> = armature.bones.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(bones, ["Bip01", "Bip01 Spine"]);
    assert_eq!(armature.bones[1].parent, Some(0));
    assert!(imported.objects.is_empty());

    let skin = imported.meshes[0].skin.as_ref().unwrap();
    assert_eq!(skin.bones, ["Bip01 Spine"]);
    assert_eq!(skin.weights.weights_of(1), &[(0, 1.0)]);
}

#[test]
fn detached_skeleton_root_is_a_warning() {
    let mut file = grandchild_skin_file();
    let stray = file
        .blocks
        .register(Block::Node(NiNode::named("Stray")), None);
    let skin = file
        .blocks
        .iter()
        .find(|(_, b)| matches!(b, Block::SkinInstance(_)))
        .map(|(k, _)| k)
        .unwrap();
    if let Some(Block::SkinInstance(skin)) = file.blocks.resolve_mut(skin) {
        skin.skeleton_root = RecordLink::Block(stray);
    }
    file.roots.push(stray);

    let imported = import(&file, &NifSettings::default()).unwrap();
    assert!(imported.warnings.iter().any(|w| matches!(
        w,
        nif_graph::NifWarning::DetachedSkinRoot { .. }
    )));
}
