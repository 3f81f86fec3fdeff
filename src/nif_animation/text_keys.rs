// src/nif_animation/text_keys.rs

use std::fmt::Write as _;

use bevy::log::{info, warn};

use crate::nif::error::{BlockContext, NifError, Result};
use crate::nif::registry::{BlockRef, BlockRegistry};
use crate::nif::types::{
    Block, ControllerFlags, ExtraData, ExtraFields, NiSequenceStreamHelper, NiStringExtraData,
    NiTextKeyExtraData, RecordLink, TextKey,
};

/// Playback mode stored in sequence and controller data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleType {
    #[default]
    Cyclic = 0,
    Reverse = 1,
    Constant = 2,
}

impl CycleType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(CycleType::Cyclic),
            1 => Some(CycleType::Reverse),
            2 => Some(CycleType::Constant),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Controller flags keep the cycle type in bits 1 and 2.
    pub fn from_flags(flags: ControllerFlags) -> Option<Self> {
        Self::from_raw(u32::from(flags.cycle_bits() >> 1))
    }
}

/// A timeline marker: one text key, split into its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMarker {
    pub frame: i32,
    pub lines: Vec<String>,
}

impl TextMarker {
    pub fn new(frame: i32, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            frame,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

fn frame_of(time: f32, fps: f32) -> i32 {
    (time * fps).round() as i32
}

/// Text keys as markers. Key times are seconds, markers are frames.
pub fn import_text_keys(keys: &[TextKey], fps: f32) -> Vec<TextMarker> {
    keys.iter()
        .map(|key| TextMarker {
            frame: frame_of(key.time, fps),
            lines: key
                .value
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        })
        .collect()
}

/// `frame/line1/line2` per marker.
pub fn markers_to_text(markers: &[TextMarker]) -> String {
    let mut out = String::new();
    for marker in markers {
        let _ = write!(out, "{}", marker.frame);
        for line in &marker.lines {
            let _ = write!(out, "/{line}");
        }
        out.push('\n');
    }
    out
}

pub fn parse_marker_text(text: &str) -> Result<Vec<TextMarker>> {
    let mut markers = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split('/');
        let frame = parts.next().unwrap_or_default();
        let frame = frame
            .trim()
            .parse()
            .map_err(|_| NifError::SidecarSyntax {
                table: "Anim",
                line: number + 1,
                reason: format!("'{frame}' is not a frame number"),
            })?;
        markers.push(TextMarker {
            frame,
            lines: parts.filter(|p| !p.is_empty()).map(str::to_string).collect(),
        });
    }
    Ok(markers)
}

/// Text keys for an export covering frames `first..=last`.
///
/// Without markers the clip is tagged as one looping idle.
pub fn export_text_keys(
    markers: &[TextMarker],
    first: i32,
    last: i32,
    fps: f32,
) -> Result<NiTextKeyExtraData> {
    let at = BlockContext::new("NiTextKeyExtraData");
    if fps <= 0.0 {
        return Err(NifError::invalid(at, format!("frame rate {fps} is not positive")));
    }
    let defaults;
    let markers = if markers.is_empty() {
        defaults = [
            TextMarker::new(first, ["Idle: Start", "Idle: Loop Start"]),
            TextMarker::new(last, ["Idle: Loop Stop", "Idle: Stop"]),
        ];
        &defaults[..]
    } else {
        markers
    };

    let mut text_keys = Vec::with_capacity(markers.len());
    for marker in markers {
        if marker.frame < first || marker.frame > last {
            return Err(NifError::invalid(
                at,
                format!("text key at frame {} is outside {first}..{last}", marker.frame),
            ));
        }
        text_keys.push(TextKey {
            time: marker.frame as f32 / fps,
            value: marker.lines.join("\r\n"),
        });
    }
    text_keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    info!("Exporting {} text keys", text_keys.len());
    Ok(NiTextKeyExtraData {
        text_keys,
        ..Default::default()
    })
}

/// What a text key line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Start,
    Stop,
    LoopStart,
    LoopStop,
    /// Anything else, kept verbatim: hits, sounds, sound generators.
    Event(String),
}

/// Splits `Group: command` into the group name and command.
///
/// Groups may contain colons; the command is what follows the last one.
pub fn parse_text_key_line(line: &str) -> Option<(String, TextCommand)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (group, command) = match line.rsplit_once(':') {
        Some((group, command)) => (group.trim(), command.trim()),
        None => ("", line),
    };
    let command = match command.to_lowercase().as_str() {
        "start" => TextCommand::Start,
        "stop" => TextCommand::Stop,
        "loop start" => TextCommand::LoopStart,
        "loop stop" => TextCommand::LoopStop,
        _ => TextCommand::Event(command.to_string()),
    };
    Some((group.to_string(), command))
}

/// Groups whose keys are events wherever they appear.
const GENERIC_EVENT_GROUPS: [&str; 2] = ["soundgen", "sound"];

/// One named clip delimited by `Start` and `Stop` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationGroup {
    pub name: String,
    pub start: f32,
    pub stop: f32,
    pub loop_start: Option<f32>,
    pub loop_stop: Option<f32>,
    /// Events as (absolute time, line).
    pub events: Vec<(f32, String)>,
}

/// Collects the clips named by a key list, in start order.
///
/// A group without a stop key runs to its last key. Loop bounds are clamped
/// into the clip; a loop start without a stop loops to the end.
pub fn animation_groups(keys: &[TextKey]) -> Vec<AnimationGroup> {
    let lines: Vec<(f32, &str, String, TextCommand)> = keys
        .iter()
        .flat_map(|key| key.value.lines().map(move |line| (key.time, line)))
        .filter_map(|(time, line)| {
            parse_text_key_line(line).map(|(group, command)| (time, line, group, command))
        })
        .collect();

    let mut groups: Vec<AnimationGroup> = Vec::new();
    for (time, _, group, command) in &lines {
        if *command != TextCommand::Start || group.is_empty() {
            continue;
        }
        let lower = group.to_lowercase();
        if GENERIC_EVENT_GROUPS.contains(&lower.as_str())
            || groups
                .iter()
                .any(|g| g.name.to_lowercase() == lower && g.start == *time)
        {
            continue;
        }
        groups.push(AnimationGroup {
            name: group.clone(),
            start: *time,
            stop: *time,
            loop_start: None,
            loop_stop: None,
            events: Vec::new(),
        });
    }
    groups.sort_by(|a, b| a.start.total_cmp(&b.start));

    for g in &mut groups {
        let lower = g.name.to_lowercase();
        let mut explicit_stop = None;
        let mut last_key = g.start;
        for (time, _, group, command) in &lines {
            if *time < g.start || group.to_lowercase() != lower {
                continue;
            }
            if *command == TextCommand::Stop {
                explicit_stop = Some(explicit_stop.map_or(*time, |s: f32| s.min(*time)));
            }
            last_key = last_key.max(*time);
        }
        g.stop = explicit_stop.unwrap_or(last_key);

        for (time, line, group, command) in &lines {
            if *time < g.start || *time > g.stop {
                continue;
            }
            let lower_group = group.to_lowercase();
            match command {
                TextCommand::LoopStart if lower_group == lower => g.loop_start = Some(*time),
                TextCommand::LoopStop if lower_group == lower => g.loop_stop = Some(*time),
                TextCommand::Event(_)
                    if lower_group.starts_with(&lower)
                        || GENERIC_EVENT_GROUPS.contains(&lower_group.as_str()) =>
                {
                    g.events.push((*time, line.trim().to_string()));
                }
                _ => {}
            }
        }
        if g.loop_start.is_some() && g.loop_stop.is_none() {
            g.loop_stop = Some(g.stop);
        }
        if let (Some(start), Some(stop)) = (g.loop_start, g.loop_stop) {
            if stop < start {
                warn!("'{}' loops backwards; loop stop moved to loop start", g.name);
                g.loop_stop = Some(start);
            }
        }
    }
    groups
}

/// Extra data blocks chained from `key`, legacy link first, then the list.
pub fn extra_data_of(blocks: &BlockRegistry, key: BlockRef) -> Vec<BlockRef> {
    let Some(net) = blocks.resolve(key).and_then(Block::net) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut link = net.extra_data_link;
    while let Some(next) = link.block() {
        if out.contains(&next) {
            break;
        }
        let Some(Block::ExtraData(extra)) = blocks.resolve(next) else {
            break;
        };
        out.push(next);
        link = extra.fields().next_extra_data_link;
    }
    for key in net.extra_data_list.iter().filter_map(|l| l.block()) {
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

/// The first text key block attached to `key`.
pub fn text_keys_of(blocks: &BlockRegistry, key: BlockRef) -> Option<&NiTextKeyExtraData> {
    extra_data_of(blocks, key)
        .into_iter()
        .find_map(|k| match blocks.resolve(k) {
            Some(Block::ExtraData(ExtraData::TextKeys(t))) => Some(t),
            _ => None,
        })
}

/// A controller in a KF file and the bone it animates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KfBinding {
    pub bone: String,
    pub controller: BlockRef,
}

/// Pairs the bone names of a stream helper with its controllers, in order.
pub fn pair_stream_helper(blocks: &BlockRegistry, helper: BlockRef) -> Result<Vec<KfBinding>> {
    let at = blocks.context(helper);
    if !matches!(blocks.resolve(helper), Some(Block::SequenceStreamHelper(_))) {
        return Err(NifError::invalid(at, "not a sequence stream helper"));
    }
    let bones: Vec<String> = extra_data_of(blocks, helper)
        .into_iter()
        .filter_map(|k| match blocks.resolve(k) {
            Some(Block::ExtraData(ExtraData::String(s))) => Some(s.string_data.clone()),
            _ => None,
        })
        .collect();
    let controllers = super::chain::controllers_of(blocks, helper);
    if bones.len() != controllers.len() {
        return Err(NifError::invalid(
            at,
            format!(
                "{} bone names for {} controllers",
                bones.len(),
                controllers.len()
            ),
        ));
    }
    Ok(bones
        .into_iter()
        .zip(controllers)
        .map(|(bone, controller)| KfBinding { bone, controller })
        .collect())
}

/// Builds a KF root: text keys, then one string per bone, chained in order.
///
/// Controllers must already be attached to the helper in the same order as
/// `bones`.
pub fn build_stream_helper(
    blocks: &mut BlockRegistry,
    text_keys: NiTextKeyExtraData,
    bones: &[&str],
) -> BlockRef {
    let text_keys = blocks.register(Block::ExtraData(ExtraData::TextKeys(text_keys)), None);
    let mut previous = text_keys;
    for bone in bones {
        let name = blocks.register(
            Block::ExtraData(ExtraData::String(NiStringExtraData {
                extra_base: ExtraFields::default(),
                string_data: bone.to_string(),
            })),
            Some(*bone),
        );
        if let Some(Block::ExtraData(extra)) = blocks.resolve_mut(previous) {
            extra.fields_mut().next_extra_data_link = name.into();
        }
        previous = name;
    }
    let mut helper = NiSequenceStreamHelper::default();
    helper.net_base.extra_data_link = RecordLink::Block(text_keys);
    blocks.register(Block::SequenceStreamHelper(helper), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::types::{Controller, NiKeyframeController};
    use crate::nif_animation::chain::attach_controller;
    use approx::assert_relative_eq;

    fn key(time: f32, value: &str) -> TextKey {
        TextKey {
            time,
            value: value.to_string(),
        }
    }

    #[test]
    fn cycle_types_map_from_raw_and_flags() {
        assert_eq!(CycleType::from_raw(1), Some(CycleType::Reverse));
        assert_eq!(CycleType::from_raw(3), None);
        assert_eq!(CycleType::Constant.raw(), 2);
        assert_eq!(
            CycleType::from_flags(ControllerFlags::ACTIVE | ControllerFlags::CYCLE_CLAMP),
            Some(CycleType::Constant)
        );
        assert_eq!(CycleType::from_flags(ControllerFlags::ACTIVE), Some(CycleType::Cyclic));
    }

    #[test]
    fn markers_round_trip_through_text() {
        let keys = [key(0.0, "Idle: Start\r\nIdle: Loop Start"), key(1.0, "Idle: Stop")];
        let markers = import_text_keys(&keys, 30.0);
        assert_eq!(markers[0].lines, ["Idle: Start", "Idle: Loop Start"]);
        assert_eq!(markers[1].frame, 30);
        let text = markers_to_text(&markers);
        assert_eq!(text, "0/Idle: Start/Idle: Loop Start\n30/Idle: Stop\n");
        assert_eq!(parse_marker_text(&text).unwrap(), markers);
        assert!(matches!(
            parse_marker_text("x/Idle: Start"),
            Err(NifError::SidecarSyntax { table: "Anim", line: 1, .. })
        ));
    }

    #[test]
    fn export_defaults_to_idle_loop() {
        let data = export_text_keys(&[], 0, 60, 30.0).unwrap();
        assert_eq!(data.text_keys.len(), 2);
        assert_eq!(data.text_keys[0].value, "Idle: Start\r\nIdle: Loop Start");
        assert_relative_eq!(data.text_keys[1].time, 2.0);
        assert_eq!(data.text_keys[1].value, "Idle: Loop Stop\r\nIdle: Stop");
    }

    #[test]
    fn export_rejects_markers_outside_range() {
        let markers = [TextMarker::new(90, ["Attack: Hit"])];
        assert!(matches!(
            export_text_keys(&markers, 0, 60, 30.0),
            Err(NifError::InvalidData { .. })
        ));
        let markers = [TextMarker::new(15, ["Attack: Hit"])];
        let data = export_text_keys(&markers, 0, 60, 30.0).unwrap();
        assert_relative_eq!(data.text_keys[0].time, 0.5);
    }

    #[test]
    fn lines_parse_multi_word_commands() {
        assert_eq!(
            parse_text_key_line("Idle: Loop Start"),
            Some(("Idle".to_string(), TextCommand::LoopStart))
        );
        assert_eq!(
            parse_text_key_line("Weapon: Attack: hit"),
            Some(("Weapon: Attack".to_string(), TextCommand::Event("hit".to_string())))
        );
        assert_eq!(parse_text_key_line("  "), None);
    }

    #[test]
    fn groups_collect_loops_and_events() {
        let keys = [
            key(0.0, "Idle: Start\r\nIdle: Loop Start"),
            key(0.5, "SoundGen: Left"),
            key(1.0, "Idle: Loop Stop\r\nIdle: Stop"),
            key(1.5, "Walk: Start"),
            key(1.7, "Walk: Loop Start"),
            key(2.0, "Walk: Stop"),
        ];
        let groups = animation_groups(&keys);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Idle");
        assert_eq!(groups[0].loop_start, Some(0.0));
        assert_eq!(groups[0].loop_stop, Some(1.0));
        assert_eq!(groups[0].events, vec![(0.5, "SoundGen: Left".to_string())]);
        assert_eq!(groups[1].stop, 2.0);
        assert_eq!(groups[1].loop_stop, Some(2.0));
    }

    #[test]
    fn stream_helper_pairs_bones_with_controllers() {
        let mut blocks = BlockRegistry::new();
        let helper = build_stream_helper(
            &mut blocks,
            NiTextKeyExtraData::default(),
            &["Bip01", "Bip01 Head"],
        );
        let first = blocks.register(
            Block::Controller(Controller::Keyframe(NiKeyframeController::default())),
            None,
        );
        let second = blocks.register(
            Block::Controller(Controller::Keyframe(NiKeyframeController::default())),
            None,
        );
        assert!(matches!(
            pair_stream_helper(&blocks, helper),
            Err(NifError::InvalidData { .. })
        ));
        attach_controller(&mut blocks, helper, first).unwrap();
        attach_controller(&mut blocks, helper, second).unwrap();
        let bindings = pair_stream_helper(&blocks, helper).unwrap();
        assert_eq!(bindings[0].bone, "Bip01");
        assert_eq!(bindings[1].controller, second);
        assert!(text_keys_of(&blocks, helper).is_some());
    }
}
