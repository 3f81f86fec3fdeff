use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::*;

/// Values that can sit in a key group.
pub trait KeyValue: Sized + Copy {
    const SIZE: usize;
    fn read(r: &mut Reader) -> Result<Self>;
    fn write(&self, w: &mut Writer) -> Result<()>;
}

impl KeyValue for f32 {
    const SIZE: usize = 4;
    fn read(r: &mut Reader) -> Result<Self> {
        r.f32()
    }
    fn write(&self, w: &mut Writer) -> Result<()> {
        w.f32(*self)
    }
}

impl KeyValue for Vector3 {
    const SIZE: usize = 12;
    fn read(r: &mut Reader) -> Result<Self> {
        r.vec3()
    }
    fn write(&self, w: &mut Writer) -> Result<()> {
        w.vec3(*self)
    }
}

fn read_tbc(r: &mut Reader) -> Result<Tbc> {
    Ok(Tbc {
        tension: r.f32()?,
        bias: r.f32()?,
        continuity: r.f32()?,
    })
}

fn write_tbc(w: &mut Writer, tbc: Option<Tbc>) -> Result<()> {
    let tbc = tbc.unwrap_or_default();
    w.f32(tbc.tension)?;
    w.f32(tbc.bias)?;
    w.f32(tbc.continuity)
}

/// Key types whose per-key payload is known; anything else cannot be skipped.
fn read_key_type(r: &mut Reader) -> Result<KeyType> {
    match KeyType::from(r.u32()?) {
        KeyType::Unknown(raw) => Err(r.invalid(format!("unknown key type {raw}"))),
        known => Ok(known),
    }
}

fn check_key_type(w: &Writer, key_type: KeyType) -> Result<()> {
    match key_type {
        KeyType::Unknown(raw) => Err(w.invalid(format!("unknown key type {raw}"))),
        _ => Ok(()),
    }
}

fn read_key<T: KeyValue>(r: &mut Reader, key_type: KeyType) -> Result<Key<T>> {
    let mut key = Key::linear(r.f32()?, T::read(r)?);
    match key_type {
        KeyType::Quadratic => {
            key.forward_tangent = Some(T::read(r)?);
            key.backward_tangent = Some(T::read(r)?);
        }
        KeyType::TBC => key.tbc = Some(read_tbc(r)?),
        _ => {}
    }
    Ok(key)
}

fn write_key<T: KeyValue + Default>(w: &mut Writer, key: &Key<T>, key_type: KeyType) -> Result<()> {
    w.f32(key.time)?;
    key.value.write(w)?;
    match key_type {
        KeyType::Quadratic => {
            key.forward_tangent.unwrap_or_default().write(w)?;
            key.backward_tangent.unwrap_or_default().write(w)
        }
        KeyType::TBC => write_tbc(w, key.tbc),
        _ => Ok(()),
    }
}

impl<T: KeyValue> Load for KeyGroup<T> {
    fn load(r: &mut Reader) -> Result<Self> {
        let count = r.count(4 + T::SIZE)?;
        if count == 0 {
            return Ok(KeyGroup::new(KeyType::default(), Vec::new()));
        }
        let interpolation = read_key_type(r)?;
        let keys = (0..count)
            .map(|_| read_key(r, interpolation))
            .collect::<Result<_>>()?;
        Ok(KeyGroup::new(interpolation, keys))
    }
}

impl<T: KeyValue + Default> Save for KeyGroup<T> {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.count(self.keys.len())?;
        if self.keys.is_empty() {
            return Ok(());
        }
        check_key_type(w, self.interpolation)?;
        w.u32(self.interpolation.into())?;
        self.keys
            .iter()
            .try_for_each(|key| write_key(w, key, self.interpolation))
    }
}

impl Load for NiKeyframeData {
    fn load(r: &mut Reader) -> Result<Self> {
        let num_rotations = r.count(8)?;
        let mut rotations = RotationKeys::None;
        if num_rotations != 0 {
            let key_type = read_key_type(r)?;
            if key_type == KeyType::XyzRotation {
                let order = if r.has(Field::KeyEulerOrder) {
                    r.f32()?
                } else {
                    0.0
                };
                let axes = [
                    KeyGroup::load(r)?,
                    KeyGroup::load(r)?,
                    KeyGroup::load(r)?,
                ];
                rotations = RotationKeys::Euler { order, axes };
            } else {
                let mut keys = Vec::with_capacity(num_rotations);
                for _ in 0..num_rotations {
                    let time = r.f32()?;
                    let value = r.quat()?;
                    let tbc = match key_type {
                        KeyType::TBC => Some(read_tbc(r)?),
                        _ => None,
                    };
                    keys.push(KeyQuaternion { time, value, tbc });
                }
                rotations = RotationKeys::Quaternion { key_type, keys };
            }
        }
        Ok(NiKeyframeData {
            kind: KeyframeDataKind::default(),
            rotations,
            translations: KeyGroup::load(r)?,
            scales: KeyGroup::load(r)?,
        })
    }
}

impl Save for NiKeyframeData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        match &self.rotations {
            RotationKeys::None => w.u32(0)?,
            RotationKeys::Quaternion { keys, .. } if keys.is_empty() => w.u32(0)?,
            RotationKeys::Quaternion { key_type, keys } => {
                check_key_type(w, *key_type)?;
                w.count(keys.len())?;
                w.u32((*key_type).into())?;
                for key in keys {
                    w.f32(key.time)?;
                    w.quat(key.value)?;
                    if *key_type == KeyType::TBC {
                        write_tbc(w, key.tbc)?;
                    }
                }
            }
            RotationKeys::Euler { order, axes } => {
                w.u32(1)?;
                w.u32(KeyType::XyzRotation.into())?;
                if w.has(Field::KeyEulerOrder) {
                    w.f32(*order)?;
                }
                axes.iter().try_for_each(|axis| axis.save(w))?;
            }
        }
        self.translations.save(w)?;
        self.scales.save(w)
    }
}

impl Load for NiKeyframeController {
    fn load(r: &mut Reader) -> Result<Self> {
        let base = NiTimeController {
            next_controller: r.link()?,
            flags: ControllerFlags::from_bits_retain(r.u16()?),
            frequency: r.f32()?,
            phase: r.f32()?,
            start_time: r.f32()?,
            stop_time: r.f32()?,
            target: r.link()?,
        };
        let interpolator = if r.has(Field::CtrlInterpolator) {
            r.link()?
        } else {
            RecordLink::Null
        };
        let data = if r.has(Field::CtrlData) {
            r.link()?
        } else {
            RecordLink::Null
        };
        Ok(NiKeyframeController {
            base,
            interpolator,
            data,
        })
    }
}

impl Save for NiKeyframeController {
    fn save(&self, w: &mut Writer) -> Result<()> {
        let base = &self.base;
        w.link(base.next_controller)?;
        w.u16(base.flags.bits())?;
        w.f32(base.frequency)?;
        w.f32(base.phase)?;
        w.f32(base.start_time)?;
        w.f32(base.stop_time)?;
        w.link(base.target)?;
        if w.has(Field::CtrlInterpolator) {
            w.link(self.interpolator)?;
        }
        if w.has(Field::CtrlData) {
            w.link(self.data)?;
        }
        Ok(())
    }
}

impl Load for NiTransformInterpolator {
    fn load(r: &mut Reader) -> Result<Self> {
        let translation = r.vec3()?;
        let rotation = r.quat()?;
        let scale = r.f32()?;
        let mut trs_valid = [true; 3];
        if r.has(Field::InterpTrsValid) {
            for valid in &mut trs_valid {
                *valid = r.byte_bool()?;
            }
        }
        Ok(NiTransformInterpolator {
            translation,
            rotation,
            scale,
            trs_valid,
            data: r.link()?,
        })
    }
}

impl Save for NiTransformInterpolator {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.vec3(self.translation)?;
        w.quat(self.rotation)?;
        w.f32(self.scale)?;
        if w.has(Field::InterpTrsValid) {
            self.trs_valid.iter().try_for_each(|v| w.byte_bool(*v))?;
        }
        w.link(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::registry::BlockRegistry;
    use crate::nif::schema::StreamFormat;
    use crate::nif::version::NifVersion;

    fn round_trip(data: &NiKeyframeData, version: NifVersion) -> NiKeyframeData {
        let registry = BlockRegistry::new();
        let format = StreamFormat::new(version, 0, 0);
        let mut w = Writer::new(format, &registry);
        data.save(&mut w).unwrap();
        let (bytes, _) = w.finish();
        let mut r = Reader::new(&bytes);
        r.format = format;
        let read = NiKeyframeData::load(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        read
    }

    #[test]
    fn euler_rotation_writes_one_as_count() {
        let axis = |v: f32| KeyGroup::new(KeyType::Linear, vec![Key::linear(0.0, v)]);
        let data = NiKeyframeData {
            rotations: RotationKeys::Euler {
                order: 0.0,
                axes: [axis(0.1), axis(0.2), axis(0.3)],
            },
            ..Default::default()
        };
        let registry = BlockRegistry::new();
        let mut w = Writer::new(StreamFormat::new(NifVersion::V4_0_0_2, 0, 0), &registry);
        data.save(&mut w).unwrap();
        let (bytes, _) = w.finish();
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 4, 0, 0, 0]);
        assert_eq!(round_trip(&data, NifVersion::V4_0_0_2), data);
        assert_eq!(round_trip(&data, NifVersion::V20_0_0_5), data);
    }

    #[test]
    fn tbc_and_quadratic_extras_survive() {
        let tbc = Some(Tbc {
            tension: 0.5,
            bias: -0.25,
            continuity: 1.0,
        });
        let data = NiKeyframeData {
            rotations: RotationKeys::Quaternion {
                key_type: KeyType::TBC,
                keys: vec![KeyQuaternion {
                    time: 0.5,
                    value: Quaternion::from_rotation_z(0.3),
                    tbc,
                }],
            },
            translations: KeyGroup::new(
                KeyType::Quadratic,
                vec![Key {
                    forward_tangent: Some(Vector3::X),
                    backward_tangent: Some(Vector3::Y),
                    ..Key::linear(0.0, Vector3::new(1.0, 2.0, 3.0))
                }],
            ),
            scales: KeyGroup::new(KeyType::Linear, vec![Key::linear(0.0, 1.0)]),
            ..Default::default()
        };
        assert_eq!(round_trip(&data, NifVersion::V10_0_1_0), data);
    }
}
