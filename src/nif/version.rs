use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A packed `a.b.c.d` file version, one byte per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NifVersion(pub u32);

impl NifVersion {
    pub const V3_3_0_13: NifVersion = NifVersion(0x0303_000D);
    pub const V4_0_0_2: NifVersion = NifVersion(0x0400_0002);
    pub const V4_1_0_1: NifVersion = NifVersion(0x0401_0001);
    pub const V4_2_1_0: NifVersion = NifVersion(0x0402_0100);
    pub const V4_2_2_0: NifVersion = NifVersion(0x0402_0200);
    pub const V5_0_0_1: NifVersion = NifVersion(0x0500_0001);
    pub const V5_0_0_6: NifVersion = NifVersion(0x0500_0006);
    pub const V10_0_1_0: NifVersion = NifVersion(0x0A00_0100);
    pub const V10_0_1_2: NifVersion = NifVersion(0x0A00_0102);
    pub const V10_0_1_8: NifVersion = NifVersion(0x0A00_0108);
    pub const V10_1_0_0: NifVersion = NifVersion(0x0A01_0000);
    pub const V10_1_0_101: NifVersion = NifVersion(0x0A01_0065);
    pub const V10_1_0_103: NifVersion = NifVersion(0x0A01_0067);
    pub const V10_1_0_104: NifVersion = NifVersion(0x0A01_0068);
    pub const V10_1_0_106: NifVersion = NifVersion(0x0A01_006A);
    pub const V10_1_0_108: NifVersion = NifVersion(0x0A01_006C);
    pub const V10_1_0_114: NifVersion = NifVersion(0x0A01_0072);
    pub const V10_2_0_0: NifVersion = NifVersion(0x0A02_0000);
    pub const V20_0_0_3: NifVersion = NifVersion(0x1400_0003);
    pub const V20_0_0_4: NifVersion = NifVersion(0x1400_0004);
    pub const V20_0_0_5: NifVersion = NifVersion(0x1400_0005);
    pub const V20_1_0_1: NifVersion = NifVersion(0x1401_0001);
    pub const V20_1_0_2: NifVersion = NifVersion(0x1401_0002);
    pub const V20_1_0_3: NifVersion = NifVersion(0x1401_0003);
    pub const V20_2_0_5: NifVersion = NifVersion(0x1402_0005);
    pub const V20_2_0_7: NifVersion = NifVersion(0x1402_0007);

    /// Versions with a complete block schema in this crate.
    pub const SUPPORTED: [NifVersion; 7] = [
        Self::V4_0_0_2,
        Self::V4_2_2_0,
        Self::V10_0_1_0,
        Self::V10_2_0_0,
        Self::V20_0_0_4,
        Self::V20_0_0_5,
        Self::V20_2_0_7,
    ];

    /// Highest Bethesda stream version whose geometry layout is covered.
    pub const MAX_BS_VERSION: u32 = 34;

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        NifVersion((a as u32) << 24 | (b as u32) << 16 | (c as u32) << 8 | d as u32)
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// The text line that opens every file of this version, without the newline.
    pub fn header_line(self) -> String {
        if self < Self::V10_1_0_0 {
            format!("NetImmerse File Format, Version {self}")
        } else {
            format!("Gamebryo File Format, Version {self}")
        }
    }
}

impl fmt::Display for NifVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl FromStr for NifVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u8>().map_err(|e| format!("bad version '{s}': {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [a, b, c, d] => Ok(NifVersion::new(*a, *b, *c, *d)),
            _ => Err(format!("bad version '{s}': expected four components")),
        }
    }
}

impl Serialize for NifVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NifVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
