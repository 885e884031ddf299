//! Artifacts: named configuration snapshots handed to the sink.

use std::fmt;

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};

use crate::inventory::RetrievalUnit;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DAY_FORMAT: &str = "%Y%m%d";

/// Wall-clock instant a run started, used in every artifact name of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp(NaiveDateTime);

impl RunStamp {
    /// Stamp for a run starting now, in local time.
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    /// Stamp for a fixed local time.
    pub fn at(time: NaiveDateTime) -> Self {
        Self(time)
    }

    /// The run day as `YYYYmmdd`.
    pub fn day(&self) -> String {
        self.0.format(DAY_FORMAT).to_string()
    }

    /// Name of the artifact for one retrieval unit of a device.
    ///
    /// `{id}_{stamp}.cfg` for a single-surface device and
    /// `{id}_{context}_{stamp}.cfg` for a context. Device ids and context
    /// names never contain `_`, so distinct units get distinct names.
    pub fn artifact_name(&self, device_id: &str, unit: &RetrievalUnit) -> ArtifactName {
        let stamp = self.0.format(STAMP_FORMAT);
        let name = match unit.label() {
            Some(context) => format!("{}_{}_{}.cfg", device_id, context, stamp),
            None => format!("{}_{}.cfg", device_id, stamp),
        };
        ArtifactName(name)
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

/// File name of an artifact. Only built by [`RunStamp::artifact_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A finished configuration snapshot.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: ArtifactName,
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(name: ArtifactName, bytes: impl Into<Bytes>) -> Self {
        Self {
            name,
            bytes: bytes.into(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_stamp() -> RunStamp {
    use chrono::NaiveDate;

    RunStamp::at(
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let stamp = test_stamp();
        assert_eq!(
            stamp
                .artifact_name("CORE-SW-01", &RetrievalUnit::Whole)
                .as_str(),
            "CORE-SW-01_20240501_023000.cfg"
        );
        assert_eq!(
            stamp
                .artifact_name("ASA-FW-01", &RetrievalUnit::Context("DMZ".to_string()))
                .as_str(),
            "ASA-FW-01_DMZ_20240501_023000.cfg"
        );
        assert_eq!(
            stamp
                .artifact_name("ASA-FW-01", &RetrievalUnit::System("system".to_string()))
                .as_str(),
            "ASA-FW-01_system_20240501_023000.cfg"
        );
        assert_eq!(stamp.day(), "20240501");
    }

    #[test]
    fn test_artifact_len() {
        let name = test_stamp().artifact_name("SW1", &RetrievalUnit::Whole);
        let artifact = Artifact::new(name, "hostname SW1\n");
        assert_eq!(artifact.len(), 13);
        assert!(!artifact.is_empty());
    }
}
