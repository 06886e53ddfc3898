//! Reference data sets kept up to date by updater jobs
//!
//! Each data set describes the archive it is published as and an import
//! plan: which extracted files feed which table, and how they are
//! delimited.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UpdaterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSetKind {
    /// Geocoded National Address File
    Gnaf,
    /// RedBook vehicle data
    RedBook,
    /// Glass's Guide vehicle data
    GlassGuide,
}

impl DataSetKind {
    pub const ALL: [DataSetKind; 3] = [DataSetKind::Gnaf, DataSetKind::RedBook, DataSetKind::GlassGuide];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSetKind::Gnaf => "gnaf",
            DataSetKind::RedBook => "red_book",
            DataSetKind::GlassGuide => "glass_guide",
        }
    }

    pub fn definition(&self) -> &'static dyn DataSetDefinition {
        match self {
            DataSetKind::Gnaf => &GnafDataSet,
            DataSetKind::RedBook => &RedBookDataSet,
            DataSetKind::GlassGuide => &GlassGuideDataSet,
        }
    }
}

impl fmt::Display for DataSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSetKind {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalised.as_str() {
            "gnaf" => Ok(DataSetKind::Gnaf),
            "red_book" | "redbook" => Ok(DataSetKind::RedBook),
            "glass_guide" | "glassguide" | "glasses_guide" => Ok(DataSetKind::GlassGuide),
            _ => Err(UpdaterError::UnknownDataSet(s.to_string())),
        }
    }
}

/// One extracted file type and the table it is imported into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub table: &'static str,
    /// File name without extension (and without state prefix)
    pub stem: &'static str,
    /// Matched case-insensitively, including the leading separator
    pub suffix: &'static str,
    /// GNAF publishes one file per state, named `<STATE>_<STEM><SUFFIX>`
    pub state_prefixed: bool,
    pub delimiter: u8,
    pub has_header: bool,
}

impl ImportFile {
    pub fn matches(&self, file_name: &str) -> bool {
        let upper = file_name.to_ascii_uppercase();
        let suffix = self.suffix.to_ascii_uppercase();
        let Some(stem) = upper.strip_suffix(&suffix) else {
            return false;
        };
        let stem = if self.state_prefixed {
            match stem.split_once('_') {
                Some((_, rest)) => rest,
                None => return false,
            }
        } else {
            stem
        };
        stem == self.stem.to_ascii_uppercase()
    }
}

pub trait DataSetDefinition: Send + Sync {
    fn kind(&self) -> DataSetKind;

    /// Name the downloaded archive is saved under
    fn archive_name(&self) -> &'static str;

    fn import_plan(&self) -> Vec<ImportFile>;

    /// Plan entry for an extracted file, if it is imported at all
    fn plan_for(&self, file_name: &str) -> Option<ImportFile> {
        self.import_plan().into_iter().find(|f| f.matches(file_name))
    }
}

pub struct GnafDataSet;

impl DataSetDefinition for GnafDataSet {
    fn kind(&self) -> DataSetKind {
        DataSetKind::Gnaf
    }

    fn archive_name(&self) -> &'static str {
        "gnaf.zip"
    }

    fn import_plan(&self) -> Vec<ImportFile> {
        [
            ("gnaf_address_detail", "ADDRESS_DETAIL"),
            ("gnaf_locality", "LOCALITY"),
            ("gnaf_street_locality", "STREET_LOCALITY"),
            ("gnaf_state", "STATE"),
            ("gnaf_address_default_geocode", "ADDRESS_DEFAULT_GEOCODE"),
        ]
        .into_iter()
        .map(|(table, stem)| ImportFile {
            table,
            stem,
            suffix: "_psv.psv",
            state_prefixed: true,
            delimiter: b'|',
            has_header: true,
        })
        .collect()
    }
}

pub struct RedBookDataSet;

impl DataSetDefinition for RedBookDataSet {
    fn kind(&self) -> DataSetKind {
        DataSetKind::RedBook
    }

    fn archive_name(&self) -> &'static str {
        "redbook.zip"
    }

    fn import_plan(&self) -> Vec<ImportFile> {
        [
            ("redbook_vehicle", "VEHICLE"),
            ("redbook_make", "MAKE"),
            ("redbook_family", "FAMILY"),
        ]
        .into_iter()
        .map(|(table, stem)| ImportFile {
            table,
            stem,
            suffix: ".csv",
            state_prefixed: false,
            delimiter: b',',
            has_header: true,
        })
        .collect()
    }
}

pub struct GlassGuideDataSet;

impl DataSetDefinition for GlassGuideDataSet {
    fn kind(&self) -> DataSetKind {
        DataSetKind::GlassGuide
    }

    fn archive_name(&self) -> &'static str {
        "glassguide.zip"
    }

    fn import_plan(&self) -> Vec<ImportFile> {
        [
            ("glass_guide_passenger", "PASSENGER"),
            ("glass_guide_light_commercial", "LIGHT_COMMERCIAL"),
            ("glass_guide_motorcycle", "MOTORCYCLE"),
        ]
        .into_iter()
        .map(|(table, stem)| ImportFile {
            table,
            stem,
            suffix: ".txt",
            state_prefixed: false,
            delimiter: b'\t',
            has_header: true,
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gnaf_files_match_by_state_prefix() {
        let gnaf = DataSetKind::Gnaf.definition();

        let plan = gnaf.plan_for("NSW_STREET_LOCALITY_psv.psv").unwrap();
        assert_eq!(plan.table, "gnaf_street_locality");

        let plan = gnaf.plan_for("vic_locality_psv.psv").unwrap();
        assert_eq!(plan.table, "gnaf_locality");

        assert!(gnaf.plan_for("NSW_ADDRESS_ALIAS_psv.psv").is_none());
        assert!(gnaf.plan_for("Authority_Code_STATE_psv.txt").is_none());
    }

    #[test]
    fn test_vehicle_files() {
        let redbook = DataSetKind::RedBook.definition();
        assert_eq!(redbook.plan_for("vehicle.csv").unwrap().delimiter, b',');
        assert!(redbook.plan_for("vehicle.txt").is_none());

        let glass = DataSetKind::GlassGuide.definition();
        assert_eq!(glass.plan_for("LIGHT_COMMERCIAL.txt").unwrap().delimiter, b'\t');
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("GNAF".parse::<DataSetKind>().unwrap(), DataSetKind::Gnaf);
        assert_eq!("red-book".parse::<DataSetKind>().unwrap(), DataSetKind::RedBook);
        assert_eq!("glass_guide".parse::<DataSetKind>().unwrap(), DataSetKind::GlassGuide);
        assert!("nvic".parse::<DataSetKind>().is_err());
    }

    #[test]
    fn test_definitions_report_their_kind() {
        for kind in DataSetKind::ALL {
            assert_eq!(kind.definition().kind(), kind);
        }
    }
}
