//! Text parsing for `diskutil` output. Nothing outside this module looks at
//! raw command output; callers get [`DiskDetails`] and [`DiskId`] values.

use std::collections::BTreeMap;

use crate::error::UtilityError;
use crate::model::{DiskDetails, DiskId};

const DEV_PREFIX: &str = "/dev/";

const FILESYSTEM_FIELD: &str = "Type (Bundle)";
const MOUNTED_FIELD: &str = "Mounted";

/// Fields of the root volume that identify the boot media.
const SYSTEM_SIGNATURE_FIELDS: &[&str] = &[
    "Device Identifier",
    "Part of Whole",
    "APFS Physical Store",
];

/// Splits `key: value` rows into a map. Rows without a colon are ignored and
/// the first occurrence of a key wins.
pub fn parse_info_fields(output: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        fields
            .entry(key.to_string())
            .or_insert_with(|| value.trim().to_string());
    }
    fields
}

pub fn parse_disk_details(output: &str) -> DiskDetails {
    let fields = parse_info_fields(output);
    let filesystem = fields
        .get(FILESYSTEM_FIELD)
        .map(|value| value.to_lowercase())
        .filter(|value| !value.is_empty());
    let mounted = fields
        .get(MOUNTED_FIELD)
        .is_some_and(|value| value.eq_ignore_ascii_case("yes"));
    DiskDetails {
        filesystem,
        mounted,
    }
}

/// Whole-disk rows of `diskutil list`, e.g. `/dev/disk4 (external, physical):`.
pub fn parse_disk_list(output: &str) -> Vec<DiskId> {
    output
        .lines()
        .filter(|line| line.starts_with("/dev/disk"))
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| DiskId::new(token.trim_end_matches(':')))
        .collect()
}

/// Partitions backing the root volume, from `diskutil info /`.
pub fn parse_system_partitions(output: &str) -> Result<Vec<String>, UtilityError> {
    let fields = parse_info_fields(output);
    let partitions = SYSTEM_SIGNATURE_FIELDS
        .iter()
        .filter_map(|field| fields.get(*field))
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(normalize_device)
        .collect::<Vec<_>>();

    if partitions.is_empty() {
        return Err(UtilityError::MissingField(
            SYSTEM_SIGNATURE_FIELDS.join(" / "),
        ));
    }
    Ok(partitions)
}

fn normalize_device(value: &str) -> String {
    if value.starts_with(DEV_PREFIX) {
        value.to_string()
    } else {
        format!("{DEV_PREFIX}{value}")
    }
}
