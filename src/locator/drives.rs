//! Windows drive letter probe
//!
//! Enumerates `A:\` through `Z:\` in order. Labels come from the output of
//! `cmd /C vol X:`, which is only queried for drives that exist.

use super::{VolumeCandidate, VolumeProbe};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Probe over the 26 drive letters
#[derive(Debug, Clone, Default)]
pub struct DriveLetters;

impl DriveLetters {
    pub fn new() -> Self {
        Self
    }

    /// Drive identifiers in enumeration order
    pub fn letters() -> impl Iterator<Item = String> {
        (b'A'..=b'Z').map(|l| format!("{}:", l as char))
    }
}

impl VolumeProbe for DriveLetters {
    fn name(&self) -> &'static str {
        "drive-letters"
    }

    fn candidates(&self) -> Vec<VolumeCandidate> {
        Self::letters()
            .map(|drive| {
                let mut candidate =
                    VolumeCandidate::from_dir(drive.clone(), PathBuf::from(format!("{}\\", drive)));
                if candidate.accessible {
                    candidate.label = query_label(&drive);
                }
                candidate
            })
            .collect()
    }
}

/// Ask `vol` for a drive's label
fn query_label(drive: &str) -> Option<String> {
    let output = match Command::new("cmd").args(["/C", "vol", drive]).output() {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            debug!("vol {} exited with {}", drive, o.status);
            return None;
        }
        Err(e) => {
            debug!("vol not available: {}", e);
            return None;
        }
    };

    parse_vol_label(&String::from_utf8_lossy(&output.stdout))
}

/// Extract the label from `vol` output
///
/// ```text
///  Volume in drive D is config-2
///  Volume Serial Number is 1A2B-3C4D
/// ```
///
/// Unlabelled drives print "has no label" instead and yield `None`.
pub fn parse_vol_label(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Volume in drive ")?;
        let (_, label) = rest.split_once(" is ")?;
        let label = label.trim();
        (!label.is_empty()).then(|| label.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_in_order() {
        let letters: Vec<String> = DriveLetters::letters().collect();
        assert_eq!(letters.len(), 26);
        assert_eq!(letters[0], "A:");
        assert_eq!(letters[3], "D:");
        assert_eq!(letters[25], "Z:");
    }

    #[test]
    fn test_parse_vol_label() {
        let output = " Volume in drive D is config-2\r\n Volume Serial Number is 1A2B-3C4D\r\n";
        assert_eq!(parse_vol_label(output), Some("config-2".to_string()));
    }

    #[test]
    fn test_parse_vol_label_with_spaces() {
        let output = " Volume in drive E is My Data\r\n";
        assert_eq!(parse_vol_label(output), Some("My Data".to_string()));
    }

    #[test]
    fn test_parse_vol_no_label() {
        let output = " Volume in drive C has no label.\r\n Volume Serial Number is 0000-0001\r\n";
        assert_eq!(parse_vol_label(output), None);
    }
}
