//! Evidence capture records.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_watch_lot_models::{CaptureMetadata, Evidence};
use sha2::{Digest, Sha256};

/// Lot sections cycled through for generated captures.
const SECTIONS: &[&str] = &["A", "B", "C", "D"];

/// Hex-encoded SHA-256 over the fields that identify a capture.
#[must_use]
pub fn content_hash(
    lot_id: &str,
    captured_at: DateTime<Utc>,
    vehicle_count: u32,
    camera_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(lot_id.as_bytes());
    hasher.update(b"|");
    hasher.update(
        captured_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(vehicle_count.to_le_bytes());
    hasher.update(b"|");
    hasher.update(camera_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds the next evidence entry for a violation.
#[must_use]
pub fn capture(
    lot_id: &str,
    violation_id: &str,
    sequence: usize,
    captured_at: DateTime<Utc>,
    vehicle_count: u32,
    metadata: &CaptureMetadata,
) -> Evidence {
    Evidence {
        id: format!("ev-{violation_id}-{sequence}"),
        violation_id: violation_id.to_string(),
        captured_at,
        vehicle_count,
        content_hash: content_hash(lot_id, captured_at, vehicle_count, &metadata.camera_id),
        camera_id: metadata.camera_id.clone(),
        lot_section: metadata.lot_section.clone(),
    }
}

/// Camera metadata used when a reading arrives without any.
#[must_use]
pub fn fallback_metadata(camera_id: &str, sequence: usize) -> CaptureMetadata {
    CaptureMetadata {
        camera_id: camera_id.to_string(),
        lot_section: SECTIONS[sequence % SECTIONS.len()].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let a = content_hash("lot-001", at(), 130, "CAM-1");
        let b = content_hash("lot-001", at(), 130, "CAM-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_changes_with_count() {
        assert_ne!(
            content_hash("lot-001", at(), 130, "CAM-1"),
            content_hash("lot-001", at(), 131, "CAM-1")
        );
    }

    #[test]
    fn capture_ids_follow_sequence() {
        let meta = fallback_metadata("CAM-1", 5);
        assert_eq!(meta.lot_section, "B");
        let ev = capture("lot-001", "viol-009", 2, at(), 130, &meta);
        assert_eq!(ev.id, "ev-viol-009-2");
        assert_eq!(ev.violation_id, "viol-009");
        assert_eq!(ev.camera_id, "CAM-1");
    }
}
