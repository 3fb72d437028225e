use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{BoxId, MeasurementId, SpaceId, UserId};

/// User record as delivered by the identity provider. Read-only to the
/// application; the provider owns its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Fixed color palette for box annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxColor {
    Blue,
    Green,
    Orange,
    Purple,
    Red,
    Teal,
}

impl BoxColor {
    pub const ALL: [BoxColor; 6] = [
        BoxColor::Blue,
        BoxColor::Green,
        BoxColor::Orange,
        BoxColor::Purple,
        BoxColor::Red,
        BoxColor::Teal,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BoxColor::Blue => "blue",
            BoxColor::Green => "green",
            BoxColor::Orange => "orange",
            BoxColor::Purple => "purple",
            BoxColor::Red => "red",
            BoxColor::Teal => "teal",
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("unknown box color {0:?}")]
pub struct ParseBoxColorError(pub String);

impl FromStr for BoxColor {
    type Err = ParseBoxColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoxColor::ALL
            .into_iter()
            .find(|color| color.as_str() == s)
            .ok_or_else(|| ParseBoxColorError(s.to_owned()))
    }
}

/// Real-world cuboid dimensions in centimeters. Zero means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl Dimensions {
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.width > 0.0 || self.height > 0.0 || self.depth > 0.0
    }
}

/// On-screen rectangle for positioning a box over the photo, in fractions of
/// the rendered image (0.0..=1.0 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Photo reference for a measurement. Exactly one representation is
/// authoritative: either the inline-encoded image captured on device or the
/// durable URL returned by the image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhotoRef {
    Hosted { url: String },
    Inline { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Box3D {
    pub id: BoxId,
    pub dimensions: Dimensions,
    pub label: String,
    pub color: BoxColor,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: MeasurementId,
    pub name: String,
    pub photo: PhotoRef,
    pub boxes: Vec<Box3D>,
    #[serde(with = "crate::time::millis")]
    pub created_at: SystemTime,
    #[serde(with = "crate::time::millis")]
    pub updated_at: SystemTime,
}

/// A space document: one user-defined room, with measurements and their boxes
/// denormalized into the document itself. `revision` is stamped by the store
/// on every write and guards against lost updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: SpaceId,
    pub owner: UserId,
    pub name: String,
    pub icon: String,
    pub measurements: Vec<Measurement>,
    #[serde(with = "crate::time::millis")]
    pub created_at: SystemTime,
    #[serde(with = "crate::time::millis")]
    pub updated_at: SystemTime,
    pub revision: i64,
}

// ---------------------------------------------------------------------------
// Draft inputs and partial updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub name: String,
    pub photo: PhotoRef,
    pub boxes: Vec<Box3D>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBox {
    pub dimensions: Dimensions,
    pub label: String,
    pub color: BoxColor,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeasurementPatch {
    pub name: Option<String>,
    pub photo: Option<PhotoRef>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoxPatch {
    pub dimensions: Option<Dimensions>,
    pub label: Option<String>,
    pub color: Option<BoxColor>,
    pub placement: Option<Placement>,
}

// ---------------------------------------------------------------------------
// Nested rewrites
//
// Measurements and boxes are embedded arrays of the space document, so every
// nested edit produces a full replacement subtree: copy the space, rebuild the
// affected arrays, refresh `updated_at` on the touched measurement and on the
// space. Nothing is mutated in place; callers replace their copy wholesale.
// ---------------------------------------------------------------------------

impl Space {
    #[must_use]
    pub fn measurement(&self, id: MeasurementId) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.id == id)
    }

    /// Merge a rename and/or icon change, refreshing `updated_at`. An empty
    /// patch still refreshes the timestamp.
    #[must_use]
    pub fn with_fields(&self, name: Option<&str>, icon: Option<&str>, now: SystemTime) -> Space {
        let mut next = self.clone();
        if let Some(name) = name {
            next.name = name.to_owned();
        }
        if let Some(icon) = icon {
            next.icon = icon.to_owned();
        }
        next.updated_at = now;
        next
    }

    /// Append a measurement with a generated id and fresh timestamps.
    #[must_use]
    pub fn with_measurement_added(
        &self,
        draft: NewMeasurement,
        now: SystemTime,
    ) -> (Space, MeasurementId) {
        let measurement = Measurement {
            id: MeasurementId::new(),
            name: draft.name,
            photo: draft.photo,
            boxes: draft.boxes,
            created_at: now,
            updated_at: now,
        };
        let id = measurement.id;

        let mut next = self.clone();
        next.measurements.push(measurement);
        next.updated_at = now;
        (next, id)
    }

    /// Returns `None` when the measurement does not exist.
    #[must_use]
    pub fn with_measurement_updated(
        &self,
        id: MeasurementId,
        patch: &MeasurementPatch,
        now: SystemTime,
    ) -> Option<Space> {
        self.measurement(id)?;
        let mut next = self.clone();
        next.measurements = self
            .measurements
            .iter()
            .map(|m| {
                if m.id != id {
                    return m.clone();
                }
                let mut updated = m.clone();
                if let Some(name) = &patch.name {
                    updated.name = name.clone();
                }
                if let Some(photo) = &patch.photo {
                    updated.photo = photo.clone();
                }
                updated.updated_at = now;
                updated
            })
            .collect();
        next.updated_at = now;
        Some(next)
    }

    #[must_use]
    pub fn with_measurement_removed(&self, id: MeasurementId, now: SystemTime) -> Option<Space> {
        self.measurement(id)?;
        let mut next = self.clone();
        next.measurements.retain(|m| m.id != id);
        next.updated_at = now;
        Some(next)
    }

    /// Append a box with a generated id to the given measurement. The parent
    /// measurement and the space both get refreshed timestamps; boxes carry
    /// none of their own.
    #[must_use]
    pub fn with_box_added(
        &self,
        measurement_id: MeasurementId,
        draft: NewBox,
        now: SystemTime,
    ) -> Option<(Space, BoxId)> {
        self.measurement(measurement_id)?;
        let new_box = Box3D {
            id: BoxId::new(),
            dimensions: draft.dimensions,
            label: draft.label,
            color: draft.color,
            placement: draft.placement,
        };
        let box_id = new_box.id;

        let mut next = self.clone();
        next.measurements = self
            .measurements
            .iter()
            .map(|m| {
                if m.id != measurement_id {
                    return m.clone();
                }
                let mut updated = m.clone();
                updated.boxes.push(new_box.clone());
                updated.updated_at = now;
                updated
            })
            .collect();
        next.updated_at = now;
        Some((next, box_id))
    }

    #[must_use]
    pub fn with_box_updated(
        &self,
        measurement_id: MeasurementId,
        box_id: BoxId,
        patch: &BoxPatch,
        now: SystemTime,
    ) -> Option<Space> {
        let measurement = self.measurement(measurement_id)?;
        measurement.boxes.iter().find(|b| b.id == box_id)?;

        let mut next = self.clone();
        next.measurements = self
            .measurements
            .iter()
            .map(|m| {
                if m.id != measurement_id {
                    return m.clone();
                }
                let mut updated = m.clone();
                updated.boxes = m
                    .boxes
                    .iter()
                    .map(|b| {
                        if b.id != box_id {
                            return b.clone();
                        }
                        let mut patched = b.clone();
                        if let Some(dimensions) = patch.dimensions {
                            patched.dimensions = dimensions;
                        }
                        if let Some(label) = &patch.label {
                            patched.label = label.clone();
                        }
                        if let Some(color) = patch.color {
                            patched.color = color;
                        }
                        if let Some(placement) = patch.placement {
                            patched.placement = placement;
                        }
                        patched
                    })
                    .collect();
                updated.updated_at = now;
                updated
            })
            .collect();
        next.updated_at = now;
        Some(next)
    }

    #[must_use]
    pub fn with_box_removed(
        &self,
        measurement_id: MeasurementId,
        box_id: BoxId,
        now: SystemTime,
    ) -> Option<Space> {
        let measurement = self.measurement(measurement_id)?;
        measurement.boxes.iter().find(|b| b.id == box_id)?;

        let mut next = self.clone();
        next.measurements = self
            .measurements
            .iter()
            .map(|m| {
                if m.id != measurement_id {
                    return m.clone();
                }
                let mut updated = m.clone();
                updated.boxes.retain(|b| b.id != box_id);
                updated.updated_at = now;
                updated
            })
            .collect();
        next.updated_at = now;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn sample_space() -> Space {
        let t0 = UNIX_EPOCH + Duration::from_millis(1_000);
        Space {
            id: SpaceId::new(),
            owner: UserId::new(),
            name: "Kitchen".to_owned(),
            icon: "🍳".to_owned(),
            measurements: Vec::new(),
            created_at: t0,
            updated_at: t0,
            revision: 1,
        }
    }

    fn sample_measurement_draft() -> NewMeasurement {
        NewMeasurement {
            name: "Wall A".to_owned(),
            photo: PhotoRef::Hosted {
                url: "https://images.example/wall-a.jpg".to_owned(),
            },
            boxes: Vec::new(),
        }
    }

    fn sample_box_draft() -> NewBox {
        NewBox {
            dimensions: Dimensions {
                width: 10.0,
                height: 20.0,
                depth: 5.0,
            },
            label: "Sofa".to_owned(),
            color: BoxColor::Blue,
            placement: Placement::default(),
        }
    }

    #[test]
    fn box_color_parse_round_trip() {
        for color in BoxColor::ALL {
            assert_eq!(BoxColor::from_str(color.as_str()).expect("parse"), color);
        }
        assert!(BoxColor::from_str("magenta").is_err());
    }

    #[test]
    fn with_fields_empty_patch_refreshes_only_updated_at() {
        let space = sample_space();
        let now = space.updated_at + Duration::from_secs(60);
        let next = space.with_fields(None, None, now);

        assert_eq!(next.updated_at, now);
        assert_eq!(next.name, space.name);
        assert_eq!(next.icon, space.icon);
        assert_eq!(next.measurements, space.measurements);
        assert_eq!(next.created_at, space.created_at);
        assert_eq!(next.id, space.id);
    }

    #[test]
    fn with_measurement_added_generates_id_and_bubbles_timestamp() {
        let space = sample_space();
        let now = space.updated_at + Duration::from_secs(5);
        let (next, id) = space.with_measurement_added(sample_measurement_draft(), now);

        assert_eq!(next.measurements.len(), 1);
        let m = next.measurement(id).expect("added measurement");
        assert_eq!(m.name, "Wall A");
        assert_eq!(m.created_at, now);
        assert_eq!(next.updated_at, now);
        // Original untouched.
        assert!(space.measurements.is_empty());
    }

    #[test]
    fn with_measurement_updated_missing_returns_none() {
        let space = sample_space();
        let patch = MeasurementPatch {
            name: Some("Wall B".to_owned()),
            photo: None,
        };
        assert!(space
            .with_measurement_updated(MeasurementId::new(), &patch, space.updated_at)
            .is_none());
    }

    #[test]
    fn with_box_added_then_updated_preserves_untouched_fields() {
        let space = sample_space();
        let now = space.updated_at + Duration::from_secs(1);
        let (space, m_id) = space.with_measurement_added(sample_measurement_draft(), now);
        let (space, box_id) = space
            .with_box_added(m_id, sample_box_draft(), now)
            .expect("add box");

        let later = now + Duration::from_secs(2);
        let patch = BoxPatch {
            label: Some("Armchair".to_owned()),
            ..BoxPatch::default()
        };
        let space = space
            .with_box_updated(m_id, box_id, &patch, later)
            .expect("update box");

        let boxes = &space.measurement(m_id).expect("measurement").boxes;
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].id, box_id);
        assert_eq!(boxes[0].label, "Armchair");
        assert_eq!(boxes[0].color, BoxColor::Blue);
        assert_eq!(boxes[0].dimensions.width, 10.0);
        assert_eq!(boxes[0].dimensions.depth, 5.0);
        assert_eq!(space.updated_at, later);
    }

    #[test]
    fn with_box_removed_only_touches_target_measurement() {
        let space = sample_space();
        let now = space.updated_at;
        let (space, m_a) = space.with_measurement_added(sample_measurement_draft(), now);
        let (space, m_b) = space.with_measurement_added(sample_measurement_draft(), now);
        let (space, box_a) = space
            .with_box_added(m_a, sample_box_draft(), now)
            .expect("box in a");
        let (space, _box_b) = space
            .with_box_added(m_b, sample_box_draft(), now)
            .expect("box in b");

        let later = now + Duration::from_secs(9);
        let space = space
            .with_box_removed(m_a, box_a, later)
            .expect("remove box");

        assert!(space.measurement(m_a).expect("a").boxes.is_empty());
        assert_eq!(space.measurement(m_b).expect("b").boxes.len(), 1);
        assert_eq!(space.measurement(m_a).expect("a").updated_at, later);
        assert_eq!(space.measurement(m_b).expect("b").updated_at, now);
    }

    #[test]
    fn with_box_updated_missing_box_returns_none() {
        let space = sample_space();
        let now = space.updated_at;
        let (space, m_id) = space.with_measurement_added(sample_measurement_draft(), now);
        assert!(space
            .with_box_updated(m_id, BoxId::new(), &BoxPatch::default(), now)
            .is_none());
    }

    #[test]
    fn timestamp_ordering_invariant_holds_after_edits() {
        let space = sample_space();
        let t1 = space.updated_at + Duration::from_secs(1);
        let (space, m_id) = space.with_measurement_added(sample_measurement_draft(), t1);
        let t2 = t1 + Duration::from_secs(1);
        let space = space
            .with_box_added(m_id, sample_box_draft(), t2)
            .expect("add box")
            .0;

        let measurement = space.measurement(m_id).expect("measurement");
        assert!(space.updated_at >= measurement.updated_at);
        assert!(measurement.updated_at >= measurement.created_at);
    }

    #[test]
    fn space_json_uses_camel_case_and_millis() {
        let space = sample_space();
        let json = serde_json::to_value(&space).expect("encode");
        assert_eq!(json["createdAt"], serde_json::json!(1_000));
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("revision").is_some());

        let decoded: Space = serde_json::from_value(json).expect("decode");
        assert_eq!(decoded, space);
    }

    #[test]
    fn photo_ref_untagged_round_trip() {
        let hosted = PhotoRef::Hosted {
            url: "https://images.example/a.jpg".to_owned(),
        };
        let inline = PhotoRef::Inline {
            data: "data:image/jpeg;base64,/9j/4AAQ".to_owned(),
        };
        for photo in [hosted, inline] {
            let json = serde_json::to_string(&photo).expect("encode");
            let decoded: PhotoRef = serde_json::from_str(&json).expect("decode");
            assert_eq!(decoded, photo);
        }
    }
}
