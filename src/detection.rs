//! Sign detections as produced by the inference collaborator
//!
//! The ledger stores only a [`DetectionResult`]; the richer [`SignDetection`]
//! is what clients send and receive over the API. When no inference backend
//! is available a canned demo detection is used instead.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::blockchain::{BoundingBox, DetectionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDetection {
    pub sign_type: String,
    #[serde(serialize_with = "crate::crypto::serialize_number")]
    pub confidence: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl SignDetection {
    /// The subset that goes on the ledger.
    pub fn to_record(&self) -> DetectionResult {
        DetectionResult {
            sign_type: self.sign_type.clone(),
            confidence: self.confidence,
            bounding_box: self.bounding_box,
            description: self.description.clone(),
        }
    }
}

fn demo(
    sign_type: &str,
    confidence: f64,
    description: &str,
    color: &str,
    shape: &str,
    text: &str,
    (x, y, width, height): (f64, f64, f64, f64),
) -> SignDetection {
    SignDetection {
        sign_type: sign_type.to_string(),
        confidence,
        description: description.to_string(),
        color: Some(color.to_string()),
        shape: Some(shape.to_string()),
        text: Some(text.to_string()),
        bounding_box: Some(BoundingBox { x, y, width, height }),
    }
}

pub fn demo_detections() -> Vec<SignDetection> {
    vec![
        demo(
            "STOP",
            0.94,
            "Red octagonal stop sign requiring vehicles to come to a complete stop",
            "Red",
            "Octagon",
            "STOP",
            (120.0, 80.0, 200.0, 200.0),
        ),
        demo(
            "SPEED_LIMIT",
            0.89,
            "Speed limit sign indicating maximum speed of 50 km/h",
            "White with red border",
            "Circle",
            "50",
            (150.0, 100.0, 180.0, 180.0),
        ),
        demo(
            "YIELD",
            0.91,
            "Yellow triangular yield sign indicating drivers must give way",
            "Yellow",
            "Triangle",
            "YIELD",
            (100.0, 90.0, 220.0, 190.0),
        ),
        demo(
            "NO_PARKING",
            0.87,
            "No parking sign with red circle and diagonal line",
            "Blue with red",
            "Circle",
            "P",
            (130.0, 110.0, 160.0, 160.0),
        ),
    ]
}

/// A random canned detection.
pub fn demo_detection() -> SignDetection {
    let mut detections = demo_detections();
    let index = rand::thread_rng().gen_range(0..detections.len());
    detections.swap_remove(index)
}
