use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box area in pixels (width × height).
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Face embedding vector (512-dimensional for ArcFace), L2-normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// A face found by the analysis model: where it is, and who it is.
#[derive(Debug, Clone)]
pub struct Face {
    pub bbox: BoundingBox,
    pub embedding: Option<Embedding>,
}

impl Face {
    pub fn landmarks(&self) -> Option<&[(f32, f32); 5]> {
        self.bbox.landmarks.as_ref()
    }
}

/// Pick the face with the largest bounding-box area.
///
/// Equal areas resolve to the later face, matching the last element of a
/// stable ascending sort by area. `None` for an empty slice.
pub fn select_largest(faces: &[Face]) -> Option<&Face> {
    faces.iter().max_by(|a, b| {
        a.bbox
            .area()
            .partial_cmp(&b.bbox.area())
            .unwrap_or(Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, w: f32, h: f32) -> Face {
        Face {
            bbox: BoundingBox {
                x, y: 0.0, width: w, height: h, confidence: 0.9, landmarks: None,
            },
            embedding: None,
        }
    }

    #[test]
    fn test_area() {
        let f = face(0.0, 20.0, 30.0);
        assert!((f.bbox.area() - 600.0).abs() < 1e-6);
    }

    #[test]
    fn test_select_largest_distinct_areas() {
        let faces = vec![face(0.0, 10.0, 10.0), face(1.0, 50.0, 40.0), face(2.0, 30.0, 30.0)];
        let picked = select_largest(&faces).unwrap();
        assert_eq!(picked.bbox.x, 1.0);
    }

    #[test]
    fn test_select_largest_is_area_not_width() {
        // Widest box is not the largest one.
        let faces = vec![face(0.0, 100.0, 5.0), face(1.0, 40.0, 40.0)];
        assert_eq!(select_largest(&faces).unwrap().bbox.x, 1.0);
    }

    #[test]
    fn test_select_largest_tie_takes_last() {
        let faces = vec![face(0.0, 20.0, 20.0), face(1.0, 10.0, 40.0), face(2.0, 5.0, 5.0)];
        assert_eq!(select_largest(&faces).unwrap().bbox.x, 1.0);
    }

    #[test]
    fn test_face_accessors() {
        let mut f = face(0.0, 10.0, 10.0);
        assert!(f.landmarks().is_none());
        f.bbox.landmarks = Some([(1.0, 2.0); 5]);
        f.embedding = Some(Embedding { values: vec![1.0, 0.0] });
        assert_eq!(f.landmarks().unwrap()[4], (1.0, 2.0));
        assert_eq!(f.embedding.unwrap().values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_select_largest_empty() {
        assert!(select_largest(&[]).is_none());
    }
}
