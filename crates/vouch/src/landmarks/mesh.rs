//! Anchor extraction from a 468-point face mesh.

use super::{EyeLandmarks, FaceLandmarks, Point};

/// Points in a full face mesh
pub const MESH_POINT_COUNT: usize = 468;

/// Mesh indices for the anchors we read
mod idx {
    pub const NOSE_TIP: usize = 4;
    pub const LEFT_CHEEK: usize = 234;
    pub const RIGHT_CHEEK: usize = 454;
    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;

    pub const LEFT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const LEFT_EYE_TOP: usize = 159;
    pub const LEFT_EYE_BOTTOM: usize = 145;

    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const RIGHT_EYE_TOP: usize = 386;
    pub const RIGHT_EYE_BOTTOM: usize = 374;

    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const UPPER_LIP: usize = 0;
    pub const LOWER_LIP: usize = 17;
}

pub(super) fn anchors(points: &[[f32; 3]]) -> Option<FaceLandmarks> {
    if points.len() < MESH_POINT_COUNT {
        return None;
    }

    let p = |i: usize| Point::new(points[i][0], points[i][1]);

    Some(FaceLandmarks {
        nose_tip: p(idx::NOSE_TIP),
        left_cheek: p(idx::LEFT_CHEEK),
        right_cheek: p(idx::RIGHT_CHEEK),
        forehead: p(idx::FOREHEAD),
        chin: p(idx::CHIN),
        left_eye: EyeLandmarks {
            outer: p(idx::LEFT_EYE_OUTER),
            inner: p(idx::LEFT_EYE_INNER),
            top: p(idx::LEFT_EYE_TOP),
            bottom: p(idx::LEFT_EYE_BOTTOM),
        },
        right_eye: EyeLandmarks {
            outer: p(idx::RIGHT_EYE_OUTER),
            inner: p(idx::RIGHT_EYE_INNER),
            top: p(idx::RIGHT_EYE_TOP),
            bottom: p(idx::RIGHT_EYE_BOTTOM),
        },
        mouth_left: p(idx::MOUTH_LEFT),
        mouth_right: p(idx::MOUTH_RIGHT),
        upper_lip: p(idx::UPPER_LIP),
        lower_lip: p(idx::LOWER_LIP),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_mesh_rejected() {
        let points = vec![[0.0f32; 3]; 100];
        assert!(FaceLandmarks::from_mesh(&points).is_none());
    }

    #[test]
    fn test_mesh_anchor_lookup() {
        let mut points = vec![[0.0f32; 3]; MESH_POINT_COUNT];
        points[idx::NOSE_TIP] = [0.51, 0.49, -0.02];
        points[idx::MOUTH_RIGHT] = [0.6, 0.7, 0.0];

        let face = FaceLandmarks::from_mesh(&points).unwrap();
        assert_eq!(face.nose_tip, Point::new(0.51, 0.49));
        assert_eq!(face.mouth_right, Point::new(0.6, 0.7));
    }
}
