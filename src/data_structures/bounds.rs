use cgmath::{InnerSpace, Matrix4, Point3, Transform, Vector3};

/// Axis-aligned bounding box. An empty box has `min > max` on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Point3<f32>>>(points: I) -> Self {
        let mut aabb = Self::empty();
        points.into_iter().for_each(|p| aabb.expand_by_point(p));
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn expand_by_point(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.expand_by_point(other.min);
        self.expand_by_point(other.max);
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    /// Length of the box diagonal, `0.0` for empty boxes.
    pub fn diagonal(&self) -> f32 {
        self.size().magnitude()
    }

    pub fn center(&self) -> Point3<f32> {
        if self.is_empty() {
            return Point3::new(0.0, 0.0, 0.0);
        }
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Box enclosing the eight transformed corners of `self`.
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let (lo, hi) = (self.min, self.max);
        Aabb::from_points(
            [
                Point3::new(lo.x, lo.y, lo.z),
                Point3::new(lo.x, lo.y, hi.z),
                Point3::new(lo.x, hi.y, lo.z),
                Point3::new(lo.x, hi.y, hi.z),
                Point3::new(hi.x, lo.y, lo.z),
                Point3::new(hi.x, lo.y, hi.z),
                Point3::new(hi.x, hi.y, lo.z),
                Point3::new(hi.x, hi.y, hi.z),
            ]
            .into_iter()
            .map(|corner| transform.transform_point(corner)),
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::instance::Instance;

    #[test]
    fn empty_box_has_zero_diagonal() {
        let aabb = Aabb::empty();
        assert!(aabb.is_empty());
        assert_eq!(aabb.diagonal(), 0.0);
    }

    #[test]
    fn union_ignores_empty() {
        let mut aabb = Aabb::from_points([Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 2.0, 0.0)]);
        aabb.union(&Aabb::empty());
        assert_eq!(aabb.center(), Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn transformed_box_follows_scale_and_translation() {
        let aabb = Aabb::from_points([Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        let transform = Instance {
            position: [0.0, 3.0, 0.0].into(),
            scale: [2.0; 3].into(),
            ..Default::default()
        };
        let moved = aabb.transformed(&transform.to_matrix());
        assert_eq!(moved.min, Point3::new(-2.0, 1.0, -2.0));
        assert_eq!(moved.max, Point3::new(2.0, 5.0, 2.0));
    }
}
