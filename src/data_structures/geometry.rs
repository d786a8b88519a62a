//! CPU-side vertex data with its GPU handle.
//!
//! A [`Geometry`] holds positions, normals, optional vertex colours and an
//! optional index list. The backend uploads it on first draw and keys the GPU
//! buffers by the geometry's [`ResourceId`].

use std::{collections::HashSet, ops::Range, rc::Rc};

use cgmath::{InnerSpace, Point3, Vector3};

use crate::data_structures::{
    bounds::Aabb,
    handle::{GpuHandle, ResourceId, ResourceKind, ResourceTracker},
};

/// A range of elements drawn with the material at `material_index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeometryGroup {
    pub elements: Range<u32>,
    pub material_index: usize,
}

#[derive(Debug)]
pub struct Geometry {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    colors: Option<Vec<[f32; 3]>>,
    indices: Option<Vec<u32>>,
    groups: Vec<GeometryGroup>,
    handle: GpuHandle,
}

impl Geometry {
    pub fn new(
        tracker: &Rc<ResourceTracker>,
        label: &str,
        positions: Vec<[f32; 3]>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        Self {
            normals: vec![[0.0; 3]; positions.len()],
            positions,
            colors: None,
            indices,
            groups: Vec::new(),
            handle: tracker.allocate(ResourceKind::Geometry, label),
        }
    }

    /// Uses the given normals; missing or mismatched normals are zeroed.
    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        if normals.len() == self.positions.len() {
            self.normals = normals;
        } else {
            log::warn!(
                "geometry {} has {} normals for {} positions, ignoring them",
                self.handle.label(),
                normals.len(),
                self.positions.len()
            );
        }
        self
    }

    pub fn with_colors(mut self, colors: Vec<[f32; 3]>) -> Self {
        if colors.len() == self.positions.len() {
            self.colors = Some(colors);
        }
        self
    }

    /// Splits the draw into per-material element ranges.
    pub fn with_groups(mut self, groups: Vec<GeometryGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    pub fn handle(&self) -> &GpuHandle {
        &self.handle
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn colors(&self) -> Option<&[[f32; 3]]> {
        self.colors.as_deref()
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Material groups; a geometry without groups is drawn in one piece with material 0.
    pub fn groups(&self) -> Vec<GeometryGroup> {
        if self.groups.is_empty() {
            vec![GeometryGroup {
                elements: 0..self.element_count() as u32,
                material_index: 0,
            }]
        } else {
            self.groups.clone()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of elements a draw call covers: indices if present, vertices otherwise.
    pub fn element_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.positions.len(), |indices| indices.len())
    }

    pub fn triangle_count(&self) -> usize {
        self.element_count() / 3
    }

    fn triangles(&self) -> Vec<[usize; 3]> {
        match &self.indices {
            Some(indices) => indices
                .chunks_exact(3)
                .map(|c| [c[0] as usize, c[1] as usize, c[2] as usize])
                .filter(|t| t.iter().all(|&i| i < self.positions.len()))
                .collect(),
            None => (0..self.positions.len() / 3)
                .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
        }
    }

    /// Recomputes smooth per-vertex normals from the triangle faces.
    ///
    /// Face normals are accumulated unnormalized, so larger faces weigh more.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for [a, b, c] in self.triangles() {
            let (pa, pb, pc): (Vector3<f32>, Vector3<f32>, Vector3<f32>) = (
                self.positions[a].into(),
                self.positions[b].into(),
                self.positions[c].into(),
            );
            let face = (pc - pb).cross(pa - pb);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                let length = n.magnitude();
                if length > f32::EPSILON {
                    (n / length).into()
                } else {
                    [0.0; 3]
                }
            })
            .collect();
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().map(|&p| Point3::from(p)))
    }

    /// Line-list positions of the triangle edges.
    ///
    /// Indexed geometry shares edges between adjacent triangles, so each edge is
    /// emitted once. Non-indexed geometry emits the three edges of every triangle.
    pub fn wireframe_positions(&self) -> Vec<[f32; 3]> {
        let mut lines = Vec::new();
        match &self.indices {
            Some(_) => {
                let mut seen = HashSet::new();
                for [a, b, c] in self.triangles() {
                    for (from, to) in [(a, b), (b, c), (c, a)] {
                        let key = (from.min(to), from.max(to));
                        if seen.insert(key) {
                            lines.push(self.positions[from]);
                            lines.push(self.positions[to]);
                        }
                    }
                }
            }
            None => {
                for [a, b, c] in self.triangles() {
                    for (from, to) in [(a, b), (b, c), (c, a)] {
                        lines.push(self.positions[from]);
                        lines.push(self.positions[to]);
                    }
                }
            }
        }
        lines
    }
}

/// Unit cube centred on the origin: 24 vertices, 36 indices (12 triangles).
pub fn cube_positions_and_indices(half_extent: f32) -> (Vec<[f32; 3]>, Vec<u32>) {
    let h = half_extent;
    let faces: [[[f32; 3]; 4]; 6] = [
        [[h, -h, -h], [h, h, -h], [h, h, h], [h, -h, h]],
        [[-h, -h, h], [-h, h, h], [-h, h, -h], [-h, -h, -h]],
        [[-h, h, -h], [-h, h, h], [h, h, h], [h, h, -h]],
        [[-h, -h, h], [-h, -h, -h], [h, -h, -h], [h, -h, h]],
        [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]],
        [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]],
    ];
    let positions = faces.iter().flatten().copied().collect();
    let indices = (0..6u32)
        .flat_map(|f| {
            let base = f * 4;
            [base, base + 1, base + 2, base, base + 2, base + 3]
        })
        .collect();
    (positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(tracker: &Rc<ResourceTracker>) -> Geometry {
        let (positions, indices) = cube_positions_and_indices(0.5);
        Geometry::new(tracker, "cube", positions, Some(indices))
    }

    #[test]
    fn counts_indexed_and_unindexed_triangles() {
        let tracker = ResourceTracker::new();
        assert_eq!(cube(&tracker).triangle_count(), 12);

        let soup = Geometry::new(&tracker, "soup", vec![[0.0; 3]; 9], None);
        assert_eq!(soup.triangle_count(), 3);
    }

    #[test]
    fn cube_normals_point_outwards() {
        let tracker = ResourceTracker::new();
        let mut geometry = cube(&tracker);
        geometry.compute_vertex_normals();
        for (p, n) in geometry.positions().iter().zip(geometry.normals()) {
            let p: Vector3<f32> = (*p).into();
            let n: Vector3<f32> = (*n).into();
            assert!((n.magnitude() - 1.0).abs() < 1e-5);
            assert!(p.dot(n) > 0.0, "normal {:?} at {:?} points inwards", n, p);
        }
    }

    #[test]
    fn indexed_wireframe_deduplicates_shared_edges() {
        let tracker = ResourceTracker::new();
        // faces don't share vertices: four sides plus the diagonal per face
        assert_eq!(cube(&tracker).wireframe_positions().len(), 6 * 5 * 2);
    }

    #[test]
    fn unindexed_wireframe_keeps_every_edge() {
        let tracker = ResourceTracker::new();
        let quad = Geometry::new(
            &tracker,
            "quad",
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            None,
        );
        assert_eq!(quad.wireframe_positions().len(), 6 * 2);
    }

    #[test]
    fn empty_geometry_has_empty_bounds() {
        let tracker = ResourceTracker::new();
        let geometry = Geometry::new(&tracker, "empty", Vec::new(), None);
        assert!(geometry.bounding_box().is_empty());
        assert!(geometry.wireframe_positions().is_empty());
    }
}
