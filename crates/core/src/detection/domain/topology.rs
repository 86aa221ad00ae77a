//! Landmark connection tables used to draw the face mesh.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::geometry::domain::point::NormalizedPoint;
use crate::shared::constants::MESH_LANDMARKS;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read topology file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid topology JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Index pairs into a face's landmark list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    connections: Vec<(usize, usize)>,
}

const FACE_OVAL: [usize; 36] = [
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

const LIPS_LOWER: [usize; 11] = [61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291];
const LIPS_UPPER: [usize; 11] = [61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291];

const LEFT_EYE: [(usize, usize); 16] = [
    (263, 249),
    (249, 390),
    (390, 373),
    (373, 374),
    (374, 380),
    (380, 381),
    (381, 382),
    (382, 362),
    (263, 466),
    (466, 388),
    (388, 387),
    (387, 386),
    (386, 385),
    (385, 384),
    (384, 398),
    (398, 362),
];

const RIGHT_EYE: [(usize, usize); 16] = [
    (33, 7),
    (7, 163),
    (163, 144),
    (144, 145),
    (145, 153),
    (153, 154),
    (154, 155),
    (155, 133),
    (33, 246),
    (246, 161),
    (161, 160),
    (160, 159),
    (159, 158),
    (158, 157),
    (157, 173),
    (173, 133),
];

impl Topology {
    pub fn new(connections: Vec<(usize, usize)>) -> Self {
        Self { connections }
    }

    /// Face oval, lips and eye contours of the 468-point mesh.
    pub fn contours() -> Self {
        let mut connections = Vec::new();
        connections.extend(closed_path(&FACE_OVAL));
        connections.extend(open_path(&LIPS_LOWER));
        connections.extend(open_path(&LIPS_UPPER));
        connections.extend_from_slice(&LEFT_EYE);
        connections.extend_from_slice(&RIGHT_EYE);
        Self { connections }
    }

    /// Parses `[[a, b], ...]`.
    pub fn from_json_str(json: &str) -> Result<Self, TopologyError> {
        let pairs: Vec<[usize; 2]> = serde_json::from_str(json)?;
        Ok(Self::new(pairs.into_iter().map(|[a, b]| (a, b)).collect()))
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let json = std::fs::read_to_string(path).map_err(|source| TopologyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn connections(&self) -> &[(usize, usize)] {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Highest landmark index referenced, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.connections.iter().map(|&(a, b)| a.max(b)).max()
    }

    /// Delaunay triangulation of `points` as an edge list (Bowyer-Watson).
    ///
    /// Edges are `(low, high)` index pairs, sorted. Repeated coordinates keep
    /// their first index only. Fewer than three distinct points give an
    /// empty table.
    pub fn tessellate(points: &[NormalizedPoint]) -> Self {
        let mut seen = HashSet::new();
        let distinct: Vec<usize> = (0..points.len())
            .filter(|&i| {
                let p = points[i];
                p.x.is_finite() && p.y.is_finite() && seen.insert((p.x.to_bits(), p.y.to_bits()))
            })
            .collect();
        if distinct.len() < 3 {
            return Self::default();
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &i in &distinct {
            min_x = min_x.min(points[i].x);
            min_y = min_y.min(points[i].y);
            max_x = max_x.max(points[i].x);
            max_y = max_y.max(points[i].y);
        }
        let span = (max_x - min_x).max(max_y - min_y).max(1e-9);
        let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

        // Super triangle vertices live past the end of `points`.
        let n = points.len();
        let mut vertices: Vec<NormalizedPoint> = points.to_vec();
        vertices.push(NormalizedPoint::new(mid_x - 20.0 * span, mid_y - span));
        vertices.push(NormalizedPoint::new(mid_x, mid_y + 20.0 * span));
        vertices.push(NormalizedPoint::new(mid_x + 20.0 * span, mid_y - span));

        let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &vertices)];
        for &i in &distinct {
            let p = vertices[i];
            let (bad, good): (Vec<Triangle>, Vec<Triangle>) =
                triangles.into_iter().partition(|t| t.circumcircle_contains(p));

            let mut edge_counts: Vec<((usize, usize), usize)> = Vec::new();
            for t in &bad {
                for edge in t.edges() {
                    match edge_counts.iter_mut().find(|(e, _)| *e == edge) {
                        Some((_, count)) => *count += 1,
                        None => edge_counts.push((edge, 1)),
                    }
                }
            }

            triangles = good;
            for ((a, b), count) in edge_counts {
                if count == 1 {
                    triangles.push(Triangle::new([a, b, i], &vertices));
                }
            }
        }

        let connections: BTreeSet<(usize, usize)> = triangles
            .iter()
            .filter(|t| t.vertices.iter().all(|&v| v < n))
            .flat_map(Triangle::edges)
            .collect();
        Self::new(connections.into_iter().collect())
    }
}

struct Triangle {
    vertices: [usize; 3],
    center: (f64, f64),
    radius_sq: f64,
}

impl Triangle {
    fn new(vertices: [usize; 3], points: &[NormalizedPoint]) -> Self {
        let [a, b, c] = vertices.map(|v| points[v]);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < 1e-18 {
            // Collinear: replaced by the next insertion.
            return Self {
                vertices,
                center: (0.0, 0.0),
                radius_sq: f64::INFINITY,
            };
        }
        let (a2, b2, c2) = (
            a.x * a.x + a.y * a.y,
            b.x * b.x + b.y * b.y,
            c.x * c.x + c.y * c.y,
        );
        let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        Self {
            vertices,
            center: (ux, uy),
            radius_sq: (a.x - ux).powi(2) + (a.y - uy).powi(2),
        }
    }

    fn circumcircle_contains(&self, p: NormalizedPoint) -> bool {
        let (dx, dy) = (p.x - self.center.0, p.y - self.center.1);
        dx * dx + dy * dy < self.radius_sq
    }

    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.vertices;
        [(a.min(b), a.max(b)), (b.min(c), b.max(c)), (a.min(c), a.max(c))]
    }
}

fn open_path(indices: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    indices.windows(2).map(|w| (w[0], w[1]))
}

fn closed_path(indices: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let closing = match (indices.last(), indices.first()) {
        (Some(&last), Some(&first)) if indices.len() > 2 => Some((last, first)),
        _ => None,
    };
    open_path(indices).chain(closing)
}

/// Where a detector's connection table comes from.
#[derive(Clone, Debug)]
pub enum TopologySource {
    /// No table; the overlay draws points only.
    PointsOnly,
    /// A fixed table (built-in contours or a loaded file).
    Fixed(Arc<Topology>),
    /// Tessellation of the first face's mesh points, reused for every later
    /// face so the wireframe stays stable.
    Tessellated(Option<Arc<Topology>>),
}

impl TopologySource {
    pub fn fixed(topology: Topology) -> Self {
        Self::Fixed(Arc::new(topology))
    }

    pub fn tessellated() -> Self {
        Self::Tessellated(None)
    }

    /// Table to attach to a result carrying `face`.
    pub fn for_face(&mut self, face: &[NormalizedPoint]) -> Option<Arc<Topology>> {
        match self {
            Self::PointsOnly => None,
            Self::Fixed(topology) => Some(Arc::clone(topology)),
            Self::Tessellated(Some(topology)) => Some(Arc::clone(topology)),
            Self::Tessellated(cached) => {
                if face.len() < 3 {
                    return None;
                }
                // Iris points of refined models stay out of the mesh.
                let mesh = &face[..face.len().min(MESH_LANDMARKS)];
                let topology = Arc::new(Topology::tessellate(mesh));
                log::debug!(
                    "Tessellated {} landmarks into {} connections",
                    mesh.len(),
                    topology.connections().len()
                );
                *cached = Some(Arc::clone(&topology));
                Some(topology)
            }
        }
    }
}
