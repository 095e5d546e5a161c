//! Slab layouts: how the z planes of a periodic grid are dealt to ranks.

use slabtrace_core::{FieldError, Rank};

/// Global grid dimensions in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridShape {
    /// Cells along x (fastest varying in memory).
    pub nx: usize,
    /// Cells along y.
    pub ny: usize,
    /// Cells along z, the slab axis (slowest varying).
    pub nz: usize,
}

impl GridShape {
    /// Shape with the given extents.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Total number of cells.
    pub fn cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Extents as `[nx, ny, nz]`.
    pub fn as_array(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }
}

/// The z-range of the grid held by one rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalSlab {
    /// Owning rank.
    pub rank: Rank,
    /// First global z plane.
    pub start: usize,
    /// Number of z planes.
    pub planes: usize,
}

impl LocalSlab {
    /// One past the last global z plane.
    pub fn end(&self) -> usize {
        self.start + self.planes
    }

    /// Whether global plane `z` belongs to this slab.
    pub fn contains_plane(&self, z: usize) -> bool {
        z >= self.start && z < self.end()
    }
}

/// Immutable description of a slab decomposition.
///
/// Samples are stored `[z][y][x][component]`, so every slab is one
/// contiguous run of a flattened global snapshot. The x and y axes carry
/// periodic flags; z is periodic by construction, which is how halo
/// neighbours wrap at the domain edges.
#[derive(Clone, Debug, PartialEq)]
pub struct SlabLayout {
    shape: GridShape,
    components: usize,
    periodic: [bool; 2],
    /// Prefix sums of per-rank plane counts, `ranks + 1` entries.
    starts: Vec<usize>,
    /// Owning rank of every global z plane.
    owners: Vec<Rank>,
}

impl SlabLayout {
    /// Deal `shape.nz` planes over `ranks` ranks as evenly as possible.
    ///
    /// The remainder goes one plane each to the lowest ranks.
    pub fn even(shape: GridShape, components: usize, ranks: usize) -> Result<Self, FieldError> {
        if ranks == 0 {
            return Err(FieldError::InvalidLayout {
                reason: "at least one rank is required".to_string(),
            });
        }
        let base = shape.nz / ranks;
        let extra = shape.nz % ranks;
        let counts: Vec<usize> = (0..ranks).map(|r| base + usize::from(r < extra)).collect();
        Self::from_plane_counts(shape, components, &counts)
    }

    /// Build a layout from explicit per-rank plane counts, in rank order.
    pub fn from_plane_counts(
        shape: GridShape,
        components: usize,
        counts: &[usize],
    ) -> Result<Self, FieldError> {
        if counts.is_empty() {
            return Err(FieldError::InvalidLayout {
                reason: "at least one rank is required".to_string(),
            });
        }
        if shape.nx == 0 || shape.ny == 0 || shape.nz == 0 {
            return Err(FieldError::InvalidLayout {
                reason: format!(
                    "grid extents must be positive, got {}x{}x{}",
                    shape.nx, shape.ny, shape.nz
                ),
            });
        }
        if components == 0 {
            return Err(FieldError::InvalidLayout {
                reason: "fields need at least one component".to_string(),
            });
        }
        if let Some(r) = counts.iter().position(|&c| c == 0) {
            return Err(FieldError::InvalidLayout {
                reason: format!("rank {r} owns no planes"),
            });
        }
        let total: usize = counts.iter().sum();
        if total != shape.nz {
            return Err(FieldError::InvalidLayout {
                reason: format!("plane counts sum to {total}, grid has nz = {}", shape.nz),
            });
        }

        let mut starts = Vec::with_capacity(counts.len() + 1);
        let mut owners = Vec::with_capacity(shape.nz);
        let mut acc = 0;
        starts.push(0);
        for (r, &c) in counts.iter().enumerate() {
            owners.extend(std::iter::repeat_n(Rank(r), c));
            acc += c;
            starts.push(acc);
        }

        Ok(Self {
            shape,
            components,
            periodic: [true, true],
            starts,
            owners,
        })
    }

    /// Replace the x/y periodic flags.
    pub fn with_periodic(mut self, x: bool, y: bool) -> Self {
        self.periodic = [x, y];
        self
    }

    /// Global grid shape.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Values per cell.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Periodic flags for x and y.
    pub fn periodic(&self) -> [bool; 2] {
        self.periodic
    }

    /// Number of ranks.
    pub fn ranks(&self) -> usize {
        self.starts.len() - 1
    }

    /// Values in one z plane (`nx * ny * components`).
    pub fn plane_len(&self) -> usize {
        self.shape.nx * self.shape.ny * self.components
    }

    /// Values in a full global snapshot.
    pub fn global_len(&self) -> usize {
        self.shape.nz * self.plane_len()
    }

    /// Slab owned by `rank`.
    pub fn local(&self, rank: Rank) -> Result<LocalSlab, FieldError> {
        if rank.0 >= self.ranks() {
            return Err(FieldError::InvalidLayout {
                reason: format!("rank {rank} outside a layout of {} ranks", self.ranks()),
            });
        }
        let start = self.starts[rank.0];
        Ok(LocalSlab {
            rank,
            start,
            planes: self.starts[rank.0 + 1] - start,
        })
    }

    /// All slabs in rank order.
    pub fn slabs(&self) -> impl Iterator<Item = LocalSlab> + '_ {
        self.starts.windows(2).enumerate().map(|(r, w)| LocalSlab {
            rank: Rank(r),
            start: w[0],
            planes: w[1] - w[0],
        })
    }

    /// Owner of global plane `plane`, wrapping periodically.
    pub fn owner_of_plane(&self, plane: i64) -> Rank {
        let wrapped = plane.rem_euclid(self.shape.nz as i64) as usize;
        self.owners[wrapped]
    }

    /// Values held by `rank` (`planes * plane_len`).
    pub fn local_len(&self, rank: Rank) -> Result<usize, FieldError> {
        Ok(self.local(rank)?.planes * self.plane_len())
    }

    /// The contiguous part of a flattened global snapshot owned by `rank`.
    pub fn local_slice<'a, T>(&self, global: &'a [T], rank: Rank) -> Result<&'a [T], FieldError> {
        if global.len() != self.global_len() {
            return Err(FieldError::SampleSizeMismatch {
                expected: self.global_len(),
                found: global.len(),
            });
        }
        let slab = self.local(rank)?;
        let pl = self.plane_len();
        Ok(&global[slab.start * pl..slab.end() * pl])
    }
}
