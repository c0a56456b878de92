//! Subdomain identity and coupled solution storage
//!
//! The simulator couples exactly two subdomains: cell-centered fluid flow
//! and vertex-centered poroelastic mechanics. Components address them
//! through the closed [`SubdomainId`] enum and store per-subdomain data in
//! [`PerDomain`], so subdomain dispatch is a plain array index instead of
//! type machinery.

use std::ops::{Index, IndexMut};

/// Identifies one of the two coupled subdomains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubdomainId {
    /// Cell-centered single-phase flow (pore pressure per cell).
    Flow,
    /// Vertex-centered poroelastic mechanics (displacement per vertex).
    Mechanics,
}

impl SubdomainId {
    pub const ALL: [SubdomainId; 2] = [SubdomainId::Flow, SubdomainId::Mechanics];

    /// Slot position in [`PerDomain`] containers.
    pub fn index(self) -> usize {
        match self {
            SubdomainId::Flow => 0,
            SubdomainId::Mechanics => 1,
        }
    }

    /// The other subdomain of the coupled pair.
    pub fn partner(self) -> SubdomainId {
        match self {
            SubdomainId::Flow => SubdomainId::Mechanics,
            SubdomainId::Mechanics => SubdomainId::Flow,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SubdomainId::Flow => "flow",
            SubdomainId::Mechanics => "mechanics",
        }
    }
}

/// Fixed-size container holding one value per subdomain.
#[derive(Debug, Clone, Default)]
pub struct PerDomain<T>([T; 2]);

impl<T> PerDomain<T> {
    pub fn new(flow: T, mechanics: T) -> Self {
        PerDomain([flow, mechanics])
    }

    pub fn from_fn<F: FnMut(SubdomainId) -> T>(mut f: F) -> Self {
        PerDomain([f(SubdomainId::Flow), f(SubdomainId::Mechanics)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubdomainId, &T)> + '_ {
        SubdomainId::ALL.iter().map(move |&id| (id, &self.0[id.index()]))
    }
}

impl<T> Index<SubdomainId> for PerDomain<T> {
    type Output = T;
    fn index(&self, id: SubdomainId) -> &T {
        &self.0[id.index()]
    }
}

impl<T> IndexMut<SubdomainId> for PerDomain<T> {
    fn index_mut(&mut self, id: SubdomainId) -> &mut T {
        &mut self.0[id.index()]
    }
}

/// Descriptor of one subdomain's discretized field.
///
/// Built by the matching physics kernel; consumed by the coupling manager
/// at initialization to size its stencils and caches.
#[derive(Debug, Clone)]
pub struct Subdomain {
    pub id: SubdomainId,
    /// Human-readable field name ("pressure", "displacement").
    pub field: &'static str,
    pub num_dofs: usize,
}

impl Subdomain {
    pub fn new(id: SubdomainId, field: &'static str, num_dofs: usize) -> Self {
        Subdomain { id, field, num_dofs }
    }
}

/// One complete coupled solution snapshot: a pressure vector and a
/// displacement vector, plus a version tag.
///
/// The solver keeps two instances, "old" (last accepted step) and "new"
/// (current Newton iterate). They are always distinct objects; promoting
/// new to old goes through [`SolutionState::assign_from`], never through
/// shared pointers. The version counter increments on every mutation so
/// consumers holding derived quantities (the coupling manager's caches)
/// can detect staleness without tracking individual writes.
#[derive(Debug, Clone)]
pub struct SolutionState {
    data: PerDomain<Vec<f64>>,
    version: u64,
}

impl SolutionState {
    pub fn zeros(num_dofs: PerDomain<usize>) -> Self {
        SolutionState {
            data: PerDomain::from_fn(|id| vec![0.0; num_dofs[id]]),
            version: 0,
        }
    }

    pub fn len(&self, id: SubdomainId) -> usize {
        self.data[id].len()
    }

    pub fn total_dofs(&self) -> usize {
        self.data[SubdomainId::Flow].len() + self.data[SubdomainId::Mechanics].len()
    }

    /// Offset of this subdomain's block in the flattened global ordering
    /// (flow dofs first, then mechanics dofs).
    pub fn global_offset(&self, id: SubdomainId) -> usize {
        match id {
            SubdomainId::Flow => 0,
            SubdomainId::Mechanics => self.data[SubdomainId::Flow].len(),
        }
    }

    pub fn dof(&self, id: SubdomainId, i: usize) -> f64 {
        self.data[id][i]
    }

    pub fn slice(&self, id: SubdomainId) -> &[f64] {
        &self.data[id]
    }

    pub fn set_dof(&mut self, id: SubdomainId, i: usize, value: f64) {
        self.data[id][i] = value;
        self.version += 1;
    }

    /// Set every dof of one subdomain to a uniform value (initial
    /// conditions).
    pub fn fill(&mut self, id: SubdomainId, value: f64) {
        for x in self.data[id].iter_mut() {
            *x = value;
        }
        self.version += 1;
    }

    /// Copy another state's values into this one. Counts as a mutation of
    /// `self`; the source is untouched.
    pub fn assign_from(&mut self, other: &SolutionState) {
        for id in SubdomainId::ALL {
            self.data[id].clear();
            self.data[id].extend_from_slice(&other.data[id]);
        }
        self.version += 1;
    }

    /// Apply a damped Newton update `x <- x - damping * delta`, where
    /// `delta` uses the flattened global ordering (flow block first).
    pub fn apply_update(&mut self, delta: &[f64], damping: f64) {
        debug_assert_eq!(delta.len(), self.total_dofs());
        let n_flow = self.data[SubdomainId::Flow].len();
        for (i, x) in self.data[SubdomainId::Flow].iter_mut().enumerate() {
            *x -= damping * delta[i];
        }
        for (i, x) in self.data[SubdomainId::Mechanics].iter_mut().enumerate() {
            *x -= damping * delta[n_flow + i];
        }
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partner_is_involution() {
        for id in SubdomainId::ALL {
            assert_eq!(id.partner().partner(), id);
            assert_ne!(id.partner(), id);
        }
    }

    #[test]
    fn test_per_domain_indexing() {
        let mut pd = PerDomain::new(1.0, 2.0);
        assert_relative_eq!(pd[SubdomainId::Flow], 1.0);
        assert_relative_eq!(pd[SubdomainId::Mechanics], 2.0);
        pd[SubdomainId::Mechanics] = 5.0;
        assert_relative_eq!(pd[SubdomainId::Mechanics], 5.0);
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let mut s = SolutionState::zeros(PerDomain::new(3, 4));
        let v0 = s.version();
        s.set_dof(SubdomainId::Flow, 1, 2.5);
        assert!(s.version() > v0);

        let v1 = s.version();
        s.fill(SubdomainId::Mechanics, -1.0);
        assert!(s.version() > v1);
        assert_relative_eq!(s.dof(SubdomainId::Mechanics, 3), -1.0);
    }

    #[test]
    fn test_assign_from_copies_values_not_version() {
        let mut a = SolutionState::zeros(PerDomain::new(2, 2));
        let mut b = SolutionState::zeros(PerDomain::new(2, 2));
        a.set_dof(SubdomainId::Flow, 0, 7.0);
        a.set_dof(SubdomainId::Mechanics, 1, -3.0);

        let vb = b.version();
        b.assign_from(&a);
        assert_relative_eq!(b.dof(SubdomainId::Flow, 0), 7.0);
        assert_relative_eq!(b.dof(SubdomainId::Mechanics, 1), -3.0);
        assert!(b.version() > vb);
    }

    #[test]
    fn test_apply_update_global_layout() {
        let mut s = SolutionState::zeros(PerDomain::new(2, 3));
        // delta = [1, 2 | 3, 4, 5], damping 0.5 => x = -0.5 * delta
        s.apply_update(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5);
        assert_relative_eq!(s.dof(SubdomainId::Flow, 1), -1.0);
        assert_relative_eq!(s.dof(SubdomainId::Mechanics, 0), -1.5);
        assert_relative_eq!(s.dof(SubdomainId::Mechanics, 2), -2.5);
    }

    #[test]
    fn test_global_offsets() {
        let s = SolutionState::zeros(PerDomain::new(4, 5));
        assert_eq!(s.global_offset(SubdomainId::Flow), 0);
        assert_eq!(s.global_offset(SubdomainId::Mechanics), 4);
        assert_eq!(s.total_dofs(), 9);
    }
}
