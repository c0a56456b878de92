//! Deformation-dependent porosity and permeability
//!
//! The mechanics-to-flow coupling goes through these two relations: the
//! volumetric strain of a cell changes its pore fraction, and optionally
//! the pore fraction changes its permeability. Both are evaluated by the
//! coupling manager when it derives the flow-side coupling context.

/// Porosity as a function of volumetric strain.
///
/// Solid-mass conservation over a deforming cell gives
/// `φ(e) = (φ_ref + e) / (1 + e)` for volumetric strain `e`. The
/// `feedback` factor scales the strain before it enters the law;
/// `feedback = 0` freezes porosity at its reference value, which
/// decouples the flow problem from mechanics entirely.
#[derive(Debug, Clone)]
pub struct PorosityLaw {
    reference: f64,
    feedback: f64,
}

impl PorosityLaw {
    pub fn new(reference_porosity: f64, feedback: f64) -> Self {
        assert!(
            reference_porosity > 0.0 && reference_porosity < 1.0,
            "reference porosity must lie in (0, 1)"
        );
        assert!(
            (0.0..=1.0).contains(&feedback),
            "strain feedback must lie in [0, 1]"
        );
        PorosityLaw {
            reference: reference_porosity,
            feedback,
        }
    }

    pub fn reference(&self) -> f64 {
        self.reference
    }

    /// Whether strain actually moves porosity.
    pub fn is_active(&self) -> bool {
        self.feedback > 0.0
    }

    /// Effective porosity for the given volumetric strain. Large
    /// compressive strains can push the result to zero or below; callers
    /// downstream detect the resulting non-finite residuals rather than
    /// clamping here.
    pub fn porosity(&self, volumetric_strain: f64) -> f64 {
        let e = self.feedback * volumetric_strain;
        (self.reference + e) / (1.0 + e)
    }
}

/// Kozeny-Carman permeability-porosity relation.
///
/// `k(φ) = k_ref · (φ/φ_ref)³ · ((1−φ_ref)/(1−φ))²`. When disabled the
/// reference permeability is returned unchanged.
#[derive(Debug, Clone)]
pub struct KozenyCarman {
    reference_permeability: f64,
    reference_porosity: f64,
    enabled: bool,
}

impl KozenyCarman {
    pub fn new(reference_permeability: f64, reference_porosity: f64, enabled: bool) -> Self {
        assert!(reference_permeability > 0.0, "permeability must be positive");
        assert!(
            reference_porosity > 0.0 && reference_porosity < 1.0,
            "reference porosity must lie in (0, 1)"
        );
        KozenyCarman {
            reference_permeability,
            reference_porosity,
            enabled,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled
    }

    pub fn permeability(&self, porosity: f64) -> f64 {
        if !self.enabled {
            return self.reference_permeability;
        }
        let phi0 = self.reference_porosity;
        let ratio = porosity / phi0;
        let packing = (1.0 - phi0) / (1.0 - porosity);
        self.reference_permeability * ratio.powi(3) * packing.powi(2)
    }
}
