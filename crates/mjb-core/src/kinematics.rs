//! Jet and recoil-system kinematics.
//!
//! `FourMomentum` stores the collider coordinates (pt, eta, phi, E) that the
//! jet tools and histograms consume. Vector arithmetic goes through Cartesian
//! components so that sums of jets (the recoil system) are exact.

use std::f64::consts::PI;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Pseudorapidity reported for vectors along the beam axis.
const BEAM_AXIS_ETA: f64 = 1e10;

/// Lorentz 4-vector in (pt, eta, phi, E) coordinates. Energies are in GeV.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    /// Transverse momentum.
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuthal angle.
    pub phi: f64,
    /// Energy.
    pub e: f64,
}

impl FourMomentum {
    /// Create from collider coordinates.
    pub fn new(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        Self { pt, eta, phi, e }
    }

    /// Create a massless vector from (pt, eta, phi).
    pub fn massless(pt: f64, eta: f64, phi: f64) -> Self {
        Self { pt, eta, phi, e: pt * eta.cosh() }
    }

    /// Create from Cartesian components.
    pub fn from_cartesian(px: f64, py: f64, pz: f64, e: f64) -> Self {
        let pt = px.hypot(py);
        let phi = if px == 0.0 && py == 0.0 { 0.0 } else { py.atan2(px) };
        let eta = if pt > 0.0 {
            (pz / pt).asinh()
        } else if pz == 0.0 {
            0.0
        } else if pz > 0.0 {
            BEAM_AXIS_ETA
        } else {
            -BEAM_AXIS_ETA
        };
        Self { pt, eta, phi, e }
    }

    /// x component of the momentum.
    pub fn px(&self) -> f64 {
        self.pt * self.phi.cos()
    }

    /// y component of the momentum.
    pub fn py(&self) -> f64 {
        self.pt * self.phi.sin()
    }

    /// z component of the momentum.
    pub fn pz(&self) -> f64 {
        self.pt * self.eta.sinh()
    }

    /// Momentum magnitude.
    pub fn p(&self) -> f64 {
        self.pt * self.eta.cosh()
    }

    /// Invariant mass. Space-like vectors return `-sqrt(-m^2)`.
    pub fn mass(&self) -> f64 {
        let p = self.p();
        let m2 = self.e * self.e - p * p;
        if m2 < 0.0 { -(-m2).sqrt() } else { m2.sqrt() }
    }

    /// Scale all four components by `factor`.
    ///
    /// Direction is unchanged for positive factors; only pt, |p| and E move.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_cartesian(
            self.px() * factor,
            self.py() * factor,
            self.pz() * factor,
            self.e * factor,
        )
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum::from_cartesian(
            self.px() + rhs.px(),
            self.py() + rhs.py(),
            self.pz() + rhs.pz(),
            self.e + rhs.e,
        )
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        *self = *self + rhs;
    }
}

impl Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> FourMomentum {
        iter.fold(FourMomentum::default(), |acc, v| acc + v)
    }
}

/// Map an angle into `[0, 2π)`.
pub fn phi_0_2pi(phi: f64) -> f64 {
    if !phi.is_finite() {
        return phi;
    }
    let r = phi.rem_euclid(2.0 * PI);
    if r >= 2.0 * PI { 0.0 } else { r }
}

/// Map an angle into `[-π, π)`.
pub fn phi_mpi_pi(phi: f64) -> f64 {
    if !phi.is_finite() {
        return phi;
    }
    phi_0_2pi(phi + PI) - PI
}

/// Absolute azimuthal separation in `[0, π]`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    phi_mpi_pi(phi_0_2pi(phi1) - phi_0_2pi(phi2)).abs()
}
