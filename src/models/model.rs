//! Energy-volume evaluation for Murnaghan / Birch-Murnaghan / Vinet.
//!
//! Every form takes the same parameter vector `(E0, B0, BP, V0)` so fitters
//! and reports can stay generic over [`ModelKind`].
//!
//! Evaluation is checked: inputs outside a form's domain return
//! [`EosError::Domain`] instead of producing NaN or infinity.

use crate::domain::{DerivedQuantities, ModelKind, ParameterVector};
use crate::error::{DomainViolation, EosError};

/// eV/Å^3 to GPa.
pub const EV_PER_A3_TO_GPA: f64 = 160.217_662_08;

/// Relative step for the central-difference pressure.
const PRESSURE_REL_STEP: f64 = 1e-5;

/// Murnaghan EOS (Phys. Rev. B 28, 5480 (1983)).
///
/// `E(V) = E0 + B0 V / BP * ((V0/V)^BP / (BP - 1) + 1) - V0 B0 / (BP - 1)`
pub fn murnaghan(p: &ParameterVector, v: f64) -> Result<f64, EosError> {
    check_domain(ModelKind::Murnaghan, p, v)?;
    let ParameterVector { e0, b0, bp, v0 } = *p;
    let e = e0 + b0 * v / bp * ((v0 / v).powf(bp) / (bp - 1.0) + 1.0) - v0 * b0 / (bp - 1.0);
    finite_energy(ModelKind::Murnaghan, p, v, e)
}

/// Third-order Birch-Murnaghan EOS.
pub fn birch_murnaghan(p: &ParameterVector, v: f64) -> Result<f64, EosError> {
    check_domain(ModelKind::BirchMurnaghan, p, v)?;
    let ParameterVector { e0, b0, bp, v0 } = *p;
    let eta2 = (v0 / v).powf(2.0 / 3.0);
    let d = eta2 - 1.0;
    let e = e0 + 9.0 * b0 * v0 / 16.0 * d * d * (6.0 + bp * d - 4.0 * eta2);
    finite_energy(ModelKind::BirchMurnaghan, p, v, e)
}

/// Vinet (universal) EOS.
pub fn vinet(p: &ParameterVector, v: f64) -> Result<f64, EosError> {
    check_domain(ModelKind::Vinet, p, v)?;
    let ParameterVector { e0, b0, bp, v0 } = *p;
    let x = (v / v0).cbrt();
    let k = bp - 1.0;
    let e = e0
        + 2.0 * b0 * v0 / (k * k)
            * (2.0 - (5.0 + 3.0 * bp * (x - 1.0) - 3.0 * x) * (-1.5 * k * (x - 1.0)).exp());
    finite_energy(ModelKind::Vinet, p, v, e)
}

/// Evaluate `E(v)` for the given model kind.
pub fn evaluate(model: ModelKind, p: &ParameterVector, v: f64) -> Result<f64, EosError> {
    match model {
        ModelKind::Murnaghan => murnaghan(p, v),
        ModelKind::BirchMurnaghan => birch_murnaghan(p, v),
        ModelKind::Vinet => vinet(p, v),
    }
}

/// Evaluate `E(v)` elementwise; fails on the first volume outside the domain.
pub fn evaluate_many(model: ModelKind, p: &ParameterVector, volumes: &[f64]) -> Result<Vec<f64>, EosError> {
    volumes.iter().map(|&v| evaluate(model, p, v)).collect()
}

/// Pressure `P(V) = -dE/dV`, in energy/volume units of the inputs.
pub fn pressure(model: ModelKind, p: &ParameterVector, v: f64) -> Result<f64, EosError> {
    let h = PRESSURE_REL_STEP * v.abs().max(1e-12);
    // Keep the lower stencil point inside the domain for tiny volumes.
    let lo = (v - h).max(v * 0.5);
    let hi = v + h;
    let e_lo = evaluate(model, p, lo)?;
    let e_hi = evaluate(model, p, hi)?;
    Ok(-(e_hi - e_lo) / (hi - lo))
}

/// Unit conversions and length scales derived from fitted parameters.
pub fn derived_quantities(p: &ParameterVector) -> DerivedQuantities {
    DerivedQuantities {
        b0_gpa: p.b0 * EV_PER_A3_TO_GPA,
        cube_root_v0: p.v0.cbrt(),
        // A primitive fcc cell holds a quarter of the conventional cube.
        fcc_lattice_constant: (4.0 * p.v0).cbrt(),
    }
}

fn check_domain(model: ModelKind, p: &ParameterVector, v: f64) -> Result<(), EosError> {
    let violation = if !p.is_finite() {
        Some(DomainViolation::NonFiniteParameter)
    } else if !(v.is_finite() && v > 0.0) {
        Some(DomainViolation::NonPositiveVolume)
    } else if p.v0 <= 0.0 {
        Some(DomainViolation::NonPositiveV0)
    } else {
        match model {
            ModelKind::Murnaghan if p.bp == 0.0 => Some(DomainViolation::ZeroBp),
            ModelKind::Murnaghan | ModelKind::Vinet if p.bp == 1.0 => Some(DomainViolation::UnitBp),
            _ => None,
        }
    };

    match violation {
        Some(reason) => Err(EosError::Domain {
            model,
            volume: v,
            params: *p,
            reason,
        }),
        None => Ok(()),
    }
}

fn finite_energy(model: ModelKind, p: &ParameterVector, v: f64, e: f64) -> Result<f64, EosError> {
    if e.is_finite() {
        Ok(e)
    } else {
        Err(EosError::Domain {
            model,
            volume: v,
            params: *p,
            reason: DomainViolation::NonFiniteEnergy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ParameterVector {
        ParameterVector::new(-56.468, 0.572, 2.74, 16.56)
    }

    #[test]
    fn every_form_is_at_minimum_at_v0() {
        let p = reference();
        for kind in ModelKind::ALL {
            let e = evaluate(kind, &p, p.v0).unwrap();
            assert!((e - p.e0).abs() < 1e-12, "{kind}: E(V0)={e}");
            for dv in [-0.5, 0.5] {
                let side = evaluate(kind, &p, p.v0 + dv).unwrap();
                assert!(side > e, "{kind}: E(V0{dv:+}) should exceed E0");
            }
        }
    }

    #[test]
    fn murnaghan_is_finite_and_continuous() {
        let p = reference();
        for &v in &[8.0, 13.71, 16.0, 18.52, 30.0] {
            let e = murnaghan(&p, v).unwrap();
            assert!(e.is_finite());
            let e_near = murnaghan(&p, v * (1.0 + 1e-9)).unwrap();
            assert!((e - e_near).abs() < 1e-6, "jump at v={v}");
        }
    }

    #[test]
    fn unit_bp_is_a_domain_error() {
        let p = ParameterVector::new(-56.0, 0.5, 1.0, 16.0);
        let err = murnaghan(&p, 15.0).unwrap_err();
        assert!(matches!(
            err,
            EosError::Domain {
                reason: DomainViolation::UnitBp,
                ..
            }
        ));
        assert!(vinet(&p, 15.0).is_err());
        // Birch-Murnaghan has no pole at BP = 1.
        assert!(birch_murnaghan(&p, 15.0).is_ok());
    }

    #[test]
    fn zero_bp_and_bad_volume_are_domain_errors() {
        let p = ParameterVector::new(-56.0, 0.5, 0.0, 16.0);
        assert!(matches!(
            murnaghan(&p, 15.0),
            Err(EosError::Domain {
                reason: DomainViolation::ZeroBp,
                ..
            })
        ));
        let p = reference();
        for v in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                evaluate(ModelKind::Murnaghan, &p, v),
                Err(EosError::Domain {
                    reason: DomainViolation::NonPositiveVolume,
                    ..
                })
            ));
        }
    }

    #[test]
    fn evaluate_many_matches_pointwise() {
        let p = reference();
        let vols = [14.0, 16.0, 18.0];
        let many = evaluate_many(ModelKind::Vinet, &p, &vols).unwrap();
        for (v, e) in vols.iter().zip(many) {
            assert_eq!(e, vinet(&p, *v).unwrap());
        }
    }

    #[test]
    fn pressure_vanishes_at_v0_and_is_positive_under_compression() {
        let p = reference();
        for kind in ModelKind::ALL {
            let p0 = pressure(kind, &p, p.v0).unwrap();
            assert!(p0.abs() < 1e-6, "{kind}: P(V0)={p0}");
            assert!(pressure(kind, &p, p.v0 * 0.9).unwrap() > 0.0);
        }
    }

    #[test]
    fn bulk_modulus_converts_to_gpa() {
        let d = derived_quantities(&ParameterVector::new(0.0, 1.0, 4.0, 16.0));
        assert!((d.b0_gpa - 160.21766208).abs() < 1e-9);
        assert!((d.fcc_lattice_constant - 4.0).abs() < 1e-12);
    }
}
