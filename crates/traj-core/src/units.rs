//! Declared unit strings and their SI conversion factors.
//!
//! Phase variables and ODE inputs carry free-form unit strings (`"m/s"`,
//! `"deg"`, `"m**2"`). Factors are taken from uom so the table stays in
//! agreement with the SI definitions used elsewhere.

use uom::si::f64::{
    Acceleration, Angle, AngularVelocity, Area, Force, Length, Mass, MassRate, Time, Velocity,
};

use crate::{CoreError, CoreResult};

/// Physical dimension of a declared unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    Dimensionless,
    Length,
    Time,
    Mass,
    Velocity,
    Acceleration,
    Angle,
    AngularVelocity,
    Area,
    Force,
    MassRate,
}

/// A parsed unit: dimension plus the factor that converts a value to SI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitSpec {
    pub dimension: Dimension,
    pub to_si: f64,
}

impl UnitSpec {
    const fn new(dimension: Dimension, to_si: f64) -> Self {
        Self { dimension, to_si }
    }
}

/// Parse a unit string. `None`, `""` and `"unitless"` are dimensionless.
pub fn parse_unit(unit: Option<&str>) -> CoreResult<UnitSpec> {
    use uom::si::{
        acceleration, angle, angular_velocity, area, force, length, mass, mass_rate, time,
        velocity,
    };

    let Some(raw) = unit else {
        return Ok(UnitSpec::new(Dimension::Dimensionless, 1.0));
    };
    let key = raw.trim().replace("**", "^");

    let spec = match key.as_str() {
        "" | "unitless" | "1" => UnitSpec::new(Dimension::Dimensionless, 1.0),

        "m" => UnitSpec::new(Dimension::Length, 1.0),
        "km" => UnitSpec::new(
            Dimension::Length,
            Length::new::<length::kilometer>(1.0).get::<length::meter>(),
        ),
        "ft" => UnitSpec::new(
            Dimension::Length,
            Length::new::<length::foot>(1.0).get::<length::meter>(),
        ),
        "NM" | "nmi" => UnitSpec::new(
            Dimension::Length,
            Length::new::<length::nautical_mile>(1.0).get::<length::meter>(),
        ),

        "s" => UnitSpec::new(Dimension::Time, 1.0),
        "min" => UnitSpec::new(
            Dimension::Time,
            Time::new::<time::minute>(1.0).get::<time::second>(),
        ),
        "h" => UnitSpec::new(
            Dimension::Time,
            Time::new::<time::hour>(1.0).get::<time::second>(),
        ),

        "kg" => UnitSpec::new(Dimension::Mass, 1.0),
        "lbm" => UnitSpec::new(
            Dimension::Mass,
            Mass::new::<mass::pound>(1.0).get::<mass::kilogram>(),
        ),

        "m/s" => UnitSpec::new(Dimension::Velocity, 1.0),
        "ft/s" => UnitSpec::new(
            Dimension::Velocity,
            Velocity::new::<velocity::foot_per_second>(1.0).get::<velocity::meter_per_second>(),
        ),
        "km/h" => UnitSpec::new(
            Dimension::Velocity,
            Velocity::new::<velocity::kilometer_per_hour>(1.0)
                .get::<velocity::meter_per_second>(),
        ),

        "m/s^2" => UnitSpec::new(Dimension::Acceleration, 1.0),
        "ft/s^2" => UnitSpec::new(
            Dimension::Acceleration,
            Acceleration::new::<acceleration::foot_per_second_squared>(1.0)
                .get::<acceleration::meter_per_second_squared>(),
        ),

        "rad" => UnitSpec::new(Dimension::Angle, 1.0),
        "deg" => UnitSpec::new(
            Dimension::Angle,
            Angle::new::<angle::degree>(1.0).get::<angle::radian>(),
        ),

        "rad/s" => UnitSpec::new(Dimension::AngularVelocity, 1.0),
        "deg/s" => UnitSpec::new(
            Dimension::AngularVelocity,
            AngularVelocity::new::<angular_velocity::degree_per_second>(1.0)
                .get::<angular_velocity::radian_per_second>(),
        ),

        "m^2" => UnitSpec::new(Dimension::Area, 1.0),
        "ft^2" => UnitSpec::new(
            Dimension::Area,
            Area::new::<area::square_foot>(1.0).get::<area::square_meter>(),
        ),

        "N" => UnitSpec::new(Dimension::Force, 1.0),
        "lbf" => UnitSpec::new(
            Dimension::Force,
            Force::new::<force::pound_force>(1.0).get::<force::newton>(),
        ),

        "kg/s" => UnitSpec::new(Dimension::MassRate, 1.0),
        "lbm/s" => UnitSpec::new(
            Dimension::MassRate,
            MassRate::new::<mass_rate::pound_per_second>(1.0)
                .get::<mass_rate::kilogram_per_second>(),
        ),

        _ => {
            return Err(CoreError::UnknownUnit {
                unit: raw.to_string(),
            });
        }
    };
    Ok(spec)
}

/// Factor `f` such that `value_in_to = f * value_in_from`.
///
/// A missing unit on either side means "no conversion requested" and yields 1.
pub fn conversion_factor(from: Option<&str>, to: Option<&str>) -> CoreResult<f64> {
    let (Some(from_raw), Some(to_raw)) = (from, to) else {
        return Ok(1.0);
    };
    let from_spec = parse_unit(Some(from_raw))?;
    let to_spec = parse_unit(Some(to_raw))?;
    if from_spec.dimension != to_spec.dimension {
        return Err(CoreError::IncompatibleUnits {
            from: from_raw.to_string(),
            to: to_raw.to_string(),
        });
    }
    Ok(from_spec.to_si / to_spec.to_si)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_convert_to_radians() {
        let f = conversion_factor(Some("deg"), Some("rad")).unwrap();
        assert!((f * 180.0 - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn power_notation_is_accepted() {
        let a = parse_unit(Some("m**2")).unwrap();
        let b = parse_unit(Some("m^2")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension, Dimension::Area);
    }

    #[test]
    fn missing_side_means_identity() {
        assert_eq!(conversion_factor(None, Some("m")).unwrap(), 1.0);
        assert_eq!(conversion_factor(Some("ft"), None).unwrap(), 1.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let err = conversion_factor(Some("m"), Some("s")).unwrap_err();
        assert!(matches!(err, CoreError::IncompatibleUnits { .. }));
    }

    #[test]
    fn unknown_unit_is_rejected() {
        assert!(matches!(
            parse_unit(Some("furlong")),
            Err(CoreError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn feet_round_trip() {
        let to_m = conversion_factor(Some("ft"), Some("m")).unwrap();
        let back = conversion_factor(Some("m"), Some("ft")).unwrap();
        assert!((to_m - 0.3048).abs() < 1e-12);
        assert!((to_m * back - 1.0).abs() < 1e-12);
    }
}
