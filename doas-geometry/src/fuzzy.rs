//!
//! Fuzzy two-instrument plume altitude, used when the closed-form ray intersection
//! is ill-conditioned: iterates on plume height by Newton's method with line
//! search, minimising the wind-direction disagreement implied by the two
//! scanners when both rays are forced to pass through a known source (spec §4.9
//! "Fuzzy two-instrument alternative"), grounded on
//! `GeometryCalculator.cpp::GetPlumeHeight_Fuzzy`.
//!

use crate::result::{Error, Result};
use crate::single_instrument::wind_direction_given_altitude;
use crate::two_instrument::PlumeCentreObservation;
use doas_model::data::GpsPoint;

/// Converges to within 1 degree of wind-direction disagreement between the two
/// scanners, or fails after 100 iterations (spec §4.9).
const MAX_WIND_DIRECTION_DISAGREEMENT_DEG: f64 = 1.0;
const MAX_ITERATIONS: u32 = 100;
const MAX_LINE_SEARCH_HALVINGS: u32 = 1000;

fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

fn disagreement(source: &GpsPoint, lower: &PlumeCentreObservation, upper: &PlumeCentreObservation, guess: f64) -> (f64, f64, f64) {
    let height_difference = upper.location.position.altitude - lower.location.position.altitude;
    let wd_lower = wind_direction_given_altitude(source, lower.location, lower.plume_centre_angle_deg, lower.location.position.altitude + guess);
    let wd_upper = wind_direction_given_altitude(
        source,
        upper.location,
        upper.plume_centre_angle_deg,
        upper.location.position.altitude + guess - height_difference,
    );
    (angular_difference(wd_lower, wd_upper), wd_lower, wd_upper)
}

pub struct FuzzyResult {
    pub plume_altitude_m: f64,
    pub wind_direction_deg: f64,
}

/// Solves for the plume height above the lower scanner, and the wind direction
/// implied at that height, by Newton iteration with line search.
pub fn intersect(source: &GpsPoint, a: &PlumeCentreObservation, b: &PlumeCentreObservation) -> Result<FuzzyResult> {
    let (lower, upper) = if a.location.position.altitude <= b.location.position.altitude {
        (a, b)
    } else {
        (b, a)
    };

    let mut guess = if lower.location.position.altitude > 0.0 && source.altitude > 0.0 {
        (source.altitude - lower.location.position.altitude).clamp(0.0, 5000.0)
    } else {
        1000.0
    };
    let step = 10.0;

    for _ in 0..MAX_ITERATIONS {
        let (f, wd_lower, wd_upper) = disagreement(source, lower, upper, guess);
        if f < MAX_WIND_DIRECTION_DISAGREEMENT_DEG {
            return finish(lower, guess, wd_lower, wd_upper);
        }

        let (f_plus, wd_lower_plus, wd_upper_plus) = disagreement(source, lower, upper, guess + step);
        if f_plus < MAX_WIND_DIRECTION_DISAGREEMENT_DEG {
            return finish(lower, guess + step, wd_lower_plus, wd_upper_plus);
        }

        let derivative = (f_plus - f) / step;
        if derivative.abs() < 1e-12 {
            return Err(Error::GeometryAmbiguous("fuzzy geometry solver stalled (zero derivative)".to_string()));
        }

        let mut alpha = 0.5;
        let mut new_guess = guess - alpha * f / derivative;
        let (mut f_new, mut wd_lower_new, mut wd_upper_new) = disagreement(source, lower, upper, new_guess);

        let mut halvings = 0;
        while f_new > f {
            alpha /= 2.0;
            new_guess = guess - alpha * f / derivative;
            let next = disagreement(source, lower, upper, new_guess);
            f_new = next.0;
            wd_lower_new = next.1;
            wd_upper_new = next.2;
            halvings += 1;
            if halvings > MAX_LINE_SEARCH_HALVINGS {
                return Err(Error::GeometryAmbiguous("fuzzy geometry solver line search did not converge".to_string()));
            }
        }

        if f_new < MAX_WIND_DIRECTION_DISAGREEMENT_DEG {
            return finish(lower, new_guess, wd_lower_new, wd_upper_new);
        }
        guess = new_guess;
    }

    Err(Error::GeometryAmbiguous(format!(
        "fuzzy geometry solver did not converge within {MAX_ITERATIONS} iterations"
    )))
}

fn finish(lower: &PlumeCentreObservation, guess: f64, wd_lower: f64, wd_upper: f64) -> Result<FuzzyResult> {
    if !(0.0..=10_000.0).contains(&guess) {
        return Err(Error::GeometryAmbiguous(format!(
            "fuzzy geometry solver converged to an unphysical height of {guess:.0} m"
        )));
    }
    Ok(FuzzyResult {
        plume_altitude_m: guess + lower.location.position.altitude,
        wind_direction_deg: (wd_lower + wd_upper) / 2.0,
    })
}
