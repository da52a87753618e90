//!
//! Flux integration formulas (spec §4.11): a single-axis/cone-scanner path integral
//! and a two-axis (Heidelberg) variant. Grounded on
//! `FluxCalculator.cpp::CalculateFlux`'s dispatch by instrument type and cone angle;
//! the reference implementation's actual `CalculateFluxFlatScanner`/
//! `CalculateFluxConicalScanner` bodies live in `SpectralEvaluation`, which is not
//! part of this pack, so the integral itself is rebuilt from the scanner-ray
//! convention already established in `doas-geometry::ray` (see DESIGN.md).
//!

use doas_geometry::ray::plume_centre_direction;

/// North/east ground displacement per unit plume height above the scanner, for a
/// single-axis reading of a cone/flat scanner (`ScannerType::FlatSingleAxis`).
fn single_axis_offset(scan_angle_deg: f64, cone_angle_deg: f64, tilt_deg: f64, compass_deg: f64) -> (f64, f64) {
    let [x, y, _] = plume_centre_direction(scan_angle_deg, cone_angle_deg, tilt_deg);
    rotate_to_north_east(x, y, compass_deg)
}

/// North/east ground displacement per unit plume height for a two-axis (Heidelberg)
/// scanner, modelled as two independent orthogonal mirror tilts (self-derived, see
/// DESIGN.md).
fn two_axis_offset(alpha_deg: f64, phi_deg: f64, compass_deg: f64) -> (f64, f64) {
    let x = phi_deg.to_radians().tan();
    let y = alpha_deg.to_radians().tan();
    rotate_to_north_east(x, y, compass_deg)
}

fn rotate_to_north_east(x: f64, y: f64, compass_deg: f64) -> (f64, f64) {
    let compass_rad = compass_deg.to_radians();
    let north = x * compass_rad.cos() - y * compass_rad.sin();
    let east = x * compass_rad.sin() + y * compass_rad.cos();
    (north, east)
}

/// Trapezoidal path integral `windSpeed * sum(column_avg * (ds x wind_unit))` along a
/// sequence of ground offsets, equivalent to the classical
/// `column(alpha) * sin(alpha - compass_to_wind)` formula when the path is a straight
/// line (the flat-scanner case), but general enough to cover a curved cone-scanner
/// arc or a two-axis Heidelberg path without a separate formula per case.
fn path_integral(offsets: &[(f64, f64)], column_kg_m2: &[f64], wind_speed_mps: f64, wind_direction_deg: f64) -> f64 {
    let wind_rad = wind_direction_deg.to_radians();
    let (wind_north, wind_east) = (wind_rad.cos(), wind_rad.sin());

    let mut flux = 0.0;
    for i in 0..offsets.len().saturating_sub(1) {
        let (n1, e1) = offsets[i];
        let (n2, e2) = offsets[i + 1];
        let ds_north = n2 - n1;
        let ds_east = e2 - e1;
        let cross = ds_east * wind_north - ds_north * wind_east;
        let column_avg = (column_kg_m2[i] + column_kg_m2[i + 1]) / 2.0;
        flux += column_avg * cross;
    }
    flux * wind_speed_mps
}

/// Flux for a flat (`|cone - 90| < 1`) or conical single-axis scanner (spec §4.11
/// bullet 1-2): both are the same ray geometry, differing only in `cone_angle_deg`.
pub fn single_axis_flux(
    scan_angle_deg: &[f64],
    column_kg_m2: &[f64],
    plume_height_above_scanner_m: f64,
    wind_speed_mps: f64,
    wind_direction_deg: f64,
    compass_deg: f64,
    cone_angle_deg: f64,
    tilt_deg: f64,
) -> f64 {
    let offsets: Vec<(f64, f64)> = scan_angle_deg
        .iter()
        .map(|&angle| {
            let (n, e) = single_axis_offset(angle, cone_angle_deg, tilt_deg, compass_deg);
            (n * plume_height_above_scanner_m, e * plume_height_above_scanner_m)
        })
        .collect();
    path_integral(&offsets, column_kg_m2, wind_speed_mps, wind_direction_deg)
}

/// Flux for a two-axis (Heidelberg) scanner using both the `alpha` and `phi` scan
/// angle series (spec §4.11 bullet 3).
pub fn two_axis_flux(
    alpha_deg: &[f64],
    phi_deg: &[f64],
    column_kg_m2: &[f64],
    plume_height_above_scanner_m: f64,
    wind_speed_mps: f64,
    wind_direction_deg: f64,
    compass_deg: f64,
) -> f64 {
    let offsets: Vec<(f64, f64)> = alpha_deg
        .iter()
        .zip(phi_deg.iter())
        .map(|(&alpha, &phi)| {
            let (n, e) = two_axis_offset(alpha, phi, compass_deg);
            (n * plume_height_above_scanner_m, e * plume_height_above_scanner_m)
        })
        .collect();
    path_integral(&offsets, column_kg_m2, wind_speed_mps, wind_direction_deg)
}
