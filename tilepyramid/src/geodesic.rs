//! Geodesic problems on the WGS84 ellipsoid.
//!
//! - [`direct`]: start point, azimuth and distance to end point (Vincenty).
//! - [`inverse`]: two points to distance and azimuths (Vincenty), with an
//!   iteration cap for near-antipodal inputs.
//! - [`fast_distance`]: closed-form chord approximation for high-frequency
//!   callers such as on-screen radius estimation.
//!
//! Azimuths are degrees clockwise from north in `[0, 360)`. The second azimuth
//! returned by both problems is the *reverse* azimuth: the direction from the
//! end point back towards the start point.

use crate::coord::GeoPoint;

/// Reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in meters.
    pub a: f64,
    /// Flattening.
    pub f: f64,
}

impl Ellipsoid {
    /// Semi-minor axis in meters.
    #[inline]
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    #[inline]
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    #[inline]
    pub fn eccentricity(&self) -> f64 {
        self.e2().sqrt()
    }
}

pub const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    f: 1.0 / 298.257_223_563,
};

/// Iteration cap for [`inverse`].
pub const MAX_INVERSE_ITERATIONS: usize = 200;

const MAX_DIRECT_ITERATIONS: usize = 100;
const DIRECT_SIGMA_TOLERANCE: f64 = 1e-12;

/// Builds a decimal-degree value from degrees, minutes and seconds.
///
/// The sign of `degrees` applies to the whole value.
pub fn dms(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    let magnitude = degrees.abs() + minutes / 60.0 + seconds / 3600.0;
    if degrees.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    }
}

/// Normalizes an angle in degrees into `(-180, 180]`.
pub fn normalize_longitude(degrees: f64) -> f64 {
    let mut d = degrees % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}

/// Normalizes an azimuth in degrees into `[0, 360)`.
pub fn normalize_azimuth(degrees: f64) -> f64 {
    let d = degrees % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

/// Result of the direct problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectSolution {
    pub point: GeoPoint,
    /// Azimuth from `point` back towards the start.
    pub reverse_azimuth: f64,
}

/// Result of the inverse problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSolution {
    pub distance: f64,
    /// Azimuth at the first point towards the second.
    pub azimuth1: f64,
    /// Azimuth at the second point back towards the first.
    pub azimuth2: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the convergence criterion was met before the iteration cap
    /// or a divergence guard stopped the solver.
    pub converged: bool,
}

/// The `A`/`B` series coefficients shared by both Vincenty problems.
fn series_coefficients(u_sq: f64) -> (f64, f64) {
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    (a, b)
}

fn delta_sigma(b: f64, sin_sigma: f64, cos_sigma: f64, cos_2sm: f64) -> f64 {
    let cos_2sm_sq = cos_2sm * cos_2sm;
    b * sin_sigma
        * (cos_2sm
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sm_sq)
                    - b / 6.0
                        * cos_2sm
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sm_sq)))
}

/// Solves the direct geodesic problem.
///
/// The reduced-latitude iteration on `sigma` has no antipodal singularity and
/// settles within a handful of steps for every input.
pub fn direct(start: GeoPoint, azimuth_deg: f64, distance_m: f64) -> DirectSolution {
    let ellipsoid = WGS84;
    let (a, b, f) = (ellipsoid.a, ellipsoid.b(), ellipsoid.f);

    let alpha1 = azimuth_deg.to_radians();
    let (sin_alpha1, cos_alpha1) = alpha1.sin_cos();

    let tan_u1 = (1.0 - f) * start.lat.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;

    let sigma1 = tan_u1.atan2(cos_alpha1);
    let sin_alpha = cos_u1 * sin_alpha1;
    let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
    let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
    let (big_a, big_b) = series_coefficients(u_sq);

    let sigma0 = distance_m / (b * big_a);
    let mut sigma = sigma0;
    for _ in 0..MAX_DIRECT_ITERATIONS {
        let cos_2sm = (2.0 * sigma1 + sigma).cos();
        let (sin_sigma, cos_sigma) = sigma.sin_cos();
        let previous = sigma;
        sigma = sigma0 + delta_sigma(big_b, sin_sigma, cos_sigma, cos_2sm);
        if (sigma - previous).abs() < DIRECT_SIGMA_TOLERANCE {
            break;
        }
    }

    let cos_2sm = (2.0 * sigma1 + sigma).cos();
    let (sin_sigma, cos_sigma) = sigma.sin_cos();
    let x = sin_u1 * sin_sigma - cos_u1 * cos_sigma * cos_alpha1;

    let lat2 = (sin_u1 * cos_sigma + cos_u1 * sin_sigma * cos_alpha1)
        .atan2((1.0 - f) * sin_alpha.hypot(x));
    let lambda = (sin_sigma * sin_alpha1).atan2(cos_u1 * cos_sigma - sin_u1 * sin_sigma * cos_alpha1);
    let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
    let l = lambda
        - (1.0 - c)
            * f
            * sin_alpha
            * (sigma
                + c * sin_sigma * (cos_2sm + c * cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)));

    let final_bearing = sin_alpha.atan2(-x).to_degrees();

    DirectSolution {
        point: GeoPoint {
            lat: lat2.to_degrees(),
            lon: normalize_longitude(start.lon + l.to_degrees()),
        },
        reverse_azimuth: normalize_azimuth(final_bearing + 180.0),
    }
}

/// Solves the inverse geodesic problem.
///
/// Iterates until two successive estimates move less than `eps_m` meters,
/// both in distance and in the lateral displacement implied by the change of
/// the auxiliary longitude. Near-antipodal pairs can fail to converge; the
/// solver then stops after [`MAX_INVERSE_ITERATIONS`] or as soon as the
/// auxiliary longitude leaves `[-pi, pi]`, and returns the best estimate
/// reached with `converged == false`.
pub fn inverse(p1: GeoPoint, p2: GeoPoint, eps_m: f64) -> InverseSolution {
    let ellipsoid = WGS84;
    let (a, b, f) = (ellipsoid.a, ellipsoid.b(), ellipsoid.f);

    let l = normalize_longitude(p2.lon - p1.lon).to_radians();
    let u1 = ((1.0 - f) * p1.lat.to_radians().tan()).atan();
    let u2 = ((1.0 - f) * p2.lat.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut best = InverseSolution {
        distance: 0.0,
        azimuth1: 0.0,
        azimuth2: 0.0,
        iterations: 0,
        converged: false,
    };
    let mut previous_distance: Option<f64> = None;

    for iteration in 1..=MAX_INVERSE_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = (cos_u2 * sin_lambda).hypot(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
        if sin_sigma == 0.0 {
            // coincident points
            return InverseSolution {
                distance: 0.0,
                azimuth1: 0.0,
                azimuth2: 0.0,
                iterations: iteration,
                converged: true,
            };
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha == 0
        let cos_2sm = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };

        let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
        let (big_a, big_b) = series_coefficients(u_sq);
        let distance = b * big_a * (sigma - delta_sigma(big_b, sin_sigma, cos_sigma, cos_2sm));

        let alpha1 = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
        let alpha2 = (cos_u1 * sin_lambda).atan2(-sin_u1 * cos_u2 + cos_u1 * sin_u2 * cos_lambda);
        best = InverseSolution {
            distance,
            azimuth1: normalize_azimuth(alpha1.to_degrees()),
            azimuth2: normalize_azimuth(alpha2.to_degrees() + 180.0),
            iterations: iteration,
            converged: false,
        };

        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let next_lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma
                    + c * sin_sigma * (cos_2sm + c * cos_sigma * (-1.0 + 2.0 * cos_2sm * cos_2sm)));
        let lateral_change = a * (next_lambda - lambda).abs();
        lambda = next_lambda;

        if let Some(prev) = previous_distance {
            if (distance - prev).abs() < eps_m && lateral_change < eps_m {
                best.converged = true;
                return best;
            }
        }
        previous_distance = Some(distance);

        if lambda.abs() > std::f64::consts::PI {
            tracing::debug!(
                iteration,
                distance,
                "Geodesic inverse diverging near antipode, returning best estimate"
            );
            return best;
        }
    }

    best
}

/// Approximate geodesic distance in meters without iteration.
///
/// Takes the straight chord between the two points on the ellipsoid and bends
/// it onto a circle whose radius is the ellipsoid's normal-section radius of
/// curvature at the mid-latitude in the direction of travel. Within a few
/// meters of [`inverse`] below ~1000 km; errors grow to hundreds of meters at
/// continental range.
pub fn fast_distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let ellipsoid = WGS84;
    let e2 = ellipsoid.e2();

    let to_ecef = |point: GeoPoint| {
        let (sin_phi, cos_phi) = point.lat.to_radians().sin_cos();
        let (sin_lambda, cos_lambda) = point.lon.to_radians().sin_cos();
        let n = ellipsoid.a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        (
            n * cos_phi * cos_lambda,
            n * cos_phi * sin_lambda,
            n * (1.0 - e2) * sin_phi,
        )
    };
    let (x1, y1, z1) = to_ecef(p1);
    let (x2, y2, z2) = to_ecef(p2);
    let chord = ((x2 - x1).powi(2) + (y2 - y1).powi(2) + (z2 - z1).powi(2)).sqrt();

    let mid_lat = ((p1.lat + p2.lat) / 2.0).to_radians();
    let sin_mid = mid_lat.sin();
    let w2 = 1.0 - e2 * sin_mid * sin_mid;
    let meridian = ellipsoid.a * (1.0 - e2) / (w2 * w2.sqrt());
    let prime_vertical = ellipsoid.a / w2.sqrt();

    let north = meridian * (p2.lat - p1.lat).to_radians();
    let east = prime_vertical * mid_lat.cos() * normalize_longitude(p2.lon - p1.lon).to_radians();
    let h = north * north + east * east;
    if h == 0.0 {
        return chord;
    }

    // Euler's radius of curvature along the direction of travel
    let radius = 1.0 / (north * north / h / meridian + east * east / h / prime_vertical);
    if chord >= 2.0 * radius {
        return std::f64::consts::PI * radius;
    }
    2.0 * radius * (chord / (2.0 * radius)).asin()
}
