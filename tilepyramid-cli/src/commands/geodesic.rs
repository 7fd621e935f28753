//! `inverse` and `direct` commands: geodesic problems on WGS84.

use clap::Args;
use tilepyramid::geodesic::{direct, fast_distance, inverse};
use tilepyramid::GeoPoint;

use super::common::format_point;
use crate::error::CliError;

#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct InverseArgs {
    /// Latitude of the first point
    pub lat1: f64,
    /// Longitude of the first point
    pub lon1: f64,
    /// Latitude of the second point
    pub lat2: f64,
    /// Longitude of the second point
    pub lon2: f64,
    /// Convergence tolerance in meters
    #[arg(long, default_value_t = 0.1)]
    pub eps: f64,
}

#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct DirectArgs {
    /// Latitude of the start point
    pub lat: f64,
    /// Longitude of the start point
    pub lon: f64,
    /// Initial azimuth in degrees from north
    pub azimuth: f64,
    /// Distance in meters
    pub distance: f64,
}

fn check_latitude(lat: f64) -> Result<(), CliError> {
    if lat.is_finite() && lat.abs() <= 90.0 {
        Ok(())
    } else {
        Err(CliError::Config(format!("latitude {} is outside [-90, 90]", lat)))
    }
}

pub fn run_inverse(args: InverseArgs) -> Result<(), CliError> {
    check_latitude(args.lat1)?;
    check_latitude(args.lat2)?;
    if args.eps.is_nan() || args.eps <= 0.0 {
        return Err(CliError::Config("--eps must be positive".to_string()));
    }
    let p1 = GeoPoint::new(args.lat1, args.lon1);
    let p2 = GeoPoint::new(args.lat2, args.lon2);

    let solution = inverse(p1, p2, args.eps);
    let fast = fast_distance(p1, p2);

    println!("From:          {}", format_point(p1.lat, p1.lon));
    println!("To:            {}", format_point(p2.lat, p2.lon));
    println!("Distance:      {:.3} m", solution.distance);
    println!("Azimuth:       {:.6}°", solution.azimuth1);
    println!("Back azimuth:  {:.6}°", solution.azimuth2);
    println!(
        "Iterations:    {}{}",
        solution.iterations,
        if solution.converged { "" } else { " (not converged, best estimate)" }
    );
    println!(
        "Fast distance: {:.3} m ({:+.3} m)",
        fast,
        fast - solution.distance
    );
    Ok(())
}

pub fn run_direct(args: DirectArgs) -> Result<(), CliError> {
    check_latitude(args.lat)?;
    let start = GeoPoint::new(args.lat, args.lon);
    let solution = direct(start, args.azimuth, args.distance);

    println!("From:          {}", format_point(start.lat, start.lon));
    println!("Destination:   {}", format_point(solution.point.lat, solution.point.lon));
    println!("Back azimuth:  {:.6}°", solution.reverse_azimuth);
    Ok(())
}
