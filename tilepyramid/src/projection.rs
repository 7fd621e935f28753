//! Coordinate conversions between geographic, world, tile, pixel and screen space.
//!
//! All functions are pure. World coordinates are normalized to `[0, 1]` on
//! both axes independent of zoom; tile coordinates scale world coordinates by
//! [`world_size`] for a (possibly fractional) zoom level.
//!
//! Latitudes at or beyond the poles are undefined for both projections;
//! callers clamp with [`clamp_latitude`] first.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::coord::{GeoPoint, ScreenPoint, TilePoint, WorldPoint};
use crate::geodesic::WGS84;
use crate::map::Projection;

/// Convergence tolerance (radians) for the ellipsoidal inverse latitude.
pub const INVERSE_TOLERANCE: f64 = 1e-8;

/// Iteration cap for the ellipsoidal inverse latitude.
pub const MAX_INVERSE_ITERATIONS: usize = 32;

/// Width and height of the tile grid, in tiles, at zoom `z`.
///
/// Fractional zoom levels interpolate linearly between the power-of-two grids
/// of the neighbouring integer levels: `2^(floor(z) - 1) * (1 + frac(z))`.
#[inline]
pub fn world_size(z: f64) -> f64 {
    let whole = z.floor();
    2.0_f64.powi(whole as i32 - 1) * (1.0 + (z - whole))
}

/// Projects a geographic point into normalized world space.
pub fn geo_to_world(point: GeoPoint, projection: Projection) -> WorldPoint {
    let x = (point.lon + 180.0) / 360.0;
    let phi = point.lat.to_radians();
    let mercator = match projection {
        Projection::Spherical => phi.tan().asinh(),
        Projection::Ellipsoidal => {
            let e = WGS84.eccentricity();
            let es = e * phi.sin();
            ((FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).ln()
        }
    };
    WorldPoint {
        x,
        y: (1.0 - mercator / PI) / 2.0,
    }
}

/// Inverse of [`geo_to_world`].
///
/// The ellipsoidal inverse is a fixed-point iteration that stops once the
/// latitude changes by less than [`INVERSE_TOLERANCE`] or after
/// [`MAX_INVERSE_ITERATIONS`] steps.
pub fn world_to_geo(point: WorldPoint, projection: Projection) -> GeoPoint {
    let lon = point.x * 360.0 - 180.0;
    let mercator = PI * (1.0 - 2.0 * point.y);
    let phi = match projection {
        Projection::Spherical => mercator.sinh().atan(),
        Projection::Ellipsoidal => {
            let e = WGS84.eccentricity();
            let ts = (-mercator).exp();
            let mut phi = FRAC_PI_2 - 2.0 * ts.atan();
            for _ in 0..MAX_INVERSE_ITERATIONS {
                let es = e * phi.sin();
                let next = FRAC_PI_2 - 2.0 * (ts * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
                let delta = (next - phi).abs();
                phi = next;
                if delta < INVERSE_TOLERANCE {
                    break;
                }
            }
            phi
        }
    };
    GeoPoint {
        lat: phi.to_degrees(),
        lon,
    }
}

/// Scales a world point to tile units at zoom `z`.
#[inline]
pub fn world_to_tile(point: WorldPoint, z: f64) -> TilePoint {
    let size = world_size(z);
    TilePoint {
        x: point.x * size,
        y: point.y * size,
    }
}

/// Inverse of [`world_to_tile`].
#[inline]
pub fn tile_to_world(point: TilePoint, z: f64) -> WorldPoint {
    let size = world_size(z);
    WorldPoint {
        x: point.x / size,
        y: point.y / size,
    }
}

/// Converts a geographic point straight to tile units.
pub fn geo_to_tile(point: GeoPoint, projection: Projection, z: f64) -> TilePoint {
    world_to_tile(geo_to_world(point, projection), z)
}

/// Converts tile units to pixels for tiles of `tile_size` pixels.
#[inline]
pub fn tile_to_pixel(point: TilePoint, tile_size: u32) -> (f64, f64) {
    (point.x * tile_size as f64, point.y * tile_size as f64)
}

/// Inverse of [`tile_to_pixel`].
#[inline]
pub fn pixel_to_tile(px: f64, py: f64, tile_size: u32) -> TilePoint {
    TilePoint {
        x: px / tile_size as f64,
        y: py / tile_size as f64,
    }
}

/// Largest latitude (degrees) the projection can represent inside `[0, 1]`.
pub fn max_latitude(projection: Projection) -> f64 {
    world_to_geo(WorldPoint::new(0.0, 0.0), projection).lat
}

/// Clamps a latitude into the band the projection maps onto the world square.
pub fn clamp_latitude(lat: f64, projection: Projection) -> f64 {
    let limit = max_latitude(projection);
    lat.clamp(-limit, limit)
}

/// Fixed screen/world pairing used to convert between tile and screen space.
///
/// A renderer picks one anchor per frame (usually the viewport centre and the
/// world point under it) so that the geo/world step runs once per frame rather
/// than once per tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenAnchor {
    pub screen: ScreenPoint,
    pub world: WorldPoint,
    pub zoom: f64,
    pub tile_size: u32,
}

impl ScreenAnchor {
    pub fn new(screen: ScreenPoint, world: WorldPoint, zoom: f64, tile_size: u32) -> Self {
        Self {
            screen,
            world,
            zoom,
            tile_size,
        }
    }

    /// The anchor's world point in tile units.
    pub fn anchor_tile(&self) -> TilePoint {
        world_to_tile(self.world, self.zoom)
    }

    pub fn tile_to_screen(&self, point: TilePoint) -> ScreenPoint {
        let anchor = self.anchor_tile();
        let scale = self.tile_size as f64;
        ScreenPoint {
            x: self.screen.x + (point.x - anchor.x) * scale,
            y: self.screen.y + (point.y - anchor.y) * scale,
        }
    }

    pub fn screen_to_tile(&self, point: ScreenPoint) -> TilePoint {
        let anchor = self.anchor_tile();
        let scale = self.tile_size as f64;
        TilePoint {
            x: anchor.x + (point.x - self.screen.x) / scale,
            y: anchor.y + (point.y - self.screen.y) / scale,
        }
    }

    pub fn world_to_screen(&self, point: WorldPoint) -> ScreenPoint {
        self.tile_to_screen(world_to_tile(point, self.zoom))
    }

    pub fn screen_to_world(&self, point: ScreenPoint) -> WorldPoint {
        tile_to_world(self.screen_to_tile(point), self.zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_size_integer_levels() {
        assert_eq!(world_size(1.0), 1.0);
        assert_eq!(world_size(2.0), 2.0);
        assert_eq!(world_size(11.0), 1024.0);
    }

    #[test]
    fn test_world_size_fractional_interpolates() {
        assert_eq!(world_size(3.5), 6.0);
        assert!(world_size(3.999) < world_size(4.0));
        assert!(world_size(3.0) < world_size(3.25));
    }

    #[test]
    fn test_origin_maps_to_world_center() {
        for projection in [Projection::Spherical, Projection::Ellipsoidal] {
            let world = geo_to_world(GeoPoint::new(0.0, 0.0), projection);
            assert!((world.x - 0.5).abs() < 1e-12);
            assert!((world.y - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ellipsoidal_differs_from_spherical() {
        let point = GeoPoint::new(60.0, 30.0);
        let sphere = geo_to_world(point, Projection::Spherical);
        let ellipsoid = geo_to_world(point, Projection::Ellipsoidal);
        assert_eq!(sphere.x, ellipsoid.x);
        assert!((sphere.y - ellipsoid.y).abs() > 1e-4);
    }

    #[test]
    fn test_max_latitude() {
        assert!((max_latitude(Projection::Spherical) - 85.051_128_78).abs() < 1e-6);
        let ellipsoidal = max_latitude(Projection::Ellipsoidal);
        assert!(ellipsoidal > 85.08 && ellipsoidal < 85.09);
        assert_eq!(clamp_latitude(89.0, Projection::Spherical), max_latitude(Projection::Spherical));
        assert_eq!(clamp_latitude(-10.0, Projection::Ellipsoidal), -10.0);
    }

    #[test]
    fn test_new_york_tile_at_zoom_17() {
        // zoom 17 here has the same 65536-tile grid as zoom 16 elsewhere
        let tile = geo_to_tile(GeoPoint::new(40.7128, -74.0060), Projection::Spherical, 17.0);
        assert_eq!(tile.x.floor() as u32, 19295);
        assert_eq!(tile.y.floor() as u32, 24640);
    }

    #[test]
    fn test_screen_anchor_round_trip() {
        let world = geo_to_world(GeoPoint::new(48.85, 2.35), Projection::Spherical);
        let anchor = ScreenAnchor::new(ScreenPoint::new(400.0, 300.0), world, 12.3, 256);

        assert_eq!(anchor.world_to_screen(world), ScreenPoint::new(400.0, 300.0));

        let screen = ScreenPoint::new(17.0, 590.5);
        let back = anchor.tile_to_screen(anchor.screen_to_tile(screen));
        assert!((back.x - screen.x).abs() < 1e-9);
        assert!((back.y - screen.y).abs() < 1e-9);
    }

    #[test]
    fn test_screen_anchor_one_tile_is_tile_size_pixels() {
        let anchor = ScreenAnchor::new(
            ScreenPoint::new(0.0, 0.0),
            WorldPoint::new(0.5, 0.5),
            5.0,
            256,
        );
        let origin = anchor.anchor_tile();
        let shifted = anchor.tile_to_screen(TilePoint::new(origin.x + 1.0, origin.y - 2.0));
        assert_eq!(shifted, ScreenPoint::new(256.0, -512.0));
    }

    #[test]
    fn test_pixel_conversion() {
        let (px, py) = tile_to_pixel(TilePoint::new(1.5, 2.0), 256);
        assert_eq!((px, py), (384.0, 512.0));
        assert_eq!(pixel_to_tile(px, py, 256), TilePoint::new(1.5, 2.0));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_spherical_round_trip(
                lat in -85.0..85.0_f64,
                lon in -180.0..180.0_f64,
            ) {
                let back = world_to_geo(geo_to_world(GeoPoint::new(lat, lon), Projection::Spherical), Projection::Spherical);
                prop_assert!((back.lat - lat).abs() < 1e-6, "lat {} -> {}", lat, back.lat);
                prop_assert!((back.lon - lon).abs() < 1e-6, "lon {} -> {}", lon, back.lon);
            }

            #[test]
            fn test_ellipsoidal_round_trip(
                lat in -85.0..85.0_f64,
                lon in -180.0..180.0_f64,
            ) {
                let back = world_to_geo(geo_to_world(GeoPoint::new(lat, lon), Projection::Ellipsoidal), Projection::Ellipsoidal);
                prop_assert!((back.lat - lat).abs() < 1e-6, "lat {} -> {}", lat, back.lat);
                prop_assert!((back.lon - lon).abs() < 1e-6, "lon {} -> {}", lon, back.lon);
            }

            #[test]
            fn test_tile_round_trip_at_integer_zoom(
                lat in -85.0..85.0_f64,
                lon in -180.0..180.0_f64,
                z in 1u8..=20,
            ) {
                for projection in [Projection::Spherical, Projection::Ellipsoidal] {
                    let world = geo_to_world(GeoPoint::new(lat, lon), projection);
                    let tile = world_to_tile(world, z as f64);
                    let back = world_to_geo(tile_to_world(tile, z as f64), projection);
                    prop_assert!((back.lat - lat).abs() < 1e-6);
                    prop_assert!((back.lon - lon).abs() < 1e-6);
                }
            }

            #[test]
            fn test_world_size_doubles(z in 1u8..=29) {
                let z = z as f64;
                prop_assert_eq!(world_size(z + 1.0), 2.0 * world_size(z));
            }
        }
    }
}
