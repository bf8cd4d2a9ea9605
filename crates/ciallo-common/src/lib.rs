//! # Ciallo Common
//!
//! Common types shared by the ciallo crates:
//! - Surface-space geometry (`Rect`)
//! - Particle identifiers
//! - Error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_particle_id_generation() {
        let id1 = ParticleId::new();
        let id2 = ParticleId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!ParticleId::NULL.is_valid());
    }

    #[test]
    fn test_rect_contains_point_inclusive() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(rect.contains_point(0.0, 0.0));
        assert!(rect.contains_point(100.0, 100.0));
        assert!(!rect.contains_point(-0.5, 50.0));
        assert!(!rect.contains_point(50.0, 100.5));
    }

    #[test]
    fn test_rect_intersects_touching() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 10.0, 5.0, 5.0);
        let c = Rect::new(11.0, 0.0, 5.0, 5.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&Rect::point(5.0, 5.0)));
    }

    #[test]
    fn test_rect_union_and_inflate() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(-5.0, 20.0, 5.0, 5.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(-5.0, 0.0, 15.0, 25.0));
        assert!(u.contains(&a));
        assert!(u.contains(&b));

        let grown = a.inflate(1.0);
        assert_eq!(grown, Rect::new(-1.0, -1.0, 12.0, 12.0));
    }

    proptest! {
        #[test]
        fn prop_contained_point_intersects(
            x in -500.0f32..500.0,
            y in -500.0f32..500.0,
            w in 0.0f32..200.0,
            h in 0.0f32..200.0,
            fx in 0.0f32..=1.0,
            fy in 0.0f32..=1.0,
        ) {
            let rect = Rect::new(x, y, w, h);
            let px = (x + w * fx).min(rect.right());
            let py = (y + h * fy).min(rect.bottom());
            prop_assert!(rect.contains_point(px, py));
            prop_assert!(rect.intersects(&Rect::point(px, py)));
        }
    }
}
