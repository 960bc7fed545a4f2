//! Collision queries consumed by the movement validators.
//!
//! The validators only ever ask "is this region free"; world storage stays
//! behind [`CollisionOracle`]. [`BoxWorld`] is the in-tree implementation used
//! by the server binary and the tests.

use shared::{Aabb, BlockPos, Vec3};

/// Answers whether a volume of the world is obstructed.
pub trait CollisionOracle {
    /// True if any solid shape intersects `region`.
    fn is_obstructed(&self, region: &Aabb) -> bool;

    /// True if any fluid intersects `region`.
    fn contains_fluid(&self, _region: &Aabb) -> bool {
        false
    }
}

/// A region that sends whoever steps into it to another dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portal {
    pub region: Aabb,
    pub dimension: u32,
    /// Where the traveller arrives.
    pub exit: Vec3,
}

/// A world made of solid and fluid boxes, plus portals.
#[derive(Debug, Clone, Default)]
pub struct BoxWorld {
    solids: Vec<Aabb>,
    fluids: Vec<Aabb>,
    portals: Vec<Portal>,
}

impl BoxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A square slab whose top face is at `floor_y`, extending `half_extent`
    /// blocks from the origin on X and Z.
    pub fn flat(floor_y: f64, half_extent: f64) -> Self {
        let mut world = Self::new();
        world.add_solid(Aabb::new(
            Vec3::new(-half_extent, floor_y - 1.0, -half_extent),
            Vec3::new(half_extent, floor_y, half_extent),
        ));
        world
    }

    pub fn add_solid(&mut self, aabb: Aabb) {
        self.solids.push(aabb);
    }

    pub fn add_fluid(&mut self, aabb: Aabb) {
        self.fluids.push(aabb);
    }

    pub fn add_portal(&mut self, portal: Portal) {
        self.portals.push(portal);
    }

    /// First portal overlapping `region`.
    pub fn portal_at(&self, region: &Aabb) -> Option<&Portal> {
        self.portals
            .iter()
            .find(|portal| portal.region.intersects(region))
    }

    pub fn add_block(&mut self, pos: BlockPos) {
        if !self.has_block(pos) {
            self.solids.push(pos.bounds());
        }
    }

    /// Removes the unit block at `pos`. Returns false if there was none.
    pub fn remove_block(&mut self, pos: BlockPos) -> bool {
        let bounds = pos.bounds();
        let before = self.solids.len();
        self.solids.retain(|solid| *solid != bounds);
        self.solids.len() != before
    }

    pub fn has_block(&self, pos: BlockPos) -> bool {
        let bounds = pos.bounds();
        self.solids.iter().any(|solid| *solid == bounds)
    }

    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }
}

impl CollisionOracle for BoxWorld {
    fn is_obstructed(&self, region: &Aabb) -> bool {
        self.solids.iter().any(|solid| solid.intersects(region))
    }

    fn contains_fluid(&self, region: &Aabb) -> bool {
        self.fluids.iter().any(|fluid| fluid.intersects(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_world_floor() {
        let world = BoxWorld::flat(64.0, 100.0);
        let standing = Aabb::from_feet(Vec3::new(0.0, 64.0, 0.0), 0.6, 1.8);
        let sunk = Aabb::from_feet(Vec3::new(0.0, 63.5, 0.0), 0.6, 1.8);

        assert!(!world.is_obstructed(&standing));
        assert!(world.is_obstructed(&sunk));
    }

    #[test]
    fn test_add_and_remove_block() {
        let mut world = BoxWorld::new();
        let pos = BlockPos::new(2, 64, 2);

        world.add_block(pos);
        world.add_block(pos);
        assert_eq!(world.solid_count(), 1);
        assert!(world.has_block(pos));
        assert!(world.is_obstructed(&Aabb::from_feet(Vec3::new(2.5, 64.0, 2.5), 0.6, 1.8)));

        assert!(world.remove_block(pos));
        assert!(!world.remove_block(pos));
        assert!(!world.has_block(pos));
    }

    #[test]
    fn test_fluid_query_is_separate_from_solids() {
        let mut world = BoxWorld::new();
        world.add_fluid(Aabb::new(Vec3::new(0.0, 60.0, 0.0), Vec3::new(10.0, 64.0, 10.0)));

        let inside = Aabb::from_feet(Vec3::new(5.0, 62.0, 5.0), 1.0, 1.0);
        assert!(world.contains_fluid(&inside));
        assert!(!world.is_obstructed(&inside));
    }

    #[test]
    fn test_portal_lookup() {
        let mut world = BoxWorld::new();
        world.add_portal(Portal {
            region: BlockPos::new(5, 64, 0).bounds(),
            dimension: 1,
            exit: Vec3::new(100.0, 64.0, 0.0),
        });

        let inside = Aabb::from_feet(Vec3::new(5.5, 64.0, 0.5), 0.6, 1.8);
        let outside = Aabb::from_feet(Vec3::new(0.5, 64.0, 0.5), 0.6, 1.8);
        assert_eq!(world.portal_at(&inside).map(|p| p.dimension), Some(1));
        assert!(world.portal_at(&outside).is_none());
        assert!(!world.is_obstructed(&inside));
    }
}
