//! Entity movement against the collision oracle.
//!
//! This is the routine the simulation uses to move any entity, and the
//! validators replay client movement through it to see where the server
//! believes the entity should end up.

use crate::collision::CollisionOracle;
use shared::{Aabb, Vec3};

/// Bisection steps when searching for the contact point along one axis.
const SWEEP_ITERATIONS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn along(self, amount: f64) -> Vec3 {
        match self {
            Axis::X => Vec3::new(amount, 0.0, 0.0),
            Axis::Y => Vec3::new(0.0, amount, 0.0),
            Axis::Z => Vec3::new(0.0, 0.0, amount),
        }
    }
}

/// Outcome of moving a box through the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveResult {
    /// Displacement actually applied; differs from the request when obstructed.
    pub applied: Vec3,
    pub collided_horizontally: bool,
    pub collided_vertically: bool,
    /// The mover was stopped by something below it.
    pub landed: bool,
}

impl MoveResult {
    fn unobstructed(delta: Vec3) -> Self {
        Self {
            applied: delta,
            collided_horizontally: false,
            collided_vertically: false,
            landed: false,
        }
    }
}

/// Moves `bbox` by `delta`, stopping at the first obstruction on each axis.
///
/// Axes are resolved Y first, then the larger horizontal component, then the
/// other. A grounded mover (`step_height > 0`) that is blocked horizontally
/// may climb up to `step_height`. A box that already overlaps a solid moves
/// freely.
pub fn move_entity<W: CollisionOracle + ?Sized>(
    world: &W,
    bbox: Aabb,
    delta: Vec3,
    step_height: f64,
) -> MoveResult {
    if delta == Vec3::ZERO || world.is_obstructed(&bbox) {
        return MoveResult::unobstructed(delta);
    }

    let mut applied = collide(world, bbox, delta);
    let collided_vertically = applied.y != delta.y;
    let landed = collided_vertically && delta.y < 0.0;
    let mut collided_horizontally = applied.x != delta.x || applied.z != delta.z;

    if step_height > 0.0 && collided_horizontally && (landed || delta.y <= 0.0) {
        let stepped = step_up(world, bbox, delta, step_height);
        if stepped.horizontal_length_sqr() > applied.horizontal_length_sqr() {
            collided_horizontally = stepped.x != delta.x || stepped.z != delta.z;
            applied = stepped;
        }
    }

    MoveResult {
        applied,
        collided_horizontally,
        collided_vertically,
        landed,
    }
}

fn collide<W: CollisionOracle + ?Sized>(world: &W, bbox: Aabb, delta: Vec3) -> Vec3 {
    let mut current = bbox;

    let dy = sweep_axis(world, &current, Axis::Y, delta.y);
    current = current.offset(Axis::Y.along(dy));

    let (first, second) = if delta.x.abs() < delta.z.abs() {
        ((Axis::Z, delta.z), (Axis::X, delta.x))
    } else {
        ((Axis::X, delta.x), (Axis::Z, delta.z))
    };

    let first_moved = sweep_axis(world, &current, first.0, first.1);
    current = current.offset(first.0.along(first_moved));
    let second_moved = sweep_axis(world, &current, second.0, second.1);

    let mut result = Vec3::new(0.0, dy, 0.0);
    for (axis, moved) in [(first.0, first_moved), (second.0, second_moved)] {
        match axis {
            Axis::X => result.x = moved,
            Axis::Z => result.z = moved,
            Axis::Y => {}
        }
    }
    result
}

fn step_up<W: CollisionOracle + ?Sized>(
    world: &W,
    bbox: Aabb,
    delta: Vec3,
    step_height: f64,
) -> Vec3 {
    let up = sweep_axis(world, &bbox, Axis::Y, step_height);
    let lifted = bbox.offset(Axis::Y.along(up));
    let horizontal = collide(world, lifted, Vec3::new(delta.x, 0.0, delta.z));
    let moved = lifted.offset(horizontal);
    let down = sweep_axis(world, &moved, Axis::Y, -up + delta.y.min(0.0));
    Vec3::new(horizontal.x, up + down, horizontal.z)
}

/// Largest portion of `amount` the box can travel along `axis` without its
/// swept volume touching a solid.
pub fn sweep_axis<W: CollisionOracle + ?Sized>(
    world: &W,
    bbox: &Aabb,
    axis: Axis,
    amount: f64,
) -> f64 {
    if amount == 0.0 {
        return 0.0;
    }
    if !world.is_obstructed(&bbox.expand_towards(axis.along(amount))) {
        return amount;
    }

    let (mut free, mut blocked) = (0.0_f64, 1.0_f64);
    for _ in 0..SWEEP_ITERATIONS {
        let mid = (free + blocked) / 2.0;
        if world.is_obstructed(&bbox.expand_towards(axis.along(amount * mid))) {
            blocked = mid;
        } else {
            free = mid;
        }
    }
    amount * free
}

/// True if nothing solid or fluid touches the box, its sides, or a slab
/// just below it.
pub fn no_blocks_around<W: CollisionOracle + ?Sized>(world: &W, bbox: &Aabb) -> bool {
    let surroundings = bbox
        .inflate(0.0625, 0.0, 0.0625)
        .expand_towards(Vec3::new(0.0, -0.55, 0.0));
    !world.is_obstructed(&surroundings) && !world.contains_fluid(&surroundings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::BoxWorld;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BlockPos, PLAYER_HEIGHT, PLAYER_WIDTH, STEP_HEIGHT};

    fn player_box(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::from_feet(Vec3::new(x, y, z), PLAYER_WIDTH, PLAYER_HEIGHT)
    }

    #[test]
    fn test_free_movement_is_unchanged() {
        let world = BoxWorld::flat(64.0, 100.0);
        let result = move_entity(&world, player_box(0.0, 64.0, 0.0), Vec3::new(0.1, 0.0, 0.0), 0.0);

        assert_eq!(result.applied, Vec3::new(0.1, 0.0, 0.0));
        assert!(!result.collided_horizontally);
        assert!(!result.landed);
    }

    #[test]
    fn test_floor_stops_fall() {
        let world = BoxWorld::flat(64.0, 100.0);
        let result = move_entity(&world, player_box(0.0, 64.5, 0.0), Vec3::new(0.0, -2.0, 0.0), 0.0);

        assert_approx_eq!(result.applied.y, -0.5, 1e-5);
        assert!(result.collided_vertically);
        assert!(result.landed);
    }

    #[test]
    fn test_wall_blocks_horizontal_movement() {
        let mut world = BoxWorld::flat(64.0, 100.0);
        world.add_block(BlockPos::new(1, 64, 0));
        world.add_block(BlockPos::new(1, 65, 0));

        let result = move_entity(&world, player_box(0.5, 64.0, 0.5), Vec3::new(1.0, 0.0, 0.0), 0.0);

        // Box edge starts at 0.8 and the wall face is at 1.0.
        assert_approx_eq!(result.applied.x, 0.2, 1e-5);
        assert!(result.collided_horizontally);
    }

    #[test]
    fn test_thin_wall_is_not_tunnelled() {
        let mut world = BoxWorld::new();
        world.add_solid(Aabb::new(Vec3::new(5.0, 0.0, -5.0), Vec3::new(5.1, 10.0, 5.0)));

        let result = move_entity(&world, player_box(0.0, 1.0, 0.0), Vec3::new(20.0, 0.0, 0.0), 0.0);
        assert!(result.applied.x < 5.0);
        assert!(result.collided_horizontally);
    }

    #[test]
    fn test_step_up_single_block_edge() {
        let mut world = BoxWorld::flat(64.0, 100.0);
        world.add_solid(Aabb::new(Vec3::new(1.0, 64.0, -5.0), Vec3::new(3.0, 64.5, 5.0)));

        let result = move_entity(
            &world,
            player_box(0.5, 64.0, 0.5),
            Vec3::new(0.6, 0.0, 0.0),
            STEP_HEIGHT,
        );

        assert_approx_eq!(result.applied.x, 0.6, 1e-5);
        assert_approx_eq!(result.applied.y, 0.5, 1e-5);
    }

    #[test]
    fn test_no_step_up_without_step_height() {
        let mut world = BoxWorld::flat(64.0, 100.0);
        world.add_solid(Aabb::new(Vec3::new(1.0, 64.0, -5.0), Vec3::new(3.0, 64.5, 5.0)));

        let result = move_entity(&world, player_box(0.5, 64.0, 0.5), Vec3::new(0.6, 0.0, 0.0), 0.0);
        assert!(result.applied.x < 0.25);
    }

    #[test]
    fn test_already_obstructed_box_moves_freely() {
        let mut world = BoxWorld::new();
        world.add_block(BlockPos::new(0, 64, 0));

        let result = move_entity(&world, player_box(0.5, 64.0, 0.5), Vec3::new(0.0, 1.0, 0.0), 0.0);
        assert_eq!(result.applied, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_no_blocks_around() {
        let world = BoxWorld::flat(64.0, 100.0);
        assert!(!no_blocks_around(&world, &player_box(0.0, 64.0, 0.0)));
        assert!(!no_blocks_around(&world, &player_box(0.0, 64.5, 0.0)));
        assert!(no_blocks_around(&world, &player_box(0.0, 66.0, 0.0)));
    }
}
