//! # ALICE-Physics2D
//!
//! **Deterministic Fixed-Point 2D Rigid Body Engine**
//!
//! A constraint-based rigid body simulator on Q32.32 fixed-point arithmetic.
//! The same scene stepped with the same inputs produces bit-identical
//! results on every platform.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Fix64** | Q32.32 scalar with saturating arithmetic and CORDIC trig |
//! | **Broad Phase** | Dynamic AABB tree with fat bounds and a move buffer |
//! | **Narrow Phase** | Circle / polygon / edge manifolds with persistent feature ids |
//! | **Solver** | Island sequential impulses with warm starting and block solving |
//! | **Joints** | Distance, revolute, prismatic, weld, wheel, gear, pulley, rope, motor, friction, mouse, angle |
//! | **CCD** | Conservative advancement time of impact with TOI sub-steps |
//! | **Sleeping** | Per-island rest detection |
//! | **Controllers** | Velocity limits, point and body gravity, user controllers |
//!
//! ## Design Principles
//!
//! - **Deterministic**: no floats in the simulation path, stable iteration order
//! - **Deferred changes**: bodies and joints enter and leave between steps
//! - **no_std Compatible**: `alloc` is enough without the `std` feature
//! - **Parallel islands**: islands solve in parallel with the `parallel` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use alice_physics2d::prelude::*;
//!
//! let mut world = World::new(SolverConfig::default());
//!
//! let ground = world.create_body(BodyDef::default());
//! world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(Fix64::from_int(10), Fix64::ONE)));
//!
//! let ball = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::from_int(0, 5)));
//! world.create_fixture(ball, FixtureDef::new(CircleShape::new(Fix64::HALF)).with_density(Fix64::ONE));
//!
//! let dt = Fix64::from_ratio(1, 60);
//! for _ in 0..120 {
//!     world.step(dt);
//! }
//! assert!(world.body(ball).position().y < Fix64::from_int(5));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod body;
pub mod breakable;
pub mod broad_phase;
pub mod collide;
pub mod collision;
pub mod contact;
pub mod contact_manager;
pub mod contact_solver;
pub mod controller;
pub mod distance;
pub mod dynamic_tree;
pub mod error;
pub mod event;
pub mod filter;
pub mod fixture;
pub mod island;
pub mod joint;
pub mod math;
pub mod pool;
pub mod profiling;
pub mod settings;
pub mod shape;
pub mod toi;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::body::{Body, BodyDef, BodyType};
    pub use crate::breakable::BreakableBody;
    pub use crate::collision::{Aabb, Manifold, RayCastInput, RayCastOutput, WorldManifold};
    pub use crate::contact::Contact;
    pub use crate::controller::{Controller, GravityController, GravityFalloff, VelocityLimitController};
    pub use crate::error::PhysicsError;
    pub use crate::event::{ContactImpulse, ContactListener, WorldEvent};
    pub use crate::filter::Filter;
    pub use crate::fixture::{Fixture, FixtureDef};
    pub use crate::joint::{
        AngleJoint, DistanceJoint, FrictionJoint, GearJoint, Joint, JointDef, JointKind, JointType,
        MotorJoint, MouseJoint, PrismaticJoint, PulleyJoint, RevoluteJoint, RopeJoint, WeldJoint,
        WheelJoint,
    };
    pub use crate::math::{Fix64, Rot, Sweep, Transform, Vec2Fix};
    pub use crate::pool::{BodyId, ContactId, ControllerId, FixtureId, JointId};
    pub use crate::profiling::{StepProfile, StepStats};
    pub use crate::settings::SolverConfig;
    pub use crate::shape::{CircleShape, EdgeShape, MassData, PolygonShape, Shape};
    pub use crate::world::{RayHit, World};
}

// Re-export main types at crate root
pub use prelude::*;

// ============================================================================
// Integration Tests
// ============================================================================
