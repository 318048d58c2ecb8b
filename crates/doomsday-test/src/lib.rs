//! Test fixtures for the Doomsday engine.
//!
//! Provides deterministic synthetic maps and a GL driver that records what
//! it was asked to do.

pub mod driver;
pub mod fixtures;

pub use driver::{DriverEvent, RecordingDriver};
pub use fixtures::{
    build_tree, door_rooms, l_shape, nested_diamond, polyobj_room, room_grid, square_room,
    window_rooms, GRID_CELL,
};
