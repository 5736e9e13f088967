pub mod cell;
pub mod dynamic_tree;
pub mod grid;
pub mod grid_index;
pub mod hooks;
pub mod manager;
pub mod map;
pub mod move_list;
pub mod position;
pub mod respawn;
pub mod rng;
pub mod spawn_group;
pub mod terrain;
pub mod time;
pub mod updates;
pub mod weather;
