pub mod checkpoints;
pub mod events;
pub mod phases;
