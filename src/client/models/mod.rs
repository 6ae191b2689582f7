pub mod events;
pub mod filters;
pub mod poll_state;
