pub mod layout;
pub mod roster;
